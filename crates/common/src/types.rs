//! Identifier newtypes shared by the relay, the store key layout, and the
//! Telegram adapter.
//!
//! All identifiers serialize as bare numbers so stored records stay readable
//! and compatible with the messaging surface's wire format.

use {
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

use crate::Error;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<$inner>()
                    .map(Self)
                    .map_err(|e| Error::invalid_id(s, e))
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// External identity of an end-user (their private chat id).
    UserId(i64)
);

numeric_id!(
    /// A chat: a private conversation or the shared workspace.
    ChatId(i64)
);

numeric_id!(
    /// A message within a chat.
    MessageId(i32)
);

numeric_id!(
    /// Opaque handle of a conversation thread inside the workspace.
    ThreadId(i32)
);

impl From<UserId> for ChatId {
    /// A user's private chat shares the user's id.
    fn from(user: UserId) -> Self {
        Self(user.0)
    }
}
