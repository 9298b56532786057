use std::fmt::Display;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error("invalid identifier `{value}`: {reason}")]
    InvalidId { value: String, reason: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn invalid_id(value: impl Into<String>, reason: impl Display) -> Self {
        Self::InvalidId {
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Context helpers ──────────────────────────────────────────────────────────

/// Error types that can be built from a plain message.
///
/// Crates implement this for their own `Error` and then call
/// [`impl_context!`] in their error module.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;

    /// `"<context>: <source>"`, the shape every `.context()` error takes.
    fn with_source(context: impl Into<String>, source: impl Display) -> Self {
        Self::from_message(format!("{}: {source}", context.into()))
    }
}

/// Define a crate-local `Context` trait adding `.context()` and
/// `.with_context()` to `Result` and `Option`.
///
/// The invoking module must have `Error: FromMessage` and a `Result<T>` alias
/// in scope:
///
/// ```ignore
/// // crates/store/src/error.rs
/// topicbridge_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.map_err(|source| <Error as $crate::FromMessage>::with_source(context, source))
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|source| <Error as $crate::FromMessage>::with_source(f(), source))
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
