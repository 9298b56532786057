use {
    thiserror::Error,
    topicbridge_common::types::{ThreadId, UserId},
};

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum Error {
    /// The messaging surface refused to open a thread for a new user.
    #[error("failed to create a thread for user {user_id}: {source}")]
    ThreadCreationFailed {
        user_id: UserId,
        #[source]
        source: GatewayError,
    },

    /// A stored thread no longer exists on the messaging surface.
    #[error("thread {thread_id} no longer exists: {source}")]
    ThreadMissing {
        thread_id: ThreadId,
        #[source]
        source: GatewayError,
    },

    #[error("{context}: {source}")]
    DeliveryFailed {
        context: String,
        #[source]
        source: GatewayError,
    },

    /// A media-group flush found the buffer already flushed or appended to.
    #[error("media group {key} was flushed or extended by a concurrent writer")]
    GroupFlushRaced { key: String },

    #[error(transparent)]
    Store(#[from] topicbridge_store::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn delivery(context: impl Into<String>, source: GatewayError) -> Self {
        Self::DeliveryFailed {
            context: context.into(),
            source,
        }
    }

    /// Raced flushes are expected under concurrency and need no attention.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::GroupFlushRaced { .. })
    }
}

impl topicbridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

topicbridge_common::impl_context!();
