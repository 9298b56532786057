//! Outbound messaging capability.
//!
//! [`MessagingGateway`] is the only way the relay talks to the messaging
//! surface. Every call either succeeds or yields a [`GatewayError`] carrying
//! the surface's machine-readable description, which the router inspects to
//! detect deleted threads.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    thiserror::Error,
    topicbridge_common::types::{ChatId, MessageId, ThreadId},
};

use crate::event::MediaKind;

/// Description fragments the surface uses when a thread has been deleted.
const THREAD_MISSING_MARKERS: &[&str] = &[
    "MESSAGE THREAD NOT FOUND",
    "MESSAGE_THREAD_NOT_FOUND",
    "THREAD_NOT_FOUND",
    "TOPIC_NOT_FOUND",
    "FORUM_TOPIC_NOT_FOUND",
];

/// A failed outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{description}")]
pub struct GatewayError {
    /// Numeric error code reported by the surface, if any.
    pub code: Option<i64>,
    pub description: String,
}

impl GatewayError {
    pub fn new(code: Option<i64>, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// A failure that never reached the surface (network, decoding).
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(None, err.to_string())
    }

    /// Whether the failure means the target thread no longer exists.
    pub fn is_thread_missing(&self) -> bool {
        let upper = self.description.to_uppercase();
        THREAD_MISSING_MARKERS
            .iter()
            .any(|marker| upper.contains(marker))
    }
}

pub type DeliveryResult<T = ()> = Result<T, GatewayError>;

/// One entry of an outbound album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMedia {
    pub kind: MediaKind,
    pub media_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, to: ChatId, text: &str) -> DeliveryResult;

    /// Forward a message, keeping its origin attribution.
    async fn forward(
        &self,
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        thread: Option<ThreadId>,
    ) -> DeliveryResult;

    /// Copy a message without origin attribution.
    async fn copy(&self, to: ChatId, from: ChatId, message_id: MessageId) -> DeliveryResult;

    /// Forward several messages from one chat as a single batch.
    async fn forward_batch(
        &self,
        to: ChatId,
        from: ChatId,
        message_ids: &[MessageId],
        thread: Option<ThreadId>,
    ) -> DeliveryResult;

    /// Send an album assembled from media references.
    async fn send_media_group(
        &self,
        to: ChatId,
        media: &[OutboundMedia],
        thread: Option<ThreadId>,
    ) -> DeliveryResult;

    /// Open a new thread in the workspace.
    async fn create_thread(&self, workspace: ChatId, title: &str) -> DeliveryResult<ThreadId>;
}
