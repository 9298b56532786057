//! Normalized inbound event record.
//!
//! Transport adapters translate their native update format into
//! [`InboundEvent`] so routing never depends on a wire format.

use {
    serde::{Deserialize, Serialize},
    topicbridge_common::types::{ChatId, MessageId, ThreadId, UserId},
};

/// Kind of chat an event arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// Author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Media kinds that can be batched into an album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

/// Payload of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// Album-capable media.
    Media {
        kind: MediaKind,
        media_ref: String,
        caption: String,
    },
    /// Anything else (stickers, voice, audio, polls...). Never buffered.
    Unsupported { label: String },
    /// The workspace closed a thread.
    ThreadClosed,
    /// The workspace reopened a thread.
    ThreadReopened,
}

/// One buffered media message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub media_ref: String,
    #[serde(default)]
    pub caption: String,
    pub source_chat: ChatId,
    pub source_message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    pub thread_id: Option<ThreadId>,
    pub message_id: MessageId,
    pub sender: Option<Sender>,
    pub media_group_id: Option<String>,
    pub content: Content,
}

impl InboundEvent {
    /// First-contact command (`/start`, any case, surrounding whitespace ignored).
    pub fn is_start_command(&self) -> bool {
        match &self.content {
            Content::Text(text) => text.trim().to_lowercase().starts_with("/start"),
            _ => false,
        }
    }

    /// The album item this event carries, if its content can be batched.
    pub fn media_item(&self) -> Option<MediaItem> {
        match &self.content {
            Content::Media {
                kind,
                media_ref,
                caption,
            } => Some(MediaItem {
                kind: *kind,
                media_ref: media_ref.clone(),
                caption: caption.clone(),
                source_chat: self.chat_id,
                source_message_id: self.message_id,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: Content) -> InboundEvent {
        InboundEvent {
            chat_id: ChatId(5),
            chat_kind: ChatKind::Private,
            thread_id: None,
            message_id: MessageId(11),
            sender: None,
            media_group_id: None,
            content,
        }
    }

    #[test]
    fn start_command_detection() {
        assert!(event(Content::Text("  /START please".into())).is_start_command());
        assert!(event(Content::Text("/start".into())).is_start_command());
        assert!(!event(Content::Text("hello /start".into())).is_start_command());
        assert!(!event(Content::ThreadClosed).is_start_command());
    }

    #[test]
    fn media_item_carries_source() {
        let item = event(Content::Media {
            kind: MediaKind::Video,
            media_ref: "vid-1".into(),
            caption: "clip".into(),
        })
        .media_item();
        assert_eq!(
            item,
            Some(MediaItem {
                kind: MediaKind::Video,
                media_ref: "vid-1".into(),
                caption: "clip".into(),
                source_chat: ChatId(5),
                source_message_id: MessageId(11),
            })
        );
        assert!(
            event(Content::Unsupported {
                label: "sticker".into()
            })
            .media_item()
            .is_none()
        );
    }
}
