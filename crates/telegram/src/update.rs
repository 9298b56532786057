//! Webhook update decoding.
//!
//! Only the fields the relay routes on are modelled; everything else in the
//! payload is ignored. The relay moves messages by id, so a message must
//! still decode when it carries a kind or field shape newer than the pinned
//! `teloxide::types`, which would reject the whole message.

use {
    serde::Deserialize,
    serde_json::{Map, Value},
    topicbridge_common::types::{ChatId, MessageId, ThreadId, UserId},
    topicbridge_relay::{ChatKind, Content, InboundEvent, MediaKind, Sender},
};

/// Message payload keys the relay passes through without grouping.
const PASSTHROUGH_KINDS: &[&str] = &[
    "sticker",
    "voice",
    "audio",
    "video_note",
    "animation",
    "location",
    "venue",
    "contact",
    "poll",
    "dice",
];

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

impl Update {
    /// The relay event carried by this update. Only new messages are relayed;
    /// edits, channel posts and callbacks yield `None`.
    pub fn into_event(self) -> Option<InboundEvent> {
        self.message.map(Message::into_event)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: ChatType,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i32,
    pub chat: Chat,
    pub message_thread_id: Option<i32>,
    pub from: Option<User>,
    pub media_group_id: Option<String>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Available sizes, smallest first.
    #[serde(default)]
    pub photo: Vec<FileRef>,
    pub video: Option<FileRef>,
    pub document: Option<FileRef>,
    pub forum_topic_closed: Option<Value>,
    pub forum_topic_reopened: Option<Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Message {
    fn content(&mut self) -> Content {
        if self.forum_topic_closed.is_some() {
            return Content::ThreadClosed;
        }
        if self.forum_topic_reopened.is_some() {
            return Content::ThreadReopened;
        }

        let caption = self.caption.take().unwrap_or_default();
        let media = if let Some(largest) = self.photo.pop() {
            Some((MediaKind::Photo, largest))
        } else if let Some(video) = self.video.take() {
            Some((MediaKind::Video, video))
        } else {
            self.document.take().map(|doc| (MediaKind::Document, doc))
        };
        if let Some((kind, file)) = media {
            return Content::Media {
                kind,
                media_ref: file.file_id,
                caption,
            };
        }

        if let Some(text) = self.text.take() {
            return Content::Text(text);
        }
        let label = PASSTHROUGH_KINDS
            .iter()
            .find(|kind| self.rest.contains_key(**kind))
            .copied()
            .unwrap_or("other");
        Content::Unsupported {
            label: label.to_string(),
        }
    }

    pub fn into_event(mut self) -> InboundEvent {
        let content = self.content();
        InboundEvent {
            chat_id: ChatId(self.chat.id),
            chat_kind: match self.chat.kind {
                ChatType::Private => ChatKind::Private,
                ChatType::Group => ChatKind::Group,
                ChatType::Supergroup => ChatKind::Supergroup,
                ChatType::Channel => ChatKind::Channel,
            },
            thread_id: self.message_thread_id.map(ThreadId),
            message_id: MessageId(self.message_id),
            sender: self.from.map(|user| Sender {
                id: UserId(user.id),
                is_bot: user.is_bot,
                first_name: user.first_name,
                last_name: user.last_name,
                username: user.username,
            }),
            media_group_id: self.media_group_id,
            content,
        }
    }
}
