use {
    async_trait::async_trait,
    serde::Deserialize,
    serde_json::json,
    topicbridge_common::types::{ChatId, MessageId, ThreadId},
    topicbridge_relay::{DeliveryResult, MessagingGateway, OutboundMedia},
};

use crate::api::BotApi;

#[derive(Debug, Deserialize)]
struct ForumTopic {
    message_thread_id: i32,
}

/// [`MessagingGateway`] backed by the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramGateway {
    api: BotApi,
}

impl TelegramGateway {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &BotApi {
        &self.api
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_text(&self, to: ChatId, text: &str) -> DeliveryResult {
        self.api
            .call_unit(
                "sendMessage",
                &json!({
                    "chat_id": to,
                    "text": text,
                    "disable_web_page_preview": true,
                }),
            )
            .await
    }

    async fn forward(
        &self,
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        let mut payload = json!({
            "chat_id": to,
            "from_chat_id": from,
            "message_id": message_id,
        });
        if let Some(thread) = thread {
            payload["message_thread_id"] = json!(thread);
        }
        self.api.call_unit("forwardMessage", &payload).await
    }

    async fn copy(&self, to: ChatId, from: ChatId, message_id: MessageId) -> DeliveryResult {
        self.api
            .call_unit(
                "copyMessage",
                &json!({
                    "chat_id": to,
                    "from_chat_id": from,
                    "message_id": message_id,
                }),
            )
            .await
    }

    async fn forward_batch(
        &self,
        to: ChatId,
        from: ChatId,
        message_ids: &[MessageId],
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        let mut payload = json!({
            "chat_id": to,
            "from_chat_id": from,
            "message_ids": message_ids,
        });
        if let Some(thread) = thread {
            payload["message_thread_id"] = json!(thread);
        }
        self.api.call_unit("forwardMessages", &payload).await
    }

    async fn send_media_group(
        &self,
        to: ChatId,
        media: &[OutboundMedia],
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        let media: Vec<_> = media
            .iter()
            .map(|m| {
                let mut entry = json!({"type": m.kind.as_str(), "media": m.media_ref});
                if let Some(caption) = &m.caption {
                    entry["caption"] = json!(caption);
                }
                entry
            })
            .collect();
        let mut payload = json!({"chat_id": to, "media": media});
        if let Some(thread) = thread {
            payload["message_thread_id"] = json!(thread);
        }
        self.api.call_unit("sendMediaGroup", &payload).await
    }

    async fn create_thread(&self, workspace: ChatId, title: &str) -> DeliveryResult<ThreadId> {
        let topic: ForumTopic = self
            .api
            .call(
                "createForumTopic",
                &json!({"chat_id": workspace, "name": title}),
            )
            .await?;
        Ok(ThreadId(topic.message_thread_id))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::mock_api::{MockApi, Reply},
        topicbridge_relay::MediaKind,
    };

    async fn setup() -> (MockApi, TelegramGateway) {
        let mock = MockApi::start().await;
        let gateway = TelegramGateway::new(mock.api());
        (mock, gateway)
    }

    #[tokio::test]
    async fn forward_targets_thread_only_when_given() {
        let (mock, gateway) = setup().await;
        gateway
            .forward(ChatId(-100), ChatId(42), MessageId(5), Some(ThreadId(77)))
            .await
            .unwrap();
        gateway
            .forward(ChatId(42), ChatId(-100), MessageId(6), None)
            .await
            .unwrap();

        assert_eq!(mock.bodies("forwardMessage"), vec![
            json!({"chat_id": -100, "from_chat_id": 42, "message_id": 5, "message_thread_id": 77}),
            json!({"chat_id": 42, "from_chat_id": -100, "message_id": 6}),
        ]);
        mock.stop().await;
    }

    #[tokio::test]
    async fn create_thread_returns_topic_id() {
        let (mock, gateway) = setup().await;
        mock.reply(
            "createForumTopic",
            Reply::ok(json!({"message_thread_id": 314, "name": "Ada @ada", "icon_color": 7322096})),
        );

        let thread = gateway
            .create_thread(ChatId(-100), "Ada @ada")
            .await
            .unwrap();
        assert_eq!(thread, ThreadId(314));
        assert_eq!(mock.bodies("createForumTopic"), vec![json!({
            "chat_id": -100,
            "name": "Ada @ada"
        })]);
        mock.stop().await;
    }

    #[tokio::test]
    async fn create_thread_failure_is_reported() {
        let (mock, gateway) = setup().await;
        mock.reply(
            "createForumTopic",
            Reply::error(400, "Bad Request: not enough rights to create a topic"),
        );
        let err = gateway.create_thread(ChatId(-100), "x").await.unwrap_err();
        assert!(err.description.contains("not enough rights"));
        assert!(!err.is_thread_missing());
        mock.stop().await;
    }

    #[tokio::test]
    async fn media_group_payload_uses_bot_api_shape() {
        let (mock, gateway) = setup().await;
        let media = [
            OutboundMedia {
                kind: MediaKind::Photo,
                media_ref: "p1".into(),
                caption: Some("look".into()),
            },
            OutboundMedia {
                kind: MediaKind::Document,
                media_ref: "d2".into(),
                caption: None,
            },
        ];
        gateway
            .send_media_group(ChatId(42), &media, None)
            .await
            .unwrap();

        assert_eq!(mock.bodies("sendMediaGroup"), vec![json!({
            "chat_id": 42,
            "media": [
                {"type": "photo", "media": "p1", "caption": "look"},
                {"type": "document", "media": "d2"}
            ]
        })]);
        mock.stop().await;
    }

    #[tokio::test]
    async fn batch_forward_and_copy_payloads() {
        let (mock, gateway) = setup().await;
        gateway
            .forward_batch(
                ChatId(-100),
                ChatId(42),
                &[MessageId(1), MessageId(2)],
                Some(ThreadId(9)),
            )
            .await
            .unwrap();
        gateway
            .copy(ChatId(42), ChatId(-100), MessageId(3))
            .await
            .unwrap();
        gateway.send_text(ChatId(42), "hi").await.unwrap();

        assert_eq!(mock.bodies("forwardMessages"), vec![json!({
            "chat_id": -100,
            "from_chat_id": 42,
            "message_ids": [1, 2],
            "message_thread_id": 9
        })]);
        assert_eq!(mock.bodies("copyMessage"), vec![json!({
            "chat_id": 42,
            "from_chat_id": -100,
            "message_id": 3
        })]);
        assert_eq!(mock.bodies("sendMessage")[0]["text"], "hi");
        mock.stop().await;
    }
}
