//! Recording collaborators for unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicI32, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    topicbridge_common::types::{ChatId, MessageId, ThreadId, UserId},
    topicbridge_store::{KeyValueStore, MemoryKvStore},
};

use crate::{
    event::{ChatKind, Content, InboundEvent, MediaKind, Sender},
    gateway::{DeliveryResult, GatewayError, MessagingGateway, OutboundMedia},
    verification::VerificationGate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    SendText,
    Forward,
    Copy,
    ForwardBatch,
    SendMediaGroup,
    CreateThread,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SendText {
        to: ChatId,
        text: String,
    },
    Forward {
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        thread: Option<ThreadId>,
    },
    Copy {
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
    },
    ForwardBatch {
        to: ChatId,
        from: ChatId,
        message_ids: Vec<MessageId>,
        thread: Option<ThreadId>,
    },
    SendMediaGroup {
        to: ChatId,
        media: Vec<OutboundMedia>,
        thread: Option<ThreadId>,
    },
    CreateThread {
        workspace: ChatId,
        title: String,
    },
}

impl Call {
    pub fn method(&self) -> Method {
        match self {
            Self::SendText { .. } => Method::SendText,
            Self::Forward { .. } => Method::Forward,
            Self::Copy { .. } => Method::Copy,
            Self::ForwardBatch { .. } => Method::ForwardBatch,
            Self::SendMediaGroup { .. } => Method::SendMediaGroup,
            Self::CreateThread { .. } => Method::CreateThread,
        }
    }
}

/// Gateway that records every call and fails on demand.
///
/// Calls are recorded even when they fail. Thread ids are handed out from 100
/// upwards. With a latency set, every call sleeps before it completes.
pub struct RecordingGateway {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Method, VecDeque<GatewayError>>>,
    next_thread: AtomicI32,
    latency: Mutex<Duration>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            next_thread: AtomicI32::new(100),
            latency: Mutex::new(Duration::ZERO),
        }
    }
}

#[allow(clippy::unwrap_used)]
impl RecordingGateway {
    /// Make the next call to `method` fail with `description`.
    pub fn fail_next(&self, method: Method, description: &str) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(GatewayError::new(Some(400), description));
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, method: Method) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method() == method)
            .collect()
    }

    async fn record(&self, call: Call) -> DeliveryResult {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let method = call.method();
        self.calls.lock().unwrap().push(call);
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&method)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(&self, to: ChatId, text: &str) -> DeliveryResult {
        self.record(Call::SendText {
            to,
            text: text.to_string(),
        })
        .await
    }

    async fn forward(
        &self,
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        self.record(Call::Forward {
            to,
            from,
            message_id,
            thread,
        })
        .await
    }

    async fn copy(&self, to: ChatId, from: ChatId, message_id: MessageId) -> DeliveryResult {
        self.record(Call::Copy {
            to,
            from,
            message_id,
        })
        .await
    }

    async fn forward_batch(
        &self,
        to: ChatId,
        from: ChatId,
        message_ids: &[MessageId],
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        self.record(Call::ForwardBatch {
            to,
            from,
            message_ids: message_ids.to_vec(),
            thread,
        })
        .await
    }

    async fn send_media_group(
        &self,
        to: ChatId,
        media: &[OutboundMedia],
        thread: Option<ThreadId>,
    ) -> DeliveryResult {
        self.record(Call::SendMediaGroup {
            to,
            media: media.to_vec(),
            thread,
        })
        .await
    }

    async fn create_thread(&self, workspace: ChatId, title: &str) -> DeliveryResult<ThreadId> {
        self.record(Call::CreateThread {
            workspace,
            title: title.to_string(),
        })
        .await?;
        Ok(ThreadId(self.next_thread.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Store whose reads can trail its writes, like a replicated backend before
/// a write has propagated.
///
/// Queued stale values are handed out to the next reads of a key, one per
/// read, before reads fall through to the real contents again.
#[derive(Default)]
pub struct LaggingStore {
    inner: MemoryKvStore,
    previous: Mutex<HashMap<String, Option<String>>>,
    stale: Mutex<HashMap<String, VecDeque<Option<String>>>>,
    deletes: Mutex<HashMap<String, usize>>,
}

#[allow(clippy::unwrap_used)]
impl LaggingStore {
    /// The next `reads` reads of `key` see the value it held before its
    /// latest write or delete.
    pub fn lag(&self, key: &str, reads: usize) {
        let before = self
            .previous
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default();
        self.queue(key, before, reads);
    }

    /// The next `reads` reads of `key` repeat its current value, whatever is
    /// written in between.
    pub async fn repeat(&self, key: &str, reads: usize) {
        let now = self.inner.get(key).await.unwrap();
        self.queue(key, now, reads);
    }

    fn queue(&self, key: &str, value: Option<String>, reads: usize) {
        let mut stale = self.stale.lock().unwrap();
        let pending = stale.entry(key.to_string()).or_default();
        pending.extend(std::iter::repeat_n(value, reads));
    }

    pub fn deletes(&self, key: &str) -> usize {
        self.deletes.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    async fn remember(&self, key: &str) -> topicbridge_store::Result<()> {
        let before = self.inner.get(key).await?;
        self.previous
            .lock()
            .unwrap()
            .insert(key.to_string(), before);
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl KeyValueStore for LaggingStore {
    async fn get(&self, key: &str) -> topicbridge_store::Result<Option<String>> {
        let queued = self
            .stale
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(value) => Ok(value),
            None => self.inner.get(key).await,
        }
    }

    async fn put(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> topicbridge_store::Result<()> {
        self.remember(key).await?;
        self.inner.put(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> topicbridge_store::Result<()> {
        self.remember(key).await?;
        *self
            .deletes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default() += 1;
        self.inner.delete(key).await
    }

    async fn list_keys(&self, prefix: &str) -> topicbridge_store::Result<Vec<String>> {
        self.inner.list_keys(prefix).await
    }
}

/// Gate with a fixed set of verified users that records verification requests.
#[derive(Default)]
pub struct RecordingGate {
    pub verified: Mutex<HashSet<UserId>>,
    pub requested: Mutex<Vec<UserId>>,
}

#[allow(clippy::unwrap_used)]
#[async_trait]
impl VerificationGate for RecordingGate {
    async fn is_verified(&self, user: UserId) -> bool {
        self.verified.lock().unwrap().contains(&user)
    }

    async fn request_verification(&self, user: UserId) {
        self.requested.lock().unwrap().push(user);
    }
}

pub const WORKSPACE: ChatId = ChatId(-100_500);
pub const BOT: UserId = UserId(9_000);

pub fn sender(id: i64) -> Sender {
    Sender {
        id: UserId(id),
        is_bot: false,
        first_name: "Ada".into(),
        last_name: None,
        username: Some("ada".into()),
    }
}

/// A message in `user`'s private chat.
pub fn private_event(user: i64, message_id: i32, content: Content) -> InboundEvent {
    InboundEvent {
        chat_id: ChatId(user),
        chat_kind: ChatKind::Private,
        thread_id: None,
        message_id: MessageId(message_id),
        sender: Some(sender(user)),
        media_group_id: None,
        content,
    }
}

/// A staff message inside workspace thread `thread`.
pub fn workspace_event(thread: i32, author: i64, message_id: i32, content: Content) -> InboundEvent {
    InboundEvent {
        chat_id: WORKSPACE,
        chat_kind: ChatKind::Supergroup,
        thread_id: Some(ThreadId(thread)),
        message_id: MessageId(message_id),
        sender: Some(Sender {
            id: UserId(author),
            is_bot: false,
            first_name: "Staff".into(),
            last_name: None,
            username: None,
        }),
        media_group_id: None,
        content,
    }
}

pub fn photo(media_ref: &str, caption: &str) -> Content {
    Content::Media {
        kind: MediaKind::Photo,
        media_ref: media_ref.into(),
        caption: caption.into(),
    }
}
