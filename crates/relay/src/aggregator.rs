//! Media-group aggregation.
//!
//! Albums arrive as separate messages sharing a media group id. Each item is
//! appended to a buffer stored under `mg:<direction>:<groupId>`; the buffer
//! is flushed as one grouped delivery when it reaches the size cap, after a
//! quiet period with no new items, or by the opportunistic sweep.
//!
//! Size and inactivity triggers race. Every flush re-reads the buffer and
//! compares its [`AppendMarker`] with the one captured when the trigger was
//! armed; a mismatch means another trigger already handled it and the flush
//! is a no-op.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tokio_util::task::TaskTracker,
    topicbridge_common::{
        time::Clock,
        types::{ChatId, MessageId, ThreadId},
    },
    topicbridge_config::MediaGroupConfig,
    topicbridge_store::{KeyValueStore, get_json, put_json},
    tracing::{Instrument, debug, info, info_span, warn},
};

use crate::{
    error::{Error, Result},
    event::{InboundEvent, MediaItem},
    gateway::{DeliveryResult, MessagingGateway, OutboundMedia},
};

pub const KEY_PREFIX: &str = "mg:";

/// Which way a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// From a user's private chat into their workspace thread.
    #[serde(rename = "p2t")]
    UserToWorkspace,
    /// From a workspace thread back to the user.
    #[serde(rename = "t2p")]
    WorkspaceToUser,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserToWorkspace => "p2t",
            Self::WorkspaceToUser => "t2p",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a delivery lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub chat: ChatId,
    pub thread: Option<ThreadId>,
}

/// Stored album buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaGroupBuffer {
    pub direction: Direction,
    pub destination: Destination,
    pub items: Vec<MediaItem>,
    pub last_append_ms: i64,
    #[serde(default)]
    pub revision: u64,
}

impl MediaGroupBuffer {
    fn new(direction: Direction, destination: Destination) -> Self {
        Self {
            direction,
            destination,
            items: Vec::new(),
            last_append_ms: 0,
            revision: 0,
        }
    }

    pub fn marker(&self) -> AppendMarker {
        AppendMarker {
            last_append_ms: self.last_append_ms,
            revision: self.revision,
        }
    }
}

/// Identifies one state of a buffer. Two appends in the same millisecond
/// still differ by revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendMarker {
    pub last_append_ms: i64,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Item stored; a watchdog will flush the buffer if nothing follows.
    Buffered { count: usize },
    /// Item filled the buffer, which was flushed immediately.
    Flushed { count: usize },
    /// Content cannot be grouped and was delivered on its own.
    Bypassed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub flushed: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub max_items: usize,
    pub quiet_period: Duration,
    pub buffer_ttl: Duration,
    /// How long a watchdog may keep running past its quiet period.
    pub max_background: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self::from(&MediaGroupConfig::default())
    }
}

impl From<&MediaGroupConfig> for AggregatorSettings {
    fn from(config: &MediaGroupConfig) -> Self {
        Self {
            max_items: config.max_items,
            quiet_period: Duration::from_millis(config.quiet_period_ms),
            buffer_ttl: Duration::from_secs(config.buffer_ttl_secs),
            max_background: Duration::from_secs(config.max_background_secs),
        }
    }
}

pub fn buffer_key(direction: Direction, group_id: &str) -> String {
    format!("{KEY_PREFIX}{direction}:{group_id}")
}

/// Album batcher. Cheap to clone; clones share watchdogs and flush claims.
#[derive(Clone)]
pub struct MediaAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn MessagingGateway>,
    clock: Arc<dyn Clock>,
    settings: AggregatorSettings,
    tracker: TaskTracker,
    /// Buffers being flushed by this process right now.
    in_flight: Mutex<HashSet<String>>,
}

fn lock_in_flight(in_flight: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    in_flight.lock().unwrap_or_else(|e| e.into_inner())
}

/// Releases a flush claim when dropped.
struct FlushClaim<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for FlushClaim<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.in_flight).remove(&self.key);
    }
}

impl MediaAggregator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn MessagingGateway>,
        clock: Arc<dyn Clock>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                clock,
                settings,
                tracker: TaskTracker::new(),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.inner.settings
    }

    /// Route a grouped message: buffer it when it carries album media,
    /// deliver it on its own otherwise.
    pub async fn submit(
        &self,
        direction: Direction,
        destination: Destination,
        event: &InboundEvent,
    ) -> Result<AppendOutcome> {
        match (event.media_group_id.as_deref(), event.media_item()) {
            (Some(group_id), Some(item)) => {
                self.append(direction, group_id, item, destination).await
            },
            _ => {
                transfer_single(
                    &*self.inner.gateway,
                    direction,
                    destination,
                    event.chat_id,
                    event.message_id,
                )
                .await
                .map_err(|source| Error::delivery("ungroupable album item", source))?;
                Ok(AppendOutcome::Bypassed)
            },
        }
    }

    /// Add an item to its group's buffer and arm the matching flush trigger.
    pub async fn append(
        &self,
        direction: Direction,
        group_id: &str,
        item: MediaItem,
        destination: Destination,
    ) -> Result<AppendOutcome> {
        let store = &*self.inner.store;
        let settings = &self.inner.settings;
        let key = buffer_key(direction, group_id);

        let mut buffer = match get_json::<MediaGroupBuffer>(store, &key).await {
            Ok(Some(buffer)) => buffer,
            Ok(None) => MediaGroupBuffer::new(direction, destination),
            Err(topicbridge_store::Error::Json(e)) => {
                warn!(key, error = %e, "discarding unreadable media group buffer");
                MediaGroupBuffer::new(direction, destination)
            },
            Err(e) => return Err(e.into()),
        };
        buffer.items.push(item);
        buffer.last_append_ms = self.inner.clock.now_ms();
        buffer.revision += 1;
        let count = buffer.items.len();
        let marker = buffer.marker();
        put_json(store, &key, &buffer, Some(settings.buffer_ttl)).await?;
        debug!(key, count, "buffered media group item");

        if count >= settings.max_items {
            return match self.flush_if_current(&key, marker).await {
                Ok(flushed) => Ok(AppendOutcome::Flushed { count: flushed }),
                Err(e) if e.is_benign() => {
                    debug!(key, "size-triggered flush lost its claim, arming watchdog");
                    self.arm_watchdog(key, marker);
                    Ok(AppendOutcome::Buffered { count })
                },
                Err(e) => Err(e),
            };
        }

        self.arm_watchdog(key, marker);
        Ok(AppendOutcome::Buffered { count })
    }

    /// Schedule a detached inactivity flush for the buffer state `marker`.
    fn arm_watchdog(&self, key: String, marker: AppendMarker) {
        let this = self.clone();
        let quiet = self.inner.settings.quiet_period;
        let budget = quiet.saturating_add(self.inner.settings.max_background);
        let span = info_span!("media_group_watchdog", key = %key);

        self.inner.tracker.spawn(
            async move {
                let run = async {
                    tokio::time::sleep(quiet).await;
                    this.flush_if_current(&key, marker).await
                };
                match tokio::time::timeout(budget, run).await {
                    Ok(Ok(count)) => debug!(count, "inactivity flush delivered"),
                    Ok(Err(e)) if e.is_benign() => debug!("stale watchdog, buffer already handled"),
                    Ok(Err(e)) => warn!(error = %e, "inactivity flush failed"),
                    Err(_) => warn!("inactivity flush exceeded its background budget"),
                }
            }
            .instrument(span),
        );
    }

    /// Deliver and delete the buffer if it is still in the state `expected`.
    ///
    /// Items appended while the delivery was in progress survive: they are
    /// written back under the newer marker and a fresh watchdog is armed.
    ///
    /// Returns the number of delivered items, or [`Error::GroupFlushRaced`]
    /// when the buffer is gone, has moved on, or is being flushed already.
    pub async fn flush_if_current(&self, key: &str, expected: AppendMarker) -> Result<usize> {
        let raced = || Error::GroupFlushRaced {
            key: key.to_string(),
        };
        let Some(_claim) = self.claim(key) else {
            return Err(raced());
        };

        let store = &*self.inner.store;
        let buffer = match get_json::<MediaGroupBuffer>(store, key).await? {
            Some(buffer) if buffer.marker() == expected => buffer,
            _ => return Err(raced()),
        };

        self.deliver(&buffer).await;
        self.settle(key, expected, &buffer.items).await?;
        info!(
            key,
            direction = %buffer.direction,
            count = buffer.items.len(),
            "flushed media group"
        );
        Ok(buffer.items.len())
    }

    /// Remove the delivered items from the stored buffer.
    async fn settle(
        &self,
        key: &str,
        expected: AppendMarker,
        delivered: &[MediaItem],
    ) -> Result<()> {
        let store = &*self.inner.store;
        let mut current = match get_json::<MediaGroupBuffer>(store, key).await {
            Ok(Some(current)) if current.marker() != expected => current,
            Ok(None) => return Ok(()),
            Ok(Some(_)) | Err(topicbridge_store::Error::Json(_)) => {
                store.delete(key).await?;
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };

        current.items.retain(|item| {
            !delivered.iter().any(|d| {
                d.source_chat == item.source_chat && d.source_message_id == item.source_message_id
            })
        });
        if current.items.is_empty() {
            store.delete(key).await?;
            return Ok(());
        }

        let marker = current.marker();
        put_json(store, key, &current, Some(self.inner.settings.buffer_ttl)).await?;
        debug!(
            key,
            remaining = current.items.len(),
            "kept items appended during flush"
        );
        self.arm_watchdog(key.to_string(), marker);
        Ok(())
    }

    fn claim(&self, key: &str) -> Option<FlushClaim<'_>> {
        let in_flight = &self.inner.in_flight;
        if !lock_in_flight(in_flight).insert(key.to_string()) {
            return None;
        }
        Some(FlushClaim {
            in_flight,
            key: key.to_string(),
        })
    }

    /// Flush every buffer idle for longer than the quiet period and drop
    /// empty or unreadable ones.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let store = &*self.inner.store;
        let now = self.inner.clock.now_ms();
        let quiet_ms =
            i64::try_from(self.inner.settings.quiet_period.as_millis()).unwrap_or(i64::MAX);
        let mut report = SweepReport::default();

        for key in store.list_keys(KEY_PREFIX).await? {
            let buffer = match get_json::<MediaGroupBuffer>(store, &key).await {
                Ok(Some(buffer)) => buffer,
                Ok(None) => continue,
                Err(topicbridge_store::Error::Json(e)) => {
                    warn!(key, error = %e, "deleting unreadable media group buffer");
                    store.delete(&key).await?;
                    report.discarded += 1;
                    continue;
                },
                Err(e) => return Err(e.into()),
            };

            if buffer.items.is_empty() {
                warn!(key, "deleting empty media group buffer");
                store.delete(&key).await?;
                report.discarded += 1;
                continue;
            }
            if now - buffer.last_append_ms <= quiet_ms {
                continue;
            }

            match self.flush_if_current(&key, buffer.marker()).await {
                Ok(_) => report.flushed += 1,
                Err(e) if e.is_benign() => debug!(key, "sweep lost flush race"),
                Err(e) => warn!(key, error = %e, "sweep flush failed"),
            }
        }

        if report != SweepReport::default() {
            debug!(
                flushed = report.flushed,
                discarded = report.discarded,
                "media group sweep"
            );
        }
        Ok(report)
    }

    /// Wait for every armed watchdog to finish.
    pub async fn wait_idle(&self) {
        let tracker = &self.inner.tracker;
        tracker.close();
        tracker.wait().await;
        tracker.reopen();
    }

    /// Wait for watchdogs up to `timeout`. Returns `false` if some were still
    /// running when the timeout hit.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let pending = self.inner.tracker.len();
        if pending > 0 {
            info!(pending, "waiting for media group watchdogs");
        }
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }

    async fn deliver(&self, buffer: &MediaGroupBuffer) {
        let gateway = &*self.inner.gateway;
        let destination = buffer.destination;

        match buffer.items.as_slice() {
            [] => {},
            [item] => {
                if let Err(e) = transfer_single(
                    gateway,
                    buffer.direction,
                    destination,
                    item.source_chat,
                    item.source_message_id,
                )
                .await
                {
                    warn!(error = %e, message_id = %item.source_message_id, "single album item delivery failed");
                }
            },
            items => match buffer.direction {
                Direction::UserToWorkspace => deliver_to_workspace(gateway, destination, items).await,
                Direction::WorkspaceToUser => deliver_to_user(gateway, destination, items).await,
            },
        }
    }
}

/// Move one message in `direction`. Workspace replies are copied so users do
/// not see staff identities, falling back to a forward when copying fails.
async fn transfer_single(
    gateway: &dyn MessagingGateway,
    direction: Direction,
    destination: Destination,
    from: ChatId,
    message_id: MessageId,
) -> DeliveryResult {
    match direction {
        Direction::UserToWorkspace => {
            gateway
                .forward(destination.chat, from, message_id, destination.thread)
                .await
        },
        Direction::WorkspaceToUser => match gateway.copy(destination.chat, from, message_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, %message_id, "copy failed, forwarding instead");
                gateway
                    .forward(destination.chat, from, message_id, destination.thread)
                    .await
            },
        },
    }
}

fn album(items: &[MediaItem]) -> Vec<OutboundMedia> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| OutboundMedia {
            kind: item.kind,
            media_ref: item.media_ref.clone(),
            caption: (i == 0 && !item.caption.is_empty()).then(|| item.caption.clone()),
        })
        .collect()
}

async fn deliver_to_workspace(
    gateway: &dyn MessagingGateway,
    destination: Destination,
    items: &[MediaItem],
) {
    let source = items[0].source_chat;
    let grouped = if items.iter().all(|i| i.source_chat == source) {
        let ids: Vec<MessageId> = items.iter().map(|i| i.source_message_id).collect();
        gateway
            .forward_batch(destination.chat, source, &ids, destination.thread)
            .await
    } else {
        gateway
            .send_media_group(destination.chat, &album(items), destination.thread)
            .await
    };

    let Err(e) = grouped else {
        return;
    };
    warn!(error = %e, count = items.len(), "grouped forward failed, forwarding items one by one");
    for item in items {
        if let Err(e) = gateway
            .forward(
                destination.chat,
                item.source_chat,
                item.source_message_id,
                destination.thread,
            )
            .await
        {
            warn!(error = %e, message_id = %item.source_message_id, "album item forward failed");
        }
    }
}

async fn deliver_to_user(
    gateway: &dyn MessagingGateway,
    destination: Destination,
    items: &[MediaItem],
) {
    let Err(e) = gateway
        .send_media_group(destination.chat, &album(items), destination.thread)
        .await
    else {
        return;
    };
    warn!(error = %e, count = items.len(), "album send failed, copying items one by one");
    for item in items {
        if let Err(e) = transfer_single(
            gateway,
            Direction::WorkspaceToUser,
            destination,
            item.source_chat,
            item.source_message_id,
        )
        .await
        {
            warn!(error = %e, message_id = %item.source_message_id, "album item delivery failed");
        }
    }
}
