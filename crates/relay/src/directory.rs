//! User to thread directory.
//!
//! Each user owns one [`ThreadRecord`] under `user:<id>`. A reverse index
//! `thread:<threadId>` makes workspace-side lookups cheap; it is only a hint
//! and is always validated against the forward record, with a prefix scan as
//! the fallback. Concurrent first messages from one user may each create a
//! thread; the last write wins and the other thread is orphaned.

use std::sync::Arc;

use {
    serde::{Deserialize, Serialize},
    topicbridge_common::types::{ChatId, ThreadId, UserId},
    topicbridge_store::{KeyValueStore, get_json, put_json},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    event::Sender,
    gateway::MessagingGateway,
    title::thread_title,
};

const USER_PREFIX: &str = "user:";
const THREAD_PREFIX: &str = "thread:";

/// A user's workspace thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub user_id: UserId,
    pub thread_id: ThreadId,
    pub title: String,
    pub closed: bool,
}

/// Stored form. The key is authoritative for the user id; the copy in the
/// body is informational.
#[derive(Debug, Serialize, Deserialize)]
struct StoredThread {
    #[serde(default)]
    user_id: Option<UserId>,
    thread_id: ThreadId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    closed: bool,
}

impl ThreadRecord {
    fn from_stored(user_id: UserId, stored: StoredThread) -> Self {
        Self {
            user_id,
            thread_id: stored.thread_id,
            title: stored.title,
            closed: stored.closed,
        }
    }

    fn to_stored(&self) -> StoredThread {
        StoredThread {
            user_id: Some(self.user_id),
            thread_id: self.thread_id,
            title: self.title.clone(),
            closed: self.closed,
        }
    }
}

fn user_key(user: UserId) -> String {
    format!("{USER_PREFIX}{user}")
}

fn thread_key(thread: ThreadId) -> String {
    format!("{THREAD_PREFIX}{thread}")
}

pub struct ThreadDirectory {
    store: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn MessagingGateway>,
    workspace: ChatId,
}

impl ThreadDirectory {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn MessagingGateway>,
        workspace: ChatId,
    ) -> Self {
        Self {
            store,
            gateway,
            workspace,
        }
    }

    /// The stored record for a user, if any.
    pub async fn get(&self, user: UserId) -> Result<Option<ThreadRecord>> {
        let stored: Option<StoredThread> = get_json(&*self.store, &user_key(user)).await?;
        Ok(stored.map(|s| ThreadRecord::from_stored(user, s)))
    }

    /// Return the user's record, opening a thread on first contact.
    pub async fn resolve_or_create(&self, sender: &Sender) -> Result<ThreadRecord> {
        if let Some(record) = self.get(sender.id).await? {
            return Ok(record);
        }
        self.allocate(sender).await
    }

    /// Replace a record whose thread was deleted on the surface.
    ///
    /// Always opens a new thread and overwrites, even if another event already
    /// recreated it.
    pub async fn recreate_after_loss(&self, sender: &Sender) -> Result<ThreadRecord> {
        let previous = self.get(sender.id).await?;
        let record = self.allocate(sender).await?;
        if let Some(previous) = previous {
            info!(
                user_id = %sender.id,
                old_thread_id = %previous.thread_id,
                thread_id = %record.thread_id,
                "recreated lost thread"
            );
        }
        Ok(record)
    }

    async fn allocate(&self, sender: &Sender) -> Result<ThreadRecord> {
        let title = thread_title(sender);
        let thread_id = self
            .gateway
            .create_thread(self.workspace, &title)
            .await
            .map_err(|source| Error::ThreadCreationFailed {
                user_id: sender.id,
                source,
            })?;

        let record = ThreadRecord {
            user_id: sender.id,
            thread_id,
            title,
            closed: false,
        };
        self.save(&record).await?;
        debug!(user_id = %sender.id, %thread_id, "opened thread");
        Ok(record)
    }

    async fn save(&self, record: &ThreadRecord) -> Result<()> {
        put_json(
            &*self.store,
            &user_key(record.user_id),
            &record.to_stored(),
            None,
        )
        .await?;
        self.store
            .put(
                &thread_key(record.thread_id),
                &record.user_id.to_string(),
                None,
            )
            .await?;
        Ok(())
    }

    /// The user that currently owns `thread`.
    pub async fn find_user_by_thread(&self, thread: ThreadId) -> Result<Option<UserId>> {
        Ok(self.find_record(thread).await?.map(|r| r.user_id))
    }

    async fn find_record(&self, thread: ThreadId) -> Result<Option<ThreadRecord>> {
        if let Some(raw) = self.store.get(&thread_key(thread)).await? {
            match raw.parse::<UserId>() {
                Ok(user) => {
                    if let Some(record) = self.get(user).await?
                        && record.thread_id == thread
                    {
                        return Ok(Some(record));
                    }
                },
                Err(e) => warn!(%thread, error = %e, "corrupt thread index entry"),
            }
        }
        self.scan_for_thread(thread).await
    }

    /// Walk every user record. Repairs the index on a hit.
    async fn scan_for_thread(&self, thread: ThreadId) -> Result<Option<ThreadRecord>> {
        for key in self.store.list_keys(USER_PREFIX).await? {
            let Some(user) = key
                .strip_prefix(USER_PREFIX)
                .and_then(|id| id.parse::<UserId>().ok())
            else {
                continue;
            };
            let stored = match get_json::<StoredThread>(&*self.store, &key).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key, error = %e, "skipping unreadable thread record");
                    continue;
                },
            };
            if stored.thread_id == thread {
                self.store
                    .put(&thread_key(thread), &user.to_string(), None)
                    .await?;
                return Ok(Some(ThreadRecord::from_stored(user, stored)));
            }
        }
        Ok(None)
    }

    /// Mark the thread's record closed or open.
    ///
    /// Returns `false` when no record references the thread.
    pub async fn set_closed(&self, thread: ThreadId, closed: bool) -> Result<bool> {
        let Some(mut record) = self.find_record(thread).await? else {
            debug!(%thread, closed, "close state change for unknown thread");
            return Ok(false);
        };
        record.closed = closed;
        put_json(
            &*self.store,
            &user_key(record.user_id),
            &record.to_stored(),
            None,
        )
        .await?;
        info!(user_id = %record.user_id, %thread, closed, "thread state changed");
        Ok(true)
    }
}
