//! Inbound event routing.
//!
//! [`RelayRouter::handle`] is the single entry point for every inbound event.
//! It never fails: errors are logged with their variant and the event is
//! acknowledged so the transport does not redeliver it.

use std::sync::Arc;

use {
    topicbridge_common::types::{ChatId, ThreadId, UserId},
    tracing::{debug, error, info, warn},
};

use crate::{
    aggregator::{AppendOutcome, Destination, Direction, MediaAggregator},
    directory::ThreadDirectory,
    error::{Error, Result},
    event::{ChatKind, Content, InboundEvent, Sender},
    gateway::MessagingGateway,
    verification::VerificationGate,
};

/// Reply sent to a user whose thread the staff closed.
pub const CLOSED_NOTICE: &str =
    "This conversation has been closed by the team. You will be able to write again once it is reopened.";

#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub workspace: ChatId,
    /// The bot's own account. Without it, any bot-authored workspace
    /// message is treated as our own.
    pub bot_id: Option<UserId>,
}

/// What happened to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Not relevant to the relay.
    Ignored,
    /// First-contact command acknowledged.
    Started,
    VerificationRequested,
    /// The user's thread is closed; they were told so.
    ThreadClosed,
    Relayed { recreated: bool },
    /// Stored in an album buffer for a later grouped delivery.
    Buffered,
    /// A workspace thread with no known owner.
    Orphaned,
    ThreadStateChanged { closed: bool },
    /// Handling failed and was logged.
    Failed,
}

pub struct RelayRouter {
    directory: ThreadDirectory,
    aggregator: MediaAggregator,
    gateway: Arc<dyn MessagingGateway>,
    verification: Arc<dyn VerificationGate>,
    settings: RouterSettings,
}

impl RelayRouter {
    pub fn new(
        directory: ThreadDirectory,
        aggregator: MediaAggregator,
        gateway: Arc<dyn MessagingGateway>,
        verification: Arc<dyn VerificationGate>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            directory,
            aggregator,
            gateway,
            verification,
            settings,
        }
    }

    pub fn aggregator(&self) -> &MediaAggregator {
        &self.aggregator
    }

    /// Process one inbound event. Always returns; failures are logged.
    pub async fn handle(&self, event: InboundEvent) -> RouteOutcome {
        if let Err(e) = self.aggregator.sweep().await {
            warn!(error = %e, "media group sweep failed");
        }

        let result = if event.chat_kind == ChatKind::Private {
            self.handle_private(&event).await
        } else if event.chat_id == self.settings.workspace {
            self.handle_workspace(&event).await
        } else {
            debug!(chat_id = %event.chat_id, "ignoring event from unrelated chat");
            Ok(RouteOutcome::Ignored)
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    Error::ThreadCreationFailed { user_id, .. } => {
                        error!(%user_id, error = %e, "could not open a thread, message dropped");
                    },
                    Error::DeliveryFailed { .. } | Error::ThreadMissing { .. } => {
                        warn!(chat_id = %event.chat_id, message_id = %event.message_id, error = %e, "relay failed");
                    },
                    _ => error!(chat_id = %event.chat_id, error = %e, "event handling failed"),
                }
                RouteOutcome::Failed
            },
        }
    }

    async fn handle_private(&self, event: &InboundEvent) -> Result<RouteOutcome> {
        let Some(sender) = event.sender.as_ref() else {
            return Ok(RouteOutcome::Ignored);
        };
        if event.is_start_command() {
            debug!(user_id = %sender.id, "start command");
            return Ok(RouteOutcome::Started);
        }

        if !self.verification.is_verified(sender.id).await {
            self.verification.request_verification(sender.id).await;
            info!(user_id = %sender.id, "verification requested");
            return Ok(RouteOutcome::VerificationRequested);
        }

        let record = self.directory.resolve_or_create(sender).await?;
        if record.closed {
            if let Err(e) = self.gateway.send_text(event.chat_id, CLOSED_NOTICE).await {
                warn!(user_id = %sender.id, error = %e, "closed-thread notice failed");
            }
            return Ok(RouteOutcome::ThreadClosed);
        }

        if event.media_group_id.is_some() {
            let destination = Destination {
                chat: self.settings.workspace,
                thread: Some(record.thread_id),
            };
            let outcome = self
                .aggregator
                .submit(Direction::UserToWorkspace, destination, event)
                .await?;
            return Ok(append_outcome(outcome));
        }

        self.forward_to_thread(sender, event, record.thread_id).await
    }

    /// Forward into the user's thread, recreating it once if it was deleted.
    async fn forward_to_thread(
        &self,
        sender: &Sender,
        event: &InboundEvent,
        thread: ThreadId,
    ) -> Result<RouteOutcome> {
        let workspace = self.settings.workspace;
        let first = self
            .gateway
            .forward(workspace, event.chat_id, event.message_id, Some(thread))
            .await;

        let source = match first {
            Ok(()) => return Ok(RouteOutcome::Relayed { recreated: false }),
            Err(source) if source.is_thread_missing() => source,
            Err(source) => return Err(Error::delivery("forward to thread", source)),
        };

        warn!(
            user_id = %sender.id,
            error = %Error::ThreadMissing { thread_id: thread, source },
            "thread lost, recreating"
        );
        let fresh = self.directory.recreate_after_loss(sender).await?;
        self.gateway
            .forward(
                workspace,
                event.chat_id,
                event.message_id,
                Some(fresh.thread_id),
            )
            .await
            .map_err(|source| Error::delivery("forward to recreated thread", source))?;
        Ok(RouteOutcome::Relayed { recreated: true })
    }

    async fn handle_workspace(&self, event: &InboundEvent) -> Result<RouteOutcome> {
        let Some(thread) = event.thread_id else {
            return Ok(RouteOutcome::Ignored);
        };

        if matches!(event.content, Content::ThreadClosed | Content::ThreadReopened) {
            let closed = event.content == Content::ThreadClosed;
            self.directory.set_closed(thread, closed).await?;
            return Ok(RouteOutcome::ThreadStateChanged { closed });
        }

        let Some(author) = event.sender.as_ref() else {
            return Ok(RouteOutcome::Ignored);
        };
        let own = match self.settings.bot_id {
            Some(bot) => author.id == bot,
            None => author.is_bot,
        };
        if own {
            return Ok(RouteOutcome::Ignored);
        }

        let Some(user) = self.directory.find_user_by_thread(thread).await? else {
            debug!(%thread, "no user owns this thread");
            return Ok(RouteOutcome::Orphaned);
        };
        let user_chat = ChatId::from(user);

        if event.media_group_id.is_some() {
            let destination = Destination {
                chat: user_chat,
                thread: None,
            };
            let outcome = self
                .aggregator
                .submit(Direction::WorkspaceToUser, destination, event)
                .await?;
            return Ok(append_outcome(outcome));
        }

        if let Err(e) = self
            .gateway
            .copy(user_chat, event.chat_id, event.message_id)
            .await
        {
            debug!(%user, error = %e, "copy to user failed, forwarding instead");
            self.gateway
                .forward(user_chat, event.chat_id, event.message_id, None)
                .await
                .map_err(|source| Error::delivery("reply to user", source))?;
        }
        Ok(RouteOutcome::Relayed { recreated: false })
    }
}

fn append_outcome(outcome: AppendOutcome) -> RouteOutcome {
    match outcome {
        AppendOutcome::Buffered { .. } => RouteOutcome::Buffered,
        AppendOutcome::Flushed { .. } | AppendOutcome::Bypassed => {
            RouteOutcome::Relayed { recreated: false }
        },
    }
}
