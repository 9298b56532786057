//! Telegram Bot API adapter.
//!
//! Decodes webhook updates into relay events and implements the relay's
//! outbound gateway on top of the Bot API. Relay traffic goes through a thin
//! JSON client so failure descriptions reach the router verbatim; bot
//! identity and webhook registration use teloxide.

pub mod api;
pub mod bot;
pub mod error;
pub mod gateway;
pub mod update;

#[cfg(test)]
pub(crate) mod mock_api;

pub use {
    api::BotApi,
    bot::{WebhookStatus, connect, delete_webhook, resolve_bot_id, set_webhook, webhook_status},
    error::{Error, Result},
    gateway::TelegramGateway,
    update::Update,
};
