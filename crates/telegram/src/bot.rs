//! Bot identity and webhook registration.

use {
    secrecy::ExposeSecret,
    serde::Deserialize,
    serde_json::json,
    teloxide::{prelude::*, types::AllowedUpdate},
    topicbridge_common::types::UserId,
    topicbridge_config::TelegramConfig,
    tracing::info,
};

use crate::{
    api::BotApi,
    error::{Error, Result},
};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Build a teloxide bot for the configured token and API base.
pub fn connect(config: &TelegramConfig) -> Result<Bot> {
    let bot = Bot::new(config.token.expose_secret());
    let base = config.api_base.trim_end_matches('/');
    if base == DEFAULT_API_BASE {
        return Ok(bot);
    }
    let url = reqwest::Url::parse(base)
        .map_err(|e| Error::external(format!("invalid telegram.api_base `{base}`"), e))?;
    Ok(bot.set_api_url(url))
}

/// The bot's own user id, used to ignore its echoes in the workspace.
pub async fn resolve_bot_id(bot: &Bot) -> Result<UserId> {
    let me = bot.get_me().await?;
    let id = i64::try_from(me.user.id.0)
        .map_err(|e| Error::external("bot id out of range", e))?;
    info!(bot_id = id, username = ?me.user.username, "resolved bot identity");
    Ok(UserId(id))
}

/// Point Telegram at `url`, optionally requiring a secret header.
pub async fn set_webhook(bot: &Bot, url: &str, secret: Option<&str>) -> Result<()> {
    let url = reqwest::Url::parse(url)
        .map_err(|e| Error::external(format!("invalid webhook url `{url}`"), e))?;
    let mut request = bot
        .set_webhook(url.clone())
        .allowed_updates(vec![AllowedUpdate::Message]);
    if let Some(secret) = secret {
        request = request.secret_token(secret.to_string());
    }
    request.await?;
    info!(%url, secret = secret.is_some(), "webhook registered");
    Ok(())
}

pub async fn delete_webhook(bot: &Bot, drop_pending: bool) -> Result<()> {
    bot.delete_webhook()
        .drop_pending_updates(drop_pending)
        .await?;
    info!(drop_pending, "webhook removed");
    Ok(())
}

/// Subset of `getWebhookInfo`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookStatus {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending_update_count: u64,
    pub last_error_date: Option<i64>,
    pub last_error_message: Option<String>,
    #[serde(default)]
    pub allowed_updates: Vec<String>,
}

impl WebhookStatus {
    pub fn is_registered(&self) -> bool {
        !self.url.is_empty()
    }
}

pub async fn webhook_status(api: &BotApi) -> Result<WebhookStatus> {
    Ok(api.call("getWebhookInfo", &json!({})).await?)
}
