use {
    anyhow::{Result, bail},
    clap::Subcommand,
    secrecy::ExposeSecret,
    topicbridge_config::BridgeConfig,
    topicbridge_telegram::BotApi,
};

#[derive(Subcommand)]
pub enum WebhookAction {
    /// Point Telegram at this relay. Uses `telegram.webhook_secret` when set.
    Set {
        /// Public webhook URL (defaults to `telegram.webhook_url`).
        url: Option<String>,
    },
    /// Stop Telegram from delivering updates to the webhook.
    Delete {
        /// Also discard updates Telegram is still holding.
        #[arg(long)]
        drop_pending: bool,
    },
    /// Show the webhook Telegram currently has registered.
    Info,
}

pub async fn handle_webhook(action: WebhookAction, config: &BridgeConfig) -> Result<()> {
    let telegram = &config.telegram;
    if !telegram.has_token() {
        bail!("telegram.token is not set (config file or TOPICBRIDGE_BOT_TOKEN)");
    }

    match action {
        WebhookAction::Set { url } => {
            let Some(url) = url.or_else(|| telegram.webhook_url.clone()) else {
                bail!("no URL given and telegram.webhook_url is not set");
            };
            let bot = topicbridge_telegram::connect(telegram)?;
            let secret = telegram
                .webhook_secret
                .as_ref()
                .map(|s| s.expose_secret().as_str());
            topicbridge_telegram::set_webhook(&bot, &url, secret).await?;
            println!("Webhook set to {url}");
            if secret.is_none() {
                println!("No webhook secret configured; anyone who knows the URL can post updates.");
            }
        },
        WebhookAction::Delete { drop_pending } => {
            let bot = topicbridge_telegram::connect(telegram)?;
            topicbridge_telegram::delete_webhook(&bot, drop_pending).await?;
            println!("Webhook removed.");
        },
        WebhookAction::Info => {
            let api = BotApi::new(&telegram.api_base, telegram.token.clone())?;
            let status = topicbridge_telegram::webhook_status(&api).await?;
            if status.is_registered() {
                println!("URL:             {}", status.url);
            } else {
                println!("No webhook registered.");
            }
            println!("Pending updates: {}", status.pending_update_count);
            if !status.allowed_updates.is_empty() {
                println!("Allowed updates: {}", status.allowed_updates.join(", "));
            }
            if let Some(message) = &status.last_error_message {
                println!("Last error:      {message}");
            }
        },
    }
    Ok(())
}
