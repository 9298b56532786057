use std::sync::Arc;

use {
    secrecy::Secret,
    topicbridge_common::{
        time::SystemClock,
        types::{ChatId, UserId},
    },
    topicbridge_config::BridgeConfig,
    topicbridge_relay::{
        AggregatorSettings, AlwaysVerified, MediaAggregator, MessagingGateway, RelayRouter,
        RouterSettings, ThreadDirectory, VerificationGate,
    },
    topicbridge_store::KeyValueStore,
    topicbridge_verify::{TurnstileGate, VerifySettings},
    tracing::info,
};

/// Everything the HTTP handlers need, built once at startup.
pub struct GatewayState {
    pub relay: RelayRouter,
    /// Present when Turnstile verification is configured.
    pub verification: Option<Arc<TurnstileGate>>,
    pub webhook_secret: Option<Secret<String>>,
    pub version: String,
}

impl GatewayState {
    /// Wire the relay from configuration and its external collaborators.
    pub fn build(
        config: &BridgeConfig,
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn MessagingGateway>,
        bot_id: Option<UserId>,
    ) -> anyhow::Result<Self> {
        let workspace = ChatId(config.telegram.workspace_chat_id);

        let verification = match VerifySettings::from_config(&config.verification) {
            Some(settings) => Some(Arc::new(TurnstileGate::new(
                Arc::clone(&store),
                Arc::clone(&gateway),
                settings,
            )?)),
            None => None,
        };
        let gate: Arc<dyn VerificationGate> = match &verification {
            Some(gate) => Arc::clone(gate) as Arc<dyn VerificationGate>,
            None => Arc::new(AlwaysVerified),
        };
        info!(
            %workspace,
            bot_id = ?bot_id,
            verification = verification.is_some(),
            "relay configured"
        );

        let directory = ThreadDirectory::new(Arc::clone(&store), Arc::clone(&gateway), workspace);
        let aggregator = MediaAggregator::new(
            store,
            Arc::clone(&gateway),
            Arc::new(SystemClock),
            AggregatorSettings::from(&config.media_group),
        );
        let relay = RelayRouter::new(directory, aggregator, gateway, gate, RouterSettings {
            workspace,
            bot_id,
        });

        Ok(Self {
            relay,
            verification,
            webhook_secret: config.telegram.webhook_secret.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
