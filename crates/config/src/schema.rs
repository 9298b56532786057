//! Config schema types (server, telegram, storage, media groups, verification).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub media_group: MediaGroupConfig,
    pub verification: VerificationConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Upper bound on waiting for detached flush tasks at shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
            drain_timeout_secs: 30,
        }
    }
}

/// Bot credentials and the shared staff workspace.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,

    /// Bot API base URL, without trailing `/bot<token>`.
    pub api_base: String,

    /// Forum-enabled supergroup that holds one thread per user.
    pub workspace_chat_id: i64,

    /// The bot's own user id. Resolved through `getMe` when unset.
    pub bot_id: Option<i64>,

    /// When set, inbound webhooks must carry this value in
    /// `X-Telegram-Bot-Api-Secret-Token`.
    pub webhook_secret: Option<Secret<String>>,

    /// Public URL registered by `topicbridge webhook set`.
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("workspace_chat_id", &self.workspace_chat_id)
            .field("bot_id", &self.bot_id)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_base: "https://api.telegram.org".into(),
            workspace_chat_id: 0,
            bot_id: None,
            webhook_secret: None,
            webhook_url: None,
        }
    }
}

impl TelegramConfig {
    pub fn has_token(&self) -> bool {
        !self.token.expose_secret().trim().is_empty()
    }
}

/// Which [`KeyValueStore`] backend to open.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file. Defaults to `<data dir>/topicbridge.db`.
    pub path: Option<PathBuf>,
}

/// Album batching limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaGroupConfig {
    /// Flush as soon as a buffer holds this many items.
    pub max_items: usize,
    /// Flush a buffer once no item has arrived for this long.
    pub quiet_period_ms: u64,
    /// Storage-level expiry of a buffer, independent of flushing.
    pub buffer_ttl_secs: u64,
    /// Extra time a detached watchdog may run past its quiet period.
    pub max_background_secs: u64,
}

impl Default for MediaGroupConfig {
    fn default() -> Self {
        Self {
            max_items: 10,
            quiet_period_ms: 2_000,
            buffer_ttl_secs: 60,
            max_background_secs: 30,
        }
    }
}

/// Human-verification (Cloudflare Turnstile) settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub turnstile_secret: Option<Secret<String>>,
    pub turnstile_sitekey: Option<String>,
    /// Public base URL used to build `/verify` links.
    pub public_base: Option<String>,
    /// Lifetime of an issued challenge token.
    pub token_ttl_secs: u64,
    pub siteverify_url: String,
}

impl std::fmt::Debug for VerificationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationConfig")
            .field(
                "turnstile_secret",
                &self.turnstile_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("turnstile_sitekey", &self.turnstile_sitekey)
            .field("public_base", &self.public_base)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            turnstile_secret: None,
            turnstile_sitekey: None,
            public_base: None,
            token_ttl_secs: 900,
            siteverify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".into(),
        }
    }
}

impl VerificationConfig {
    /// Verification gates traffic only when both halves are configured.
    pub fn is_enabled(&self) -> bool {
        let secret = self
            .turnstile_secret
            .as_ref()
            .is_some_and(|s| !s.expose_secret().is_empty());
        let sitekey = self
            .turnstile_sitekey
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        secret && sitekey
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_album_limits() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.media_group.max_items, 10);
        assert_eq!(cfg.media_group.quiet_period_ms, 2_000);
        assert_eq!(cfg.media_group.buffer_ttl_secs, 60);
        assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
        assert_eq!(cfg.server.port, 8787);
        assert!(!cfg.verification.is_enabled());
    }

    #[test]
    fn deserialize_partial_toml() {
        let cfg: BridgeConfig = toml::from_str(
            r#"
            [telegram]
            token = "123:ABC"
            workspace_chat_id = -1001234

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.telegram.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.telegram.workspace_chat_id, -1001234);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        // unspecified sections keep their defaults
        assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
        assert_eq!(cfg.verification.token_ttl_secs, 900);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = TelegramConfig {
            token: Secret::new("super-secret".into()),
            webhook_secret: Some(Secret::new("hook-secret".into())),
            ..Default::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("hook-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn verification_requires_both_halves() {
        let mut cfg = VerificationConfig {
            turnstile_secret: Some(Secret::new("s".into())),
            ..Default::default()
        };
        assert!(!cfg.is_enabled());
        cfg.turnstile_sitekey = Some("site".into());
        assert!(cfg.is_enabled());
        cfg.turnstile_sitekey = Some(String::new());
        assert!(!cfg.is_enabled());
    }
}
