use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    topicbridge_common::types::{ChatId, UserId},
    topicbridge_config::VerificationConfig,
    topicbridge_relay::{MessagingGateway, VerificationGate},
    topicbridge_store::{KeyValueStore, get_json, put_json},
    tracing::{debug, info, warn},
};

use crate::error::{Error, Result};

const SITEVERIFY_TIMEOUT: Duration = Duration::from_secs(10);

const CONFIRMATION: &str = "Verification complete. You can go back to the chat and keep writing.";

/// Turnstile settings with both credentials present.
#[derive(Clone)]
pub struct VerifySettings {
    pub secret: Secret<String>,
    pub sitekey: String,
    pub public_base: Option<String>,
    pub token_ttl: Duration,
    pub siteverify_url: String,
}

impl std::fmt::Debug for VerifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifySettings")
            .field("secret", &"[REDACTED]")
            .field("sitekey", &self.sitekey)
            .field("public_base", &self.public_base)
            .field("token_ttl", &self.token_ttl)
            .field("siteverify_url", &self.siteverify_url)
            .finish()
    }
}

impl VerifySettings {
    /// `None` unless both the secret and the sitekey are configured.
    pub fn from_config(config: &VerificationConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        Some(Self {
            secret: config.turnstile_secret.clone()?,
            sitekey: config.turnstile_sitekey.clone()?,
            public_base: config
                .public_base
                .as_deref()
                .map(|b| b.trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty()),
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            siteverify_url: config.siteverify_url.clone(),
        })
    }
}

/// Pending challenge stored under `verify:<token>`.
#[derive(Debug, Serialize, Deserialize)]
struct PendingChallenge {
    uid: UserId,
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

fn verified_key(user: UserId) -> String {
    format!("verified:{user}")
}

fn challenge_key(token: &str) -> String {
    format!("verify:{token}")
}

pub struct TurnstileGate {
    store: Arc<dyn KeyValueStore>,
    gateway: Arc<dyn MessagingGateway>,
    settings: VerifySettings,
    client: reqwest::Client,
}

impl TurnstileGate {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn MessagingGateway>,
        settings: VerifySettings,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(SITEVERIFY_TIMEOUT)
            .build()?;
        Ok(Self {
            store,
            gateway,
            settings,
            client,
        })
    }

    pub fn sitekey(&self) -> &str {
        &self.settings.sitekey
    }

    /// Issue a challenge token for `user` and return it.
    pub async fn issue(&self, user: UserId) -> Result<String> {
        let token = uuid::Uuid::new_v4().to_string();
        put_json(
            &*self.store,
            &challenge_key(&token),
            &PendingChallenge { uid: user },
            Some(self.settings.token_ttl),
        )
        .await?;
        Ok(token)
    }

    /// Check a Turnstile response and, if accepted, mark the token's owner
    /// verified. The token is single-use.
    pub async fn complete(&self, token: &str, response: &str) -> Result<UserId> {
        if token.is_empty() || response.is_empty() {
            return Err(Error::MissingFields);
        }
        if !self.siteverify(response).await? {
            return Err(Error::ChallengeFailed);
        }

        let key = challenge_key(token);
        let pending: Option<PendingChallenge> = get_json(&*self.store, &key).await?;
        let Some(PendingChallenge { uid }) = pending else {
            return Err(Error::UnknownToken);
        };

        self.store.put(&verified_key(uid), "1", None).await?;
        self.store.delete(&key).await?;
        info!(user_id = %uid, "user verified");

        if let Err(e) = self.gateway.send_text(ChatId::from(uid), CONFIRMATION).await {
            debug!(user_id = %uid, error = %e, "verification confirmation not delivered");
        }
        Ok(uid)
    }

    async fn siteverify(&self, response: &str) -> Result<bool> {
        let result: SiteverifyResponse = self
            .client
            .post(&self.settings.siteverify_url)
            .form(&[
                ("secret", self.settings.secret.expose_secret().as_str()),
                ("response", response),
            ])
            .send()
            .await?
            .json()
            .await?;
        if !result.success {
            debug!(errors = ?result.error_codes, "turnstile rejected response");
        }
        Ok(result.success)
    }

    fn link(&self, token: &str) -> Option<String> {
        self.settings
            .public_base
            .as_deref()
            .map(|base| format!("{base}/verify?token={token}"))
    }
}

#[async_trait]
impl VerificationGate for TurnstileGate {
    async fn is_verified(&self, user: UserId) -> bool {
        match self.store.get(&verified_key(user)).await {
            Ok(flag) => flag.is_some(),
            Err(e) => {
                warn!(user_id = %user, error = %e, "verification lookup failed");
                false
            },
        }
    }

    async fn request_verification(&self, user: UserId) {
        let token = match self.issue(user).await {
            Ok(token) => token,
            Err(e) => {
                warn!(user_id = %user, error = %e, "could not issue verification token");
                return;
            },
        };
        let Some(link) = self.link(&token) else {
            warn!(user_id = %user, "no public base configured, verification link not sent");
            return;
        };

        let text = format!(
            "Before your messages reach the team, please confirm you are human:\n{link}\n\n\
             Come back here once the page reports success. Until then you will keep seeing this request."
        );
        if let Err(e) = self.gateway.send_text(ChatId::from(user), &text).await {
            warn!(user_id = %user, error = %e, "verification link not delivered");
        }
    }
}
