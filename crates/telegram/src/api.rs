//! Minimal JSON client for Bot API methods.

use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    topicbridge_relay::{DeliveryResult, GatewayError},
    tracing::{debug, warn},
};

use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

/// Posts JSON payloads to `<api_base>/bot<token>/<method>`.
#[derive(Clone)]
pub struct BotApi {
    client: reqwest::Client,
    api_base: String,
    token: Secret<String>,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApi")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl BotApi {
    pub fn new(api_base: &str, token: Secret<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, api_base, token))
    }

    pub fn with_client(client: reqwest::Client, api_base: &str, token: Secret<String>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.token.expose_secret()
        )
    }

    /// Call `method` and decode its `result`.
    pub async fn call<T, P>(&self, method: &str, payload: &P) -> DeliveryResult<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        match self.send::<T, P>(method, payload).await? {
            Some(result) => Ok(result),
            None => Err(GatewayError::new(None, "missing result in telegram response")),
        }
    }

    /// Call `method` and only check that it succeeded.
    pub async fn call_unit<P>(&self, method: &str, payload: &P) -> DeliveryResult
    where
        P: Serialize + ?Sized,
    {
        self.send::<serde::de::IgnoredAny, P>(method, payload)
            .await
            .map(|_| ())
    }

    async fn send<T, P>(&self, method: &str, payload: &P) -> DeliveryResult<Option<T>>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.url(method))
            .json(payload)
            .send()
            .await
            // the url embeds the bot token
            .map_err(|e| GatewayError::transport(e.without_url()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::transport(e.without_url()))?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(method, %status, error = %e, "undecodable bot api response");
                return Err(GatewayError::new(
                    Some(i64::from(status.as_u16())),
                    "invalid json from telegram",
                ));
            },
        };

        if envelope.ok {
            debug!(method, "bot api call succeeded");
            return Ok(envelope.result);
        }
        let err = GatewayError::new(
            envelope.error_code,
            envelope
                .description
                .unwrap_or_else(|| "unknown telegram error".to_string()),
        );
        debug!(method, code = ?err.code, description = %err.description, "bot api call failed");
        Err(err)
    }
}
