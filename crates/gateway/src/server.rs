use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    constant_time_eq::constant_time_eq,
    secrecy::ExposeSecret,
    tower_http::trace::TraceLayer,
    tracing::{Instrument, debug, info, info_span, warn},
};

use topicbridge_telegram::Update;

use crate::state::GatewayState;

/// Header Telegram uses to echo the secret registered with `setWebhook`.
const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the HTTP app (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let mut router = Router::new()
        .route("/", post(webhook_handler).get(ok_handler))
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state));

    if let Some(gate) = &state.verification {
        router = router.merge(topicbridge_verify::router(Arc::clone(gate)));
    }

    router.layer(TraceLayer::new_for_http())
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Serve until `shutdown` resolves, then wait up to `drain_timeout` for
/// pending album flushes.
pub async fn start_gateway(
    state: Arc<GatewayState>,
    bind: &str,
    port: u16,
    drain_timeout: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let app = build_gateway_app(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, version = %state.version, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("gateway stopped accepting requests, draining");
    if !state.relay.aggregator().drain(drain_timeout).await {
        warn!(
            timeout_secs = drain_timeout.as_secs(),
            "gave up waiting for media group flushes"
        );
    }
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn secret_matches(provided: &str, expected: &str) -> bool {
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

async fn webhook_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secret_matches(provided, expected.expose_secret()) {
            warn!("webhook request with missing or wrong secret token");
            return (StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable update");
            return (StatusCode::OK, "OK");
        },
    };

    let span = info_span!("update", update_id = update.update_id);
    if let Some(event) = update.into_event() {
        let outcome = state.relay.handle(event).instrument(span.clone()).await;
        span.in_scope(|| debug!(?outcome, "update handled"));
    }
    (StatusCode::OK, "OK")
}

async fn ok_handler() -> &'static str {
    "OK"
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}
