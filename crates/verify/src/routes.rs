//! `/verify` page and form handler.

use std::sync::Arc;

use {
    askama::Template,
    axum::{
        Form, Router,
        extract::{Query, State},
        http::StatusCode,
        response::{Html, IntoResponse, Response},
        routing::get,
    },
    serde::Deserialize,
    tracing::{error, warn},
};

use crate::{error::Error, gate::TurnstileGate};

#[derive(Template)]
#[template(path = "verify.html", escape = "html")]
struct VerifyPage<'a> {
    sitekey: &'a str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct SubmitForm {
    #[serde(default, rename = "cf-turnstile-response")]
    response: String,
    #[serde(default)]
    token: String,
}

/// Routes serving the challenge page and accepting its submission.
pub fn router(gate: Arc<TurnstileGate>) -> Router {
    Router::new()
        .route("/verify", get(page).post(submit))
        .with_state(gate)
}

async fn page(State(gate): State<Arc<TurnstileGate>>, Query(query): Query<PageQuery>) -> Response {
    if query.token.is_empty() || gate.sitekey().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token or sitekey").into_response();
    }
    let page = VerifyPage {
        sitekey: gate.sitekey(),
        token: &query.token,
    };
    match page.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render verification page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

async fn submit(State(gate): State<Arc<TurnstileGate>>, Form(form): Form<SubmitForm>) -> Response {
    match gate.complete(form.token.trim(), form.response.trim()).await {
        Ok(_) => (
            StatusCode::OK,
            "Verification succeeded. Return to Telegram to continue the conversation.",
        )
            .into_response(),
        Err(Error::MissingFields) => {
            (StatusCode::BAD_REQUEST, "Missing verification data").into_response()
        },
        Err(Error::ChallengeFailed) => {
            (StatusCode::BAD_REQUEST, "Verification failed, go back and try again").into_response()
        },
        Err(Error::UnknownToken) => (
            StatusCode::BAD_REQUEST,
            "This verification link has expired. Send the bot a message to get a new one.",
        )
            .into_response(),
        Err(e @ Error::Siteverify(_)) => {
            warn!(error = %e, "turnstile unreachable");
            (StatusCode::BAD_GATEWAY, "Verification service unavailable").into_response()
        },
        Err(e) => {
            error!(error = %e, "verification failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}
