//! In-process Bot API stand-in for tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use {
    axum::{
        Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri, header},
        response::{IntoResponse, Response},
        routing::post,
    },
    secrecy::Secret,
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

use crate::api::BotApi;

#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    /// Last path segment as sent (teloxide capitalizes method names).
    pub method: String,
    pub body: Value,
}

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: String,
}

impl Reply {
    pub fn ok(result: Value) -> Self {
        Self {
            status: 200,
            body: json!({"ok": true, "result": result}).to_string(),
        }
    }

    pub fn error(code: u16, description: &str) -> Self {
        Self {
            status: code,
            body: json!({"ok": false, "error_code": code, "description": description})
                .to_string(),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<Captured>>>,
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
}

async fn handle(State(state): State<MockState>, uri: Uri, body: Bytes) -> Response {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let reply = state
        .replies
        .lock()
        .expect("replies lock")
        .get_mut(&method.to_lowercase())
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| Reply::ok(json!(true)));

    state.requests.lock().expect("requests lock").push(Captured {
        path: uri.path().to_string(),
        method,
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    (
        StatusCode::from_u16(reply.status).expect("valid status"),
        [(header::CONTENT_TYPE, "application/json")],
        reply.body,
    )
        .into_response()
}

/// Bot API mock listening on an ephemeral local port.
///
/// Unscripted methods answer `{"ok": true, "result": true}`.
pub struct MockApi {
    addr: SocketAddr,
    state: MockState,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<()>,
}

impl MockApi {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/{*path}", post(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock bot api");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock bot api");
        });

        Self {
            addr,
            state,
            shutdown,
            server,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api(&self) -> BotApi {
        BotApi::with_client(
            reqwest::Client::new(),
            &self.base_url(),
            Secret::new("test-token".into()),
        )
    }

    /// Queue a reply for the next call to `method` (case-insensitive).
    pub fn reply(&self, method: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .expect("replies lock")
            .entry(method.to_lowercase())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.state.requests.lock().expect("requests lock").clone()
    }

    /// Bodies of every call to `method` (case-insensitive), in order.
    pub fn bodies(&self, method: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method))
            .map(|r| r.body)
            .collect()
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.server.await;
    }
}
