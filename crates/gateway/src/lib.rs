//! HTTP entry point: Telegram webhook, `/verify` pages and health check.

pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};
