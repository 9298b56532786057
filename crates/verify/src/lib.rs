//! Human verification for first-time users.
//!
//! Unverified users receive a one-time link to a Cloudflare Turnstile page.
//! Passing the challenge marks the user verified for good.

pub mod error;
pub mod gate;
pub mod routes;

pub use {
    error::{Error, Result},
    gate::{TurnstileGate, VerifySettings},
    routes::router,
};
