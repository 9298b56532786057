//! Shared types, error definitions, and utilities used across all topicbridge crates.

pub mod error;
pub mod time;
pub mod types;

pub use error::{Error, FromMessage, Result};
