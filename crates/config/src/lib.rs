//! Configuration loading, validation, and env substitution.
//!
//! Config files: `topicbridge.toml`, `topicbridge.yaml`, or `topicbridge.json`
//! Searched in `./` then `~/.config/topicbridge/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values and
//! `TOPICBRIDGE_*` environment overrides for secrets.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, apply_env_overrides_with, config_dir, data_dir, discover_and_load,
        load_config,
    },
    schema::{
        BridgeConfig, MediaGroupConfig, ServerConfig, StorageBackend, StorageConfig,
        TelegramConfig, VerificationConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
