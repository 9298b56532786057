use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::BridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "topicbridge.toml",
    "topicbridge.yaml",
    "topicbridge.yml",
    "topicbridge.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./topicbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/topicbridge/topicbridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BridgeConfig::default()` if no config file is found. Environment
/// overrides are applied in every case.
pub fn discover_and_load() -> BridgeConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                BridgeConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        BridgeConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/topicbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "topicbridge").map(|d| d.config_dir().to_path_buf())
}

/// Returns the user data directory holding the default SQLite database.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "topicbridge")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Apply `TOPICBRIDGE_*` environment variables on top of file values.
pub fn apply_env_overrides(config: &mut BridgeConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

/// Testable variant of [`apply_env_overrides`] with a custom lookup.
pub fn apply_env_overrides_with(
    config: &mut BridgeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("TOPICBRIDGE_BOT_TOKEN") {
        config.telegram.token = Secret::new(token);
    }
    if let Some(raw) = var("TOPICBRIDGE_WORKSPACE_CHAT_ID") {
        match raw.trim().parse() {
            Ok(id) => config.telegram.workspace_chat_id = id,
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid TOPICBRIDGE_WORKSPACE_CHAT_ID"),
        }
    }
    if let Some(raw) = var("TOPICBRIDGE_BOT_ID") {
        match raw.trim().parse() {
            Ok(id) => config.telegram.bot_id = Some(id),
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid TOPICBRIDGE_BOT_ID"),
        }
    }
    if let Some(secret) = var("TOPICBRIDGE_WEBHOOK_SECRET") {
        config.telegram.webhook_secret = Some(Secret::new(secret));
    }
    if let Some(secret) = var("TOPICBRIDGE_TURNSTILE_SECRET") {
        config.verification.turnstile_secret = Some(Secret::new(secret));
    }
    if let Some(sitekey) = var("TOPICBRIDGE_TURNSTILE_SITEKEY") {
        config.verification.turnstile_sitekey = Some(sitekey);
    }
    if let Some(base) = var("TOPICBRIDGE_PUBLIC_BASE") {
        config.verification.public_base = Some(base);
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
