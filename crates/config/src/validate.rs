//! Configuration validation.
//!
//! Checks a loaded [`BridgeConfig`] for values the relay cannot run with and
//! for risky-but-legal combinations, reporting each as a [`Diagnostic`].

use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::schema::BridgeConfig;

/// Albums on the messaging surface hold at most this many items.
const MAX_ALBUM_ITEMS: usize = 10;

/// Media-group buffers never need to outlive a day.
const MAX_BUFFER_TTL_SECS: u64 = 86_400;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "range", "security", "unresolved-env"
    pub category: &'static str,
    /// Dotted path, e.g. "media_group.max_items"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

fn push(
    out: &mut Vec<Diagnostic>,
    severity: Severity,
    category: &'static str,
    path: &str,
    message: impl Into<String>,
) {
    out.push(Diagnostic {
        severity,
        category,
        path: path.to_string(),
        message: message.into(),
    });
}

/// Validate a loaded configuration.
pub fn validate(config: &BridgeConfig, config_path: Option<PathBuf>) -> ValidationResult {
    let mut d = Vec::new();

    let token = config.telegram.token.expose_secret();
    if token.trim().is_empty() {
        push(
            &mut d,
            Severity::Error,
            "missing",
            "telegram.token",
            "bot token is required (set it in the file or TOPICBRIDGE_BOT_TOKEN)",
        );
    } else if token.contains("${") {
        push(
            &mut d,
            Severity::Error,
            "unresolved-env",
            "telegram.token",
            "token still contains an unresolved ${...} placeholder",
        );
    }

    if config.telegram.workspace_chat_id == 0 {
        push(
            &mut d,
            Severity::Error,
            "missing",
            "telegram.workspace_chat_id",
            "workspace supergroup id is required",
        );
    } else if config.telegram.workspace_chat_id > 0 {
        push(
            &mut d,
            Severity::Warning,
            "range",
            "telegram.workspace_chat_id",
            "supergroup ids are negative; a positive id is a private chat",
        );
    }

    if config.telegram.webhook_secret.is_none() {
        push(
            &mut d,
            Severity::Info,
            "security",
            "telegram.webhook_secret",
            "webhook requests are not authenticated; anyone who knows the URL can inject updates",
        );
    }

    let mg = &config.media_group;
    if !(2..=MAX_ALBUM_ITEMS).contains(&mg.max_items) {
        push(
            &mut d,
            Severity::Error,
            "range",
            "media_group.max_items",
            format!("must be between 2 and {MAX_ALBUM_ITEMS}, got {}", mg.max_items),
        );
    }
    if mg.quiet_period_ms == 0 {
        push(
            &mut d,
            Severity::Error,
            "range",
            "media_group.quiet_period_ms",
            "quiet period must be greater than zero",
        );
    }
    if mg.buffer_ttl_secs > MAX_BUFFER_TTL_SECS {
        push(
            &mut d,
            Severity::Error,
            "range",
            "media_group.buffer_ttl_secs",
            format!(
                "must be at most {MAX_BUFFER_TTL_SECS}, got {}",
                mg.buffer_ttl_secs
            ),
        );
    } else if mg.buffer_ttl_secs.saturating_mul(1_000) <= mg.quiet_period_ms {
        push(
            &mut d,
            Severity::Warning,
            "range",
            "media_group.buffer_ttl_secs",
            "buffer expiry is not longer than the quiet period; buffers may vanish before they flush",
        );
    }

    let v = &config.verification;
    let has_secret = v.turnstile_secret.is_some();
    let has_sitekey = v.turnstile_sitekey.is_some();
    if has_secret != has_sitekey {
        push(
            &mut d,
            Severity::Warning,
            "missing",
            "verification",
            "turnstile_secret and turnstile_sitekey must both be set; verification is disabled",
        );
    }
    if v.is_enabled() && v.public_base.is_none() {
        push(
            &mut d,
            Severity::Warning,
            "missing",
            "verification.public_base",
            "verification is enabled but no public_base is set; users will not receive a link",
        );
    }

    ValidationResult {
        diagnostics: d,
        config_path,
    }
}
