//! Structured logging setup on top of `tracing`.
//!
//! Hosts call [`init_logging`] once at startup. Output style defaults to
//! human-readable in debug builds and JSON in release builds; per-module
//! verbosity is an `EnvFilter` directive string.
//!
//! The redaction helper exists for call sites that log values whose name
//! alone doesn't make them obviously safe; token material itself must never
//! reach a log call in the first place.

use std::io;

use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Output style for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// Multi-line human-readable output for development
    Pretty,
    /// One JSON object per line, fields flattened
    Json,
    /// Single-line abbreviated output
    Compact,
}

impl Default for LogStyle {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogStyle::Pretty
        } else {
            LogStyle::Json
        }
    }
}

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub style: LogStyle,
    /// Verbosity applied to our own crates when no directive string is given
    pub level: Level,
    /// Full `EnvFilter` directive string, overriding `level`
    pub directives: Option<String>,
    /// Include the emitting module path on each line
    pub show_target: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            style: LogStyle::default(),
            level: Level::INFO,
            directives: None,
            show_target: true,
        }
    }
}

impl LogOptions {
    pub fn style(mut self, style: LogStyle) -> Self {
        self.style = style;
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        let directives = match &self.directives {
            Some(directives) => directives.clone(),
            // Our crates at the requested level; HTTP internals stay quiet.
            None => format!(
                "core_runtime={level},core_auth={level},bridge_traits={level},\
                 hyper=warn,h2=warn,reqwest=warn",
                level = self.level.as_str().to_lowercase()
            ),
        };
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("bad log directives {directives:?}: {e}")))
    }
}

/// Install the global tracing subscriber. Errors if called twice.
pub fn init_logging(options: LogOptions) -> Result<()> {
    let filter = options.filter()?;
    let registry = tracing_subscriber::registry().with(filter);
    let init_error = |e: tracing_subscriber::util::TryInitError| {
        Error::Config(format!("logging already initialized: {e}"))
    };

    let base = tracing_subscriber::fmt::layer()
        .with_target(options.show_target)
        .with_writer(io::stdout);

    match options.style {
        LogStyle::Pretty => registry.with(base.pretty()).try_init().map_err(init_error),
        LogStyle::Json => registry
            .with(base.json().flatten_event(true))
            .try_init()
            .map_err(init_error),
        LogStyle::Compact => registry.with(base.compact()).try_init().map_err(init_error),
    }
}

/// Field names whose values are always secret.
const SECRET_FIELDS: &[&str] = &[
    "token", "code", "verifier", "secret", "password", "authorization", "bearer", "api_key",
];

/// Redact a value based on its field name before logging it.
///
/// Secret-named fields become `[REDACTED]`; email-shaped values keep their
/// first character; everything else passes through unchanged.
pub fn redact_field(field: &str, value: &str) -> String {
    let lowered = field.to_lowercase();
    if SECRET_FIELDS.iter().any(|f| lowered.contains(f)) {
        return "[REDACTED]".to_string();
    }

    match value.find('@') {
        Some(at) if at > 0 && value[at..].contains('.') => {
            format!("{}***@[REDACTED]", &value[..1])
        }
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_builder() {
        let options = LogOptions::default()
            .style(LogStyle::Compact)
            .level(Level::DEBUG)
            .directives("core_auth=trace")
            .show_target(false);

        assert_eq!(options.style, LogStyle::Compact);
        assert_eq!(options.level, Level::DEBUG);
        assert_eq!(options.directives.as_deref(), Some("core_auth=trace"));
        assert!(!options.show_target);
    }

    #[test]
    fn test_default_directives_carry_level() {
        let filter = LogOptions::default().level(Level::DEBUG).filter().unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("core_auth=debug"));
        assert!(rendered.contains("hyper=warn"));
    }

    #[test]
    fn test_explicit_directives_win() {
        let filter = LogOptions::default()
            .directives("core_auth=trace")
            .filter()
            .unwrap();
        assert!(filter.to_string().contains("core_auth=trace"));
    }

    #[test]
    fn test_bad_directives_are_rejected() {
        let result = LogOptions::default().directives("===").filter();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_secret_fields_fully_redacted() {
        assert_eq!(redact_field("access_token", "at-123"), "[REDACTED]");
        assert_eq!(redact_field("code_verifier", "v"), "[REDACTED]");
        assert_eq!(redact_field("client_secret", "s"), "[REDACTED]");
        assert_eq!(redact_field("Authorization", "Bearer x"), "[REDACTED]");
    }

    #[test]
    fn test_email_keeps_first_char_only() {
        let redacted = redact_field("email", "user@example.com");
        assert_eq!(redacted, "u***@[REDACTED]");
    }

    #[test]
    fn test_plain_values_pass_through() {
        assert_eq!(redact_field("account_id", "google:1"), "google:1");
        assert_eq!(redact_field("display_name", "Some Name"), "Some Name");
    }
}
