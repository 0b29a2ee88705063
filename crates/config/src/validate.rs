//! Configuration validation.
//!
//! Produces diagnostics instead of failing on the first problem so
//! `sigline config check` can report everything at once. Any
//! [`Severity::Error`] is fatal at startup.

use crate::schema::SiglineConfig;

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
    /// Dotted path, e.g. "signal.account"
    pub path: &'static str,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
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

    /// First error message, for a one-line startup failure.
    #[must_use]
    pub fn first_error(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Validate a fully resolved configuration (file + env + flags).
#[must_use]
pub fn validate(config: &SiglineConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match config.signal.account.as_deref().map(str::trim) {
        None | Some("") => result.push(
            Severity::Error,
            "signal.account",
            "account identity is required (set SIGNAL_ACCOUNT or [signal].account)",
        ),
        Some(account) if !account.starts_with('+') => result.push(
            Severity::Warning,
            "signal.account",
            format!("account '{account}' does not look like an E.164 phone number"),
        ),
        Some(_) => {},
    }

    if config.signal.cli_path.trim().is_empty() {
        result.push(Severity::Error, "signal.cli_path", "must not be empty");
    }
    if config.signal.timeout_ms == 0 {
        result.push(Severity::Error, "signal.timeout_ms", "must be greater than 0");
    }
    if config.signal.receive_wait_secs * 1000 >= config.signal.timeout_ms {
        result.push(
            Severity::Warning,
            "signal.receive_wait_secs",
            "receive wait is not shorter than the command timeout; receive calls will time out",
        );
    }

    if config.server.port == 0 {
        result.push(Severity::Error, "server.port", "must be greater than 0");
    }
    for (path, value) in [
        ("server.sse_path", &config.server.sse_path),
        ("server.message_path", &config.server.message_path),
    ] {
        if !value.starts_with('/') {
            result.push(Severity::Error, path, format!("'{value}' must start with '/'"));
        }
    }
    if config.server.sse_path == config.server.message_path {
        result.push(
            Severity::Error,
            "server.message_path",
            "must differ from server.sse_path",
        );
    }
    if config.server.keepalive_secs == 0 {
        result.push(Severity::Error, "server.keepalive_secs", "must be greater than 0");
    }
    if let Some(url) = config.server.public_url.as_deref()
        && !(url.starts_with("http://") || url.starts_with("https://"))
    {
        result.push(
            Severity::Error,
            "server.public_url",
            format!("'{url}' must be an http(s) URL"),
        );
    }
    if config.server.host == "0.0.0.0" && config.server.public_url.is_none() {
        result.push(
            Severity::Info,
            "server.public_url",
            "listening on all interfaces; clients receive a relative message endpoint",
        );
    }

    if config.history.retention_days == 0 {
        result.push(Severity::Error, "history.retention_days", "must be greater than 0");
    }
    if config.history.prune_interval_secs == 0 {
        result.push(
            Severity::Error,
            "history.prune_interval_secs",
            "must be greater than 0",
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SiglineConfig {
        let mut cfg = SiglineConfig::default();
        cfg.signal.account = Some("+15551234567".into());
        cfg
    }

    #[test]
    fn default_with_account_is_valid() {
        let result = validate(&valid());
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Info), 1);
    }

    #[test]
    fn missing_account_is_fatal() {
        let result = validate(&SiglineConfig::default());
        assert!(result.has_errors());
        assert_eq!(result.first_error().map(|d| d.path), Some("signal.account"));
    }

    #[test]
    fn blank_account_is_fatal() {
        let mut cfg = valid();
        cfg.signal.account = Some("   ".into());
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn zero_timeout_and_relative_path_are_errors() {
        let mut cfg = valid();
        cfg.signal.timeout_ms = 0;
        cfg.server.message_path = "message".into();
        let result = validate(&cfg);
        let paths: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.path)
            .collect();
        assert!(paths.contains(&"signal.timeout_ms"));
        assert!(paths.contains(&"server.message_path"));
    }

    #[test]
    fn non_e164_account_warns() {
        let mut cfg = valid();
        cfg.signal.account = Some("alice.01".into());
        let result = validate(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }
}
