//! Config schema types (signal-cli, server, history).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiglineConfig {
    pub signal: SignalConfig,
    pub server: ServerConfig,
    pub history: HistoryConfig,
}

/// How to reach the signal-cli binary and which account it acts as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Account identity passed as `-a`, usually a phone number like `+15551234567`.
    pub account: Option<String>,
    /// Binary name or path. Bare names are resolved through `PATH`.
    pub cli_path: String,
    /// Upper bound for one signal-cli invocation.
    pub timeout_ms: u64,
    /// How long `receive` waits for new messages before returning.
    pub receive_wait_secs: u64,
    /// Where signal-cli stores downloaded attachments. Defaults to
    /// `<data dir>/signal-cli/attachments`.
    pub attachments_dir: Option<PathBuf>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            account: None,
            cli_path: "signal-cli".into(),
            timeout_ms: 30_000,
            receive_wait_secs: 5,
            attachments_dir: None,
        }
    }
}

impl SignalConfig {
    /// Attachments directory with the signal-cli default filled in.
    #[must_use]
    pub fn resolved_attachments_dir(&self) -> PathBuf {
        if let Some(dir) = &self.attachments_dir {
            return dir.clone();
        }
        directories::BaseDirs::new()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("signal-cli")
            .join("attachments")
    }
}

/// HTTP/SSE server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub host: String,
    pub port: u16,
    /// Path of the stream-open endpoint.
    pub sse_path: String,
    /// Path follow-up requests are posted to. Announced to clients in the
    /// `endpoint` event.
    pub message_path: String,
    /// Absolute URL prefix for the announced endpoint, e.g.
    /// `https://signal.example.com`. Relative when unset.
    pub public_url: Option<String>,
    /// Interval between keep-alive comments on open streams.
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            sse_path: "/sse".into(),
            message_path: "/message".into(),
            public_url: None,
            keepalive_secs: 15,
        }
    }
}

/// Local message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// SQLite file. Defaults to `<data dir>/history.db`.
    pub database_path: Option<PathBuf>,
    /// Messages older than this are evicted.
    pub retention_days: u32,
    /// How often the gateway runs eviction.
    pub prune_interval_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            retention_days: 30,
            prune_interval_secs: 3600,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("history.db"))
    }
}
