//! Wiring from configuration to live collaborators.

use std::{sync::Arc, time::Duration};

use {anyhow::Context, tracing::info};

use {
    sigline_config::SiglineConfig,
    sigline_history::{HistoryStore, SqliteHistoryStore},
    sigline_mcp::{McpEngineFactory, RouterConfig, ServerIdentity, SessionRouter},
    sigline_signal::{SignalCliRunner, SignalClient},
    sigline_tools::{ToolContext, ToolRegistry},
};

const INSTRUCTIONS: &str = "Tools for reading and sending Signal messages through the \
    account this server is registered with. send_message delivers a real message; \
    confirm the recipient and text with the user before calling it.";

/// Long-lived collaborators shared by every session.
#[derive(Clone)]
pub struct GatewayServices {
    pub history: Arc<dyn HistoryStore>,
    pub registry: Arc<ToolRegistry>,
}

impl GatewayServices {
    /// Open the history database and build the tool registry.
    ///
    /// Fails when no account is configured.
    pub async fn from_config(config: &SiglineConfig) -> anyhow::Result<Self> {
        let account = config
            .signal
            .account
            .clone()
            .filter(|a| !a.trim().is_empty())
            .context("no Signal account configured (set SIGNAL_ACCOUNT or signal.account)")?;

        let db_path = config.history.resolved_database_path();
        let history: Arc<dyn HistoryStore> = Arc::new(
            SqliteHistoryStore::open(&db_path)
                .await
                .with_context(|| format!("failed to open history at {}", db_path.display()))?,
        );
        info!(path = %db_path.display(), "history store ready");

        let runner = Arc::new(SignalCliRunner::new(
            config.signal.cli_path.clone(),
            account.clone(),
            Duration::from_millis(config.signal.timeout_ms),
        ));
        let client =
            SignalClient::new(runner, account).with_receive_wait(config.signal.receive_wait_secs);
        let ctx = ToolContext::new(
            client,
            Arc::clone(&history),
            config.signal.resolved_attachments_dir(),
        );

        Ok(Self {
            history,
            registry: Arc::new(ToolRegistry::with_default_tools(ctx)),
        })
    }

    /// A session router whose engines serve this registry.
    pub fn session_router(&self, config: &SiglineConfig) -> Arc<SessionRouter> {
        let engines = McpEngineFactory::new(Arc::clone(&self.registry), server_identity());
        Arc::new(SessionRouter::new(
            router_config(config),
            Arc::new(engines),
        ))
    }
}

pub fn server_identity() -> ServerIdentity {
    ServerIdentity {
        instructions: Some(INSTRUCTIONS.to_string()),
        ..ServerIdentity::default()
    }
}

pub fn router_config(config: &SiglineConfig) -> RouterConfig {
    RouterConfig {
        message_path: config.server.message_path.clone(),
        public_url: config.server.public_url.clone(),
        keepalive: Duration::from_secs(config.server.keepalive_secs.max(1)),
    }
}
