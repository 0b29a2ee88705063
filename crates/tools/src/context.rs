use std::{path::PathBuf, sync::Arc};

use tracing::debug;

use {
    sigline_history::HistoryStore,
    sigline_records::NormalizedMessage,
    sigline_signal::SignalClient,
};

/// Collaborators shared by every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub client: SignalClient,
    pub history: Arc<dyn HistoryStore>,
    /// Where signal-cli writes downloaded attachments.
    pub attachments_dir: PathBuf,
}

impl ToolContext {
    pub fn new(
        client: SignalClient,
        history: Arc<dyn HistoryStore>,
        attachments_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            history,
            attachments_dir: attachments_dir.into(),
        }
    }

    pub fn account(&self) -> &str {
        self.client.account()
    }

    /// Pull pending messages from signal-cli and persist them.
    ///
    /// Returns everything signal-cli handed out, including messages that
    /// were already stored.
    pub async fn sync_inbox(&self) -> anyhow::Result<Vec<NormalizedMessage>> {
        let received = self.client.receive().await?;
        let inserted = self.history.insert_batch(&received).await?;
        debug!(received = received.len(), inserted, "inbox synced");
        Ok(received)
    }
}
