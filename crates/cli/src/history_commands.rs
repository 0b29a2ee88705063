use {anyhow::Context, clap::Subcommand};

use {
    sigline_config::SiglineConfig,
    sigline_gateway::retention::prune_once,
    sigline_history::{HistoryStore, SqliteHistoryStore},
};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Delete messages older than the retention window.
    Prune {
        /// Retention in days (overrides history.retention_days).
        #[arg(long)]
        days: Option<u32>,
    },
    /// Show message counts and the stored time range.
    Stats,
}

pub async fn handle_history(action: HistoryAction, config: &SiglineConfig) -> anyhow::Result<()> {
    let path = config.history.resolved_database_path();
    let store = SqliteHistoryStore::open(&path)
        .await
        .with_context(|| format!("failed to open history at {}", path.display()))?;

    match action {
        HistoryAction::Prune { days } => {
            let days = days.unwrap_or(config.history.retention_days);
            if days == 0 {
                anyhow::bail!("retention must be at least one day");
            }
            let pruned = prune_once(&store, days).await?;
            println!("Pruned {pruned} message(s) older than {days} day(s).");
        },
        HistoryAction::Stats => {
            let stats = store.stats().await?;
            println!("Database: {}", path.display());
            println!("Messages: {}", stats.messages);
            println!("Unread:   {}", stats.unread);
            println!("Oldest:   {}", format_timestamp(stats.oldest));
            println!("Newest:   {}", format_timestamp(stats.newest));
        },
    }
    Ok(())
}

fn format_timestamp(ms: Option<i64>) -> String {
    ms.and_then(chrono::DateTime::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| "-".to_string())
}
