//! Periodic eviction of old history.

use std::{sync::Arc, time::Duration};

use {
    sigline_common::time::{days_before, now_ms},
    sigline_history::HistoryStore,
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Delete everything older than `retention_days`. Returns the number of
/// messages removed.
pub async fn prune_once(history: &dyn HistoryStore, retention_days: u32) -> anyhow::Result<u64> {
    let cutoff = days_before(now_ms(), retention_days);
    let pruned = history.prune_older_than(cutoff).await?;
    if pruned > 0 {
        info!(pruned, retention_days, cutoff, "pruned old history");
    } else {
        debug!(retention_days, "nothing to prune");
    }
    Ok(pruned)
}

/// Prune now, then every `interval`, until `cancel` fires.
pub fn spawn_retention(
    history: Arc<dyn HistoryStore>,
    retention_days: u32,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = prune_once(history.as_ref(), retention_days).await {
                        warn!(error = %e, "history pruning failed");
                    }
                },
            }
        }
        debug!("retention task stopped");
    })
}
