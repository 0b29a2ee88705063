use async_trait::async_trait;

use sigline_records::{ChatSummary, NormalizedMessage};

use crate::Result;

/// Filter for [`HistoryStore::recent`].
#[derive(Debug, Clone, Default)]
pub struct RecentQuery {
    pub limit: u32,
    /// Address or display name. Matches messages from that party, messages
    /// this account sent to them, and group messages for a group id.
    pub contact: Option<String>,
    /// Only messages with `timestamp >= since` (milliseconds).
    pub since: Option<i64>,
}

/// Row counts for `sigline history stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryStats {
    pub messages: i64,
    pub unread: i64,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

/// Persistent record of observed messages.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Store a message unless one with the same `(sender, timestamp)` exists.
    /// Returns whether it was new.
    async fn insert(&self, message: &NormalizedMessage) -> Result<bool>;

    /// Insert-if-absent for a batch, atomically. Returns how many were new.
    async fn insert_batch(&self, messages: &[NormalizedMessage]) -> Result<usize>;

    /// Most recent messages first.
    async fn recent(&self, query: &RecentQuery) -> Result<Vec<NormalizedMessage>>;

    /// Case-insensitive substring match on body, sender address and sender
    /// display name, most recent first.
    async fn search(
        &self,
        query: &str,
        contact: Option<&str>,
        limit: u32,
    ) -> Result<Vec<NormalizedMessage>>;

    /// One summary per conversation, most recently active first.
    async fn chat_summaries(&self, limit: u32) -> Result<Vec<ChatSummary>>;

    /// Mark inbound messages of one conversation (direct address or group
    /// id) as read. Returns how many changed.
    async fn mark_read(&self, address: &str) -> Result<u64>;

    /// Look up a message by timestamp, optionally pinned to a sender.
    async fn find(&self, timestamp: i64, sender: Option<&str>) -> Result<Option<NormalizedMessage>>;

    /// Delete messages with `timestamp < cutoff_ms`. Returns how many went.
    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64>;

    async fn stats(&self) -> Result<HistoryStats>;
}
