use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    futures::TryStreamExt,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    },
    tracing::{debug, info},
};

use {
    sigline_common::time::now_ms,
    sigline_records::{Attachment, ChatSummary, NormalizedMessage},
};

use crate::{
    Error, Result,
    error::Context,
    store::{HistoryStats, HistoryStore, RecentQuery},
};

const MESSAGE_COLUMNS: &str = "sender, sender_name, timestamp, body, attachments, \
                               is_group, group_id, group_name, recipient";

/// Matches a conversation by address, group id or display name. Binds `?1`.
///
/// Outgoing rows carry the other party in `recipient`, so a display name is
/// resolved to the addresses it was seen sending from.
const CONTACT_MATCH: &str = "(sender = ?1 \
     OR recipient = ?1 \
     OR group_id = ?1 \
     OR sender_name = ?1 COLLATE NOCASE \
     OR recipient IN (SELECT sender FROM messages WHERE sender_name = ?1 COLLATE NOCASE))";

#[derive(sqlx::FromRow)]
struct MessageRow {
    sender: String,
    sender_name: Option<String>,
    timestamp: i64,
    body: Option<String>,
    attachments: String,
    is_group: bool,
    group_id: Option<String>,
    group_name: Option<String>,
    recipient: Option<String>,
}

impl MessageRow {
    fn matches(&self, needle: &str) -> bool {
        [
            self.body.as_deref(),
            Some(self.sender.as_str()),
            self.sender_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

impl TryFrom<MessageRow> for NormalizedMessage {
    type Error = Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        let attachments: Vec<Attachment> = serde_json::from_str(&r.attachments)?;
        Ok(Self {
            sender: r.sender,
            sender_name: r.sender_name,
            timestamp: r.timestamp,
            body: r.body,
            attachments,
            is_group: r.is_group,
            group_id: r.group_id,
            group_name: r.group_name,
            recipient: r.recipient,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    contact: String,
    contact_name: Option<String>,
    is_group: bool,
    group_name: Option<String>,
    last_message_timestamp: i64,
    last_message_body: Option<String>,
    unread_count: i64,
}

impl From<SummaryRow> for ChatSummary {
    fn from(r: SummaryRow) -> Self {
        Self {
            contact: r.contact,
            contact_name: r.contact_name,
            is_group: r.is_group,
            group_name: r.group_name,
            last_message_timestamp: r.last_message_timestamp,
            last_message_body: r.last_message_body,
            unread_count: u32::try_from(r.unread_count).unwrap_or(u32::MAX),
        }
    }
}

/// SQLite-backed message history.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database file at `path` and run
    /// migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        crate::run_migrations(&pool).await?;
        info!(path = %path.display(), "history store opened");
        Ok(Self { pool })
    }

    /// Create a store using an existing pool. Migrations must already have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_on<'e, E>(executor: E, message: &NormalizedMessage) -> Result<bool>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let attachments = serde_json::to_string(&message.attachments)?;
        let result = sqlx::query(
            "INSERT INTO messages
             (sender, sender_name, timestamp, body, attachments, is_group,
              group_id, group_name, recipient, is_read, stored_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (sender, timestamp) DO NOTHING",
        )
        .bind(&message.sender)
        .bind(&message.sender_name)
        .bind(message.timestamp)
        .bind(&message.body)
        .bind(attachments)
        .bind(message.is_group)
        .bind(&message.group_id)
        .bind(&message.group_name)
        .bind(&message.recipient)
        // Only inbound messages take part in unread bookkeeping.
        .bind(message.is_outgoing())
        .bind(now_ms())
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[cfg(feature = "metrics")]
    fn record_inserted(count: usize) {
        sigline_metrics::counter!(sigline_metrics::history::INSERTED_TOTAL)
            .increment(count as u64);
    }

    #[cfg(not(feature = "metrics"))]
    fn record_inserted(_count: usize) {}
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn insert(&self, message: &NormalizedMessage) -> Result<bool> {
        let inserted = Self::insert_on(&self.pool, message).await?;
        if inserted {
            Self::record_inserted(1);
        }
        Ok(inserted)
    }

    async fn insert_batch(&self, messages: &[NormalizedMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for message in messages {
            if Self::insert_on(&mut *tx, message).await? {
                inserted += 1;
            }
        }
        tx.commit().await?;
        debug!(
            received = messages.len(),
            inserted, "stored message batch"
        );
        Self::record_inserted(inserted);
        Ok(inserted)
    }

    async fn recent(&self, query: &RecentQuery) -> Result<Vec<NormalizedMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (?1 IS NULL OR {CONTACT_MATCH})
               AND (?2 IS NULL OR timestamp >= ?2)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(query.contact.as_deref())
            .bind(query.since)
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn search(
        &self,
        query: &str,
        contact: Option<&str>,
        limit: u32,
    ) -> Result<Vec<NormalizedMessage>> {
        // SQLite's lower() only folds ASCII, so matching happens here.
        let needle = query.to_lowercase();
        let limit = limit as usize;
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (?1 IS NULL OR {CONTACT_MATCH})
             ORDER BY timestamp DESC, id DESC"
        );
        let mut rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(contact)
            .fetch(&self.pool);

        let mut hits = Vec::new();
        while hits.len() < limit
            && let Some(row) = rows.try_next().await?
        {
            if row.matches(&needle) {
                hits.push(row.try_into()?);
            }
        }
        Ok(hits)
    }

    async fn chat_summaries(&self, limit: u32) -> Result<Vec<ChatSummary>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "WITH keyed AS (
                 SELECT id, timestamp, body, is_group, sender_name, group_name,
                        recipient, is_read,
                        CASE
                            WHEN is_group = 1 AND group_id IS NOT NULL THEN group_id
                            WHEN recipient IS NOT NULL THEN recipient
                            ELSE sender
                        END AS contact
                 FROM messages
             ),
             ranked AS (
                 SELECT *, ROW_NUMBER() OVER (
                     PARTITION BY contact ORDER BY timestamp DESC, id DESC
                 ) AS rn
                 FROM keyed
             )
             SELECT r.contact AS contact,
                    r.is_group AS is_group,
                    r.timestamp AS last_message_timestamp,
                    r.body AS last_message_body,
                    (SELECT k.sender_name FROM keyed k
                     WHERE k.contact = r.contact AND k.is_group = 0
                       AND k.recipient IS NULL AND k.sender_name IS NOT NULL
                     ORDER BY k.timestamp DESC LIMIT 1) AS contact_name,
                    (SELECT k.group_name FROM keyed k
                     WHERE k.contact = r.contact AND k.group_name IS NOT NULL
                     ORDER BY k.timestamp DESC LIMIT 1) AS group_name,
                    (SELECT COUNT(*) FROM keyed k
                     WHERE k.contact = r.contact AND k.recipient IS NULL
                       AND k.is_read = 0) AS unread_count
             FROM ranked r
             WHERE r.rn = 1
             ORDER BY r.timestamp DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_read(&self, address: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1
             WHERE is_read = 0 AND recipient IS NULL
               AND ((is_group = 0 AND sender = ?1) OR (is_group = 1 AND group_id = ?1))",
        )
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find(&self, timestamp: i64, sender: Option<&str>) -> Result<Option<NormalizedMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE timestamp = ?1 AND (?2 IS NULL OR sender = ?2)
             ORDER BY id
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(timestamp)
            .bind(sender)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE timestamp < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        let pruned = result.rows_affected();
        #[cfg(feature = "metrics")]
        sigline_metrics::counter!(sigline_metrics::history::PRUNED_TOTAL).increment(pruned);
        Ok(pruned)
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let (messages, unread, oldest, newest) =
            sqlx::query_as::<_, (i64, i64, Option<i64>, Option<i64>)>(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN is_read = 0 AND recipient IS NULL THEN 1 ELSE 0 END), 0),
                        MIN(timestamp),
                        MAX(timestamp)
                 FROM messages",
            )
            .fetch_one(&self.pool)
            .await?;
        Ok(HistoryStats {
            messages,
            unread,
            oldest,
            newest,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteHistoryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteHistoryStore::with_pool(pool)
    }

    #[tokio::test]
    async fn open_reports_which_path_failed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let err = SqliteHistoryStore::open(&blocker.join("history.db"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Message { .. }));
        assert!(
            err.to_string()
                .starts_with(&format!("creating {}: ", blocker.display())),
            "{err}"
        );

        let store = SqliteHistoryStore::open(&dir.path().join("db").join("history.db"))
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().messages, 0);
    }

    fn incoming(sender: &str, name: Option<&str>, ts: i64, body: &str) -> NormalizedMessage {
        NormalizedMessage {
            sender: sender.into(),
            sender_name: name.map(Into::into),
            timestamp: ts,
            body: Some(body.into()),
            attachments: Vec::new(),
            is_group: false,
            group_id: None,
            group_name: None,
            recipient: None,
        }
    }

    fn outgoing(recipient: &str, ts: i64, body: &str) -> NormalizedMessage {
        NormalizedMessage {
            sender: "+15550000000".into(),
            recipient: Some(recipient.into()),
            ..incoming("+15550000000", None, ts, body)
        }
    }

    fn group(sender: &str, group_id: &str, ts: i64, body: &str) -> NormalizedMessage {
        NormalizedMessage {
            is_group: true,
            group_id: Some(group_id.into()),
            group_name: Some("Climbing".into()),
            ..incoming(sender, None, ts, body)
        }
    }

    #[tokio::test]
    async fn duplicate_sender_timestamp_is_stored_once() {
        let store = store().await;
        let msg = incoming("+100", Some("Alice"), 1_000, "hello");
        assert!(store.insert(&msg).await.unwrap());
        assert!(!store.insert(&msg).await.unwrap());

        let batch = vec![msg.clone(), incoming("+100", Some("Alice"), 1_001, "again")];
        assert_eq!(store.insert_batch(&batch).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().messages, 2);
    }

    #[tokio::test]
    async fn same_timestamp_from_different_senders_is_kept() {
        let store = store().await;
        store.insert(&incoming("+100", None, 5, "a")).await.unwrap();
        store.insert(&incoming("+200", None, 5, "b")).await.unwrap();
        assert_eq!(store.stats().await.unwrap().messages, 2);
    }

    #[tokio::test]
    async fn attachments_survive_storage() {
        let store = store().await;
        let mut msg = incoming("+100", None, 7, "pic");
        msg.attachments.push(Attachment {
            id: "abc.jpg".into(),
            content_type: Some("image/jpeg".into()),
            filename: None,
            size: Some(42),
        });
        store.insert(&msg).await.unwrap();
        let found = store.find(7, Some("+100")).await.unwrap().unwrap();
        assert_eq!(found, msg);
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_limited() {
        let store = store().await;
        for ts in 1..=5 {
            store
                .insert(&incoming("+100", None, ts, &format!("m{ts}")))
                .await
                .unwrap();
        }
        let recent = store
            .recent(&RecentQuery {
                limit: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        let stamps: Vec<_> = recent.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn contact_filter_is_bidirectional_and_accepts_names() {
        let store = store().await;
        store
            .insert_batch(&[
                incoming("+100", Some("Alice"), 1, "hi from alice"),
                outgoing("+100", 2, "hi alice"),
                incoming("+200", Some("Bob"), 3, "hi from bob"),
            ])
            .await
            .unwrap();

        for contact in ["+100", "alice"] {
            let msgs = store
                .recent(&RecentQuery {
                    limit: 10,
                    contact: Some(contact.into()),
                    since: None,
                })
                .await
                .unwrap();
            let stamps: Vec<_> = msgs.iter().map(|m| m.timestamp).collect();
            assert_eq!(stamps, vec![2, 1], "contact {contact}");
        }

        let since = store
            .recent(&RecentQuery {
                limit: 10,
                contact: None,
                since: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(since.len(), 2);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_across_fields() {
        let store = store().await;
        store
            .insert_batch(&[
                incoming("+100", Some("Alice"), 1, "Team MEETING at noon"),
                incoming("+200", Some("Meeting Room Bot"), 2, "booked"),
                incoming("+300", None, 3, "lunch?"),
                outgoing("+100", 4, "see you at the meeting"),
            ])
            .await
            .unwrap();

        let hits = store.search("meeting", None, 50).await.unwrap();
        let stamps: Vec<_> = hits.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![4, 2, 1]);

        let scoped = store.search("meeting", Some("+100"), 50).await.unwrap();
        assert_eq!(scoped.len(), 2);

        let limited = store.search("meeting", None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        assert!(store.search("nothing here", None, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summaries_group_conversations_and_count_inbound_unread() {
        let store = store().await;
        store
            .insert_batch(&[
                incoming("+100", Some("Alice"), 10, "one"),
                incoming("+100", Some("Alice"), 11, "two"),
                outgoing("+100", 12, "reply"),
                group("+200", "R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==", 20, "group hi"),
                outgoing("+300", 5, "cold open"),
            ])
            .await
            .unwrap();

        let summaries = store.chat_summaries(10).await.unwrap();
        let contacts: Vec<_> = summaries.iter().map(|s| s.contact.as_str()).collect();
        assert_eq!(
            contacts,
            vec!["R3JvdXBJZGVudGlmaWVyMTIzNDU2Nzg5MA==", "+100", "+300"]
        );

        let group_summary = &summaries[0];
        assert!(group_summary.is_group);
        assert_eq!(group_summary.group_name.as_deref(), Some("Climbing"));
        assert_eq!(group_summary.unread_count, 1);

        let alice = &summaries[1];
        assert_eq!(alice.contact_name.as_deref(), Some("Alice"));
        assert_eq!(alice.last_message_timestamp, 12);
        assert_eq!(alice.last_message_body.as_deref(), Some("reply"));
        assert_eq!(alice.unread_count, 2);

        assert_eq!(summaries[2].unread_count, 0);
        assert_eq!(store.chat_summaries(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_read_only_touches_one_conversation() {
        let store = store().await;
        store
            .insert_batch(&[
                incoming("+100", None, 1, "a"),
                incoming("+100", None, 2, "b"),
                incoming("+200", None, 3, "c"),
            ])
            .await
            .unwrap();
        assert_eq!(store.mark_read("+100").await.unwrap(), 2);
        assert_eq!(store.mark_read("+100").await.unwrap(), 0);
        assert_eq!(store.stats().await.unwrap().unread, 1);
    }

    #[tokio::test]
    async fn prune_evicts_by_age() {
        let store = store().await;
        store
            .insert_batch(&[
                incoming("+100", None, 100, "old"),
                incoming("+100", None, 200, "new"),
            ])
            .await
            .unwrap();
        assert_eq!(store.prune_older_than(150).await.unwrap(), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.oldest, Some(200));
    }

    #[tokio::test]
    async fn open_creates_file_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        {
            let store = SqliteHistoryStore::open(&path).await.unwrap();
            store.insert(&incoming("+100", None, 1, "kept")).await.unwrap();
        }
        let reopened = SqliteHistoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().messages, 1);
    }
}
