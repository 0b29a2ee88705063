//! Local message history.
//!
//! Every message sigline observes (received through signal-cli or sent by a
//! tool) is stored once per `(sender, timestamp)`. Queries derive recency
//! lists, search hits and per-conversation summaries from the stored rows on
//! every call; nothing derived is cached.

pub mod error;
pub mod store;
pub mod store_sqlite;

pub use {
    error::{Error, Result},
    store::{HistoryStats, HistoryStore, RecentQuery},
    store_sqlite::SqliteHistoryStore,
};

/// Run database migrations for the history crate.
///
/// Creates the `messages` table and its indexes. Called by
/// [`SqliteHistoryStore::open`]; call it yourself before
/// [`SqliteHistoryStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
