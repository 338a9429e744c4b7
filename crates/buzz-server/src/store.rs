//! Subscription persistence.
//!
//! One row per `(chat, channel)` pair with the filters comma joined. The
//! registry itself keeps nothing on disk; the bot writes here before
//! changing the registry and replays every row at startup.

use buzz_core::filter::join_filters;
use buzz_core::parse_filters;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A persisted subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubscription {
    /// Telegram chat id.
    pub chat_id: String,
    /// Channel name.
    pub channel: String,
    /// Lowercase filters.
    pub filters: Vec<String>,
}

/// SQLite-backed subscription store.
pub struct SubscriptionStore {
    conn: Mutex<Connection>,
}

impl SubscriptionStore {
    /// Open (and create if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::with_connection(conn)?;
        info!("Subscription database opened at {}", path.display());
        Ok(store)
    }

    /// Open a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                chat_id TEXT NOT NULL,
                channel TEXT NOT NULL,
                filters TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_chat_channel
                ON subscriptions(chat_id, channel);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store the filters of `chat_id` for `channel`, replacing earlier rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub fn replace(
        &self,
        chat_id: &str,
        channel: &str,
        filters: &[String],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM subscriptions WHERE chat_id = ?1 AND channel = ?2",
            params![chat_id, channel],
        )?;
        tx.execute(
            "INSERT INTO subscriptions (chat_id, channel, filters) VALUES (?1, ?2, ?3)",
            params![chat_id, channel, join_filters(filters)],
        )?;
        tx.commit()?;
        debug!(chat = %chat_id, channel = %channel, "Subscription stored");
        Ok(())
    }

    /// Delete the subscription of `chat_id` for `channel`.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub fn remove(&self, chat_id: &str, channel: &str) -> Result<usize, StoreError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM subscriptions WHERE chat_id = ?1 AND channel = ?2",
            params![chat_id, channel],
        )?;
        debug!(chat = %chat_id, channel = %channel, removed, "Subscription deleted");
        Ok(removed)
    }

    /// List the subscriptions of one chat, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_for_chat(&self, chat_id: &str) -> Result<Vec<StoredSubscription>, StoreError> {
        self.query(
            "SELECT chat_id, channel, filters FROM subscriptions WHERE chat_id = ?1 ORDER BY id",
            params![chat_id],
        )
    }

    /// List every stored subscription, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all(&self) -> Result<Vec<StoredSubscription>, StoreError> {
        self.query(
            "SELECT chat_id, channel, filters FROM subscriptions ORDER BY id",
            params![],
        )
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredSubscription>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let filters: String = row.get(2)?;
            Ok(StoredSubscription {
                chat_id: row.get(0)?,
                channel: row.get(1)?,
                filters: parse_filters(&filters),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
