//! Durable key-value storage for client-side state.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::api::error::ApiResult;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> StoreFuture<'_, ApiResult<Option<String>>>;

    /// Insert or overwrite a value.
    fn set(&self, key: &str, value: &str) -> StoreFuture<'_, ApiResult<()>>;

    /// Remove a value; removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreFuture<'_, ApiResult<()>>;
}

/// `SQLite` implementation of the key-value store.
pub struct SqliteKeyValueStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteKeyValueStore {
    /// Table name for stored entries.
    pub const DEFAULT_TABLE: &'static str = "kv_store";

    /// Open (or create) the database file and initialize the store.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> ApiResult<Self> {
        let conn = Connection::open(path.as_ref()).await?;
        Self::new(Arc::new(conn)).await
    }

    /// Initialize the store and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Arc<Connection>) -> ApiResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> StoreFuture<'_, ApiResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str) -> StoreFuture<'_, ApiResult<()>> {
        let key = key.to_string();
        let value = value.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let now_ms = chrono::Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (key, value, updated_at)
                             VALUES (?1, ?2, ?3)
                             ON CONFLICT(key) DO UPDATE
                             SET value = excluded.value, updated_at = excluded.updated_at"
                        ),
                        rusqlite::params![key, value, now_ms],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ApiResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreFuture<'_, ApiResult<Option<String>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: &str) -> StoreFuture<'_, ApiResult<()>> {
        self.entries.insert(key.to_string(), value.to_string());
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, ApiResult<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}
