//! SQLite implementation of [`SharedStore`].
//!
//! Lets a redirect page running in another process hand result records to
//! the coordinator through a common database file.

use std::sync::Arc;

use async_trait::async_trait;
use oauthlink_core::{SharedStore, StoreError, StoreResult};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use tracing::trace;

use crate::Database;

pub struct SqliteSharedStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteSharedStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    pub fn open(path: &std::path::Path) -> StoreResult<Self> {
        let db = Database::open(path).map_err(StoreError::Backend)?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::open_in_memory().map_err(StoreError::Backend)?;
        Ok(Self::new(Arc::new(Mutex::new(db))))
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait]
impl SharedStore for SqliteSharedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().await;
        db.connection()
            .query_row(
                "SELECT value FROM shared_store WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO shared_store (key, value, updated_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(backend)?;
        trace!(key, "[Storage] Record written");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM shared_store WHERE key = ?", params![key])
            .map_err(backend)?;
        Ok(())
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().await;
        let value = db
            .connection()
            .query_row(
                "DELETE FROM shared_store WHERE key = ? RETURNING value",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        if value.is_some() {
            trace!(key, "[Storage] Record taken");
        }
        Ok(value)
    }
}
