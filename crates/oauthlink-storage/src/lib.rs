//! OAuthLink Storage Layer
//!
//! SQLite-backed shared store for authorization result records.
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │ Redirect page (any process)  │      │ ConnectionCoordinator        │
//! │   set("<tag>_auth_result")   │      │   StorageChannel: take(...)  │
//! └──────────────┬───────────────┘      └──────────────┬───────────────┘
//!                │          SqliteSharedStore           │
//!                └──────────────► shared_store ◄────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use oauthlink_storage::{default_database_path, SqliteSharedStore};
//! use std::sync::Arc;
//!
//! let path = default_database_path().expect("no data dir");
//! let store = Arc::new(SqliteSharedStore::open(&path)?);
//! let coordinator = ConnectionCoordinator::builder(config)
//!     .with_store(store)
//!     .build()?;
//! ```

mod database;
mod shared_store;

pub use database::Database;
pub use shared_store::SqliteSharedStore;

/// Default database file name.
pub const DATABASE_FILE: &str = "oauthlink.db";

/// Get the default database path for the current platform.
pub fn default_database_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|p| p.join("oauthlink").join(DATABASE_FILE))
}
