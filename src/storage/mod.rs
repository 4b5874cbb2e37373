//! SQLite persistence
//!
//! A single SQLite database holds the source registry, the local content
//! store, original snapshots, category mappings, media assets, the activity
//! log and (by default) the scheduler state. [`Database`] owns the shared
//! connection and the schema; the repositories in the submodules borrow it.

pub mod activity;
pub mod content;
pub mod dedup;
pub mod media;
pub mod sources;
pub mod state;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use activity::{ActivityLog, ActivityLogger, SqliteActivityLog};
pub use content::{ContentStore, SqliteContentStore};
pub use dedup::Deduplicator;
pub use media::{LocalMediaStore, MediaStore, StoredMedia};
pub use sources::{SourceRepository, SqliteSourceRepository};
pub use state::{RedisStateStore, SqliteStateStore, StateStore};

/// Shared SQLite handle
///
/// Cloning is cheap; all clones use the same connection behind a mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite database initialized");
        Ok(db)
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory SQLite")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.create_schema()?;
        Ok(db)
    }

    /// Lock the shared connection
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("SQLite connection mutex poisoned"))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS sources (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL UNIQUE,
                    status TEXT NOT NULL DEFAULT 'not_started',
                    start_date TEXT NOT NULL,
                    current_page INTEGER NOT NULL DEFAULT 1,
                    last_processed_at TEXT,
                    last_check_at TEXT,
                    error_count INTEGER NOT NULL DEFAULT 0,
                    post_type TEXT NOT NULL DEFAULT 'post',
                    posts_count INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    excerpt TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'publish',
                    author_id INTEGER NOT NULL,
                    post_type TEXT NOT NULL,
                    published_at TEXT,
                    published_at_gmt TEXT,
                    remote_guid TEXT NOT NULL,
                    source_url TEXT NOT NULL,
                    thumbnail_id INTEGER,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_remote_guid
                    ON posts(remote_guid, post_type);

                CREATE TABLE IF NOT EXISTS imported_posts (
                    post_id INTEGER PRIMARY KEY,
                    remote_guid TEXT NOT NULL,
                    source_url TEXT NOT NULL,
                    post_type TEXT NOT NULL,
                    original_url TEXT,
                    original_title TEXT NOT NULL,
                    original_content TEXT NOT NULL,
                    original_excerpt TEXT NOT NULL,
                    original_terms TEXT NOT NULL DEFAULT '{}',
                    imported_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                );

                CREATE TABLE IF NOT EXISTS post_categories (
                    post_id INTEGER NOT NULL,
                    category_id INTEGER NOT NULL,
                    PRIMARY KEY (post_id, category_id)
                );

                CREATE TABLE IF NOT EXISTS post_tags (
                    post_id INTEGER NOT NULL,
                    tag_id INTEGER NOT NULL,
                    PRIMARY KEY (post_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS category_mappings (
                    remote_name TEXT PRIMARY KEY,
                    category_id INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS media_assets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    post_id INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    url TEXT NOT NULL,
                    alt_text TEXT,
                    source_url TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_media_assets_post
                    ON media_assets(post_id);

                CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source_url TEXT,
                    severity TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_activity_log_created
                    ON activity_log(created_at);

                CREATE TABLE IF NOT EXISTS state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    expires_at INTEGER
                );
                "#,
        )
        .context("Failed to create SQLite schema")?;

        Ok(())
    }
}

/// Parse an RFC 3339 timestamp column, falling back to now on garbage
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional RFC 3339 timestamp column
pub(crate) fn parse_opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| {
        DateTime::parse_from_rfc3339(&v)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_file_and_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("syndic.db");

        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let conn = db.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('sources', 'posts', 'state')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::in_memory().unwrap();
        assert!(db.create_schema().is_ok());
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-01-05T10:00:00+00:00");
        assert_eq!(ts.to_rfc3339(), "2024-01-05T10:00:00+00:00");
        assert!(parse_opt_timestamp(Some("garbage".into())).is_none());
        assert!(parse_opt_timestamp(None).is_none());
    }
}
