//! Key-value state store for the run lock, pause flag and next-run time
//!
//! Two backends are provided. [`SqliteStateStore`] keeps the keys in the
//! main database with an `expires_at` column checked inside the acquiring
//! statement. [`RedisStateStore`] uses `SET NX PX` and a compare-and-delete
//! script, so several hosts can share one scheduler.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::scheduler::error::{SchedulerError, SchedulerResult};

/// External state store with store-enforced expiry
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get a live (non-expired) value
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>>;

    /// Set a value without expiry
    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()>;

    /// Delete a key; returns whether a live value was removed
    async fn delete(&self, key: &str) -> SchedulerResult<bool>;

    /// Set `key` only when absent (or expired); returns whether it was set
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool>;

    /// Delete `key` only when it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool>;
}

// ============================================================================
// SQLite backend
// ============================================================================

/// State store kept in the `state` table of the main database
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn conn(&self) -> SchedulerResult<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db
            .conn()
            .map_err(|e| SchedulerError::state_store("lock connection", e.to_string()))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM state WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_millis()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO state (key, value, expires_at) VALUES (?1, ?2, NULL)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = NULL
            "#,
            params![key, value],
        )?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> SchedulerResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM state WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
            params![key, now_millis()],
        )?;
        // Expired leftovers are dropped too, but do not count as a removal
        conn.execute("DELETE FROM state WHERE key = ?1", params![key])?;

        Ok(affected > 0)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool> {
        let conn = self.conn()?;
        let now = now_millis();
        let expires_at = now.saturating_add(ttl.as_millis() as i64);

        let affected = conn.execute(
            r#"
            INSERT INTO state (key, value, expires_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            WHERE state.expires_at IS NOT NULL AND state.expires_at <= ?4
            "#,
            params![key, value, expires_at, now],
        )?;

        Ok(affected > 0)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool> {
        let conn = self.conn()?;
        let affected = conn.execute(
            "DELETE FROM state WHERE key = ?1 AND value = ?2 AND (expires_at IS NULL OR expires_at > ?3)",
            params![key, expected, now_millis()],
        )?;

        Ok(affected > 0)
    }
}

// ============================================================================
// Redis backend
// ============================================================================

const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// State store backed by Redis
pub struct RedisStateStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStateStore {
    /// Connect to Redis and verify the connection
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> SchedulerResult<Self> {
        let pool = PoolConfig::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| SchedulerError::state_store("create redis pool", e.to_string()))?;

        // Test connection
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %url, "Connected to Redis state store");

        Ok(Self {
            pool,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set(self.key(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SchedulerResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn.del(self.key(key)).await?;
        Ok(removed > 0)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> SchedulerResult<bool> {
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut *conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> SchedulerResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE_SCRIPT)
            .key(self.key(key))
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;

        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStateStore {
        SqliteStateStore::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_get_set_delete() {
        let store = store();
        assert_eq!(store.get("paused").await.unwrap(), None);

        store.set("paused", "1").await.unwrap();
        assert_eq!(store.get("paused").await.unwrap().as_deref(), Some("1"));

        assert!(store.delete("paused").await.unwrap());
        assert!(!store.delete("paused").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let store = store();
        let ttl = Duration::from_secs(60);
        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_expired_value_can_be_reacquired() {
        let store = store();
        assert!(store
            .set_if_absent("lock", "a", Duration::from_millis(1))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.get("lock").await.unwrap(), None);
        assert!(store
            .set_if_absent("lock", "b", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_permanent_value() {
        let store = store();
        store.set("lock", "manual").await.unwrap();
        assert!(!store
            .set_if_absent("lock", "a", Duration::from_secs(60))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = store();
        store
            .set_if_absent("lock", "owner-1", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!store.compare_and_delete("lock", "owner-2").await.unwrap());
        assert!(store.compare_and_delete("lock", "owner-1").await.unwrap());
        assert_eq!(store.get("lock").await.unwrap(), None);
    }
}
