//! Run lock, pause flag and next-run timestamp
//!
//! All three live in the [`StateStore`], so any process sharing the store
//! (a daemon and an operator CLI, or several hosts on Redis) sees the same
//! scheduler state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::error::{SchedulerError, SchedulerResult};
use crate::storage::StateStore;

/// Key holding the run lock token
pub const LOCK_KEY: &str = "run_lock";

/// Key holding the pause flag
pub const PAUSE_KEY: &str = "paused";

/// Key holding the next scheduled run (RFC 3339)
pub const NEXT_RUN_KEY: &str = "next_run";

/// Proof of lock ownership, needed to release it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Time-bounded mutual exclusion over the state store
#[derive(Clone)]
pub struct RunLock {
    store: Arc<dyn StateStore>,
    ttl: Duration,
}

impl RunLock {
    pub fn new(store: Arc<dyn StateStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Take the lock; `None` when someone else holds it
    pub async fn try_acquire(&self) -> SchedulerResult<Option<LockToken>> {
        let token = LockToken::generate();
        let acquired = self
            .store
            .set_if_absent(LOCK_KEY, token.as_str(), self.ttl)
            .await?;

        Ok(acquired.then_some(token))
    }

    /// Release the lock if `token` still owns it
    pub async fn release(&self, token: &LockToken) -> SchedulerResult<bool> {
        self.store.compare_and_delete(LOCK_KEY, token.as_str()).await
    }

    /// Delete the lock regardless of owner
    pub async fn force_unlock(&self) -> SchedulerResult<bool> {
        self.store.delete(LOCK_KEY).await
    }

    pub async fn is_held(&self) -> SchedulerResult<bool> {
        Ok(self.store.get(LOCK_KEY).await?.is_some())
    }
}

/// Operator-facing scheduler state: lock, pause flag and next run
#[derive(Clone)]
pub struct SchedulerControl {
    store: Arc<dyn StateStore>,
    lock: RunLock,
}

impl SchedulerControl {
    pub fn new(store: Arc<dyn StateStore>, lock_ttl: Duration) -> Self {
        Self {
            lock: RunLock::new(Arc::clone(&store), lock_ttl),
            store,
        }
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    pub async fn is_paused(&self) -> SchedulerResult<bool> {
        Ok(self.store.get(PAUSE_KEY).await?.is_some())
    }

    pub async fn is_running(&self) -> SchedulerResult<bool> {
        self.lock.is_held().await
    }

    /// Stop new cycles from starting
    pub async fn pause(&self) -> SchedulerResult<()> {
        self.store.set(PAUSE_KEY, "1").await?;
        tracing::info!("Scheduler paused");
        Ok(())
    }

    /// Allow cycles again
    pub async fn resume(&self) -> SchedulerResult<()> {
        self.store.delete(PAUSE_KEY).await?;
        tracing::info!("Scheduler resumed");
        Ok(())
    }

    /// Clear the pause flag and schedule a run right now
    ///
    /// The lock is left alone: a cycle already in flight finishes first.
    pub async fn force_run(&self) -> SchedulerResult<()> {
        self.store.delete(PAUSE_KEY).await?;
        self.set_next_run(Utc::now()).await?;
        tracing::info!("Forced run scheduled");
        Ok(())
    }

    /// Drop the run lock; returns whether a lock was held
    pub async fn force_unlock(&self) -> SchedulerResult<bool> {
        let removed = self.lock.force_unlock().await?;
        tracing::info!(removed, "Run lock force-unlocked");
        Ok(removed)
    }

    pub async fn next_run(&self) -> SchedulerResult<Option<DateTime<Utc>>> {
        let Some(value) = self.store.get(NEXT_RUN_KEY).await? else {
            return Ok(None);
        };

        DateTime::parse_from_rfc3339(&value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| SchedulerError::invalid_state(NEXT_RUN_KEY, value))
    }

    /// Overwrite the pending next-run time
    pub async fn set_next_run(&self, at: DateTime<Utc>) -> SchedulerResult<()> {
        self.store.set(NEXT_RUN_KEY, &at.to_rfc3339()).await
    }

    /// Schedule the next run `delay` from now
    pub async fn schedule_in(&self, delay: Duration) -> SchedulerResult<DateTime<Utc>> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| SchedulerError::trigger_config("delay", e.to_string()))?;
        let at = Utc::now() + delay;
        self.set_next_run(at).await?;
        Ok(at)
    }
}
