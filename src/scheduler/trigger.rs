//! Daemon trigger loop
//!
//! Sleeps until the stored next-run time, waking up at least every poll
//! interval so a resume or force-run issued by another process is picked
//! up, and stops when the shutdown future resolves.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::error::SchedulerResult;
use super::{CycleOutcome, Scheduler};
use crate::storage::ActivityLogger;

/// How often the activity log is pruned
const PRUNE_INTERVAL_HOURS: i64 = 24;

/// Trigger loop around a [`Scheduler`]
pub struct CycleTrigger {
    scheduler: Arc<Scheduler>,
    activity: ActivityLogger,
    poll_interval: Duration,
    retention_days: u32,
    last_prune: Option<DateTime<Utc>>,
}

impl CycleTrigger {
    pub fn new(scheduler: Arc<Scheduler>, activity: ActivityLogger, retention_days: u32) -> Self {
        let poll_interval = scheduler.config().poll_interval().max(Duration::from_secs(1));
        Self {
            scheduler,
            activity,
            poll_interval,
            retention_days,
            last_prune: None,
        }
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run cycles until `shutdown` resolves; returns the number of cycles run
    pub async fn run_until<F>(mut self, shutdown: F) -> SchedulerResult<usize>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0usize;

        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            "Trigger loop started"
        );

        loop {
            let sleep_for = match self.due_in().await {
                Some(wait) if !wait.is_zero() => wait.min(self.poll_interval),
                _ => {
                    match self.scheduler.run_cycle().await {
                        Ok(outcome) => {
                            if matches!(outcome, CycleOutcome::Completed { .. } | CycleOutcome::Failed { .. }) {
                                cycles += 1;
                                self.prune_if_due();
                            }
                            tracing::debug!(outcome = outcome.label(), "Cycle returned");
                        }
                        Err(e) => {
                            self.activity.failure(None, "Scheduler state unavailable", e);
                        }
                    }
                    // a short re-arm delay must not wait out the poll interval
                    match self.due_in().await {
                        Some(wait) if !wait.is_zero() => wait.min(self.poll_interval),
                        _ => self.poll_interval,
                    }
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = &mut shutdown => {
                    tracing::info!(cycles, "Trigger loop stopped");
                    break;
                }
            }
        }

        Ok(cycles)
    }

    /// Time left until the next run; `None` or zero means run now
    async fn due_in(&self) -> Option<Duration> {
        let next = match self.scheduler.control().next_run().await {
            Ok(next) => next?,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable next-run time, running now");
                return None;
            }
        };

        (next - Utc::now()).to_std().ok()
    }

    fn prune_if_due(&mut self) {
        let now = Utc::now();
        let due = self
            .last_prune
            .map_or(true, |last| now - last >= ChronoDuration::hours(PRUNE_INTERVAL_HOURS));
        if !due {
            return;
        }

        match self.activity.prune(self.retention_days) {
            Ok(removed) => {
                tracing::info!(removed, retention_days = self.retention_days, "Pruned activity log");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to prune activity log"),
        }
        self.last_prune = Some(now);
    }
}
