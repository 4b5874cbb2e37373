//! Cycle scheduling
//!
//! A cycle walks every source that is not `completed` or `error` and runs
//! the per-source pipeline for each, one after another. At most one cycle
//! runs system-wide: the run lock lives in the shared state store and
//! carries a hard expiry, so a crashed worker cannot wedge the scheduler.
//!
//! # Overview
//!
//! ```text
//!   trigger loop ──▶ run_cycle ──▶ paused? ──yes──▶ release lock, no re-arm
//!                        │
//!                        ▼
//!                  acquire lock ──taken──▶ "already running", no re-arm
//!                        │
//!                        ▼
//!               process sources (sequential)
//!                        │
//!                        ▼
//!            release lock (always, even on panic)
//!                        │
//!                        ▼
//!     re-arm once: short delay if more pages, otherwise medium delay
//! ```
//!
//! # Modules
//!
//! - [`lock`] - Run lock, pause flag and next-run timestamp
//! - [`trigger`] - Daemon loop that sleeps until the next run
//! - [`error`] - Scheduler error types

pub mod error;
pub mod lock;
pub mod trigger;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::crawler::pipeline::{SourceOutcome, SourceProcessor};
use crate::metrics;
use crate::storage::{ActivityLogger, SourceRepository};

pub use error::{SchedulerError, SchedulerResult};
pub use lock::{LockToken, RunLock, SchedulerControl};
pub use trigger::CycleTrigger;

// ============================================================================
// Cycle results
// ============================================================================

/// Summary of a cycle that ran its source loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sources the pipeline ran for
    pub processed: usize,

    /// Posts imported across all sources
    pub imported: usize,

    /// Sources whose fetch or storage failed
    pub failures: usize,

    /// Sources that moved to `error` in this cycle
    pub disabled: usize,

    /// At least one source has more pages waiting
    pub more_pages: bool,
}

/// Result of one `run_cycle` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Pause flag set; nothing ran and nothing was re-armed
    Paused,

    /// Another cycle holds the lock; nothing ran and nothing was re-armed
    AlreadyRunning,

    /// The source loop finished
    Completed {
        report: CycleReport,
        next_delay: Duration,
        next_run: DateTime<Utc>,
    },

    /// The source loop aborted; re-armed with the error backoff
    Failed {
        reason: String,
        next_delay: Duration,
        next_run: DateTime<Utc>,
    },
}

impl CycleOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::AlreadyRunning => "already_running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Delay until the re-armed run, if one was scheduled
    pub fn next_delay(&self) -> Option<Duration> {
        match self {
            Self::Completed { next_delay, .. } | Self::Failed { next_delay, .. } => {
                Some(*next_delay)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Runs cycles under the shared run lock
pub struct Scheduler {
    control: SchedulerControl,
    sources: Arc<dyn SourceRepository>,
    processor: SourceProcessor,
    activity: ActivityLogger,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        control: SchedulerControl,
        sources: Arc<dyn SourceRepository>,
        processor: SourceProcessor,
        activity: ActivityLogger,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            control,
            sources,
            processor,
            activity,
            config,
        }
    }

    pub fn control(&self) -> &SchedulerControl {
        &self.control
    }

    /// Run one cycle if not paused and not already running
    pub async fn run_cycle(&self) -> SchedulerResult<CycleOutcome> {
        if self.control.is_paused().await? {
            if self.control.force_unlock().await? {
                self.activity
                    .info(None, "Scheduler paused, released the run lock");
            }
            tracing::info!("Scheduler paused, skipping cycle");
            metrics::record_cycle(CycleOutcome::Paused.label());
            return Ok(CycleOutcome::Paused);
        }

        let Some(token) = self.control.lock().try_acquire().await? else {
            self.activity
                .info(None, "Another cycle is running, skipping");
            metrics::record_cycle(CycleOutcome::AlreadyRunning.label());
            return Ok(CycleOutcome::AlreadyRunning);
        };
        metrics::set_lock_held(true);

        let timer = metrics::start_cycle_timer();
        let result = AssertUnwindSafe(self.run_sources()).catch_unwind().await;

        match self.control.lock().release(&token).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Run lock expired or was removed before release"),
            // the lock still expires after its TTL
            Err(e) => self.activity.failure(None, "Failed to release run lock", e),
        }
        metrics::set_lock_held(false);

        let outcome = match result {
            Ok(Ok(report)) => {
                let next_delay = if report.more_pages {
                    self.config.more_pages_delay()
                } else {
                    self.config.monitoring_delay()
                };
                let next_run = self.control.schedule_in(next_delay).await?;
                self.activity.info(
                    None,
                    format!(
                        "Cycle finished: {} sources, {} posts imported, {} failures; next run in {}s",
                        report.processed,
                        report.imported,
                        report.failures,
                        next_delay.as_secs()
                    ),
                );
                CycleOutcome::Completed {
                    report,
                    next_delay,
                    next_run,
                }
            }
            Ok(Err(e)) => {
                timer.discard();
                self.fail(e.to_string()).await?
            }
            Err(_) => {
                timer.discard();
                self.fail(SchedulerError::CyclePanicked.to_string()).await?
            }
        };

        metrics::record_cycle(outcome.label());
        Ok(outcome)
    }

    /// Re-arm with the error backoff after an aborted cycle
    async fn fail(&self, reason: String) -> SchedulerResult<CycleOutcome> {
        let next_delay = self.config.error_delay();
        let next_run = self.control.schedule_in(next_delay).await?;
        self.activity.error(
            None,
            format!("Cycle failed: {reason}; retrying in {}s", next_delay.as_secs()),
        );

        Ok(CycleOutcome::Failed {
            reason,
            next_delay,
            next_run,
        })
    }

    async fn run_sources(&self) -> SchedulerResult<CycleReport> {
        let sources = self
            .sources
            .list()
            .map_err(|e| SchedulerError::cycle_failed(format!("listing sources: {e:#}")))?;

        let mut report = CycleReport::default();
        for mut source in sources.into_iter().filter(|s| s.is_eligible()) {
            let outcome = self.processor.process(&mut source).await;

            report.processed += 1;
            report.imported += outcome.imported();
            report.more_pages |= outcome.has_more_pages();
            if outcome.is_failure() {
                report.failures += 1;
            }
            if outcome == SourceOutcome::BecameError {
                report.disabled += 1;
            }
        }

        tracing::debug!(?report, "Source loop finished");
        Ok(report)
    }

    /// Clear the pause flag and run as soon as the trigger wakes up
    pub async fn force_run(&self) -> SchedulerResult<()> {
        self.control.force_run().await?;
        self.activity.info(None, "Forced run requested");
        Ok(())
    }

    /// Remove the run lock regardless of owner
    pub async fn force_unlock(&self) -> SchedulerResult<bool> {
        let removed = self.control.force_unlock().await?;
        self.activity
            .warning(None, format!("Run lock force-unlocked (was held: {removed})"));
        Ok(removed)
    }

    pub async fn pause(&self) -> SchedulerResult<()> {
        self.control.pause().await?;
        self.activity.info(None, "Scheduler paused");
        Ok(())
    }

    pub async fn resume(&self) -> SchedulerResult<()> {
        self.control.resume().await?;
        self.activity.info(None, "Scheduler resumed");
        Ok(())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(CycleOutcome::Paused.label(), "paused");
        assert_eq!(CycleOutcome::AlreadyRunning.label(), "already_running");
        assert_eq!(CycleOutcome::Paused.next_delay(), None);

        let failed = CycleOutcome::Failed {
            reason: "boom".into(),
            next_delay: Duration::from_secs(300),
            next_run: Utc::now(),
        };
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.next_delay(), Some(Duration::from_secs(300)));
    }
}
