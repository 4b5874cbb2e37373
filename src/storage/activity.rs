//! Operator activity log
//!
//! Pipeline milestones and failures are emitted as `tracing` events and
//! mirrored into SQLite so `syndic logs list` can show them later.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use super::{parse_timestamp, Database};
use crate::error::{Error, SyndicErrorTrait};
use crate::models::{LogEntry, Severity};

/// Append-only activity log
pub trait ActivityLog: Send + Sync {
    fn append(&self, source_url: Option<&str>, severity: Severity, message: &str) -> Result<()>;

    /// Most recent entries first
    fn recent(
        &self,
        limit: usize,
        severity: Option<Severity>,
        source_url: Option<&str>,
    ) -> Result<Vec<LogEntry>>;

    /// Delete entries older than `cutoff`; returns the number removed
    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    fn clear(&self) -> Result<usize>;
}

/// SQLite implementation of ActivityLog
#[derive(Clone)]
pub struct SqliteActivityLog {
    db: Database,
}

impl SqliteActivityLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ActivityLog for SqliteActivityLog {
    fn append(&self, source_url: Option<&str>, severity: Severity, message: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO activity_log (source_url, severity, message, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![source_url, severity.as_str(), message, Utc::now().to_rfc3339()],
        )
        .context("Failed to append activity log entry")?;

        Ok(())
    }

    fn recent(
        &self,
        limit: usize,
        severity: Option<Severity>,
        source_url: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, source_url, severity, message, created_at
            FROM activity_log
            WHERE (?1 IS NULL OR severity = ?1)
              AND (?2 IS NULL OR source_url = ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )?;

        let entries = stmt
            .query_map(
                params![severity.map(|s| s.as_str()), source_url, limit as i64],
                |row| {
                    let severity: String = row.get(2)?;
                    Ok(LogEntry {
                        id: row.get(0)?,
                        source_url: row.get(1)?,
                        severity: severity.parse().unwrap_or(Severity::Info),
                        message: row.get(3)?,
                        created_at: parse_timestamp(&row.get::<_, String>(4)?),
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read activity log")?;

        Ok(entries)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM activity_log WHERE created_at < ?1",
                params![cutoff.to_rfc3339()],
            )
            .context("Failed to prune activity log")?;

        Ok(removed)
    }

    fn clear(&self) -> Result<usize> {
        let conn = self.db.conn()?;
        let removed = conn
            .execute("DELETE FROM activity_log", [])
            .context("Failed to clear activity log")?;

        Ok(removed)
    }
}

/// Writes every event to `tracing` and to the activity log
///
/// A failing log write is reported through `tracing` only; it never
/// propagates into the pipeline.
#[derive(Clone)]
pub struct ActivityLogger {
    log: Arc<dyn ActivityLog>,
}

impl ActivityLogger {
    pub fn new(log: Arc<dyn ActivityLog>) -> Self {
        Self { log }
    }

    pub fn info(&self, source_url: Option<&str>, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(source = source_url.unwrap_or("-"), "{message}");
        self.write(source_url, Severity::Info, message);
    }

    pub fn warning(&self, source_url: Option<&str>, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!(source = source_url.unwrap_or("-"), "{message}");
        self.write(source_url, Severity::Warning, message);
    }

    pub fn error(&self, source_url: Option<&str>, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!(source = source_url.unwrap_or("-"), "{message}");
        self.write(source_url, Severity::Error, message);
    }

    /// Record a failure at the level its classification asks for
    pub fn failure(
        &self,
        source_url: Option<&str>,
        context: impl AsRef<str>,
        error: impl Into<Error>,
    ) {
        let error = error.into();
        let message = format!("{}: {}", context.as_ref(), error.description());
        match error.severity() {
            Severity::Error => self.error(source_url, message),
            _ => self.warning(source_url, message),
        }
    }

    /// Record a failure the pipeline works around; always a warning
    pub fn degraded(
        &self,
        source_url: Option<&str>,
        context: impl AsRef<str>,
        error: impl Into<Error>,
    ) {
        let error = error.into();
        self.warning(
            source_url,
            format!("{}: {}", context.as_ref(), error.description()),
        );
    }

    /// Remove entries older than `retention_days`
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let removed = self.log.prune_before(cutoff)?;
        tracing::debug!(removed, retention_days, "Pruned activity log");
        Ok(removed)
    }

    pub fn log(&self) -> &Arc<dyn ActivityLog> {
        &self.log
    }

    fn write(&self, source_url: Option<&str>, severity: Severity, message: &str) {
        if let Err(e) = self.log.append(source_url, severity, message) {
            tracing::warn!(error = %e, "Failed to write activity log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> SqliteActivityLog {
        SqliteActivityLog::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_append_and_filter() {
        let log = log();
        log.append(Some("a"), Severity::Info, "started").unwrap();
        log.append(Some("b"), Severity::Error, "failed").unwrap();
        log.append(None, Severity::Warning, "paused").unwrap();

        let all = log.recent(10, None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "paused");

        let errors = log.recent(10, Some(Severity::Error), None).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source_url.as_deref(), Some("b"));

        let for_a = log.recent(10, None, Some("a")).unwrap();
        assert_eq!(for_a.len(), 1);
    }

    #[test]
    fn test_prune_before() {
        let log = log();
        {
            let conn = log.db.conn().unwrap();
            let old = (Utc::now() - Duration::days(45)).to_rfc3339();
            conn.execute(
                "INSERT INTO activity_log (source_url, severity, message, created_at) VALUES (NULL, 'info', 'old', ?1)",
                params![old],
            )
            .unwrap();
        }
        log.append(None, Severity::Info, "fresh").unwrap();

        let logger = ActivityLogger::new(Arc::new(log.clone()));
        assert_eq!(logger.prune(30).unwrap(), 1);

        let remaining = log.recent(10, None, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message, "fresh");
    }

    #[test]
    fn test_logger_mirrors_to_store() {
        let log = log();
        let logger = ActivityLogger::new(Arc::new(log.clone()));
        logger.warning(Some("src"), "unmapped category");
        assert_eq!(log.recent(1, None, None).unwrap()[0].severity, Severity::Warning);
        assert_eq!(log.clear().unwrap(), 1);
    }

    #[test]
    fn test_failure_level_follows_classification() {
        use crate::utils::error::{FetchError, MediaError};

        let log = log();
        let logger = ActivityLogger::new(Arc::new(log.clone()));

        logger.failure(Some("src"), "Fetch failed", FetchError::Status(503));
        logger.failure(Some("src"), "Fetch failed", FetchError::Status(404));
        logger.degraded(Some("src"), "Image not relocated", MediaError::Status(404));

        let entries = log.recent(10, None, Some("src")).unwrap();
        assert_eq!(entries[2].severity, Severity::Warning);
        assert_eq!(
            entries[2].message,
            "Fetch failed: network error: Invalid response code: 503"
        );
        assert_eq!(entries[1].severity, Severity::Error);
        assert_eq!(entries[0].severity, Severity::Warning);
        assert!(entries[0].message.starts_with("Image not relocated: network error:"));
    }
}
