//! Source registry persistence

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_opt_timestamp, parse_timestamp, Database};
use crate::models::{Source, SourceStatus};

/// Repository for remote sources and their cursor state
pub trait SourceRepository: Send + Sync {
    /// Insert a source, replacing any existing entry with the same URL
    fn upsert(&self, source: &Source) -> Result<Source>;

    /// Get a source by its endpoint URL
    fn get(&self, url: &str) -> Result<Option<Source>>;

    /// All sources, oldest first
    fn list(&self) -> Result<Vec<Source>>;

    /// Persist the cursor fields written by the pipeline
    ///
    /// Leaves `posts_count` alone so counters incremented during a run are
    /// not overwritten by a stale copy.
    fn save_state(&self, source: &Source) -> Result<()>;

    /// Persist every mutable field, including the post counter
    fn update(&self, source: &Source) -> Result<()>;

    /// Remove a source; returns whether it existed
    fn delete(&self, url: &str) -> Result<bool>;

    /// Bump the imported-post counter
    fn increment_posts(&self, url: &str, by: u64) -> Result<()>;
}

/// SQLite implementation of SourceRepository
#[derive(Clone)]
pub struct SqliteSourceRepository {
    db: Database,
}

impl SqliteSourceRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn row_to_source(row: &Row<'_>) -> rusqlite::Result<Source> {
        let status: String = row.get(2)?;
        let start_date: String = row.get(3)?;

        Ok(Source {
            id: row.get(0)?,
            url: row.get(1)?,
            status: status.parse().unwrap_or(SourceStatus::Error),
            start_date: NaiveDate::parse_from_str(&start_date, "%Y-%m-%d")
                .unwrap_or_default(),
            current_page: row.get(4)?,
            last_processed_at: parse_opt_timestamp(row.get(5)?),
            last_check_at: parse_opt_timestamp(row.get(6)?),
            error_count: row.get(7)?,
            post_type: row.get(8)?,
            posts_count: row.get::<_, i64>(9)?.max(0) as u64,
            created_at: parse_timestamp(&row.get::<_, String>(10)?),
        })
    }
}

const SOURCE_COLUMNS: &str = "id, url, status, start_date, current_page, last_processed_at, \
     last_check_at, error_count, post_type, posts_count, created_at";

impl SourceRepository for SqliteSourceRepository {
    fn upsert(&self, source: &Source) -> Result<Source> {
        {
            let conn = self.db.conn()?;
            conn.execute(
                r#"
                INSERT INTO sources (url, status, start_date, current_page, last_processed_at,
                                     last_check_at, error_count, post_type, posts_count, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(url) DO UPDATE SET
                    status = excluded.status,
                    start_date = excluded.start_date,
                    current_page = excluded.current_page,
                    last_processed_at = excluded.last_processed_at,
                    last_check_at = excluded.last_check_at,
                    error_count = excluded.error_count,
                    post_type = excluded.post_type,
                    posts_count = excluded.posts_count
                "#,
                params![
                    source.url,
                    source.status.as_str(),
                    source.start_date.format("%Y-%m-%d").to_string(),
                    source.current_page,
                    source.last_processed_at.map(|t| t.to_rfc3339()),
                    source.last_check_at.map(|t| t.to_rfc3339()),
                    source.error_count,
                    source.post_type,
                    source.posts_count as i64,
                    source.created_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert source")?;
        }

        self.get(&source.url)?
            .context("Source missing right after upsert")
    }

    fn get(&self, url: &str) -> Result<Option<Source>> {
        let conn = self.db.conn()?;
        let source = conn
            .query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE url = ?1"),
                params![url],
                Self::row_to_source,
            )
            .optional()
            .context("Failed to get source")?;

        Ok(source)
    }

    fn list(&self) -> Result<Vec<Source>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id"))
            .context("Failed to prepare source listing")?;

        let sources = stmt
            .query_map([], Self::row_to_source)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list sources")?;

        Ok(sources)
    }

    fn save_state(&self, source: &Source) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            r#"
            UPDATE sources SET
                status = ?2,
                current_page = ?3,
                last_processed_at = ?4,
                last_check_at = ?5,
                error_count = ?6
            WHERE url = ?1
            "#,
            params![
                source.url,
                source.status.as_str(),
                source.current_page,
                source.last_processed_at.map(|t| t.to_rfc3339()),
                source.last_check_at.map(|t| t.to_rfc3339()),
                source.error_count,
            ],
        )
        .context("Failed to save source state")?;

        Ok(())
    }

    fn update(&self, source: &Source) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            r#"
            UPDATE sources SET
                status = ?2,
                start_date = ?3,
                current_page = ?4,
                last_processed_at = ?5,
                last_check_at = ?6,
                error_count = ?7,
                post_type = ?8,
                posts_count = ?9
            WHERE url = ?1
            "#,
            params![
                source.url,
                source.status.as_str(),
                source.start_date.format("%Y-%m-%d").to_string(),
                source.current_page,
                source.last_processed_at.map(|t| t.to_rfc3339()),
                source.last_check_at.map(|t| t.to_rfc3339()),
                source.error_count,
                source.post_type,
                source.posts_count as i64,
            ],
        )
        .context("Failed to update source")?;

        Ok(())
    }

    fn delete(&self, url: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let affected = conn
            .execute("DELETE FROM sources WHERE url = ?1", params![url])
            .context("Failed to delete source")?;

        Ok(affected > 0)
    }

    fn increment_posts(&self, url: &str, by: u64) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE sources SET posts_count = posts_count + ?2, last_processed_at = ?3 WHERE url = ?1",
            params![url, by as i64, Utc::now().to_rfc3339()],
        )
        .context("Failed to increment source post counter")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://donor.example/wp-json/wp/v2/posts";

    fn repo() -> SqliteSourceRepository {
        SqliteSourceRepository::new(Database::in_memory().unwrap())
    }

    fn source() -> Source {
        Source::new(URL, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "post")
    }

    #[test]
    fn test_upsert_and_get() {
        let repo = repo();
        let stored = repo.upsert(&source()).unwrap();
        assert!(stored.id > 0);
        assert_eq!(stored.status, SourceStatus::NotStarted);
        assert_eq!(stored.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        assert!(repo.get("https://missing.example").unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_existing_state() {
        let repo = repo();
        let mut s = repo.upsert(&source()).unwrap();
        s.status = SourceStatus::Error;
        s.error_count = 3;
        repo.update(&s).unwrap();

        let replaced = repo.upsert(&source()).unwrap();
        assert_eq!(replaced.id, s.id);
        assert_eq!(replaced.status, SourceStatus::NotStarted);
        assert_eq!(replaced.error_count, 0);
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_save_state_keeps_counter() {
        let repo = repo();
        let mut s = repo.upsert(&source()).unwrap();
        repo.increment_posts(URL, 4).unwrap();

        s.advance(3);
        repo.save_state(&s).unwrap();

        let loaded = repo.get(URL).unwrap().unwrap();
        assert_eq!(loaded.posts_count, 4);
        assert_eq!(loaded.current_page, 2);
        assert_eq!(loaded.status, SourceStatus::InProgress);
        assert!(loaded.last_processed_at.is_some());
    }

    #[test]
    fn test_delete() {
        let repo = repo();
        repo.upsert(&source()).unwrap();
        assert!(repo.delete(URL).unwrap());
        assert!(!repo.delete(URL).unwrap());
        assert!(repo.list().unwrap().is_empty());
    }
}
