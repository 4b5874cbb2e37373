//! Source registry operator actions
//!
//! Adding, removing and resetting sources, plus the statistics shown by
//! `syndic status`. Pause, resume, force-run and force-unlock live on
//! [`SchedulerControl`]; the registry only reads that state for reporting.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::crawler::fetcher::PostSource;
use crate::crawler::url::normalize_endpoint;
use crate::models::{Source, Statistics};
use crate::scheduler::SchedulerControl;
use crate::storage::{ActivityLogger, SourceRepository};

/// Operator-facing view of the source registry
pub struct SourceRegistry {
    sources: Arc<dyn SourceRepository>,
    fetcher: Arc<dyn PostSource>,
    control: SchedulerControl,
    activity: ActivityLogger,
}

impl SourceRegistry {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        fetcher: Arc<dyn PostSource>,
        control: SchedulerControl,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            sources,
            fetcher,
            control,
            activity,
        }
    }

    /// Register a source, replacing any existing entry for the same URL
    ///
    /// The URL is normalised to the posts endpoint. With `verify`, the
    /// endpoint must answer `?per_page=1` with 200 before it is stored.
    pub async fn add(
        &self,
        url: &str,
        start_date: NaiveDate,
        post_type: &str,
        verify: bool,
    ) -> Result<Source> {
        let endpoint = normalize_endpoint(url).context("Invalid source URL")?;
        let post_type = post_type.trim();
        if post_type.is_empty() {
            anyhow::bail!("post type cannot be empty");
        }

        if verify {
            self.fetcher
                .check_endpoint(&endpoint)
                .await
                .with_context(|| format!("Source {endpoint} did not answer"))?;
        }

        let source = self
            .sources
            .upsert(&Source::new(&endpoint, start_date, post_type))?;

        self.activity.info(
            Some(endpoint.as_str()),
            format!("Source added (start date {start_date}, post type {post_type})"),
        );
        Ok(source)
    }

    /// Remove a source and its counters; returns whether it existed
    pub fn delete(&self, url: &str) -> Result<bool> {
        let endpoint = self.resolve(url);
        let removed = self.sources.delete(&endpoint)?;
        if removed {
            self.activity.info(Some(endpoint.as_str()), "Source deleted");
        }
        Ok(removed)
    }

    /// Put a source back to its initial state
    pub fn reset(&self, url: &str) -> Result<Source> {
        let endpoint = self.resolve(url);
        let mut source = self
            .sources
            .get(&endpoint)?
            .with_context(|| format!("Source not found: {endpoint}"))?;

        source.reset();
        self.sources.update(&source)?;

        self.activity.info(Some(endpoint.as_str()), "Source reset");
        Ok(source)
    }

    pub fn list(&self) -> Result<Vec<Source>> {
        self.sources.list()
    }

    pub fn get(&self, url: &str) -> Result<Option<Source>> {
        self.sources.get(&self.resolve(url))
    }

    /// Aggregate figures across all sources plus scheduler state
    pub async fn statistics(&self) -> Result<Statistics> {
        let sources = self.sources.list()?;
        let mut stats = Statistics::from_sources(&sources);

        stats.is_running = self.control.is_running().await?;
        stats.is_paused = self.control.is_paused().await?;

        Ok(stats)
    }

    /// Stored key for an operator-supplied URL
    fn resolve(&self, url: &str) -> String {
        normalize_endpoint(url).unwrap_or_else(|_| url.trim().to_string())
    }
}
