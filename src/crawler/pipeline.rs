//! Per-source pipeline run
//!
//! One run handles exactly one page of one source:
//!
//! ```text
//! ┌──────────┐     ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Fetch   │────▶│ Deduplicate │────▶│    Import    │────▶│ Save cursor  │
//! │  page P  │     │  by guid    │     │  post by post│     │ and status   │
//! └──────────┘     └─────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Posts are imported strictly one after another. A failing post never
//! stops its siblings, and a failing source never stops the cycle.

use std::sync::Arc;

use chrono::Utc;

use super::fetcher::PostSource;
use crate::importer::{ContentImporter, ImportOutcome, SkipReason};
use crate::metrics;
use crate::models::Source;
use crate::storage::{ActivityLogger, Deduplicator, SourceRepository};

// ============================================================================
// Run results
// ============================================================================

/// Counters for one processed page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Posts returned by the remote
    pub fetched: usize,

    /// New local records
    pub imported: usize,

    /// Already imported earlier
    pub duplicates: usize,

    /// Missing id or guid
    pub invalid: usize,

    /// Posts whose import failed
    pub failed: usize,
}

/// What happened to a source during one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOutcome {
    /// Source is `completed` or `error`; nothing was fetched
    Skipped,

    /// Page processed and more pages remain
    MorePages { stats: PageStats, next_page: u32 },

    /// Remote has nothing beyond this page; source is monitoring
    CaughtUp { stats: PageStats },

    /// Fetch failed below the error threshold
    FetchFailed { error_count: u32 },

    /// Fetch failed and the source reached the error threshold
    BecameError,

    /// Local storage failed before the page could be processed
    Aborted,
}

impl SourceOutcome {
    /// Whether the source wants a quick follow-up run
    pub fn has_more_pages(&self) -> bool {
        matches!(self, Self::MorePages { .. })
    }

    pub fn imported(&self) -> usize {
        match self {
            Self::MorePages { stats, .. } | Self::CaughtUp { stats } => stats.imported,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. } | Self::BecameError | Self::Aborted)
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Runs the fetch → dedup → import pipeline for one source
pub struct SourceProcessor {
    fetcher: Arc<dyn PostSource>,
    sources: Arc<dyn SourceRepository>,
    dedup: Deduplicator,
    importer: Arc<ContentImporter>,
    activity: ActivityLogger,
}

impl SourceProcessor {
    pub fn new(
        fetcher: Arc<dyn PostSource>,
        sources: Arc<dyn SourceRepository>,
        dedup: Deduplicator,
        importer: Arc<ContentImporter>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            fetcher,
            sources,
            dedup,
            importer,
            activity,
        }
    }

    /// Process the page at the source's cursor and persist the new state
    pub async fn process(&self, source: &mut Source) -> SourceOutcome {
        if !source.is_eligible() {
            return SourceOutcome::Skipped;
        }

        let settings = self.importer.settings();
        let url = source.url.clone();
        let src = Some(url.as_str());

        tracing::info!(
            source = %source.url,
            page = source.current_page,
            status = %source.status,
            "Processing source"
        );

        let page = match self.fetcher.fetch_page(source, settings.batch_size).await {
            Ok(page) => page,
            Err(e) => {
                metrics::record_fetch_failure(&source.url);
                let became_error = source.record_failure(settings.max_errors);
                let outcome = if became_error {
                    self.activity.error(
                        src,
                        format!(
                            "Fetch failed ({e}); {} consecutive errors, source disabled",
                            source.error_count
                        ),
                    );
                    SourceOutcome::BecameError
                } else {
                    self.activity.failure(
                        src,
                        format!(
                            "Fetch failed, error {} of {}",
                            source.error_count, settings.max_errors
                        ),
                        e,
                    );
                    SourceOutcome::FetchFailed {
                        error_count: source.error_count,
                    }
                };
                self.save(source);
                return outcome;
            }
        };

        if page.is_empty() {
            source.mark_caught_up();
            self.activity.info(src, "No new posts, source is up to date");
            self.save(source);
            return SourceOutcome::CaughtUp {
                stats: PageStats::default(),
            };
        }

        let mut stats = PageStats {
            fetched: page.posts.len(),
            ..Default::default()
        };
        let total_pages = page.total_pages;

        let filtered = match self.dedup.filter_new(page.posts, &source.post_type) {
            Ok(filtered) => filtered,
            Err(e) => {
                self.activity
                    .error(src, format!("Duplicate check failed: {e:#}"));
                source.last_check_at = Some(Utc::now());
                self.save(source);
                return SourceOutcome::Aborted;
            }
        };

        stats.duplicates = filtered.duplicates;
        stats.invalid = filtered.invalid.len();
        metrics::record_posts_skipped("duplicate", stats.duplicates);
        metrics::record_posts_skipped("invalid", stats.invalid);
        for post in &filtered.invalid {
            self.activity.warning(
                src,
                format!(
                    "Skipping remote post {}: missing id or guid",
                    post.id.map(|id| id.to_string()).unwrap_or_else(|| "?".into())
                ),
            );
        }

        for post in &filtered.new_posts {
            match self.importer.import_post(post, source).await {
                Ok(ImportOutcome::Imported(_)) => stats.imported += 1,
                Ok(ImportOutcome::Skipped(SkipReason::Duplicate)) => stats.duplicates += 1,
                Ok(ImportOutcome::Skipped(SkipReason::Invalid(_))) => stats.invalid += 1,
                Err(e) => {
                    stats.failed += 1;
                    let remote_id = post.id.map(|id| id.to_string()).unwrap_or_else(|| "?".into());
                    self.activity
                        .failure(src, format!("Import of remote post {remote_id} failed"), e);
                }
            }
        }
        source.posts_count += stats.imported as u64;

        let more = source.advance(total_pages);
        self.activity.info(
            src,
            format!(
                "Page processed: {} fetched, {} imported, {} duplicates, {} failed{}",
                stats.fetched,
                stats.imported,
                stats.duplicates,
                stats.failed,
                if more {
                    format!("; next page {}", source.current_page)
                } else {
                    String::from("; caught up")
                }
            ),
        );
        self.save(source);

        if more {
            SourceOutcome::MorePages {
                stats,
                next_page: source.current_page,
            }
        } else {
            SourceOutcome::CaughtUp { stats }
        }
    }

    /// Persist cursor and status; a failure is logged and the cycle goes on
    fn save(&self, source: &Source) {
        if let Err(e) = self.sources.save_state(source) {
            self.activity.error(
                Some(source.url.as_str()),
                format!("Failed to save source state: {e:#}"),
            );
        } else {
            tracing::debug!(
                source = %source.url,
                page = source.current_page,
                status = %source.status,
                errors = source.error_count,
                "Saved source state"
            );
        }
    }
}
