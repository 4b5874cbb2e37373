// Core data structures for the syndic pipeline

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ============================================================================
// Sources
// ============================================================================

/// Lifecycle state of a remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    NotStarted,
    InProgress,
    Monitoring,
    Completed,
    Error,
}

impl SourceStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Monitoring => "monitoring",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Terminal sources are skipped by the scheduler until reset
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Sources counted as "active" in statistics
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Monitoring)
    }

    /// Get all statuses
    pub fn all() -> Vec<Self> {
        vec![
            Self::NotStarted,
            Self::InProgress,
            Self::Monitoring,
            Self::Completed,
            Self::Error,
        ]
    }
}

impl FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "monitoring" => Ok(Self::Monitoring),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown source status: {other}")),
        }
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A remote WordPress REST endpoint polled by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub url: String, // normalised `.../wp-json/wp/v2/posts` endpoint
    pub status: SourceStatus,
    pub start_date: NaiveDate,
    pub current_page: u32,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_check_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub post_type: String,
    pub posts_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Create a fresh source in `not_started` state
    pub fn new(url: impl Into<String>, start_date: NaiveDate, post_type: impl Into<String>) -> Self {
        Self {
            id: 0,
            url: url.into(),
            status: SourceStatus::NotStarted,
            start_date,
            current_page: 1,
            last_processed_at: None,
            last_check_at: None,
            error_count: 0,
            post_type: post_type.into(),
            posts_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether the scheduler should process this source
    pub fn is_eligible(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Value of the `after` query parameter: start date at midnight
    pub fn after_param(&self) -> String {
        self.start_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    /// Record a failed fetch
    ///
    /// Returns `true` when this failure moved the source into `error`.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.error_count = self.error_count.saturating_add(1);
        self.last_check_at = Some(Utc::now());

        if self.error_count >= threshold && self.status != SourceStatus::Error {
            self.status = SourceStatus::Error;
            return true;
        }
        false
    }

    /// Remote returned nothing new: rewind the cursor and keep watching
    pub fn mark_caught_up(&mut self) {
        self.current_page = 1;
        self.status = SourceStatus::Monitoring;
        self.error_count = 0;
        self.last_check_at = Some(Utc::now());
    }

    /// A page was processed; move the cursor according to `total_pages`
    ///
    /// Returns `true` when more pages remain.
    pub fn advance(&mut self, total_pages: u32) -> bool {
        let now = Utc::now();
        self.error_count = 0;
        self.last_processed_at = Some(now);
        self.last_check_at = Some(now);

        if self.current_page < total_pages {
            self.current_page += 1;
            self.status = SourceStatus::InProgress;
            true
        } else {
            self.current_page = 1;
            self.status = SourceStatus::Monitoring;
            false
        }
    }

    /// Operator reset: back to the initial state regardless of prior state
    pub fn reset(&mut self) {
        self.status = SourceStatus::NotStarted;
        self.current_page = 1;
        self.error_count = 0;
        self.posts_count = 0;
        self.last_processed_at = None;
    }
}

// ============================================================================
// Remote API payloads
// ============================================================================

/// `{ "rendered": "..." }` wrapper used throughout the WordPress REST API
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

impl Rendered {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self {
            rendered: rendered.into(),
        }
    }
}

/// Taxonomy term embedded under `_embedded["wp:term"]`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RemoteTerm {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub taxonomy: String,
    #[serde(default)]
    pub description: String,
}

impl RemoteTerm {
    pub fn is_category(&self) -> bool {
        self.taxonomy == "category"
    }

    pub fn is_tag(&self) -> bool {
        self.taxonomy == "post_tag"
    }
}

/// Featured media embedded under `_embedded["wp:featuredmedia"]`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RemoteMedia {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub guid: Option<Rendered>,
    #[serde(default)]
    pub alt_text: Option<String>,
}

impl RemoteMedia {
    /// Download URL: `source_url`, falling back to `guid.rendered`
    pub fn asset_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| {
                self.guid
                    .as_ref()
                    .map(|g| g.rendered.as_str())
                    .filter(|url| !url.trim().is_empty())
            })
    }

    /// Alt text, if non-empty
    pub fn alt(&self) -> Option<&str> {
        self.alt_text.as_deref().filter(|alt| !alt.trim().is_empty())
    }
}

/// `_embedded` block requested with `_embed=wp:featuredmedia,wp:term`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Embedded {
    #[serde(rename = "wp:featuredmedia", default)]
    pub featured_media: Vec<RemoteMedia>,

    #[serde(rename = "wp:term", default)]
    pub terms: Vec<Vec<RemoteTerm>>,
}

/// A post as returned by `GET /wp-json/wp/v2/posts`
///
/// Every field is optional so a single malformed post never fails the
/// whole page; validation happens in the importer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemotePost {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub guid: Option<Rendered>,
    #[serde(default)]
    pub title: Option<Rendered>,
    #[serde(default)]
    pub content: Option<Rendered>,
    #[serde(default)]
    pub excerpt: Option<Rendered>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_gmt: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "_embedded", default)]
    pub embedded: Option<Embedded>,
}

impl RemotePost {
    /// Globally unique remote identifier (`guid.rendered`)
    pub fn remote_guid(&self) -> Option<&str> {
        self.guid
            .as_ref()
            .map(|g| g.rendered.as_str())
            .filter(|g| !g.is_empty())
    }

    pub fn title_html(&self) -> &str {
        rendered_or_empty(&self.title)
    }

    pub fn content_html(&self) -> &str {
        rendered_or_empty(&self.content)
    }

    pub fn excerpt_html(&self) -> &str {
        rendered_or_empty(&self.excerpt)
    }

    /// First embedded featured media entry
    pub fn featured_media(&self) -> Option<&RemoteMedia> {
        self.embedded.as_ref()?.featured_media.first()
    }

    /// All embedded taxonomy terms, flattened
    pub fn terms(&self) -> impl Iterator<Item = &RemoteTerm> {
        self.embedded
            .iter()
            .flat_map(|e| e.terms.iter())
            .flat_map(|group| group.iter())
    }
}

fn rendered_or_empty(field: &Option<Rendered>) -> &str {
    field.as_ref().map(|r| r.rendered.as_str()).unwrap_or("")
}

/// One page of remote posts plus the totals reported by the API headers
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub posts: Vec<RemotePost>,
    pub total_posts: u64,
    pub total_pages: u32,
}

impl FetchedPage {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Original taxonomy terms grouped by taxonomy name
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TermSet(pub BTreeMap<String, Vec<RemoteTerm>>);

impl TermSet {
    pub fn from_terms<'a>(terms: impl IntoIterator<Item = &'a RemoteTerm>) -> Self {
        let mut grouped: BTreeMap<String, Vec<RemoteTerm>> = BTreeMap::new();
        for term in terms {
            grouped
                .entry(term.taxonomy.clone())
                .or_default()
                .push(term.clone());
        }
        Self(grouped)
    }

    /// Terms of the `category` taxonomy
    pub fn categories(&self) -> &[RemoteTerm] {
        self.0.get("category").map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Local content store
// ============================================================================

/// Fields of a content record to be created
#[derive(Debug, Clone, Default)]
pub struct NewContent {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub author_id: i64,
    pub post_type: String,
    pub published_at: Option<String>,
    pub published_at_gmt: Option<String>,
    pub remote_guid: String,
    pub source_url: String,
}

/// A record in the local content store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub author_id: i64,
    pub post_type: String,
    pub published_at: Option<String>,
    pub published_at_gmt: Option<String>,
    pub remote_guid: String,
    pub source_url: String,
    pub thumbnail_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of a content record; `None` leaves the field as is
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.excerpt.is_none()
    }
}

/// Immutable audit snapshot of an imported post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedPost {
    pub post_id: i64,
    pub remote_guid: String,
    pub source_url: String,
    pub post_type: String,
    pub original_url: Option<String>,
    pub original_title: String,
    pub original_content: String,
    pub original_excerpt: String,
    pub original_terms: TermSet,
    pub imported_at: DateTime<Utc>,
}

/// Local category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Remote category name mapped onto a local category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryMapping {
    pub remote_name: String,
    pub category_id: i64,
}

/// A remote category name seen in imported posts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportedCategory {
    pub name: String,
    pub slug: String,

    /// Imported records carrying this category
    pub posts: usize,

    /// Local category the name is mapped to
    pub mapped_to: Option<i64>,
}

impl ImportedCategory {
    pub fn is_mapped(&self) -> bool {
        self.mapped_to.is_some()
    }
}

/// Outcome of creating local categories for unmapped remote names
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCreation {
    /// Remote names that got a new local category and mapping
    pub created: Vec<String>,

    /// Remote names that were already mapped
    pub already_mapped: usize,

    pub errors: usize,
}

/// Outcome of a bulk category re-mapping pass
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemapReport {
    pub updated: usize,
    pub processed: usize,
    pub errors: usize,
}

// ============================================================================
// Media
// ============================================================================

/// Kind of embedded media reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("Unknown media kind: {other}")),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media file stored locally and attached to a content record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    pub post_id: i64,
    pub kind: MediaKind,
    pub file_name: String,
    pub url: String,
    pub alt_text: Option<String>,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Activity log and statistics
// ============================================================================

/// Severity of an activity log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown severity: {other}")),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-facing activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub source_url: Option<String>,
    pub severity: Severity,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate numbers shown by `syndic status`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub total_sources: usize,
    pub active_sources: usize,
    pub completed_sources: usize,
    pub error_sources: usize,
    pub total_posts: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub success_rate: f64,
    pub average_posts_per_source: f64,
}

impl Statistics {
    /// Compute source aggregates; run/pause flags are filled in by the caller
    pub fn from_sources(sources: &[Source]) -> Self {
        let total_sources = sources.len();
        let active_sources = sources.iter().filter(|s| s.status.is_active()).count();
        let completed_sources = sources
            .iter()
            .filter(|s| s.status == SourceStatus::Completed)
            .count();
        let error_sources = sources
            .iter()
            .filter(|s| s.status == SourceStatus::Error)
            .count();
        let total_posts: u64 = sources.iter().map(|s| s.posts_count).sum();

        let (success_rate, average_posts_per_source) = if total_sources > 0 {
            (
                round2(completed_sources as f64 / total_sources as f64 * 100.0),
                round2(total_posts as f64 / total_sources as f64),
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total_sources,
            active_sources,
            completed_sources,
            error_sources,
            total_posts,
            is_running: false,
            is_paused: false,
            success_rate,
            average_posts_per_source,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
