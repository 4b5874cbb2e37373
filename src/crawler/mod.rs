//! Remote post retrieval
//!
//! This module fetches pages of posts from WordPress REST sources and runs
//! the per-source pipeline that turns a fetched page into local records.
//!
//! - [`url`] - Endpoint normalisation and page query building
//! - [`fetcher`] - Rate-limited HTTP fetcher
//! - [`pipeline`] - Fetch, deduplicate, import and save one source page

pub mod fetcher;
pub mod pipeline;
pub mod url;

pub use fetcher::{PostSource, WordPressFetcher};
pub use pipeline::{PageStats, SourceOutcome, SourceProcessor};
pub use url::normalize_endpoint;
