//! syndic - WordPress source poller and importer
//!
//! Polls registered WordPress REST sources page by page, imports new posts
//! into a local content store, optionally paraphrases them through an LLM,
//! relocates their media and cross-posts them to Telegram and Instagram.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`registry`] - Source registration and statistics
//! - [`scheduler`] - Run lock, pause flag and the cycle loop
//! - [`crawler`] - Rate-limited fetching and the per-source pipeline
//! - [`error`] - Failure classification for the activity log
//! - [`importer`] - Turning remote posts into local records
//! - [`llm`] - Paraphrasing through an OpenAI-compatible API
//! - [`media`] - Downloading and re-hosting embedded media
//! - [`parser`] - HTML sanitising and rewriting
//! - [`social`] - Cross-posting imported records
//! - [`storage`] - SQLite persistence and the shared state store
//! - [`metrics`] - Prometheus metrics
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use syndic::config::Config;
//! use syndic::storage::{Database, SqliteSourceRepository, SourceRepository};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::open(&config.database.sqlite_path)?;
//!     let sources: Arc<dyn SourceRepository> = Arc::new(SqliteSourceRepository::new(db));
//!     for source in sources.list()? {
//!         println!("{} [{}] page {}", source.url, source.status, source.current_page);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod importer;
pub mod llm;
pub mod media;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod registry;
pub mod scheduler;
pub mod social;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{PostSource, SourceProcessor, WordPressFetcher};
    pub use crate::error::{Error, ErrorCategory, SyndicErrorTrait};
    pub use crate::importer::{ContentImporter, ImportOutcome};
    pub use crate::models::{RemotePost, Source, SourceStatus, Statistics};
    pub use crate::registry::SourceRegistry;
    pub use crate::scheduler::{CycleOutcome, Scheduler, SchedulerControl};
    pub use crate::storage::{ActivityLogger, Database};
}

// Direct re-exports for convenience
pub use models::{RemotePost, Source, SourceStatus};
