use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use syndic::config::{Config, StateBackend};
use syndic::crawler::{PostSource, SourceProcessor, WordPressFetcher};
use syndic::importer::ContentImporter;
use syndic::llm::ChatParaphraser;
use syndic::media::MediaRelocator;
use syndic::parser::{ContentRewriter, RegexRewriter};
use syndic::registry::SourceRegistry;
use syndic::scheduler::{Scheduler, SchedulerControl};
use syndic::social::publishers_from_config;
use syndic::storage::{
    ActivityLogger, ContentStore, Database, Deduplicator, LocalMediaStore, RedisStateStore,
    SourceRepository, SqliteActivityLog, SqliteContentStore, SqliteSourceRepository,
    SqliteStateStore, StateStore,
};

/// Every service a command may need, wired from one [`Config`]
pub struct AppContext {
    pub config: Config,
    pub content: Arc<dyn ContentStore>,
    pub activity: ActivityLogger,
    pub importer: Arc<ContentImporter>,
    pub scheduler: Arc<Scheduler>,
    pub registry: SourceRegistry,
}

impl AppContext {
    pub async fn build(config: Config) -> Result<Self> {
        let db = Database::open(&config.database.sqlite_path)?;

        let sources: Arc<dyn SourceRepository> = Arc::new(SqliteSourceRepository::new(db.clone()));
        let content: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(db.clone()));
        let activity = ActivityLogger::new(Arc::new(SqliteActivityLog::new(db.clone())));

        let state: Arc<dyn StateStore> = match config.state.backend {
            StateBackend::Sqlite => Arc::new(SqliteStateStore::new(db.clone())),
            StateBackend::Redis => Arc::new(
                RedisStateStore::connect(&config.state.redis_url, config.state.key_prefix.clone())
                    .await
                    .context("Failed to connect to Redis state store")?,
            ),
        };
        let control = SchedulerControl::new(state, config.scheduler.lock_ttl());

        let fetcher: Arc<dyn PostSource> = Arc::new(
            WordPressFetcher::new(&config.fetcher).context("Failed to create fetcher")?,
        );
        let rewriter: Arc<dyn ContentRewriter> = Arc::new(RegexRewriter::new());

        let media_store = LocalMediaStore::new(&config.media, &config.fetcher.user_agent, db)
            .context("Failed to create media store")?;
        let relocator = MediaRelocator::new(
            Arc::new(media_store),
            Arc::clone(&rewriter),
            Arc::clone(&content),
            activity.clone(),
        );

        let mut importer = ContentImporter::new(
            config.importer.clone(),
            Arc::clone(&content),
            Arc::clone(&sources),
            rewriter,
            relocator,
            activity.clone(),
        );

        if config.paraphrase.api_key.is_some() {
            let paraphraser = ChatParaphraser::with_config(config.paraphrase.clone())
                .context("Failed to create paraphraser")?;
            importer = importer.with_paraphraser(Arc::new(paraphraser));
        } else if config.importer.paraphrase_enabled {
            tracing::warn!("Paraphrasing enabled but no API key configured, importing text as is");
        }

        let publish_timeout = Duration::from_secs(config.fetcher.request_timeout_secs);
        let publishers = publishers_from_config(&config.social, publish_timeout)
            .context("Invalid social configuration")?;
        for publisher in &publishers {
            tracing::info!(channel = publisher.name(), "Cross-posting enabled");
        }
        importer = importer.with_publishers(publishers);
        let importer = Arc::new(importer);

        let processor = SourceProcessor::new(
            Arc::clone(&fetcher),
            Arc::clone(&sources),
            Deduplicator::new(Arc::clone(&content)),
            Arc::clone(&importer),
            activity.clone(),
        );
        let scheduler = Arc::new(Scheduler::new(
            control.clone(),
            Arc::clone(&sources),
            processor,
            activity.clone(),
            config.scheduler.clone(),
        ));
        let registry = SourceRegistry::new(sources, fetcher, control, activity.clone());

        Ok(Self {
            config,
            content,
            activity,
            importer,
            scheduler,
            registry,
        })
    }
}
