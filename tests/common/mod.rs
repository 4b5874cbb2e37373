//! Common test utilities
//!
//! A [`Harness`] wires the full pipeline against an in-memory database, a
//! temporary media directory and a wiremock server that plays the remote
//! WordPress site, the paraphrase API, the Telegram Bot API and the
//! Instagram Graph API at once.

#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syndic::config::{Config, MediaConfig, ParaphraseConfig, SocialConfig};
use syndic::crawler::{PostSource, SourceProcessor, WordPressFetcher};
use syndic::importer::ContentImporter;
use syndic::llm::ChatParaphraser;
use syndic::media::MediaRelocator;
use syndic::models::Source;
use syndic::parser::{ContentRewriter, RegexRewriter};
use syndic::registry::SourceRegistry;
use syndic::scheduler::{Scheduler, SchedulerControl};
use syndic::social::publishers_from_config;
use syndic::storage::{
    ActivityLogger, ContentStore, Database, Deduplicator, LocalMediaStore, SourceRepository,
    SqliteActivityLog, SqliteContentStore, SqliteSourceRepository, SqliteStateStore,
};

pub const POSTS_PATH: &str = "/wp-json/wp/v2/posts";
pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";
pub const TELEGRAM_TOKEN: &str = "123:abc";
pub const INSTAGRAM_TOKEN: &str = "EAAB-test";
pub const INSTAGRAM_USER: &str = "1784";

/// Remote post as the WordPress REST API renders it
pub fn remote_post(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "guid": { "rendered": format!("https://donor.example/?p={id}") },
        "title": { "rendered": title },
        "content": { "rendered": format!("<p>Body of post {id}</p>") },
        "excerpt": { "rendered": format!("<p>Summary of post {id}</p>") },
        "date": "2024-01-05T10:00:00",
        "date_gmt": "2024-01-05T09:00:00",
        "link": format!("https://donor.example/news/{id}"),
    })
}

/// Attach embedded taxonomy terms to a remote post
pub fn with_terms(mut post: Value, categories: &[&str], tags: &[&str]) -> Value {
    let categories: Vec<Value> = categories
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({ "id": i + 1, "name": name, "slug": name.to_lowercase(), "taxonomy": "category" })
        })
        .collect();
    let tags: Vec<Value> = tags
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({ "id": i + 100, "name": name, "slug": name.to_lowercase(), "taxonomy": "post_tag" })
        })
        .collect();

    post["_embedded"]["wp:term"] = json!([categories, tags]);
    post
}

/// Attach an embedded featured image to a remote post
pub fn with_featured(mut post: Value, url: &str, alt: &str) -> Value {
    post["_embedded"]["wp:featuredmedia"] = json!([{ "source_url": url, "alt_text": alt }]);
    post
}

/// Chat completion reply carrying `content`
pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

/// Optional parts of the pipeline
#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    pub paraphrase: bool,
    pub telegram: bool,
    pub instagram: bool,
    pub default_category: Option<i64>,
    pub more_pages_delay_secs: Option<u64>,
}

/// Fully wired pipeline over in-memory storage
pub struct Harness {
    pub server: MockServer,
    pub db: Database,
    pub config: Config,
    pub sources: Arc<dyn SourceRepository>,
    pub content: Arc<dyn ContentStore>,
    pub activity: ActivityLogger,
    pub control: SchedulerControl,
    pub fetcher: Arc<dyn PostSource>,
    pub importer: Arc<ContentImporter>,
    pub scheduler: Arc<Scheduler>,
    pub registry: SourceRegistry,
    pub media_dir: TempDir,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_options(HarnessOptions::default()).await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        let server = MockServer::start().await;
        let media_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.importer.paraphrase_enabled = options.paraphrase;
        config.importer.default_category = options.default_category;
        if let Some(delay) = options.more_pages_delay_secs {
            config.scheduler.more_pages_delay_secs = delay;
        }
        config.fetcher.requests_per_second = 100;
        config.fetcher.request_timeout_secs = 5;
        config.media = MediaConfig {
            storage_dir: media_dir.path().to_path_buf(),
            public_base_url: "/media".to_string(),
            download_timeout_secs: 5,
            ..Default::default()
        };
        config.paraphrase = ParaphraseConfig {
            endpoint: format!("{}/v1", server.uri()),
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
            ..Default::default()
        };
        config.social = SocialConfig {
            enabled: options.telegram || options.instagram,
            telegram_token: options.telegram.then(|| TELEGRAM_TOKEN.to_string()),
            telegram_channel: Some("@syndic_test".to_string()),
            telegram_api_base: server.uri(),
            instagram_token: options.instagram.then(|| INSTAGRAM_TOKEN.to_string()),
            instagram_user_id: Some(INSTAGRAM_USER.to_string()),
            instagram_api_base: server.uri(),
            site_url: "https://mirror.example".to_string(),
        };

        let db = Database::in_memory().unwrap();
        let sources: Arc<dyn SourceRepository> = Arc::new(SqliteSourceRepository::new(db.clone()));
        let content: Arc<dyn ContentStore> = Arc::new(SqliteContentStore::new(db.clone()));
        let activity = ActivityLogger::new(Arc::new(SqliteActivityLog::new(db.clone())));
        let control = SchedulerControl::new(
            Arc::new(SqliteStateStore::new(db.clone())),
            config.scheduler.lock_ttl(),
        );

        let fetcher: Arc<dyn PostSource> = Arc::new(
            WordPressFetcher::with_config(100, Duration::from_secs(5), "syndic-test").unwrap(),
        );
        let rewriter: Arc<dyn ContentRewriter> = Arc::new(RegexRewriter::new());
        let media_store = LocalMediaStore::new(&config.media, "syndic-test", db.clone()).unwrap();
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
        if options.paraphrase {
            let paraphraser = ChatParaphraser::with_config(config.paraphrase.clone()).unwrap();
            importer = importer.with_paraphraser(Arc::new(paraphraser));
        }
        importer = importer
            .with_publishers(publishers_from_config(&config.social, Duration::from_secs(5)).unwrap());
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
        let registry = SourceRegistry::new(
            Arc::clone(&sources),
            Arc::clone(&fetcher),
            control.clone(),
            activity.clone(),
        );

        Self {
            server,
            db,
            config,
            sources,
            content,
            activity,
            control,
            fetcher,
            importer,
            scheduler,
            registry,
            media_dir,
        }
    }

    /// Posts endpoint of the mock site
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.server.uri(), POSTS_PATH)
    }

    /// Absolute URL on the mock server
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Register the mock site as a `post` source starting 2024-01-01
    pub fn add_source(&self) -> Source {
        self.add_source_with_type("post")
    }

    pub fn add_source_with_type(&self, post_type: &str) -> Source {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        self.sources
            .upsert(&Source::new(self.endpoint(), start, post_type))
            .unwrap()
    }

    pub fn source(&self) -> Source {
        self.sources.get(&self.endpoint()).unwrap().unwrap()
    }

    /// Serve `posts` as `page` of `total_pages`
    pub async fn mount_page(&self, page: u32, posts: Vec<Value>, total_pages: u32) {
        let total = posts.len() as u32 * total_pages.max(1);
        Mock::given(method("GET"))
            .and(path(POSTS_PATH))
            .and(query_param("page", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(Value::Array(posts))
                    .insert_header("X-WP-Total", total.to_string())
                    .insert_header("X-WP-TotalPages", total_pages.to_string()),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every page request with `status`
    pub async fn mount_fetch_error(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(POSTS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
            .mount(&self.server)
            .await;
    }

    /// Serve a small binary file at `path`
    pub async fn mount_file(&self, file_path: &str) {
        Mock::given(method("GET"))
            .and(path(file_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10])
                    .insert_header("Content-Type", "image/jpeg"),
            )
            .mount(&self.server)
            .await;
    }

    /// Requests the mock server received on `path`
    pub async fn requests_to(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }

    /// Number of local content records
    pub fn post_count(&self) -> i64 {
        let conn = self.db.conn().unwrap();
        conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
            .unwrap()
    }

    /// Local record id for a remote post id from [`remote_post`]
    pub fn local_id(&self, remote_id: i64) -> i64 {
        let conn = self.db.conn().unwrap();
        conn.query_row(
            "SELECT id FROM posts WHERE remote_guid = ?1",
            [format!("https://donor.example/?p={remote_id}")],
            |row| row.get(0),
        )
        .unwrap()
    }
}
