//! Local media storage
//!
//! Remote assets are streamed into a temporary file inside the media
//! root, up to a configured size, then moved to `<root>/<YYYY>/<MM>/<name>` and recorded in the
//! `media_assets` table.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use rusqlite::params;
use tempfile::NamedTempFile;
use url::Url;

use super::{parse_timestamp, Database};
use crate::config::MediaConfig;
use crate::models::{MediaAsset, MediaKind};
use crate::utils::error::MediaError;
use crate::utils::sanitize_filename;

/// A stored asset as seen by the relocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub asset_id: i64,
    pub url: String,
}

/// Media storage collaborator
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download a remote asset into a temporary file
    async fn download(&self, url: &str) -> Result<NamedTempFile, MediaError>;

    /// Move a downloaded file into storage and attach it to `post_id`
    async fn store(
        &self,
        file: NamedTempFile,
        source_url: &str,
        post_id: i64,
        kind: MediaKind,
    ) -> Result<StoredMedia, MediaError>;

    /// Set the alt text of a stored asset
    async fn set_alt_text(&self, asset_id: i64, alt: &str) -> Result<(), MediaError>;

    /// Assets attached to a record
    async fn assets_of(&self, post_id: i64) -> Result<Vec<MediaAsset>, MediaError>;
}

/// File-system media store with SQLite bookkeeping
pub struct LocalMediaStore {
    client: Client,
    db: Database,
    root: PathBuf,
    public_base_url: String,
    max_file_bytes: u64,
}

impl LocalMediaStore {
    /// Create a new store rooted at `config.storage_dir`
    pub fn new(config: &MediaConfig, user_agent: &str, db: Database) -> Result<Self, MediaError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            db,
            root: config.storage_dir.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Root directory of stored files
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db_err(err: impl std::fmt::Display) -> MediaError {
        MediaError::Storage(err.to_string())
    }
}

/// File name for a remote asset: URL basename without query, sanitised
pub fn file_name_from_url(url: &str) -> String {
    let basename = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    let name = sanitize_filename(basename.trim());
    if name.is_empty() || name == "." || name == ".." {
        format!("media-{}", uuid::Uuid::new_v4().simple())
    } else {
        name
    }
}

/// First free name in `dir`: `name`, then `stem-1.ext`, `stem-2.ext`, ...
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };

    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem}-{n}.{ext}")),
            None => dir.join(format!("{stem}-{n}")),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn download(&self, url: &str) -> Result<NamedTempFile, MediaError> {
        let parsed = Url::parse(url).map_err(|_| MediaError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MediaError::InvalidUrl(url.to_string()));
        }

        let mut response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::Status(status.as_u16()));
        }

        let limit = self.max_file_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(MediaError::TooLarge { limit });
        }

        // Content-Length may be absent or wrong, so count as we go
        let mut file = NamedTempFile::new_in(&self.root)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > limit {
                return Err(MediaError::TooLarge { limit });
            }
            file.write_all(&chunk)?;
        }
        file.flush()?;

        tracing::debug!(url = %url, bytes = written, "Downloaded media");
        Ok(file)
    }

    async fn store(
        &self,
        file: NamedTempFile,
        source_url: &str,
        post_id: i64,
        kind: MediaKind,
    ) -> Result<StoredMedia, MediaError> {
        let now = Utc::now();
        let subdir = format!("{:04}/{:02}", now.year(), now.month());
        let dir = self.root.join(&subdir);
        tokio::fs::create_dir_all(&dir).await?;

        let path = unique_path(&dir, &file_name_from_url(source_url));
        file.persist_noclobber(&path).map_err(|e| MediaError::Io(e.error))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let url = format!("{}/{}/{}", self.public_base_url, subdir, file_name);

        let conn = self.db.conn().map_err(Self::db_err)?;
        conn.execute(
            r#"
            INSERT INTO media_assets (post_id, kind, file_name, url, alt_text, source_url, created_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6)
            "#,
            params![post_id, kind.as_str(), file_name, url, source_url, now.to_rfc3339()],
        )
        .map_err(Self::db_err)?;
        let asset_id = conn.last_insert_rowid();

        tracing::debug!(post_id, asset_id, url = %url, "Stored media asset");
        Ok(StoredMedia { asset_id, url })
    }

    async fn set_alt_text(&self, asset_id: i64, alt: &str) -> Result<(), MediaError> {
        let conn = self.db.conn().map_err(Self::db_err)?;
        conn.execute(
            "UPDATE media_assets SET alt_text = ?2 WHERE id = ?1",
            params![asset_id, alt],
        )
        .map_err(Self::db_err)?;

        Ok(())
    }

    async fn assets_of(&self, post_id: i64) -> Result<Vec<MediaAsset>, MediaError> {
        let conn = self.db.conn().map_err(Self::db_err)?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, post_id, kind, file_name, url, alt_text, source_url, created_at
                FROM media_assets WHERE post_id = ?1 ORDER BY id
                "#,
            )
            .map_err(Self::db_err)?;

        let assets = stmt
            .query_map(params![post_id], |row| {
                let kind: String = row.get(2)?;
                Ok(MediaAsset {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    kind: kind.parse().unwrap_or(MediaKind::Image),
                    file_name: row.get(3)?,
                    url: row.get(4)?,
                    alt_text: row.get(5)?,
                    source_url: row.get(6)?,
                    created_at: parse_timestamp(&row.get::<_, String>(7)?),
                })
            })
            .map_err(Self::db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Self::db_err)?;

        Ok(assets)
    }
}
