//! Error types for the syndic pipeline
//!
//! This module defines the domain errors raised by the fetcher, the
//! paraphraser, the media relocator and the content importer.

use thiserror::Error;

/// Errors that can occur while fetching a page from a remote source
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status code
    #[error("Invalid response code: {0}")]
    Status(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Body could not be decoded as a post list
    #[error("Malformed response body: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify a reqwest error, separating timeouts from other transport failures
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    /// Check if the failure is worth retrying on a later cycle
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::Decode(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// Errors returned by the paraphrasing service
#[derive(Error, Debug)]
pub enum ParaphraseError {
    /// No API key configured
    #[error("Paraphrase API key not set")]
    MissingApiKey,

    /// Nothing to rewrite
    #[error("Empty input text")]
    EmptyInput,

    /// HTTP transport error
    #[error("Paraphrase request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status
    #[error("Paraphrase API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response did not carry a rewritten text
    #[error("Invalid paraphrase response: {0}")]
    InvalidResponse(String),
}

impl ParaphraseError {
    /// Check if the failure is transient
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::MissingApiKey | Self::EmptyInput | Self::InvalidResponse(_) => false,
        }
    }
}

/// Errors raised while downloading or storing a media asset
#[derive(Error, Debug)]
pub enum MediaError {
    /// HTTP transport error
    #[error("Download failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status code
    #[error("Download failed with status {0}")]
    Status(u16),

    /// Asset URL is not usable
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),

    /// Asset exceeds the configured size limit
    #[error("Media exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    /// Local filesystem error
    #[error("Media storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Media bookkeeping in the database failed
    #[error("Media storage error: {0}")]
    Storage(String),
}

impl MediaError {
    /// Check if the failure is transient
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Io(_))
            || matches!(self, Self::Status(code) if *code >= 500)
    }
}

/// Errors raised by the content importer
#[derive(Error, Debug)]
pub enum ImportError {
    /// Remote post lacks a required field
    #[error("Remote post is missing required field '{0}'")]
    MissingField(&'static str),

    /// Content store rejected the new record
    #[error("Content creation rejected: {0}")]
    CreateRejected(String),

    /// No audit snapshot exists for the local record
    #[error("Original content not found for post {0}")]
    SnapshotNotFound(i64),

    /// Local record does not exist
    #[error("Post {0} not found")]
    PostNotFound(i64),

    /// Re-paraphrasing requested without a paraphraser
    #[error("Paraphrasing is disabled")]
    ParaphraseDisabled,

    /// Storage failure outside the create step
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

impl ImportError {
    /// Import failures are never retried for the same post
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
