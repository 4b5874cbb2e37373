//! HTTP fetcher for WordPress REST sources
//!
//! Fetches one page of posts per call with:
//! - Rate limiting with governor
//! - An explicit per-request timeout
//! - A browser-like User-Agent
//! - Totals read from the `X-WP-Total` / `X-WP-TotalPages` headers
//!
//! There is no in-call retry: a failed fetch is retried on the next
//! scheduler cycle and counted against the source's error threshold.

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client,
};
use std::num::NonZeroU32;
use std::time::Duration;

use super::url::{check_url, PageQuery};
use crate::config::{FetcherConfig, MAX_BATCH_SIZE};
use crate::models::{FetchedPage, RemotePost, Source};
use crate::utils::error::FetchError;

/// Response header carrying the total number of matching posts
pub const TOTAL_HEADER: &str = "X-WP-Total";

/// Response header carrying the total number of pages
pub const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";

/// Source of remote posts
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch the page at the source's cursor
    async fn fetch_page(&self, source: &Source, per_page: u32) -> Result<FetchedPage, FetchError>;

    /// Verify that an endpoint answers `GET ?per_page=1` with 200
    async fn check_endpoint(&self, endpoint: &str) -> Result<(), FetchError>;
}

/// WordPress REST API fetcher
pub struct WordPressFetcher {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl WordPressFetcher {
    /// Create a fetcher from configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        Self::with_config(
            config.requests_per_second,
            Duration::from_secs(config.request_timeout_secs),
            &config.user_agent,
        )
    }

    /// Create a fetcher with explicit settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        requests_per_second: u32,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(user_agent)
            .default_headers(Self::build_headers())
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Standard headers sent with every request
    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers
    }

    /// Read a numeric header, `None` when missing or malformed
    fn header_number(headers: &HeaderMap, name: &str) -> Option<u64> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Decode a page body into posts
    pub fn decode_posts(body: &str) -> Result<Vec<RemotePost>, FetchError> {
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PostSource for WordPressFetcher {
    async fn fetch_page(&self, source: &Source, per_page: u32) -> Result<FetchedPage, FetchError> {
        let query = PageQuery {
            per_page: per_page.clamp(1, MAX_BATCH_SIZE),
            page: source.current_page.max(1),
            after: source.after_param(),
        };
        let url = query.to_url(&source.url)?;

        // Wait for rate limiter
        self.rate_limiter.until_ready().await;

        tracing::debug!(source = %source.url, page = query.page, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let total_posts = Self::header_number(response.headers(), TOTAL_HEADER);
        let total_pages = Self::header_number(response.headers(), TOTAL_PAGES_HEADER);

        let body = response.text().await.map_err(FetchError::from_transport)?;
        let posts = Self::decode_posts(&body)?;

        Ok(FetchedPage {
            total_posts: total_posts.unwrap_or(posts.len() as u64),
            total_pages: total_pages
                .map(|p| p.min(u64::from(u32::MAX)) as u32)
                .unwrap_or(1),
            posts,
        })
    }

    async fn check_endpoint(&self, endpoint: &str) -> Result<(), FetchError> {
        let url = check_url(endpoint)?;

        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        match response.status().as_u16() {
            200 => Ok(()),
            code => Err(FetchError::Status(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_creation() {
        let fetcher = WordPressFetcher::new(&FetcherConfig::default());
        assert!(fetcher.is_ok());

        let fetcher = WordPressFetcher::with_config(0, Duration::from_secs(1), "test-agent");
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_build_headers() {
        let headers = WordPressFetcher::build_headers();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert!(headers.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn test_header_number() {
        let mut headers = HeaderMap::new();
        headers.insert("x-wp-totalpages", HeaderValue::from_static(" 7 "));
        headers.insert("x-wp-total", HeaderValue::from_static("many"));

        assert_eq!(WordPressFetcher::header_number(&headers, TOTAL_PAGES_HEADER), Some(7));
        assert_eq!(WordPressFetcher::header_number(&headers, TOTAL_HEADER), None);
        assert_eq!(WordPressFetcher::header_number(&headers, "X-Missing"), None);
    }

    #[test]
    fn test_decode_posts() {
        let posts = WordPressFetcher::decode_posts(r#"[{"id": 1}, {"id": 2, "guid": {"rendered": "g"}}]"#)
            .unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].remote_guid(), Some("g"));

        let err = WordPressFetcher::decode_posts(r#"{"code": "rest_no_route"}"#).unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
