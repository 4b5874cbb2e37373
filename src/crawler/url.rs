//! WordPress REST endpoint normalisation and query building
//!
//! Sources are stored as their full posts endpoint
//! (`https://site.example/wp-json/wp/v2/posts`). Operators may register the
//! bare site URL; it is normalised here.

use url::Url;

use crate::utils::error::FetchError;

/// Route appended to bare site URLs
pub const POSTS_ROUTE: &str = "/wp-json/wp/v2/posts";

/// Embedded resources requested with every page
pub const EMBED_FIELDS: &str = "wp:featuredmedia,wp:term";

/// Normalise an operator-supplied URL into a posts endpoint
///
/// Trailing slashes are trimmed and the posts route is appended when
/// missing. Only absolute http(s) URLs are accepted.
///
/// # Examples
///
/// ```
/// use syndic::crawler::url::normalize_endpoint;
///
/// let endpoint = normalize_endpoint("https://donor.example/").unwrap();
/// assert_eq!(endpoint, "https://donor.example/wp-json/wp/v2/posts");
///
/// let same = normalize_endpoint("https://donor.example/wp-json/wp/v2/posts/").unwrap();
/// assert_eq!(same, endpoint);
/// ```
pub fn normalize_endpoint(input: &str) -> Result<String, FetchError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(FetchError::InvalidUrl(input.to_string()));
    }

    let endpoint = if trimmed.ends_with(POSTS_ROUTE) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{POSTS_ROUTE}")
    };

    let parsed = Url::parse(&endpoint).map_err(|_| FetchError::InvalidUrl(input.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(FetchError::InvalidUrl(input.to_string()));
    }

    Ok(endpoint)
}

/// Query parameters for one page of posts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub per_page: u32,
    pub page: u32,
    /// Lower publish-date bound, `YYYY-MM-DDTHH:MM:SS`
    pub after: String,
}

impl PageQuery {
    /// Full request URL for this page of `endpoint`
    pub fn to_url(&self, endpoint: &str) -> Result<Url, FetchError> {
        let mut url =
            Url::parse(endpoint).map_err(|_| FetchError::InvalidUrl(endpoint.to_string()))?;

        url.query_pairs_mut()
            .append_pair("per_page", &self.per_page.to_string())
            .append_pair("page", &self.page.to_string())
            .append_pair("_embed", EMBED_FIELDS)
            .append_pair("after", &self.after)
            .append_pair("orderby", "date")
            .append_pair("order", "asc");

        Ok(url)
    }
}

/// URL used to verify that an endpoint answers
pub fn check_url(endpoint: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(endpoint).map_err(|_| FetchError::InvalidUrl(endpoint.to_string()))?;
    url.query_pairs_mut().append_pair("per_page", "1");
    Ok(url)
}
