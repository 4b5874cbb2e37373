//! HTML content rewriting
//!
//! Imported post bodies are mutated in a few narrow ways: links back into
//! the source site are unwrapped, and media tags are located so the
//! relocator can swap remote references for local ones. All of it goes
//! through the [`ContentRewriter`] trait so the regex implementation here
//! can be replaced by a real HTML parser without touching the pipeline.

pub mod sanitize;

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

pub use crate::models::MediaKind;
use crate::utils::extract_domain;

static ANCHOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s+[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#).unwrap()
});

static IMG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\ssrc\s*=\s*["']?(https?://[^"'\s>]+)["']?[^>]*>"#).unwrap()
});

static VIDEO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<video\b[^>]*?\ssrc\s*=\s*["']?(https?://[^"'\s>]+)["']?[^>]*>"#).unwrap()
});

static SCHEME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*:").unwrap());

/// A media tag found in post content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Image or video
    pub kind: MediaKind,

    /// The full opening tag as it appears in the markup
    pub tag: String,

    /// The `src` value as written in the markup (may contain entities)
    pub url: String,
}

impl MediaRef {
    /// URL suitable for downloading (entities decoded)
    pub fn download_url(&self) -> String {
        sanitize::decode_html_entities(&self.url)
    }
}

/// Narrow interface for the HTML mutations performed by the pipeline
pub trait ContentRewriter: Send + Sync {
    /// Unwrap anchors pointing back into the source site
    ///
    /// An anchor whose href resolves to the source's own domain, or whose
    /// href is a relative path, is replaced by its inner markup. Every other
    /// anchor is left untouched.
    fn strip_source_links(&self, html: &str, source_url: &str) -> String;

    /// Find media tags of the given kind referencing absolute URLs
    fn find_media(&self, html: &str, kind: MediaKind) -> Vec<MediaRef>;

    /// Replace every occurrence of the media tag with `replacement`
    fn replace_tag(&self, html: &str, media: &MediaRef, replacement: &str) -> String;

    /// Replace only the `src` URL inside the media tag
    fn replace_src(&self, html: &str, media: &MediaRef, new_url: &str) -> String;
}

/// Regex-backed rewriter, good enough for markup produced by WordPress
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexRewriter;

impl RegexRewriter {
    pub fn new() -> Self {
        Self
    }

    fn is_internal_link(href: &str, source_domain: &str) -> bool {
        let href = href.trim().to_lowercase();

        let absolute = if href.starts_with("//") {
            format!("https:{href}")
        } else if SCHEME_REGEX.is_match(&href) {
            if !(href.starts_with("http://") || href.starts_with("https://")) {
                // mailto:, tel: and friends
                return false;
            }
            href
        } else {
            return true;
        };

        match Url::parse(&absolute) {
            Ok(url) => url
                .host_str()
                .map(|host| same_site(host, source_domain))
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

fn same_site(host: &str, domain: &str) -> bool {
    let host = host.trim_start_matches("www.");
    let domain = domain.trim_start_matches("www.");
    host == domain || host.ends_with(&format!(".{domain}"))
}

impl ContentRewriter for RegexRewriter {
    fn strip_source_links(&self, html: &str, source_url: &str) -> String {
        if html.is_empty() || source_url.is_empty() {
            return html.to_string();
        }

        let Ok(domain) = extract_domain(source_url) else {
            return html.to_string();
        };

        ANCHOR_REGEX
            .replace_all(html, |caps: &Captures| {
                if Self::is_internal_link(&caps[1], &domain) {
                    caps[2].to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn find_media(&self, html: &str, kind: MediaKind) -> Vec<MediaRef> {
        let re = match kind {
            MediaKind::Image => &*IMG_REGEX,
            MediaKind::Video => &*VIDEO_REGEX,
        };

        let mut seen = HashSet::new();
        re.captures_iter(html)
            .filter(|caps| seen.insert(caps[0].to_string()))
            .map(|caps| MediaRef {
                kind,
                tag: caps[0].to_string(),
                url: caps[1].to_string(),
            })
            .collect()
    }

    fn replace_tag(&self, html: &str, media: &MediaRef, replacement: &str) -> String {
        html.replace(&media.tag, replacement)
    }

    fn replace_src(&self, html: &str, media: &MediaRef, new_url: &str) -> String {
        let new_tag = media.tag.replace(&media.url, new_url);
        html.replace(&media.tag, &new_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://www.donor.example/wp-json/wp/v2/posts";

    #[test]
    fn test_strip_links_to_source_domain() {
        let rewriter = RegexRewriter::new();
        let html = r#"<p>See <a href="https://donor.example/2024/01/story">this story</a> now.</p>"#;
        assert_eq!(
            rewriter.strip_source_links(html, SOURCE),
            "<p>See this story now.</p>"
        );
    }

    #[test]
    fn test_strip_links_to_subdomain_and_protocol_relative() {
        let rewriter = RegexRewriter::new();
        let html = r#"<a href="//cdn.donor.example/x">cdn</a> <a href="HTTPS://WWW.DONOR.EXAMPLE/y">upper</a>"#;
        assert_eq!(rewriter.strip_source_links(html, SOURCE), "cdn upper");
    }

    #[test]
    fn test_strip_relative_links() {
        let rewriter = RegexRewriter::new();
        let html = r#"<a href="/category/politics">Politics</a> and <a href='tag/x'>X</a>"#;
        assert_eq!(rewriter.strip_source_links(html, SOURCE), "Politics and X");
    }

    #[test]
    fn test_external_links_untouched() {
        let rewriter = RegexRewriter::new();
        let html = r#"<a href="https://other.example/a" target="_blank">other</a> <a href="mailto:desk@donor.example">mail</a>"#;
        assert_eq!(rewriter.strip_source_links(html, SOURCE), html);
    }

    #[test]
    fn test_lookalike_domain_kept() {
        let rewriter = RegexRewriter::new();
        let html = r#"<a href="https://notdonor.example/a">x</a>"#;
        assert_eq!(rewriter.strip_source_links(html, SOURCE), html);
    }

    #[test]
    fn test_strip_links_keeps_inner_markup() {
        let rewriter = RegexRewriter::new();
        let html = "<a href=\"/x\">\n<strong>bold</strong>\n</a>";
        assert_eq!(
            rewriter.strip_source_links(html, SOURCE),
            "\n<strong>bold</strong>\n"
        );
    }

    #[test]
    fn test_find_images() {
        let rewriter = RegexRewriter::new();
        let html = r#"<p><img class="a" src="https://donor.example/a.jpg?w=300&amp;h=200" alt="A"><img src="/relative.png"><img data-src="https://lazy.example/x.jpg" src='http://donor.example/b.png' /></p>"#;
        let refs = rewriter.find_media(html, MediaKind::Image);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].url, "https://donor.example/a.jpg?w=300&amp;h=200");
        assert_eq!(refs[0].download_url(), "https://donor.example/a.jpg?w=300&h=200");
        assert_eq!(refs[1].url, "http://donor.example/b.png");
        assert!(refs[1].tag.starts_with("<img data-src"));
    }

    #[test]
    fn test_find_images_deduplicates_identical_tags() {
        let rewriter = RegexRewriter::new();
        let html = r#"<img src="https://d.example/a.jpg"><img src="https://d.example/a.jpg">"#;
        assert_eq!(rewriter.find_media(html, MediaKind::Image).len(), 1);
    }

    #[test]
    fn test_find_videos_and_replace_src() {
        let rewriter = RegexRewriter::new();
        let html = r#"<figure><video controls src="https://donor.example/clip.mp4"></video></figure>"#;
        let refs = rewriter.find_media(html, MediaKind::Video);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, MediaKind::Video);

        let rewritten = rewriter.replace_src(html, &refs[0], "/media/2024/01/clip.mp4");
        assert_eq!(
            rewritten,
            r#"<figure><video controls src="/media/2024/01/clip.mp4"></video></figure>"#
        );
    }

    #[test]
    fn test_replace_tag() {
        let rewriter = RegexRewriter::new();
        let html = r#"<p><img src="https://d.example/a.jpg"></p>"#;
        let refs = rewriter.find_media(html, MediaKind::Image);
        assert_eq!(rewriter.replace_tag(html, &refs[0], ""), "<p></p>");
    }
}
