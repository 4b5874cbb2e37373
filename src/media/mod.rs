//! Media relocation
//!
//! Moves remote images and videos referenced by an imported post into
//! local media storage and points the content at the local copies.
//! Every asset is handled on its own: a failed download is logged against
//! the source the post came from and the remaining assets are still
//! processed.

use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::metrics;
use crate::models::{MediaKind, RemoteMedia};
use crate::parser::{ContentRewriter, MediaRef};
use crate::storage::{ActivityLogger, ContentStore, MediaStore, StoredMedia};
use crate::utils::error::MediaError;

static ALT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\salt\s*=\s*["']([^"']*)["']"#).unwrap());

/// Result of relocating the inline media of one post
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relocation {
    /// Content with local references
    pub html: String,

    /// Assets stored locally
    pub relocated: usize,

    /// Assets that could not be downloaded or stored
    pub failed: usize,
}

/// Downloads referenced media and rewrites content references
pub struct MediaRelocator {
    media: Arc<dyn MediaStore>,
    rewriter: Arc<dyn ContentRewriter>,
    content: Arc<dyn ContentStore>,
    activity: ActivityLogger,
}

impl MediaRelocator {
    pub fn new(
        media: Arc<dyn MediaStore>,
        rewriter: Arc<dyn ContentRewriter>,
        content: Arc<dyn ContentStore>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            media,
            rewriter,
            content,
            activity,
        }
    }

    /// Relocate inline images and videos of `post_id`, imported from `source_url`
    ///
    /// Image tags are replaced by a full local rendering, or dropped when
    /// the asset cannot be stored. Video tags only get their `src`
    /// swapped and are left untouched on failure.
    pub async fn relocate(&self, post_id: i64, html: &str, source_url: &str) -> Relocation {
        let mut result = Relocation {
            html: html.to_string(),
            ..Default::default()
        };

        for image in self.rewriter.find_media(html, MediaKind::Image) {
            match self.fetch_and_store(post_id, &image).await {
                Ok(stored) => {
                    let alt = image_alt(&image.tag);
                    if !alt.is_empty() {
                        if let Err(e) = self.media.set_alt_text(stored.asset_id, &alt).await {
                            tracing::warn!(post_id, error = %e, "Failed to set alt text");
                        }
                    }
                    let rendered = render_attachment(&stored.url, &alt);
                    result.html = self.rewriter.replace_tag(&result.html, &image, &rendered);
                    result.relocated += 1;
                }
                Err(e) => {
                    self.report_failure(post_id, &image, source_url, e);
                    result.html = self.rewriter.replace_tag(&result.html, &image, "");
                    result.failed += 1;
                }
            }
        }

        for video in self.rewriter.find_media(html, MediaKind::Video) {
            match self.fetch_and_store(post_id, &video).await {
                Ok(stored) => {
                    result.html = self.rewriter.replace_src(&result.html, &video, &stored.url);
                    result.relocated += 1;
                }
                Err(e) => {
                    self.report_failure(post_id, &video, source_url, e);
                    result.failed += 1;
                }
            }
        }

        tracing::debug!(
            post_id,
            relocated = result.relocated,
            failed = result.failed,
            "Relocated inline media"
        );
        result
    }

    /// Store the featured image and make it the post's thumbnail
    ///
    /// Returns the stored asset, or `None` when there was nothing to
    /// relocate or relocation failed (failures are logged).
    pub async fn relocate_featured(
        &self,
        post_id: i64,
        media: &RemoteMedia,
        source_url: &str,
    ) -> Option<StoredMedia> {
        let url = media.asset_url()?;

        let stored = match self.download_and_store(post_id, url, MediaKind::Image).await {
            Ok(stored) => stored,
            Err(e) => {
                metrics::record_media_failure("featured");
                self.activity.degraded(
                    Some(source_url),
                    format!("Post {post_id}: featured image {url} not relocated"),
                    e,
                );
                return None;
            }
        };

        if let Err(e) = self.content.set_thumbnail(post_id, stored.asset_id) {
            self.activity.warning(
                Some(source_url),
                format!("Post {post_id}: failed to set thumbnail: {e:#}"),
            );
        }

        if let Some(alt) = media.alt() {
            if let Err(e) = self.media.set_alt_text(stored.asset_id, alt).await {
                tracing::warn!(post_id, error = %e, "Failed to set featured alt text");
            }
        }

        Some(stored)
    }

    async fn fetch_and_store(&self, post_id: i64, media: &MediaRef) -> Result<StoredMedia, MediaError> {
        self.download_and_store(post_id, &media.download_url(), media.kind)
            .await
    }

    async fn download_and_store(
        &self,
        post_id: i64,
        url: &str,
        kind: MediaKind,
    ) -> Result<StoredMedia, MediaError> {
        let file = self.media.download(url).await?;
        self.media.store(file, url, post_id, kind).await
    }

    fn report_failure(&self, post_id: i64, media: &MediaRef, source_url: &str, error: MediaError) {
        metrics::record_media_failure(media.kind.as_str());
        self.activity.degraded(
            Some(source_url),
            format!(
                "Post {post_id}: {} {} not relocated",
                media.kind,
                media.download_url()
            ),
            error,
        );
    }
}

/// Alt text of an `<img>` tag, entities decoded
fn image_alt(tag: &str) -> String {
    ALT_REGEX
        .captures(tag)
        .map(|c| crate::parser::sanitize::decode_html_entities(&c[1]))
        .unwrap_or_default()
}

/// Full rendering of a local image attachment
fn render_attachment(url: &str, alt: &str) -> String {
    format!(
        r#"<img src="{}" class="attachment-full size-full" alt="{}" decoding="async" />"#,
        html_escape::encode_double_quoted_attribute(url),
        html_escape::encode_double_quoted_attribute(alt),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_alt() {
        assert_eq!(image_alt(r#"<img src="x.jpg" alt="A &amp; B">"#), "A & B");
        assert_eq!(image_alt(r#"<img src="x.jpg">"#), "");
    }

    #[test]
    fn test_render_attachment() {
        assert_eq!(
            render_attachment("/media/2024/01/cat.jpg", r#"a "cat""#),
            r#"<img src="/media/2024/01/cat.jpg" class="attachment-full size-full" alt="a &quot;cat&quot;" decoding="async" />"#
        );
    }
}
