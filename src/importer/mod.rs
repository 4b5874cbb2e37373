//! Content import
//!
//! Turns one remote post into a local content record:
//!
//! 0. validate and deduplicate
//! 1. strip markup, unwrap source-internal links, paraphrase
//! 2. create the record (the only step whose failure aborts the post)
//! 3. store the untouched original as an audit snapshot
//! 4. map taxonomy terms onto local categories and tags
//! 5. keep the original term set for later re-mapping
//! 6. relocate featured and inline media
//! 7. bump the source counter and cross-post to every configured channel
//!
//! Steps 3 to 7 log their failures and carry on; the created record is
//! never rolled back. A failed step 2 is returned to the caller, which
//! records it in the activity log.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ImportConfig;
use crate::llm::Paraphraser;
use crate::media::MediaRelocator;
use crate::metrics;
use crate::models::{
    CategoryCreation, ContentUpdate, ImportedCategory, ImportedPost, NewContent, RemapReport,
    RemotePost, RemoteTerm, Source, TermSet,
};
use crate::parser::sanitize::strip_all_tags;
use crate::parser::ContentRewriter;
use crate::social::{Publisher, SocialPost};
use crate::storage::{ActivityLogger, ContentStore, Deduplicator, SourceRepository};
use crate::utils::error::ImportError;

/// Post type whose taxonomy terms are mapped locally
pub const MAPPED_POST_TYPE: &str = "post";

/// Status given to imported records
pub const PUBLISH_STATUS: &str = "publish";

/// Why a remote post was not imported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Required field missing
    Invalid(&'static str),
    /// Already imported for this post type
    Duplicate,
}

/// Result of importing one remote post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported(i64),
    Skipped(SkipReason),
}

/// Text fields after preparation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PreparedText {
    title: String,
    content: String,
    excerpt: String,
}

/// Imports remote posts into the local content store
pub struct ContentImporter {
    settings: ImportConfig,
    content: Arc<dyn ContentStore>,
    sources: Arc<dyn SourceRepository>,
    dedup: Deduplicator,
    rewriter: Arc<dyn ContentRewriter>,
    relocator: MediaRelocator,
    activity: ActivityLogger,
    paraphraser: Option<Arc<dyn Paraphraser>>,
    publishers: Vec<Arc<dyn Publisher>>,
}

impl ContentImporter {
    pub fn new(
        settings: ImportConfig,
        content: Arc<dyn ContentStore>,
        sources: Arc<dyn SourceRepository>,
        rewriter: Arc<dyn ContentRewriter>,
        relocator: MediaRelocator,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            settings,
            dedup: Deduplicator::new(Arc::clone(&content)),
            content,
            sources,
            rewriter,
            relocator,
            activity,
            paraphraser: None,
            publishers: Vec::new(),
        }
    }

    /// Set the paraphraser used when paraphrasing is enabled
    pub fn with_paraphraser(mut self, paraphraser: Arc<dyn Paraphraser>) -> Self {
        self.paraphraser = Some(paraphraser);
        self
    }

    /// Add cross-posting channels; channels are tried in the order given
    pub fn with_publishers(mut self, publishers: impl IntoIterator<Item = Arc<dyn Publisher>>) -> Self {
        self.publishers.extend(publishers);
        self
    }

    pub fn settings(&self) -> &ImportConfig {
        &self.settings
    }

    fn active_paraphraser(&self) -> Option<&Arc<dyn Paraphraser>> {
        if self.settings.paraphrase_enabled {
            self.paraphraser.as_ref()
        } else {
            None
        }
    }

    /// Import one remote post from `source`
    pub async fn import_post(
        &self,
        post: &RemotePost,
        source: &Source,
    ) -> Result<ImportOutcome, ImportError> {
        let src = Some(source.url.as_str());

        // Step 0: validate
        let Some(remote_id) = post.id else {
            self.activity
                .warning(src, "Skipping remote post without an id");
            return Ok(ImportOutcome::Skipped(SkipReason::Invalid("id")));
        };
        let Some(guid) = post.remote_guid() else {
            self.activity
                .warning(src, format!("Skipping remote post {remote_id}: missing guid"));
            return Ok(ImportOutcome::Skipped(SkipReason::Invalid("guid")));
        };
        if self.dedup.is_imported(guid, &source.post_type)? {
            tracing::debug!(source = %source.url, remote_id, "Post already imported");
            return Ok(ImportOutcome::Skipped(SkipReason::Duplicate));
        }

        // Step 1: prepare text
        let prepared = self.prepare_text(post, source).await;

        // Step 2: create
        let record = NewContent {
            title: prepared.title.clone(),
            content: prepared.content.clone(),
            excerpt: prepared.excerpt.clone(),
            status: PUBLISH_STATUS.to_string(),
            author_id: self.settings.default_author,
            post_type: source.post_type.clone(),
            published_at: post.date.clone(),
            published_at_gmt: post.date_gmt.clone(),
            remote_guid: guid.to_string(),
            source_url: source.url.clone(),
        };
        let post_id = match self.content.create(&record) {
            Ok(id) => id,
            Err(e) => {
                metrics::record_posts_skipped("rejected", 1);
                return Err(ImportError::CreateRejected(format!("{e:#}")));
            }
        };

        // Step 3: audit snapshot
        let terms = TermSet::from_terms(post.terms());
        let snapshot = ImportedPost {
            post_id,
            remote_guid: guid.to_string(),
            source_url: source.url.clone(),
            post_type: source.post_type.clone(),
            original_url: post.link.clone(),
            original_title: post.title_html().to_string(),
            original_content: post.content_html().to_string(),
            original_excerpt: post.excerpt_html().to_string(),
            original_terms: TermSet::default(),
            imported_at: Utc::now(),
        };
        let snapshot_saved = match self.content.save_snapshot(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                self.activity
                    .error(src, format!("Post {post_id}: failed to save original snapshot: {e:#}"));
                false
            }
        };

        // Step 4: taxonomy
        if source.post_type == MAPPED_POST_TYPE {
            self.apply_taxonomy(post_id, post.terms(), src);
        }

        // Step 5: original terms
        if snapshot_saved && !terms.is_empty() {
            if let Err(e) = self.content.save_original_terms(post_id, &terms) {
                self.activity
                    .warning(src, format!("Post {post_id}: failed to save original terms: {e:#}"));
            }
        }

        // Step 6: media
        let thumbnail = match post.featured_media() {
            Some(media) => {
                self.relocator
                    .relocate_featured(post_id, media, &source.url)
                    .await
            }
            None => None,
        };

        let relocation = self
            .relocator
            .relocate(post_id, &prepared.content, &source.url)
            .await;
        let final_content = if relocation.html != prepared.content {
            let update = ContentUpdate {
                content: Some(relocation.html.clone()),
                ..Default::default()
            };
            match self.content.update(post_id, &update) {
                Ok(()) => relocation.html,
                Err(e) => {
                    self.activity.warning(
                        src,
                        format!("Post {post_id}: failed to save relocated content: {e:#}"),
                    );
                    prepared.content.clone()
                }
            }
        } else {
            prepared.content.clone()
        };

        // Step 7: counters and cross-posting
        if let Err(e) = self.sources.increment_posts(&source.url, 1) {
            self.activity
                .warning(src, format!("Failed to increment post counter: {e:#}"));
        }
        metrics::record_post_imported(&source.url);

        if !self.publishers.is_empty() {
            let tags = if source.post_type == MAPPED_POST_TYPE {
                post.terms()
                    .filter(|t| t.is_tag() && !t.name.trim().is_empty())
                    .map(|t| t.name.clone())
                    .collect()
            } else {
                Vec::new()
            };
            let social = SocialPost {
                post_id,
                title: prepared.title.clone(),
                text: strip_all_tags(&final_content),
                image_url: thumbnail.map(|t| t.url),
                tags,
            };
            for publisher in &self.publishers {
                if let Err(e) = publisher.publish(&social).await {
                    self.activity.degraded(
                        src,
                        format!("Post {post_id}: {} cross-post failed", publisher.name()),
                        e,
                    );
                }
            }
        }

        self.activity.info(
            src,
            format!("Imported post {post_id} (remote id {remote_id})"),
        );
        Ok(ImportOutcome::Imported(post_id))
    }

    /// Strip, unwrap source links and paraphrase title, content and excerpt
    async fn prepare_text(&self, post: &RemotePost, source: &Source) -> PreparedText {
        let mut prepared = PreparedText {
            title: strip_all_tags(post.title_html()),
            content: self
                .rewriter
                .strip_source_links(post.content_html(), &source.url),
            excerpt: strip_all_tags(post.excerpt_html()),
        };

        if let Some(paraphraser) = self.active_paraphraser() {
            let src = Some(source.url.as_str());
            if let Some(title) = self.paraphrase_field(paraphraser, "title", &prepared.title, src).await {
                prepared.title = title;
            }
            if let Some(content) = self
                .paraphrase_field(paraphraser, "content", &prepared.content, src)
                .await
            {
                prepared.content = content;
            }
            if let Some(excerpt) = self
                .paraphrase_field(paraphraser, "excerpt", &prepared.excerpt, src)
                .await
            {
                prepared.excerpt = excerpt;
            }
        }

        prepared
    }

    /// Paraphrase one field; `None` means keep the original
    async fn paraphrase_field(
        &self,
        paraphraser: &Arc<dyn Paraphraser>,
        field: &str,
        text: &str,
        source_url: Option<&str>,
    ) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        match paraphraser.rewrite(text).await {
            Ok(rewritten) => Some(rewritten),
            Err(e) => {
                metrics::record_paraphrase_failure(field);
                self.activity.degraded(
                    source_url,
                    format!("Paraphrase of {field} failed, keeping original"),
                    e,
                );
                None
            }
        }
    }

    /// Attach local categories and tags for the remote terms
    fn apply_taxonomy<'a>(
        &self,
        post_id: i64,
        terms: impl Iterator<Item = &'a RemoteTerm>,
        source_url: Option<&str>,
    ) {
        let mut categories = Vec::new();
        let mut tags = Vec::new();

        for term in terms {
            if term.is_category() {
                match self.content.mapping_for(&term.name) {
                    Ok(Some(category_id)) => categories.push(category_id),
                    Ok(None) => match self.settings.default_category {
                        Some(default) => categories.push(default),
                        None => self.activity.warning(
                            source_url,
                            format!(
                                "Post {post_id}: category '{}' has no mapping, skipped",
                                term.name
                            ),
                        ),
                    },
                    Err(e) => self.activity.warning(
                        source_url,
                        format!("Post {post_id}: mapping lookup for '{}' failed: {e:#}", term.name),
                    ),
                }
            } else if term.is_tag() && !term.name.trim().is_empty() {
                tags.push(term.name.clone());
            }
        }

        categories.sort_unstable();
        categories.dedup();
        if !categories.is_empty() {
            if let Err(e) = self.content.attach_categories(post_id, &categories) {
                self.activity
                    .warning(source_url, format!("Post {post_id}: failed to attach categories: {e:#}"));
            }
        }

        if !tags.is_empty() {
            if let Err(e) = self.content.attach_tags(post_id, &tags) {
                self.activity
                    .warning(source_url, format!("Post {post_id}: failed to attach tags: {e:#}"));
            }
        }
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    /// Put the original title, content and excerpt back on a record
    pub fn restore_original(&self, post_id: i64) -> Result<(), ImportError> {
        let snapshot = self
            .content
            .snapshot(post_id)?
            .ok_or(ImportError::SnapshotNotFound(post_id))?;
        if self.content.get(post_id)?.is_none() {
            return Err(ImportError::PostNotFound(post_id));
        }

        let update = ContentUpdate {
            title: Some(snapshot.original_title),
            content: Some(snapshot.original_content),
            excerpt: Some(snapshot.original_excerpt),
        };
        self.content.update(post_id, &update)?;

        self.activity.info(
            Some(snapshot.source_url.as_str()),
            format!("Restored original content of post {post_id}"),
        );
        Ok(())
    }

    /// Paraphrase the original text again
    ///
    /// Fields whose rewrite fails keep their current value. Returns the
    /// number of fields updated.
    pub async fn reparaphrase(&self, post_id: i64) -> Result<usize, ImportError> {
        let paraphraser = self
            .paraphraser
            .as_ref()
            .ok_or(ImportError::ParaphraseDisabled)?;
        let snapshot = self
            .content
            .snapshot(post_id)?
            .ok_or(ImportError::SnapshotNotFound(post_id))?;
        if self.content.get(post_id)?.is_none() {
            return Err(ImportError::PostNotFound(post_id));
        }

        let src = Some(snapshot.source_url.as_str());
        let title = strip_all_tags(&snapshot.original_title);
        let content = self
            .rewriter
            .strip_source_links(&snapshot.original_content, &snapshot.source_url);
        let excerpt = strip_all_tags(&snapshot.original_excerpt);

        let update = ContentUpdate {
            title: self.paraphrase_field(paraphraser, "title", &title, src).await,
            content: self.paraphrase_field(paraphraser, "content", &content, src).await,
            excerpt: self.paraphrase_field(paraphraser, "excerpt", &excerpt, src).await,
        };

        let updated = [&update.title, &update.content, &update.excerpt]
            .iter()
            .filter(|f| f.is_some())
            .count();
        if !update.is_empty() {
            self.content.update(post_id, &update)?;
        }

        self.activity.info(
            src,
            format!("Re-paraphrased post {post_id} ({updated} field(s) updated)"),
        );
        Ok(updated)
    }

    /// Attach categories that became mapped since import
    pub fn remap_categories(&self) -> Result<RemapReport, ImportError> {
        let mut report = RemapReport::default();

        for snapshot in self.content.imported_posts()? {
            if snapshot.post_type != MAPPED_POST_TYPE {
                continue;
            }
            report.processed += 1;

            match self.remap_post(&snapshot) {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    self.activity.warning(
                        Some(snapshot.source_url.as_str()),
                        format!("Post {}: category re-mapping failed: {e:#}", snapshot.post_id),
                    );
                }
            }
        }

        self.activity.info(
            None,
            format!(
                "Category re-mapping: {} of {} posts updated, {} errors",
                report.updated, report.processed, report.errors
            ),
        );
        Ok(report)
    }

    /// Remote category names seen in imported posts, with their mapping state
    pub fn discover_categories(&self) -> Result<Vec<ImportedCategory>, ImportError> {
        Ok(self.content.imported_categories()?)
    }

    /// Create a local category for every unmapped remote category and map it
    ///
    /// A local category with the same name is reused. Run
    /// [`remap_categories`](Self::remap_categories) afterwards to attach the
    /// new categories to already imported posts.
    pub fn create_missing_categories(&self) -> Result<CategoryCreation, ImportError> {
        let mut creation = CategoryCreation::default();

        for category in self.content.imported_categories()? {
            if category.is_mapped() {
                creation.already_mapped += 1;
                continue;
            }

            let created = self
                .content
                .create_category(&category.name)
                .and_then(|id| self.content.set_mapping(&category.name, id));
            match created {
                Ok(()) => creation.created.push(category.name),
                Err(e) => {
                    creation.errors += 1;
                    self.activity.warning(
                        None,
                        format!("Failed to create category '{}': {e:#}", category.name),
                    );
                }
            }
        }

        self.activity.info(
            None,
            format!(
                "Created {} missing categories ({} already mapped, {} errors)",
                creation.created.len(),
                creation.already_mapped,
                creation.errors
            ),
        );
        Ok(creation)
    }

    fn remap_post(&self, snapshot: &ImportedPost) -> anyhow::Result<bool> {
        let attached: HashSet<i64> = self
            .content
            .categories_of(snapshot.post_id)?
            .into_iter()
            .collect();

        let mut missing = Vec::new();
        for term in snapshot.original_terms.categories() {
            if let Some(category_id) = self.content.mapping_for(&term.name)? {
                if !attached.contains(&category_id)
                    && !missing.contains(&category_id)
                    && self.content.category_exists(category_id)?
                {
                    missing.push(category_id);
                }
            }
        }

        if missing.is_empty() {
            return Ok(false);
        }
        self.content.attach_categories(snapshot.post_id, &missing)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rendered;

    #[test]
    fn test_remote_post_without_terms_has_empty_term_set() {
        let post = RemotePost {
            id: Some(1),
            guid: Some(Rendered::new("g")),
            ..Default::default()
        };
        assert!(TermSet::from_terms(post.terms()).is_empty());
    }

    #[test]
    fn test_outcomes_compare() {
        assert_eq!(ImportOutcome::Imported(3), ImportOutcome::Imported(3));
        assert_ne!(
            ImportOutcome::Skipped(SkipReason::Duplicate),
            ImportOutcome::Skipped(SkipReason::Invalid("guid"))
        );
    }
}
