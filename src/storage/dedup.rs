//! Remote post deduplication
//!
//! A remote post is identified by its `guid.rendered`, scoped to the local
//! content type. The check runs before any paraphrasing or media download
//! so already-imported posts cost one query and nothing else.
//!
//! The check and the later insert are not atomic. The scheduler's run lock
//! keeps a single writer, and the unique index on `posts(remote_guid,
//! post_type)` turns a violation into a rejected create.

use std::sync::Arc;

use anyhow::Result;

use super::ContentStore;
use crate::models::RemotePost;

/// Result of splitting a fetched page
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Posts not yet imported, in API order
    pub new_posts: Vec<RemotePost>,

    /// Number of posts already present locally
    pub duplicates: usize,

    /// Posts lacking an id or guid
    pub invalid: Vec<RemotePost>,
}

/// Deduplicator over the content store
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ContentStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Check whether a remote post was already imported for `post_type`
    pub fn is_imported(&self, remote_guid: &str, post_type: &str) -> Result<bool> {
        self.store.exists_by_remote_guid(remote_guid, post_type)
    }

    /// Partition a page into new, already-imported and invalid posts
    ///
    /// Duplicate guids inside the same page are collapsed onto the first
    /// occurrence.
    pub fn filter_new(&self, posts: Vec<RemotePost>, post_type: &str) -> Result<DedupOutcome> {
        let guids: Vec<String> = posts
            .iter()
            .filter_map(|p| p.remote_guid().map(str::to_string))
            .collect();
        let mut seen = self.store.existing_remote_guids(&guids, post_type)?;

        let mut outcome = DedupOutcome::default();
        for post in posts {
            let guid = match (post.id, post.remote_guid()) {
                (Some(_), Some(guid)) => guid.to_string(),
                _ => {
                    outcome.invalid.push(post);
                    continue;
                }
            };

            if seen.insert(guid) {
                outcome.new_posts.push(post);
            } else {
                outcome.duplicates += 1;
            }
        }

        Ok(outcome)
    }
}
