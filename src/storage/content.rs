//! Local content store
//!
//! Holds imported records, their category/tag associations, the immutable
//! original snapshots and the remote-category mapping table.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{parse_timestamp, Database};
use crate::models::{
    Category, CategoryMapping, ContentRecord, ContentUpdate, ImportedCategory, ImportedPost,
    NewContent, TermSet,
};

/// Content store operations used by the importer and the operator commands
pub trait ContentStore: Send + Sync {
    // ---- records ----

    /// Create a record; fails when (remote_guid, post_type) already exists
    fn create(&self, record: &NewContent) -> Result<i64>;

    /// Update the given fields of a record
    fn update(&self, id: i64, update: &ContentUpdate) -> Result<()>;

    /// Get a record by id
    fn get(&self, id: i64) -> Result<Option<ContentRecord>>;

    /// Check whether a remote post was already imported for a content type
    fn exists_by_remote_guid(&self, remote_guid: &str, post_type: &str) -> Result<bool>;

    /// Subset of `remote_guids` already imported for a content type
    fn existing_remote_guids(
        &self,
        remote_guids: &[String],
        post_type: &str,
    ) -> Result<HashSet<String>>;

    fn set_thumbnail(&self, id: i64, asset_id: i64) -> Result<()>;

    // ---- taxonomy associations ----

    fn attach_categories(&self, id: i64, category_ids: &[i64]) -> Result<()>;

    fn categories_of(&self, id: i64) -> Result<Vec<i64>>;

    /// Attach tags by name, creating missing tags
    fn attach_tags(&self, id: i64, names: &[String]) -> Result<()>;

    fn tags_of(&self, id: i64) -> Result<Vec<String>>;

    // ---- snapshots ----

    /// Store the audit snapshot; a second snapshot for the same record is rejected
    fn save_snapshot(&self, snapshot: &ImportedPost) -> Result<()>;

    /// Store the verbatim original term set of an imported record
    fn save_original_terms(&self, post_id: i64, terms: &TermSet) -> Result<()>;

    fn snapshot(&self, post_id: i64) -> Result<Option<ImportedPost>>;

    /// Every snapshot, oldest first
    fn imported_posts(&self) -> Result<Vec<ImportedPost>>;

    // ---- categories and mappings ----

    /// Create a category, or return the id of the existing one with that name
    fn create_category(&self, name: &str) -> Result<i64>;

    fn list_categories(&self) -> Result<Vec<Category>>;

    fn category_exists(&self, id: i64) -> Result<bool>;

    /// Local category id mapped to a remote category name
    fn mapping_for(&self, remote_name: &str) -> Result<Option<i64>>;

    fn set_mapping(&self, remote_name: &str, category_id: i64) -> Result<()>;

    fn remove_mapping(&self, remote_name: &str) -> Result<bool>;

    fn list_mappings(&self) -> Result<Vec<CategoryMapping>>;

    /// Remote category names found in the stored original terms of
    /// imported `post` records, with post counts and mapping state
    fn imported_categories(&self) -> Result<Vec<ImportedCategory>>;
}

/// SQLite implementation of ContentStore
#[derive(Clone)]
pub struct SqliteContentStore {
    db: Database,
}

impl SqliteContentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ContentRecord> {
        Ok(ContentRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            excerpt: row.get(3)?,
            status: row.get(4)?,
            author_id: row.get(5)?,
            post_type: row.get(6)?,
            published_at: row.get(7)?,
            published_at_gmt: row.get(8)?,
            remote_guid: row.get(9)?,
            source_url: row.get(10)?,
            thumbnail_id: row.get(11)?,
            created_at: parse_timestamp(&row.get::<_, String>(12)?),
            updated_at: parse_timestamp(&row.get::<_, String>(13)?),
        })
    }

    fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<ImportedPost> {
        let terms: String = row.get(8)?;
        Ok(ImportedPost {
            post_id: row.get(0)?,
            remote_guid: row.get(1)?,
            source_url: row.get(2)?,
            post_type: row.get(3)?,
            original_url: row.get(4)?,
            original_title: row.get(5)?,
            original_content: row.get(6)?,
            original_excerpt: row.get(7)?,
            original_terms: serde_json::from_str(&terms).unwrap_or_default(),
            imported_at: parse_timestamp(&row.get::<_, String>(9)?),
        })
    }

    fn tag_id(conn: &Connection, name: &str) -> Result<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
            params![name],
        )
        .context("Failed to create tag")?;

        let id = conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                row.get(0)
            })
            .context("Failed to look up tag")?;

        Ok(id)
    }
}

const SNAPSHOT_COLUMNS: &str = "post_id, remote_guid, source_url, post_type, original_url, \
     original_title, original_content, original_excerpt, original_terms, imported_at";

impl ContentStore for SqliteContentStore {
    fn create(&self, record: &NewContent) -> Result<i64> {
        let conn = self.db.conn()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO posts (title, content, excerpt, status, author_id, post_type,
                               published_at, published_at_gmt, remote_guid, source_url,
                               created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
            params![
                record.title,
                record.content,
                record.excerpt,
                record.status,
                record.author_id,
                record.post_type,
                record.published_at,
                record.published_at_gmt,
                record.remote_guid,
                record.source_url,
                now,
            ],
        )
        .context("Failed to insert post")?;

        Ok(conn.last_insert_rowid())
    }

    fn update(&self, id: i64, update: &ContentUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let conn = self.db.conn()?;
        let affected = conn
            .execute(
                r#"
                UPDATE posts SET
                    title = COALESCE(?2, title),
                    content = COALESCE(?3, content),
                    excerpt = COALESCE(?4, excerpt),
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    update.title,
                    update.content,
                    update.excerpt,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to update post")?;

        if affected == 0 {
            anyhow::bail!("Post {id} not found");
        }
        Ok(())
    }

    fn get(&self, id: i64) -> Result<Option<ContentRecord>> {
        let conn = self.db.conn()?;
        let record = conn
            .query_row(
                r#"
                SELECT id, title, content, excerpt, status, author_id, post_type,
                       published_at, published_at_gmt, remote_guid, source_url,
                       thumbnail_id, created_at, updated_at
                FROM posts WHERE id = ?1
                "#,
                params![id],
                Self::row_to_record,
            )
            .optional()
            .context("Failed to get post")?;

        Ok(record)
    }

    fn exists_by_remote_guid(&self, remote_guid: &str, post_type: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE remote_guid = ?1 AND post_type = ?2)",
                params![remote_guid, post_type],
                |row| row.get(0),
            )
            .context("Failed to check remote guid")?;

        Ok(exists)
    }

    fn existing_remote_guids(
        &self,
        remote_guids: &[String],
        post_type: &str,
    ) -> Result<HashSet<String>> {
        if remote_guids.is_empty() {
            return Ok(HashSet::new());
        }

        let conn = self.db.conn()?;
        const CHUNK_SIZE: usize = 500;
        let mut existing = HashSet::new();

        for chunk in remote_guids.chunks(CHUNK_SIZE) {
            let placeholders: String = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT remote_guid FROM posts WHERE post_type = ? AND remote_guid IN ({placeholders})"
            );

            let mut stmt = conn
                .prepare(&query)
                .context("Failed to prepare batch guid query")?;

            let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(chunk.len() + 1);
            params.push(&post_type);
            params.extend(chunk.iter().map(|s| s as &dyn rusqlite::ToSql));

            let found = stmt
                .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            existing.extend(found);
        }

        Ok(existing)
    }

    fn set_thumbnail(&self, id: i64, asset_id: i64) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE posts SET thumbnail_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, asset_id, Utc::now().to_rfc3339()],
        )
        .context("Failed to set thumbnail")?;

        Ok(())
    }

    fn attach_categories(&self, id: i64, category_ids: &[i64]) -> Result<()> {
        let conn = self.db.conn()?;
        for category_id in category_ids {
            conn.execute(
                "INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?1, ?2)",
                params![id, category_id],
            )
            .context("Failed to attach category")?;
        }

        Ok(())
    }

    fn categories_of(&self, id: i64) -> Result<Vec<i64>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT category_id FROM post_categories WHERE post_id = ?1 ORDER BY category_id",
        )?;

        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("Failed to list post categories")?;

        Ok(ids)
    }

    fn attach_tags(&self, id: i64, names: &[String]) -> Result<()> {
        let conn = self.db.conn()?;
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let tag_id = Self::tag_id(&conn, name)?;
            conn.execute(
                "INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )
            .context("Failed to attach tag")?;
        }

        Ok(())
    }

    fn tags_of(&self, id: i64) -> Result<Vec<String>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.name FROM post_tags pt
            JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = ?1
            ORDER BY t.name
            "#,
        )?;

        let names = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to list post tags")?;

        Ok(names)
    }

    fn save_snapshot(&self, snapshot: &ImportedPost) -> Result<()> {
        let conn = self.db.conn()?;
        let terms = serde_json::to_string(&snapshot.original_terms)?;

        conn.execute(
            &format!(
                "INSERT INTO imported_posts ({SNAPSHOT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                snapshot.post_id,
                snapshot.remote_guid,
                snapshot.source_url,
                snapshot.post_type,
                snapshot.original_url,
                snapshot.original_title,
                snapshot.original_content,
                snapshot.original_excerpt,
                terms,
                snapshot.imported_at.to_rfc3339(),
            ],
        )
        .context("Failed to store original snapshot")?;

        Ok(())
    }

    fn save_original_terms(&self, post_id: i64, terms: &TermSet) -> Result<()> {
        let conn = self.db.conn()?;
        let json = serde_json::to_string(terms)?;

        let affected = conn
            .execute(
                "UPDATE imported_posts SET original_terms = ?2 WHERE post_id = ?1",
                params![post_id, json],
            )
            .context("Failed to store original terms")?;

        if affected == 0 {
            anyhow::bail!("No snapshot for post {post_id}");
        }
        Ok(())
    }

    fn snapshot(&self, post_id: i64) -> Result<Option<ImportedPost>> {
        let conn = self.db.conn()?;
        let snapshot = conn
            .query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM imported_posts WHERE post_id = ?1"),
                params![post_id],
                Self::row_to_snapshot,
            )
            .optional()
            .context("Failed to load snapshot")?;

        Ok(snapshot)
    }

    fn imported_posts(&self) -> Result<Vec<ImportedPost>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM imported_posts ORDER BY post_id"
        ))?;

        let snapshots = stmt
            .query_map([], Self::row_to_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list imported posts")?;

        Ok(snapshots)
    }

    fn create_category(&self, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Category name must not be empty");
        }

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
            params![name],
        )
        .context("Failed to create category")?;

        let id = conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .context("Failed to look up category")?;

        Ok(id)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;

        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list categories")?;

        Ok(categories)
    }

    fn category_exists(&self, id: i64) -> Result<bool> {
        let conn = self.db.conn()?;
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check category")?;

        Ok(exists)
    }

    fn mapping_for(&self, remote_name: &str) -> Result<Option<i64>> {
        let conn = self.db.conn()?;
        let id = conn
            .query_row(
                "SELECT category_id FROM category_mappings WHERE remote_name = ?1",
                params![remote_name],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up category mapping")?;

        Ok(id)
    }

    fn set_mapping(&self, remote_name: &str, category_id: i64) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            r#"
            INSERT INTO category_mappings (remote_name, category_id)
            VALUES (?1, ?2)
            ON CONFLICT(remote_name) DO UPDATE SET category_id = excluded.category_id
            "#,
            params![remote_name, category_id],
        )
        .context("Failed to save category mapping")?;

        Ok(())
    }

    fn remove_mapping(&self, remote_name: &str) -> Result<bool> {
        let conn = self.db.conn()?;
        let affected = conn
            .execute(
                "DELETE FROM category_mappings WHERE remote_name = ?1",
                params![remote_name],
            )
            .context("Failed to remove category mapping")?;

        Ok(affected > 0)
    }

    fn list_mappings(&self) -> Result<Vec<CategoryMapping>> {
        let conn = self.db.conn()?;
        let mut stmt = conn
            .prepare("SELECT remote_name, category_id FROM category_mappings ORDER BY remote_name")?;

        let mappings = stmt
            .query_map([], |row| {
                Ok(CategoryMapping {
                    remote_name: row.get(0)?,
                    category_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list category mappings")?;

        Ok(mappings)
    }

    fn imported_categories(&self) -> Result<Vec<ImportedCategory>> {
        let conn = self.db.conn()?;

        let mappings: HashMap<String, i64> = conn
            .prepare("SELECT remote_name, category_id FROM category_mappings")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()
            .context("Failed to load category mappings")?;

        let term_sets = conn
            .prepare(
                r#"
                SELECT i.original_terms
                FROM imported_posts i
                JOIN posts p ON p.id = i.post_id
                WHERE i.post_type = 'post' AND p.status = 'publish'
                "#,
            )?
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load original terms")?;

        let mut found: BTreeMap<String, ImportedCategory> = BTreeMap::new();
        for json in term_sets {
            let terms: TermSet = serde_json::from_str(&json).unwrap_or_default();
            let mut seen = HashSet::new();
            for term in terms.categories() {
                let name = term.name.trim();
                if name.is_empty() || !seen.insert(name.to_string()) {
                    continue;
                }
                found
                    .entry(name.to_string())
                    .or_insert_with(|| ImportedCategory {
                        name: name.to_string(),
                        slug: term.slug.clone(),
                        posts: 0,
                        mapped_to: mappings.get(name).copied(),
                    })
                    .posts += 1;
            }
        }

        Ok(found.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteTerm;

    fn store() -> SqliteContentStore {
        SqliteContentStore::new(Database::in_memory().unwrap())
    }

    fn new_content(guid: &str) -> NewContent {
        NewContent {
            title: "Title".into(),
            content: "<p>Body</p>".into(),
            excerpt: "Excerpt".into(),
            status: "publish".into(),
            author_id: 1,
            post_type: "post".into(),
            published_at: Some("2024-01-05T10:00:00".into()),
            published_at_gmt: Some("2024-01-05T08:00:00".into()),
            remote_guid: guid.into(),
            source_url: "https://donor.example/wp-json/wp/v2/posts".into(),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let id = store.create(&new_content("g1")).unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.title, "Title");
        assert_eq!(record.status, "publish");
        assert_eq!(record.published_at_gmt.as_deref(), Some("2024-01-05T08:00:00"));
        assert!(store.exists_by_remote_guid("g1", "post").unwrap());
        assert!(!store.exists_by_remote_guid("g1", "page").unwrap());
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let store = store();
        store.create(&new_content("g1")).unwrap();
        assert!(store.create(&new_content("g1")).is_err());
    }

    #[test]
    fn test_partial_update() {
        let store = store();
        let id = store.create(&new_content("g1")).unwrap();
        store
            .update(
                id,
                &ContentUpdate {
                    content: Some("<p>New</p>".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.title, "Title");
        assert_eq!(record.content, "<p>New</p>");
        assert!(store
            .update(999, &ContentUpdate { title: Some("x".into()), ..Default::default() })
            .is_err());
    }

    #[test]
    fn test_existing_remote_guids() {
        let store = store();
        store.create(&new_content("a")).unwrap();
        store.create(&new_content("c")).unwrap();

        let guids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let existing = store.existing_remote_guids(&guids, "post").unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.contains("a") && existing.contains("c"));
    }

    #[test]
    fn test_tags_created_on_demand() {
        let store = store();
        let id = store.create(&new_content("g1")).unwrap();
        store
            .attach_tags(id, &["rust".into(), "news".into(), "rust".into(), " ".into()])
            .unwrap();
        assert_eq!(store.tags_of(id).unwrap(), vec!["news", "rust"]);
    }

    #[test]
    fn test_categories_and_mappings() {
        let store = store();
        let world = store.create_category("World").unwrap();
        assert_eq!(store.create_category("World").unwrap(), world);
        assert!(store.category_exists(world).unwrap());

        store.set_mapping("Internacional", world).unwrap();
        assert_eq!(store.mapping_for("Internacional").unwrap(), Some(world));
        assert_eq!(store.mapping_for("Sports").unwrap(), None);

        let id = store.create(&new_content("g1")).unwrap();
        store.attach_categories(id, &[world, world]).unwrap();
        assert_eq!(store.categories_of(id).unwrap(), vec![world]);

        assert!(store.remove_mapping("Internacional").unwrap());
        assert!(store.list_mappings().unwrap().is_empty());
    }

    #[test]
    fn test_imported_categories() {
        let store = store();
        let world = store.create_category("World").unwrap();
        store.set_mapping("Internacional", world).unwrap();

        let category = |id: i64, name: &str| RemoteTerm {
            id,
            name: name.into(),
            slug: name.to_lowercase(),
            taxonomy: "category".into(),
            description: String::new(),
        };
        let term_sets = [
            vec![category(1, "Internacional"), category(2, "Sports")],
            vec![category(2, "Sports"), category(2, "Sports")],
            vec![],
        ];

        for (i, terms) in term_sets.iter().enumerate() {
            let guid = format!("g{i}");
            let id = store.create(&new_content(&guid)).unwrap();
            store
                .save_snapshot(&ImportedPost {
                    post_id: id,
                    remote_guid: guid,
                    source_url: "https://donor.example/wp-json/wp/v2/posts".into(),
                    post_type: "post".into(),
                    original_url: None,
                    original_title: "t".into(),
                    original_content: "c".into(),
                    original_excerpt: String::new(),
                    original_terms: TermSet::default(),
                    imported_at: Utc::now(),
                })
                .unwrap();
            store
                .save_original_terms(id, &TermSet::from_terms(terms))
                .unwrap();
        }

        let found = store.imported_categories().unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "Internacional");
        assert_eq!(found[0].posts, 1);
        assert_eq!(found[0].mapped_to, Some(world));
        assert_eq!(found[1].name, "Sports");
        assert_eq!(found[1].slug, "sports");
        assert_eq!(found[1].posts, 2);
        assert!(!found[1].is_mapped());
    }

    #[test]
    fn test_snapshot_written_once() {
        let store = store();
        let id = store.create(&new_content("g1")).unwrap();
        let snapshot = ImportedPost {
            post_id: id,
            remote_guid: "g1".into(),
            source_url: "https://donor.example/wp-json/wp/v2/posts".into(),
            post_type: "post".into(),
            original_url: Some("https://donor.example/story".into()),
            original_title: "Original &amp; title".into(),
            original_content: "<p>Original</p>".into(),
            original_excerpt: String::new(),
            original_terms: TermSet::default(),
            imported_at: Utc::now(),
        };
        store.save_snapshot(&snapshot).unwrap();
        assert!(store.save_snapshot(&snapshot).is_err());

        let terms = TermSet::from_terms(&[RemoteTerm {
            id: 3,
            name: "News".into(),
            slug: "news".into(),
            taxonomy: "category".into(),
            description: String::new(),
        }]);
        store.save_original_terms(id, &terms).unwrap();

        let loaded = store.snapshot(id).unwrap().unwrap();
        assert_eq!(loaded.original_title, "Original &amp; title");
        assert_eq!(loaded.original_terms, terms);
        assert_eq!(store.imported_posts().unwrap().len(), 1);
    }
}
