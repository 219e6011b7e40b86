//! # Collection Curator
//!
//! The client-side logic the whole product hangs off: given a user's raw
//! upload records and the theme lookup table, produce the filtered, sorted,
//! display-ready view, and keep the in-memory snapshot consistent with the
//! backend after every create/edit/delete round trip.
//!
//! The view pipeline (`resolve_title` / `filter` / `sort` / `curate`) is
//! pure and total; the stateful [`Curator`] owns one [`Snapshot`] and talks
//! to the ports. Every operation takes the identity explicitly — nothing in
//! here reads ambient session state.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use icu_collator::{Collator, CollatorOptions, Strength};
use icu_locid::locale;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::{SortKey, SortOrder, Theme, UploadRecord, UserIdentity, ViewQuery};
use crate::records;
use crate::traits::{BlobStore, DocumentStore};

/// Placeholder title for a themed record whose theme is missing from the
/// map (the map may lag behind the records during a load).
pub const UNKNOWN_TITLE: &str = "不明";
/// Placeholder title for a free post without a title of its own.
pub const FREE_POST_TITLE: &str = "フリー投稿";

/// An uploaded file as received from the form.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Resolves the display title of a record. Side-effect-free and total:
/// never panics, never returns an empty string.
pub fn resolve_title(record: &UploadRecord, themes_map: &HashMap<String, String>) -> String {
    match &record.theme_id {
        Some(theme_id) => themes_map
            .get(theme_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
        None => match record.free_title.as_deref() {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => FREE_POST_TITLE.to_string(),
        },
    }
}

/// Keeps records whose resolved title contains `keyword` as a substring
/// (case-sensitive). An empty keyword keeps everything, order untouched.
pub fn filter(
    records: &[UploadRecord],
    themes_map: &HashMap<String, String>,
    keyword: &str,
) -> Vec<UploadRecord> {
    records
        .iter()
        .filter(|r| resolve_title(r, themes_map).contains(keyword))
        .cloned()
        .collect()
}

/// Stable sort by timestamp or by locale-aware title. `Desc` reverses the
/// comparator, not the result, so ties still keep their input order.
pub fn sort(
    mut records: Vec<UploadRecord>,
    themes_map: &HashMap<String, String>,
    key: SortKey,
    order: SortOrder,
) -> Vec<UploadRecord> {
    match key {
        SortKey::Timestamp => {
            records.sort_by(|a, b| {
                directed(a.timestamp_seconds().cmp(&b.timestamp_seconds()), order)
            });
        }
        SortKey::Title => {
            let collator = japanese_collator();
            records.sort_by(|a, b| {
                let ta = resolve_title(a, themes_map);
                let tb = resolve_title(b, themes_map);
                directed(compare_titles(collator.as_ref(), &ta, &tb), order)
            });
        }
    }
    records
}

/// The derived view: filter, then sort. A pure function of its inputs.
pub fn curate(
    records: &[UploadRecord],
    themes_map: &HashMap<String, String>,
    query: &ViewQuery,
) -> Vec<UploadRecord> {
    sort(
        filter(records, themes_map, &query.keyword),
        themes_map,
        query.sort_key,
        query.sort_order,
    )
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Japanese-locale collator for gojūon title ordering. Construction only
/// fails when collation data is unavailable; raw code-point order is the
/// fallback then, so sorting itself stays total.
fn japanese_collator() -> Option<Collator> {
    let mut options = CollatorOptions::new();
    options.strength = Some(Strength::Tertiary);
    Collator::try_new(&locale!("ja").into(), options).ok()
}

fn compare_titles(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    match collator {
        Some(c) => c.compare(a, b),
        None => a.cmp(b),
    }
}

/// The curator's in-memory state: one coherent fetch of everything the
/// pages render. Replaced wholesale on refresh so a view is never computed
/// from a theme map newer than its records (or vice versa).
#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub themes: Vec<Theme>,
    pub themes_map: HashMap<String, String>,
    /// The user's `collections` records: themed uploads and my-page free
    /// posts. This is what the curated my-page view is computed from.
    pub records: Vec<UploadRecord>,
    /// The user's untethered `freePosts` records, rendered only on the
    /// free-post surface.
    pub free_posts: Vec<UploadRecord>,
}

impl Snapshot {
    pub fn record_for_theme(&self, theme_id: &str) -> Option<&UploadRecord> {
        self.records
            .iter()
            .find(|r| r.theme_id.as_deref() == Some(theme_id))
    }
}

/// A deletion that has been requested but not yet confirmed. Dropping it
/// unconfirmed is the cancel path; nothing has been sent to the backend.
#[derive(Debug)]
pub struct PendingDelete {
    record_id: String,
    collection: &'static str,
}

impl PendingDelete {
    pub fn record_id(&self) -> &str {
        &self.record_id
    }
}

pub struct Curator {
    docs: Arc<dyn DocumentStore>,
    store: Arc<dyn BlobStore>,
    snapshot: Snapshot,
}

impl Curator {
    pub fn new(docs: Arc<dyn DocumentStore>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            docs,
            store,
            snapshot: Snapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The display-ready my-page view for the current snapshot.
    pub fn curated_view(&self, query: &ViewQuery) -> Vec<UploadRecord> {
        curate(&self.snapshot.records, &self.snapshot.themes_map, query)
    }

    /// Re-fetches the user's records, free posts, and the theme map, and
    /// swaps them in as one atomic replacement.
    pub async fn refresh(&mut self, user: &UserIdentity) -> Result<()> {
        let uid = json!(user.uid);

        let records = self
            .docs
            .query_by_field(records::COLLECTIONS, "userId", &uid)
            .await?
            .iter()
            .map(records::record_from_doc)
            .collect::<Result<Vec<_>>>()?;

        let free_posts = self
            .docs
            .query_by_field(records::FREE_POSTS, "userId", &uid)
            .await?
            .iter()
            .map(records::free_post_from_doc)
            .collect::<Result<Vec<_>>>()?;

        let themes = self
            .docs
            .get_all(records::THEMES)
            .await?
            .iter()
            .map(records::theme_from_doc)
            .collect::<Result<Vec<_>>>()?;

        let themes_map = themes
            .iter()
            .map(|t| (t.id.clone(), t.title.clone()))
            .collect();

        self.snapshot = Snapshot {
            themes,
            themes_map,
            records,
            free_posts,
        };
        Ok(())
    }

    /// Themed create: one record per `(user, theme)`, enforced by the page
    /// offering "update" instead of "upload" once a record exists.
    pub async fn upload_for_theme(
        &mut self,
        user: &UserIdentity,
        theme_id: &str,
        file: Option<UploadFile>,
        comment: &str,
    ) -> Result<UploadRecord> {
        let file = require_file(file)?;
        self.create_record(user, Some(theme_id), None, file, comment)
            .await
    }

    /// Free post from the my-page modal; the title is required there.
    pub async fn upload_free(
        &mut self,
        user: &UserIdentity,
        file: Option<UploadFile>,
        title: &str,
        comment: &str,
    ) -> Result<UploadRecord> {
        let file = require_file(file)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("missing title".into()));
        }
        self.create_record(user, None, Some(title), file, comment)
            .await
    }

    /// Untethered upload from the free-post surface; no title field exists
    /// there, so none is demanded.
    pub async fn post_free(
        &mut self,
        user: &UserIdentity,
        file: Option<UploadFile>,
        comment: &str,
    ) -> Result<UploadRecord> {
        let file = require_file(file)?;
        let now = Utc::now();

        // Strictly blob → URL → document; the record must never reference a
        // URL that does not resolve yet.
        let key = records::blob_key(
            records::FREE_POSTS_CATEGORY,
            &user.uid,
            now.timestamp_millis(),
            &file.filename,
        );
        self.store.put(&key, file.bytes).await?;
        let url = self.store.get_download_url(&key).await?;

        let fields = records::free_post_fields(&user.uid, &url, comment, now);
        let id = self.docs.insert(records::FREE_POSTS, fields).await?;
        log::info!("free post {id} created for user {}", user.uid);

        let record = UploadRecord {
            id,
            user_id: user.uid.clone(),
            theme_id: None,
            free_title: None,
            photo_url: url,
            comment: comment.to_string(),
            timestamp: Some(now),
        };
        self.snapshot.free_posts.push(record.clone());
        Ok(record)
    }

    async fn create_record(
        &mut self,
        user: &UserIdentity,
        theme_id: Option<&str>,
        free_title: Option<&str>,
        file: UploadFile,
        comment: &str,
    ) -> Result<UploadRecord> {
        let now = Utc::now();

        // 1. Store the blob under a user-namespaced, collision-resistant key.
        let key = records::blob_key(
            records::IMAGES_CATEGORY,
            &user.uid,
            now.timestamp_millis(),
            &file.filename,
        );
        self.store.put(&key, file.bytes).await?;

        // 2. Obtain the durable retrieval URL.
        let url = self.store.get_download_url(&key).await?;

        // 3. Append the document. A failure here strands the blob; that is
        //    accepted, the snapshot stays untouched either way.
        let fields =
            records::collection_fields(&user.uid, theme_id, free_title, &url, comment, now);
        let id = self.docs.insert(records::COLLECTIONS, fields).await?;
        log::info!(
            "record {id} created for user {} (theme: {})",
            user.uid,
            theme_id.unwrap_or("free")
        );

        let record = UploadRecord {
            id,
            user_id: user.uid.clone(),
            theme_id: theme_id.map(str::to_string),
            free_title: free_title.map(str::to_string),
            photo_url: url,
            comment: comment.to_string(),
            timestamp: Some(now),
        };
        self.snapshot.records.push(record.clone());
        Ok(record)
    }

    /// Replaces an existing themed upload: new photo when a file was
    /// supplied, new comment always, timestamp bumped.
    pub async fn update_themed(
        &mut self,
        user: &UserIdentity,
        theme_id: &str,
        new_file: Option<UploadFile>,
        comment: &str,
    ) -> Result<()> {
        let record_id = self
            .snapshot
            .record_for_theme(theme_id)
            .map(|r| r.id.clone())
            .ok_or_else(|| AppError::NotFound("upload".into(), theme_id.into()))?;
        let now = Utc::now();

        let photo_url = match new_file.filter(|f| !f.is_empty()) {
            Some(file) => {
                let key = records::blob_key(
                    records::IMAGES_CATEGORY,
                    &user.uid,
                    now.timestamp_millis(),
                    &file.filename,
                );
                self.store.put(&key, file.bytes).await?;
                Some(self.store.get_download_url(&key).await?)
            }
            None => None,
        };

        let mut partial = json!({ "comment": comment, "timestamp": now.timestamp() });
        if let Some(url) = &photo_url {
            partial["photoURL"] = json!(url);
        }
        self.docs
            .update(records::COLLECTIONS, &record_id, partial)
            .await?;

        for record in &mut self.snapshot.records {
            if record.id == record_id {
                record.comment = comment.to_string();
                record.timestamp = Some(now);
                if let Some(url) = &photo_url {
                    record.photo_url = url.clone();
                }
            }
        }
        Ok(())
    }

    /// Inline edit from the my-page detail modal. The comment is always
    /// mutable; the title only when the record is a free post — for a
    /// themed record a submitted title is ignored, matching the page that
    /// never offers the field.
    pub async fn edit(
        &mut self,
        user: &UserIdentity,
        record_id: &str,
        new_comment: &str,
        new_title: Option<&str>,
    ) -> Result<()> {
        let is_free = self
            .snapshot
            .records
            .iter()
            .find(|r| r.id == record_id)
            .map(UploadRecord::is_free)
            .ok_or_else(|| AppError::NotFound("record".into(), record_id.into()))?;

        let mut partial = json!({ "comment": new_comment });
        let applied_title = match (is_free, new_title) {
            (true, Some(title)) => {
                partial["freeTitle"] = json!(title);
                Some(title.to_string())
            }
            _ => None,
        };
        self.docs
            .update(records::COLLECTIONS, record_id, partial)
            .await?;
        log::info!("record {record_id} edited by user {}", user.uid);

        for record in &mut self.snapshot.records {
            if record.id == record_id {
                record.comment = new_comment.to_string();
                if let Some(title) = &applied_title {
                    record.free_title = Some(title.clone());
                }
            }
        }
        Ok(())
    }

    /// First half of the delete protocol: nothing leaves the process until
    /// the confirmation signal arrives. An id the snapshot does not know is
    /// still accepted — the backend delete is what reports `NotFound`, so a
    /// double delete surfaces an error instead of crashing.
    pub fn request_delete(&self, record_id: &str) -> PendingDelete {
        let collection = if self.snapshot.free_posts.iter().any(|r| r.id == record_id) {
            records::FREE_POSTS
        } else {
            records::COLLECTIONS
        };
        PendingDelete {
            record_id: record_id.to_string(),
            collection,
        }
    }

    /// Second half: the backend delete, then the snapshot catch-up.
    pub async fn confirm_delete(
        &mut self,
        user: &UserIdentity,
        pending: PendingDelete,
    ) -> Result<()> {
        self.docs
            .delete(pending.collection, &pending.record_id)
            .await?;
        log::info!(
            "record {} deleted by user {}",
            pending.record_id,
            user.uid
        );

        self.snapshot.records.retain(|r| r.id != pending.record_id);
        self.snapshot
            .free_posts
            .retain(|r| r.id != pending.record_id);
        Ok(())
    }
}

fn require_file(file: Option<UploadFile>) -> Result<UploadFile> {
    match file {
        Some(f) if !f.is_empty() => Ok(f),
        _ => Err(AppError::Validation("missing file".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Document;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    // ── In-memory ports ─────────────────────────────────────────────────

    #[derive(Default)]
    struct MemDocs {
        data: Mutex<HashMap<String, Vec<(String, Value)>>>,
        next_id: AtomicU64,
        fail_inserts: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for MemDocs {
        async fn query_by_field(
            &self,
            collection: &str,
            field: &str,
            value: &Value,
        ) -> Result<Vec<Document>> {
            let data = self.data.lock().unwrap();
            Ok(data
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|(_, fields)| fields.get(field) == Some(value))
                        .map(|(id, fields)| Document {
                            id: id.clone(),
                            fields: fields.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_all(&self, collection: &str) -> Result<Vec<Document>> {
            let data = self.data.lock().unwrap();
            Ok(data
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| Document {
                            id: id.clone(),
                            fields: fields.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
            let data = self.data.lock().unwrap();
            Ok(data.get(collection).and_then(|docs| {
                docs.iter()
                    .find(|(doc_id, _)| doc_id == id)
                    .map(|(doc_id, fields)| Document {
                        id: doc_id.clone(),
                        fields: fields.clone(),
                    })
            }))
        }

        async fn insert(&self, collection: &str, fields: Value) -> Result<String> {
            if self.fail_inserts.load(AtomicOrdering::SeqCst) {
                return Err(AppError::Persistence("insert refused".into()));
            }
            let id = format!("doc{}", self.next_id.fetch_add(1, AtomicOrdering::SeqCst));
            let mut data = self.data.lock().unwrap();
            data.entry(collection.to_string())
                .or_default()
                .push((id.clone(), fields));
            Ok(id)
        }

        async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<()> {
            let mut data = self.data.lock().unwrap();
            let docs = data.entry(collection.to_string()).or_default();
            let entry = docs
                .iter_mut()
                .find(|(doc_id, _)| doc_id == id)
                .ok_or_else(|| AppError::NotFound("document".into(), id.into()))?;
            if let (Some(target), Some(source)) =
                (entry.1.as_object_mut(), partial.as_object())
            {
                for (k, v) in source {
                    target.insert(k.clone(), v.clone());
                }
            }
            Ok(())
        }

        async fn delete(&self, collection: &str, id: &str) -> Result<()> {
            let mut data = self.data.lock().unwrap();
            let docs = data.entry(collection.to_string()).or_default();
            let before = docs.len();
            docs.retain(|(doc_id, _)| doc_id != id);
            if docs.len() == before {
                return Err(AppError::NotFound("document".into(), id.into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemBlobs {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl BlobStore for MemBlobs {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.blobs.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn get_download_url(&self, key: &str) -> Result<String> {
            let blobs = self.blobs.lock().unwrap();
            if !blobs.contains_key(key) {
                return Err(AppError::Storage(format!("no blob at {key}")));
            }
            Ok(format!("mem://{key}"))
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────────

    fn user() -> UserIdentity {
        UserIdentity {
            uid: "u1".into(),
            email: "u1@example.com".into(),
        }
    }

    fn rec(id: &str, theme_id: Option<&str>, free_title: Option<&str>, secs: i64) -> UploadRecord {
        UploadRecord {
            id: id.into(),
            user_id: "u1".into(),
            theme_id: theme_id.map(str::to_string),
            free_title: free_title.map(str::to_string),
            photo_url: format!("/p/{id}.jpg"),
            comment: String::new(),
            timestamp: (secs != 0).then(|| Utc.timestamp_opt(secs, 0).single().unwrap()),
        }
    }

    fn themes_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(id, title)| (id.to_string(), title.to_string()))
            .collect()
    }

    fn file(name: &str) -> Option<UploadFile> {
        Some(UploadFile {
            filename: name.into(),
            bytes: vec![1, 2, 3],
        })
    }

    async fn curator_with_themes(pairs: &[(&str, &str)]) -> (Curator, Arc<MemDocs>) {
        let docs = Arc::new(MemDocs::default());
        for (_, title) in pairs {
            docs.insert(records::THEMES, json!({ "title": title }))
                .await
                .unwrap();
        }
        let curator = Curator::new(docs.clone(), Arc::new(MemBlobs::default()));
        (curator, docs)
    }

    // ── Pure pipeline ───────────────────────────────────────────────────

    #[test]
    fn resolve_title_is_total_and_never_empty() {
        let map = themes_map(&[("t1", "風景")]);
        let cases = [
            (rec("a", Some("t1"), None, 0), "風景"),
            (rec("b", Some("missing"), None, 0), UNKNOWN_TITLE),
            (rec("c", None, Some("旅行"), 0), "旅行"),
            (rec("d", None, None, 0), FREE_POST_TITLE),
            (rec("e", None, Some(""), 0), FREE_POST_TITLE),
        ];
        for (record, expected) in cases {
            let title = resolve_title(&record, &map);
            assert_eq!(title, expected);
            assert!(!title.is_empty());
        }
    }

    #[test]
    fn empty_keyword_keeps_everything_in_order() {
        let map = themes_map(&[]);
        let input = vec![rec("a", None, Some("旅行"), 3), rec("b", None, None, 1)];
        let out = filter(&input, &map, "");
        assert_eq!(
            out.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );
    }

    #[test]
    fn keyword_matches_resolved_titles_only() {
        let map = themes_map(&[("t1", "風景"), ("t2", "人物")]);
        let input = vec![
            rec("a", Some("t1"), None, 0),
            rec("b", Some("t2"), None, 0),
            rec("c", None, None, 0), // resolves to フリー投稿
        ];
        let out = filter(&input, &map, "人物");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "b");
    }

    #[test]
    fn timestamp_sort_treats_missing_as_zero() {
        let map = themes_map(&[]);
        let input = vec![
            rec("late", None, None, 200),
            rec("none", None, None, 0),
            rec("early", None, None, 100),
        ];
        let asc = sort(input, &map, SortKey::Timestamp, SortOrder::Asc);
        assert_eq!(
            asc.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["none", "early", "late"]
        );
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let map = themes_map(&[]);
        let input = vec![
            rec("first", None, Some("同じ"), 50),
            rec("second", None, Some("同じ"), 50),
            rec("third", None, Some("同じ"), 50),
        ];
        for key in [SortKey::Timestamp, SortKey::Title] {
            for order in [SortOrder::Asc, SortOrder::Desc] {
                let out = sort(input.clone(), &map, key, order);
                assert_eq!(
                    out.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
                    ["first", "second", "third"],
                    "ties must keep input order for {key:?}/{order:?}"
                );
            }
        }
    }

    #[test]
    fn title_sort_uses_gojuon_order() {
        let map = themes_map(&[]);
        let input = vec![
            rec("b", None, Some("かわ"), 0),
            rec("c", None, Some("さくら"), 0),
            rec("a", None, Some("あさ"), 0),
        ];
        let asc = sort(input.clone(), &map, SortKey::Title, SortOrder::Asc);
        assert_eq!(
            asc.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );

        let mut reversed = asc;
        reversed.reverse();
        let desc = sort(input, &map, SortKey::Title, SortOrder::Desc);
        assert_eq!(
            desc.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            reversed.iter().map(|r| r.id.as_str()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn curate_filters_then_sorts() {
        let map = themes_map(&[("t1", "風景"), ("t2", "人物")]);
        let input = vec![
            rec("old", Some("t1"), None, 100),
            rec("new", Some("t1"), None, 300),
            rec("other", Some("t2"), None, 200),
        ];
        let query = ViewQuery {
            sort_key: SortKey::Timestamp,
            sort_order: SortOrder::Desc,
            keyword: "風景".into(),
        };
        let out = curate(&input, &map, &query);
        assert_eq!(
            out.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            ["new", "old"]
        );
    }

    // ── Curator operations ──────────────────────────────────────────────

    #[tokio::test]
    async fn themed_upload_then_refresh_round_trips() {
        let (mut curator, _) = curator_with_themes(&[("x", "風景"), ("y", "人物")]).await;
        let user = user();
        curator.refresh(&user).await.unwrap();
        let theme_id = curator.snapshot().themes[0].id.clone();

        let created = curator
            .upload_for_theme(&user, &theme_id, file("cat.jpg"), "初投稿")
            .await
            .unwrap();
        assert!(created.photo_url.contains("cat.jpg"));

        curator.refresh(&user).await.unwrap();
        let snapshot = curator.snapshot();
        assert_eq!(snapshot.records.len(), 1);
        let record = &snapshot.records[0];
        assert_eq!(record.theme_id.as_deref(), Some(theme_id.as_str()));
        assert_eq!(record.comment, "初投稿");
        assert_eq!(record.photo_url, created.photo_url);
        assert_eq!(resolve_title(record, &snapshot.themes_map), "風景");
        assert!(snapshot.record_for_theme(&theme_id).is_some());
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let (mut curator, _) = curator_with_themes(&[]).await;
        let err = curator
            .upload_for_theme(&user(), "t1", None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "missing file"));

        let empty = Some(UploadFile {
            filename: "x.jpg".into(),
            bytes: vec![],
        });
        let err = curator
            .upload_free(&user(), empty, "題目", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "missing file"));
    }

    #[tokio::test]
    async fn free_upload_requires_a_title_but_free_post_does_not() {
        let (mut curator, _) = curator_with_themes(&[]).await;
        let user = user();

        let err = curator
            .upload_free(&user, file("a.jpg"), "   ", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "missing title"));

        // The standalone free-post surface has no title field at all.
        let posted = curator.post_free(&user, file("b.jpg"), "散歩").await.unwrap();
        assert!(posted.is_free());
        assert_eq!(posted.free_title, None);
        assert_eq!(curator.snapshot().free_posts.len(), 1);
        assert!(curator.snapshot().records.is_empty());
    }

    #[tokio::test]
    async fn editing_a_free_title_leaves_comment_and_photo_alone() {
        let (mut curator, _) = curator_with_themes(&[]).await;
        let user = user();
        let created = curator
            .upload_free(&user, file("trip.jpg"), "旅行", "たのしい")
            .await
            .unwrap();

        curator
            .edit(&user, &created.id, "たのしい", Some("旅行記"))
            .await
            .unwrap();

        curator.refresh(&user).await.unwrap();
        let record = &curator.snapshot().records[0];
        assert_eq!(record.free_title.as_deref(), Some("旅行記"));
        assert_eq!(record.comment, "たのしい");
        assert_eq!(record.photo_url, created.photo_url);
    }

    #[tokio::test]
    async fn themed_titles_are_not_editable() {
        let (mut curator, _) = curator_with_themes(&[("x", "風景")]).await;
        let user = user();
        curator.refresh(&user).await.unwrap();
        let theme_id = curator.snapshot().themes[0].id.clone();
        let created = curator
            .upload_for_theme(&user, &theme_id, file("a.jpg"), "")
            .await
            .unwrap();

        curator
            .edit(&user, &created.id, "新コメント", Some("勝手な題目"))
            .await
            .unwrap();

        curator.refresh(&user).await.unwrap();
        let record = &curator.snapshot().records[0];
        assert_eq!(record.free_title, None);
        assert_eq!(record.comment, "新コメント");
    }

    #[tokio::test]
    async fn editing_an_unknown_record_is_not_found() {
        let (mut curator, _) = curator_with_themes(&[]).await;
        let err = curator
            .edit(&user(), "ghost", "c", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }

    #[tokio::test]
    async fn update_themed_swaps_photo_only_with_a_new_file() {
        let (mut curator, _) = curator_with_themes(&[("x", "風景")]).await;
        let user = user();
        curator.refresh(&user).await.unwrap();
        let theme_id = curator.snapshot().themes[0].id.clone();
        let created = curator
            .upload_for_theme(&user, &theme_id, file("old.jpg"), "前")
            .await
            .unwrap();

        curator
            .update_themed(&user, &theme_id, None, "後")
            .await
            .unwrap();
        let record = curator.snapshot().record_for_theme(&theme_id).unwrap();
        assert_eq!(record.photo_url, created.photo_url);
        assert_eq!(record.comment, "後");

        curator
            .update_themed(&user, &theme_id, file("new.jpg"), "後")
            .await
            .unwrap();
        let record = curator.snapshot().record_for_theme(&theme_id).unwrap();
        assert_ne!(record.photo_url, created.photo_url);
        assert!(record.photo_url.contains("new.jpg"));
    }

    #[tokio::test]
    async fn confirmed_delete_removes_everywhere_and_double_delete_errors() {
        let (mut curator, _) = curator_with_themes(&[]).await;
        let user = user();
        let created = curator
            .upload_free(&user, file("a.jpg"), "削除予定", "")
            .await
            .unwrap();

        // Unconfirmed request touches nothing.
        let _dropped = curator.request_delete(&created.id);
        assert_eq!(curator.snapshot().records.len(), 1);

        let pending = curator.request_delete(&created.id);
        curator.confirm_delete(&user, pending).await.unwrap();
        assert!(curator.snapshot().records.is_empty());

        curator.refresh(&user).await.unwrap();
        assert!(curator.snapshot().records.is_empty());

        let pending = curator.request_delete(&created.id);
        let err = curator.confirm_delete(&user, pending).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }

    #[tokio::test]
    async fn deleting_a_free_post_targets_the_free_post_collection() {
        let (mut curator, docs) = curator_with_themes(&[]).await;
        let user = user();
        let posted = curator.post_free(&user, file("a.jpg"), "").await.unwrap();

        let pending = curator.request_delete(&posted.id);
        curator.confirm_delete(&user, pending).await.unwrap();
        assert!(curator.snapshot().free_posts.is_empty());
        assert!(docs
            .get_by_id(records::FREE_POSTS, &posted.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_insert_leaves_the_snapshot_untouched() {
        let (mut curator, docs) = curator_with_themes(&[]).await;
        let user = user();
        docs.fail_inserts.store(true, AtomicOrdering::SeqCst);

        let err = curator
            .upload_free(&user, file("a.jpg"), "題目", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
        // No partial record is exposed; the stranded blob is accepted.
        assert!(curator.snapshot().records.is_empty());
    }
}
