//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Album.
//! Document ids are UUID v7 strings for time-ordered, globally unique
//! identification; they stay `String` here because the document store
//! is schemaless and owns id generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fixed topic a user may post one photo against (e.g., 風景, 人物).
/// Immutable from the application's perspective; seeded out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub title: String,
}

/// One uploaded photo, themed or free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    pub user_id: String,
    /// `None` marks a free post; the display title then comes from
    /// `free_title` (or a placeholder when that is empty too).
    pub theme_id: Option<String>,
    pub free_title: Option<String>,
    pub photo_url: String,
    pub comment: String,
    /// Absent timestamps sort as epoch 0.
    pub timestamp: Option<DateTime<Utc>>,
}

impl UploadRecord {
    pub fn is_free(&self) -> bool {
        self.theme_id.is_none()
    }

    pub fn timestamp_seconds(&self) -> i64 {
        self.timestamp.map(|t| t.timestamp()).unwrap_or(0)
    }
}

/// The authenticated principal. `uid` is the stable opaque id every
/// record is keyed by; operations take this explicitly instead of
/// reading ambient session state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Timestamp,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Ephemeral view parameters for the curated collection. Never persisted;
/// the derived view is a pure function of (records, themes, query).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub keyword: String,
}

impl Default for ViewQuery {
    /// Newest-first, no filter — the view a user lands on.
    fn default() -> Self {
        Self {
            sort_key: SortKey::Timestamp,
            sort_order: SortOrder::Desc,
            keyword: String::new(),
        }
    }
}

impl ViewQuery {
    /// Parses the `sort` request parameter (`"timestamp_desc"`,
    /// `"title_asc"`, ...). Unknown values fall back to the default so a
    /// hand-edited URL never breaks the page.
    pub fn from_params(sort: Option<&str>, keyword: Option<&str>) -> Self {
        let mut query = Self::default();
        if let Some((key, order)) = sort.and_then(|s| s.rsplit_once('_')) {
            match key {
                "timestamp" => query.sort_key = SortKey::Timestamp,
                "title" => query.sort_key = SortKey::Title,
                _ => {}
            }
            match order {
                "asc" => query.sort_order = SortOrder::Asc,
                "desc" => query.sort_order = SortOrder::Desc,
                _ => {}
            }
        }
        if let Some(k) = keyword {
            query.keyword = k.to_string();
        }
        query
    }

    /// The value round-tripped through the sort `<select>`.
    pub fn sort_param(&self) -> &'static str {
        match (self.sort_key, self.sort_order) {
            (SortKey::Timestamp, SortOrder::Desc) => "timestamp_desc",
            (SortKey::Timestamp, SortOrder::Asc) => "timestamp_asc",
            (SortKey::Title, SortOrder::Asc) => "title_asc",
            (SortKey::Title, SortOrder::Desc) => "title_desc",
        }
    }
}
