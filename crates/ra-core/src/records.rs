//! Schema boundary between the schemaless [`Document`] store and the
//! typed domain models. Field names match the persisted collections
//! (`userId`, `themeId`, `photoURL`, ...) so existing data stays readable.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::models::{Theme, UploadRecord};
use crate::traits::Document;

/// Collection names as persisted.
pub const THEMES: &str = "themes";
pub const COLLECTIONS: &str = "collections";
pub const FREE_POSTS: &str = "freePosts";
pub const USERS: &str = "users";

/// Blob key categories (first path component of a blob key).
pub const IMAGES_CATEGORY: &str = "images";
pub const FREE_POSTS_CATEGORY: &str = "freePosts";

fn str_field(doc: &Document, name: &str) -> Result<String> {
    doc.fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::Persistence(format!("document {} is missing field {name}", doc.id))
        })
}

fn opt_str_field(doc: &Document, name: &str) -> Option<String> {
    doc.fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn opt_timestamp(doc: &Document) -> Option<DateTime<Utc>> {
    let secs = doc.fields.get("timestamp")?.as_i64()?;
    Utc.timestamp_opt(secs, 0).single()
}

pub fn theme_from_doc(doc: &Document) -> Result<Theme> {
    Ok(Theme {
        id: doc.id.clone(),
        title: str_field(doc, "title")?,
    })
}

/// A `collections` document: themed upload or a my-page free post.
pub fn record_from_doc(doc: &Document) -> Result<UploadRecord> {
    Ok(UploadRecord {
        id: doc.id.clone(),
        user_id: str_field(doc, "userId")?,
        theme_id: opt_str_field(doc, "themeId"),
        free_title: opt_str_field(doc, "freeTitle"),
        photo_url: str_field(doc, "photoURL")?,
        comment: opt_str_field(doc, "comment").unwrap_or_default(),
        timestamp: opt_timestamp(doc),
    })
}

/// A `freePosts` document: untethered upload, never themed, never titled.
pub fn free_post_from_doc(doc: &Document) -> Result<UploadRecord> {
    Ok(UploadRecord {
        id: doc.id.clone(),
        user_id: str_field(doc, "userId")?,
        theme_id: None,
        free_title: None,
        photo_url: str_field(doc, "photoURL")?,
        comment: opt_str_field(doc, "comment").unwrap_or_default(),
        timestamp: opt_timestamp(doc),
    })
}

pub fn collection_fields(
    user_id: &str,
    theme_id: Option<&str>,
    free_title: Option<&str>,
    photo_url: &str,
    comment: &str,
    timestamp: DateTime<Utc>,
) -> Value {
    json!({
        "userId": user_id,
        "themeId": theme_id,
        "freeTitle": free_title,
        "photoURL": photo_url,
        "comment": comment,
        "timestamp": timestamp.timestamp(),
    })
}

pub fn free_post_fields(
    user_id: &str,
    photo_url: &str,
    comment: &str,
    timestamp: DateTime<Utc>,
) -> Value {
    json!({
        "userId": user_id,
        "photoURL": photo_url,
        "comment": comment,
        "timestamp": timestamp.timestamp(),
    })
}

/// Builds a blob key: `"<category>/<uid>/<epoch-ms>_<original-filename>"`.
///
/// The filename component comes from the browser and must never escape the
/// key namespace: only its final path segment survives, and a segment that
/// is empty or a dot-form becomes a fixed stand-in.
pub fn blob_key(category: &str, uid: &str, epoch_ms: i64, filename: &str) -> String {
    format!("{category}/{uid}/{epoch_ms}_{}", sanitize_filename(filename))
}

fn sanitize_filename(filename: &str) -> &str {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => "photo",
        other => other,
    }
}
