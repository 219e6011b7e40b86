//! Askama templates and their view models. Handlers build these from
//! curator snapshots; everything user-supplied is escaped by askama.

use std::collections::HashMap;

use askama::Template;
use ra_core::curator::resolve_title;
use ra_core::models::UploadRecord;

/// A record shaped for rendering: title resolved, timestamp formatted.
#[derive(Debug, Clone)]
pub struct DisplayRecord {
    pub id: String,
    pub title: String,
    pub photo_url: String,
    pub comment: String,
    /// Formatted registration date; empty when the record has none.
    pub posted_on: String,
    pub is_free: bool,
}

impl DisplayRecord {
    pub fn from_record(record: &UploadRecord, themes_map: &HashMap<String, String>) -> Self {
        Self {
            id: record.id.clone(),
            title: resolve_title(record, themes_map),
            photo_url: record.photo_url.clone(),
            comment: record.comment.clone(),
            posted_on: record
                .timestamp
                .map(|t| t.format("%Y/%m/%d %H:%M").to_string())
                .unwrap_or_default(),
            is_free: record.is_free(),
        }
    }
}

/// One row of the theme roster: the theme plus the user's upload for it,
/// if any, and whether the row is in edit mode.
#[derive(Debug, Clone)]
pub struct ThemeEntry {
    pub theme_id: String,
    pub theme_title: String,
    pub upload: Option<DisplayRecord>,
    pub editing: bool,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub is_new_user: bool,
    pub message: Option<String>,
}

#[derive(Template)]
#[template(path = "themes.html")]
pub struct ThemesTemplate {
    pub entries: Vec<ThemeEntry>,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "mypage.html")]
pub struct MyPageTemplate {
    pub items: Vec<DisplayRecord>,
    pub sort_param: String,
    pub keyword: String,
    /// The record opened in the detail modal, if any.
    pub detail: Option<DisplayRecord>,
    pub editing: bool,
    pub show_free_form: bool,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "free.html")]
pub struct FreePostsTemplate {
    pub posts: Vec<DisplayRecord>,
    pub notice: Option<String>,
}
