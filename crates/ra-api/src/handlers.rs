//! # ra-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the core
//! ports. Pages are server-rendered; every mutating route follows
//! POST-redirect-GET on success and re-renders the page with a blocking
//! notice on failure, leaving the prior view intact.

use std::collections::HashMap;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use askama::Template;
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;

use ra_core::curator::{Curator, Snapshot, UploadFile};
use ra_core::error::AppError;
use ra_core::models::{UserIdentity, ViewQuery};
use ra_core::traits::AuthProvider;
use ra_ui::{DisplayRecord, FreePostsTemplate, LoginTemplate, MyPageTemplate, ThemeEntry, ThemesTemplate};

/// State shared across all Actix-web workers. The curator mutex is the
/// concurrency contract made literal: one user-initiated mutation is in
/// flight at a time.
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub curator: Mutex<Curator>,
}

// ── Small helpers ───────────────────────────────────────────────────────

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header(("Location", location.to_string()))
        .finish()
}

fn render_page<T: Template>(template: &T, status: StatusCode) -> HttpResponse {
    match template.render() {
        Ok(html) => HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(html),
        Err(e) => {
            log::error!("template rendering failed: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

fn error_status(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::Auth(_) => StatusCode::UNAUTHORIZED,
        AppError::Storage(_) | AppError::Persistence(_) => StatusCode::BAD_GATEWAY,
        AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
        AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The blocking notice for a failed operation; validation failures get the
/// product's own wording, everything else carries the action context.
fn op_notice(action: &str, err: &AppError) -> String {
    match err {
        AppError::Validation(m) if m == "missing file" => "ファイルを選択してください".into(),
        AppError::Validation(m) if m == "missing title" => "題目を入力してください".into(),
        _ => format!("{action}: {err}"),
    }
}

/// Resolves the signed-in identity once per request; everything below the
/// handler takes it as an explicit argument.
fn signed_in(state: &AppState) -> Result<UserIdentity, HttpResponse> {
    state.auth.current_user().ok_or_else(|| see_other("/"))
}

// ── Multipart ───────────────────────────────────────────────────────────

pub(crate) struct PostedForm {
    file: Option<UploadFile>,
    fields: HashMap<String, String>,
}

impl PostedForm {
    fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

fn bad_multipart(e: actix_multipart::MultipartError) -> AppError {
    AppError::Validation(format!("broken multipart request: {e}"))
}

/// Buffers a multipart form: at most one file part plus text fields.
async fn read_form(mut payload: Multipart) -> Result<PostedForm, AppError> {
    let mut form = PostedForm {
        file: None,
        fields: HashMap::new(),
    };
    while let Some(mut field) = payload.try_next().await.map_err(bad_multipart)? {
        let name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) if !filename.is_empty() => {
                form.file = Some(UploadFile {
                    filename,
                    bytes: data,
                });
            }
            // An empty filename means the picker was left untouched; the
            // curator reports the missing file.
            Some(_) => {}
            None => {
                form.fields
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }
    Ok(form)
}

// ── Auth pages ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginQuery {
    new: Option<String>,
}

#[derive(Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

pub async fn login_page(
    data: web::Data<AppState>,
    query: web::Query<LoginQuery>,
) -> impl Responder {
    if data.auth.current_user().is_some() {
        return see_other("/mypage");
    }
    render_page(
        &LoginTemplate {
            is_new_user: query.new.is_some(),
            message: None,
        },
        StatusCode::OK,
    )
}

pub async fn login(data: web::Data<AppState>, form: web::Form<Credentials>) -> impl Responder {
    match data.auth.sign_in(&form.email, &form.password).await {
        Ok(_) => see_other("/mypage"),
        Err(e) => render_page(
            &LoginTemplate {
                is_new_user: false,
                message: Some(format!("エラー: {e}")),
            },
            error_status(&e),
        ),
    }
}

pub async fn signup(data: web::Data<AppState>, form: web::Form<Credentials>) -> impl Responder {
    match data.auth.sign_up(&form.email, &form.password).await {
        Ok(_) => see_other("/mypage"),
        Err(e) => render_page(
            &LoginTemplate {
                is_new_user: true,
                message: Some(format!("エラー: {e}")),
            },
            error_status(&e),
        ),
    }
}

pub async fn logout(data: web::Data<AppState>) -> impl Responder {
    data.auth.sign_out().await;
    see_other("/")
}

// ── Theme roster ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ThemesQuery {
    edit: Option<String>,
}

fn themes_response(
    snapshot: &Snapshot,
    editing: Option<&str>,
    notice: Option<String>,
    status: StatusCode,
) -> HttpResponse {
    let entries = snapshot
        .themes
        .iter()
        .map(|theme| ThemeEntry {
            theme_id: theme.id.clone(),
            theme_title: theme.title.clone(),
            upload: snapshot
                .record_for_theme(&theme.id)
                .map(|r| DisplayRecord::from_record(r, &snapshot.themes_map)),
            editing: editing == Some(theme.id.as_str()),
        })
        .collect();
    render_page(&ThemesTemplate { entries, notice }, status)
}

pub async fn themes_page(
    data: web::Data<AppState>,
    query: web::Query<ThemesQuery>,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let mut curator = data.curator.lock().await;
    if let Err(e) = curator.refresh(&user).await {
        // Failed load: no record set is assumed.
        return themes_response(
            &Snapshot::default(),
            None,
            Some(op_notice("読み込みに失敗しました", &e)),
            error_status(&e),
        );
    }
    themes_response(curator.snapshot(), query.edit.as_deref(), None, StatusCode::OK)
}

pub async fn theme_upload(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Multipart,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let theme_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        let form = read_form(payload).await?;
        let comment = form.text("comment").to_string();
        curator.refresh(&user).await?;
        curator
            .upload_for_theme(&user, &theme_id, form.file, &comment)
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/themes"),
        Err(e) => themes_response(
            curator.snapshot(),
            None,
            Some(op_notice("アップロードに失敗しました", &e)),
            error_status(&e),
        ),
    }
}

pub async fn theme_update(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: Multipart,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let theme_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        let form = read_form(payload).await?;
        let comment = form.text("comment").to_string();
        curator.refresh(&user).await?;
        curator
            .update_themed(&user, &theme_id, form.file, &comment)
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/themes"),
        Err(e) => themes_response(
            curator.snapshot(),
            Some(&theme_id),
            Some(op_notice("更新に失敗しました", &e)),
            error_status(&e),
        ),
    }
}

#[derive(Deserialize)]
pub struct ConfirmForm {
    #[serde(default)]
    confirm: String,
}

pub async fn theme_delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ConfirmForm>,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    // The confirmation signal never arrived: nothing happens.
    if form.confirm != "yes" {
        return see_other("/themes");
    }
    let theme_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        curator.refresh(&user).await?;
        let record_id = curator
            .snapshot()
            .record_for_theme(&theme_id)
            .map(|r| r.id.clone())
            .ok_or_else(|| AppError::NotFound("upload".into(), theme_id.clone()))?;
        let pending = curator.request_delete(&record_id);
        curator.confirm_delete(&user, pending).await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/themes"),
        Err(e) => themes_response(
            curator.snapshot(),
            None,
            Some(op_notice("削除に失敗しました", &e)),
            error_status(&e),
        ),
    }
}

// ── My page ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct MyPageQuery {
    sort: Option<String>,
    q: Option<String>,
    show: Option<String>,
    edit: Option<String>,
    post: Option<String>,
}

impl MyPageQuery {
    fn view(&self) -> ViewQuery {
        ViewQuery::from_params(self.sort.as_deref(), self.q.as_deref())
    }
}

fn mypage_response(
    snapshot: &Snapshot,
    query: &ViewQuery,
    show: Option<&str>,
    editing: bool,
    show_free_form: bool,
    notice: Option<String>,
    status: StatusCode,
) -> HttpResponse {
    let items: Vec<DisplayRecord> =
        ra_core::curator::curate(&snapshot.records, &snapshot.themes_map, query)
            .iter()
            .map(|r| DisplayRecord::from_record(r, &snapshot.themes_map))
            .collect();
    let detail = show.and_then(|id| {
        snapshot
            .records
            .iter()
            .find(|r| r.id == id)
            .map(|r| DisplayRecord::from_record(r, &snapshot.themes_map))
    });
    let editing = editing && detail.is_some();
    render_page(
        &MyPageTemplate {
            items,
            sort_param: query.sort_param().to_string(),
            keyword: query.keyword.clone(),
            detail,
            editing,
            show_free_form,
            notice,
        },
        status,
    )
}

pub async fn my_page(data: web::Data<AppState>, query: web::Query<MyPageQuery>) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let view = query.view();

    let mut curator = data.curator.lock().await;
    if let Err(e) = curator.refresh(&user).await {
        return mypage_response(
            &Snapshot::default(),
            &view,
            None,
            false,
            false,
            Some(op_notice("読み込みに失敗しました", &e)),
            error_status(&e),
        );
    }
    mypage_response(
        curator.snapshot(),
        &view,
        query.show.as_deref(),
        query.edit.is_some(),
        query.post.is_some(),
        None,
        StatusCode::OK,
    )
}

pub async fn my_page_free_upload(
    data: web::Data<AppState>,
    query: web::Query<MyPageQuery>,
    payload: Multipart,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };

    let mut curator = data.curator.lock().await;
    let result = async {
        let form = read_form(payload).await?;
        let title = form.text("title").to_string();
        let comment = form.text("comment").to_string();
        curator.refresh(&user).await?;
        curator
            .upload_free(&user, form.file, &title, &comment)
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/mypage"),
        // The active sort and keyword stay in force under the notice.
        Err(e) => mypage_response(
            curator.snapshot(),
            &query.view(),
            None,
            false,
            true,
            Some(op_notice("アップロードに失敗しました", &e)),
            error_status(&e),
        ),
    }
}

#[derive(Deserialize)]
pub struct EditForm {
    comment: String,
    title: Option<String>,
}

pub async fn edit_record(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MyPageQuery>,
    form: web::Form<EditForm>,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let record_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        curator.refresh(&user).await?;
        curator
            .edit(&user, &record_id, &form.comment, form.title.as_deref())
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        // Saving closes the detail view.
        Ok(()) => see_other("/mypage"),
        // Failure keeps the detail open in edit mode, view unchanged.
        Err(e) => mypage_response(
            curator.snapshot(),
            &query.view(),
            Some(&record_id),
            true,
            false,
            Some(op_notice("更新に失敗しました", &e)),
            error_status(&e),
        ),
    }
}

pub async fn delete_record(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<MyPageQuery>,
    form: web::Form<ConfirmForm>,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    if form.confirm != "yes" {
        return see_other("/mypage");
    }
    let record_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        curator.refresh(&user).await?;
        let pending = curator.request_delete(&record_id);
        curator.confirm_delete(&user, pending).await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        // Deleting closes any detail view referencing the record.
        Ok(()) => see_other("/mypage"),
        Err(e) => mypage_response(
            curator.snapshot(),
            &query.view(),
            Some(&record_id),
            false,
            false,
            Some(op_notice("削除に失敗しました", &e)),
            error_status(&e),
        ),
    }
}

// ── Free posts ──────────────────────────────────────────────────────────

fn free_response(snapshot: &Snapshot, notice: Option<String>, status: StatusCode) -> HttpResponse {
    let posts = snapshot
        .free_posts
        .iter()
        .map(|r| DisplayRecord::from_record(r, &snapshot.themes_map))
        .collect();
    render_page(&FreePostsTemplate { posts, notice }, status)
}

pub async fn free_page(data: web::Data<AppState>) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    let mut curator = data.curator.lock().await;
    if let Err(e) = curator.refresh(&user).await {
        return free_response(
            &Snapshot::default(),
            Some(op_notice("読み込みに失敗しました", &e)),
            error_status(&e),
        );
    }
    free_response(curator.snapshot(), None, StatusCode::OK)
}

pub async fn free_upload(data: web::Data<AppState>, payload: Multipart) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };

    let mut curator = data.curator.lock().await;
    let result = async {
        let form = read_form(payload).await?;
        let comment = form.text("comment").to_string();
        curator.refresh(&user).await?;
        curator.post_free(&user, form.file, &comment).await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/free"),
        Err(e) => free_response(
            curator.snapshot(),
            Some(op_notice("アップロードに失敗しました", &e)),
            error_status(&e),
        ),
    }
}

pub async fn free_delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
    form: web::Form<ConfirmForm>,
) -> impl Responder {
    let user = match signed_in(&data) {
        Ok(u) => u,
        Err(redirect) => return redirect,
    };
    if form.confirm != "yes" {
        return see_other("/free");
    }
    let record_id = path.into_inner();

    let mut curator = data.curator.lock().await;
    let result = async {
        curator.refresh(&user).await?;
        let pending = curator.request_delete(&record_id);
        curator.confirm_delete(&user, pending).await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => see_other("/free"),
        Err(e) => free_response(
            curator.snapshot(),
            Some(op_notice("削除に失敗しました", &e)),
            error_status(&e),
        ),
    }
}
