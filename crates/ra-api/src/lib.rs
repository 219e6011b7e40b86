//! # ra-api
//!
//! The web routing and orchestration layer for Rusty-Album.

pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Configures the routes for the photo-collection app.
///
/// # Developer Note
/// We use a scoped configuration to allow the main binary to mount
/// the pages under a different path if needed.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            // Unauthenticated landing / login
            .route("/", web::get().to(handlers::login_page))
            .route("/login", web::post().to(handlers::login))
            .route("/signup", web::post().to(handlers::signup))
            .route("/logout", web::post().to(handlers::logout))
            // Theme roster: one upload per theme
            .route("/themes", web::get().to(handlers::themes_page))
            .route("/themes/{theme_id}/upload", web::post().to(handlers::theme_upload))
            .route("/themes/{theme_id}/update", web::post().to(handlers::theme_update))
            .route("/themes/{theme_id}/delete", web::post().to(handlers::theme_delete))
            // Personal collection
            .route("/mypage", web::get().to(handlers::my_page))
            .route("/mypage/free", web::post().to(handlers::my_page_free_upload))
            .route("/mypage/{record_id}/edit", web::post().to(handlers::edit_record))
            .route("/mypage/{record_id}/delete", web::post().to(handlers::delete_record))
            // Untethered free posts
            .route("/free", web::get().to(handlers::free_page))
            .route("/free/upload", web::post().to(handlers::free_upload))
            .route("/free/{record_id}/delete", web::post().to(handlers::free_delete)),
    );
}
