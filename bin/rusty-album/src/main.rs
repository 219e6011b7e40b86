//! # Rusty-Album Binary
//!
//! The entry point that assembles the application from one implementation
//! of each port: SQLite documents, local-disk blobs, argon2 auth.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use ra_api::handlers::AppState;
use ra_api::middleware;
use ra_core::curator::Curator;
use ra_core::records;
use ra_core::traits::DocumentStore;
use serde_json::json;
use tokio::sync::Mutex;

use ra_auth_simple::SimpleAuthProvider;
use ra_db_sqlite::SqliteDocumentStore;
use ra_storage_local::LocalBlobStore;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Dev/test bootstrap: the theme roster has no admin surface, so an empty
/// roster is filled from `RA_SEED_THEMES` (comma-separated titles).
async fn seed_themes(docs: &dyn DocumentStore) -> anyhow::Result<()> {
    if !docs.get_all(records::THEMES).await?.is_empty() {
        return Ok(());
    }
    match std::env::var("RA_SEED_THEMES") {
        Ok(titles) => {
            for title in titles.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                docs.insert(records::THEMES, json!({ "title": title })).await?;
                log::info!("seeded theme {title}");
            }
        }
        Err(_) => log::warn!("theme roster is empty and RA_SEED_THEMES is unset"),
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = env_or("RA_DATABASE_URL", "sqlite:rusty_album.db");
    let upload_root = env_or("RA_UPLOAD_ROOT", "./data/uploads");
    let url_prefix = env_or("RA_URL_PREFIX", "/static/uploads");
    let bind_addr = env_or("RA_BIND_ADDR", "127.0.0.1:8080");

    // 1. Documents
    let docs: Arc<dyn DocumentStore> = Arc::new(
        SqliteDocumentStore::new(&database_url)
            .await
            .expect("Failed to init SQLite"),
    );
    seed_themes(docs.as_ref()).await.expect("Failed to seed themes");

    // 2. Blobs
    let store = Arc::new(LocalBlobStore::new(
        upload_root.clone().into(),
        url_prefix.clone(),
    ));

    // 3. Auth (same document store underneath)
    let auth = Arc::new(SimpleAuthProvider::new(docs.clone()));

    // 4. The curator, behind the one-operation-at-a-time mutex
    let state = web::Data::new(AppState {
        auth,
        curator: Mutex::new(Curator::new(docs, store)),
    });

    log::info!("🚀 Rusty-Album starting on http://{bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::standard_middleware())
            .wrap(middleware::cors_policy())
            .service(actix_files::Files::new(&url_prefix, &upload_root))
            .configure(ra_api::configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
