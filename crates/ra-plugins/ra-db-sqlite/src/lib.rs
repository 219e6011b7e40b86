//! # ra-db-sqlite
//!
//! SQLite implementation of the `DocumentStore` port. The schemaless
//! contract maps onto a single `documents` table keyed by collection name
//! and id, with the fields kept as a JSON body. Field queries go through
//! `json_extract`, so the store never learns the application schema.

use async_trait::async_trait;
use ra_core::error::{AppError, Result};
use ra_core::traits::{Document, DocumentStore};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connects (creating the file if needed) and ensures the schema.
    ///
    /// The pool is pinned to one connection: `sqlite::memory:` databases
    /// are per-connection, and the write load here is a single user's
    /// clicks.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection_name TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection_name, id)
            )",
        )
        .execute(&pool)
        .await?;

        log::info!("document store ready at {url}");
        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> AppError {
    AppError::Persistence(e.to_string())
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let id: String = row.get("id");
    let body: String = row.get("body");
    let fields = serde_json::from_str(&body)
        .map_err(|e| AppError::Persistence(format!("corrupt document {id}: {e}")))?;
    Ok(Document { id, fields })
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        let query = sqlx::query(
            "SELECT id, body FROM documents
             WHERE collection_name = ? AND json_extract(body, ?) = ?
             ORDER BY rowid",
        )
        .bind(collection)
        .bind(format!("$.{field}"));

        // json_extract yields SQL scalars, so the comparison value binds by
        // its JSON type.
        let query = match value {
            Value::String(s) => query.bind(s.clone()),
            Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
            Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
            Value::Bool(b) => query.bind(*b),
            other => {
                return Err(AppError::Persistence(format!(
                    "unsupported query value: {other}"
                )))
            }
        };

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>> {
        // rowid preserves insertion order, which the theme roster relies on.
        let rows = sqlx::query(
            "SELECT id, body FROM documents WHERE collection_name = ? ORDER BY rowid",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_document).collect()
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, body FROM documents WHERE collection_name = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn insert(&self, collection: &str, fields: Value) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        sqlx::query("INSERT INTO documents (collection_name, id, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(&id)
            .bind(fields.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Read-merge-write inside one transaction so a partial update can
    /// never leave a half-merged body behind.
    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            "SELECT body FROM documents WHERE collection_name = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| AppError::NotFound("document".into(), id.into()))?;

        let body: String = row.get("body");
        let mut fields: Value = serde_json::from_str(&body)
            .map_err(|e| AppError::Persistence(format!("corrupt document {id}: {e}")))?;
        if let (Some(target), Some(source)) = (fields.as_object_mut(), partial.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }

        sqlx::query("UPDATE documents SET body = ? WHERE collection_name = ? AND id = ?")
            .bind(fields.to_string())
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM documents WHERE collection_name = ? AND id = ?",
        )
        .bind(collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("document".into(), id.into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_query_by_field() {
        let store = store().await;
        let id = store
            .insert("collections", json!({ "userId": "u1", "comment": "初投稿" }))
            .await
            .unwrap();
        store
            .insert("collections", json!({ "userId": "u2", "comment": "" }))
            .await
            .unwrap();

        let docs = store
            .query_by_field("collections", "userId", &json!("u1"))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert_eq!(docs[0].fields["comment"], "初投稿");
    }

    #[tokio::test]
    async fn query_ignores_other_collections() {
        let store = store().await;
        store
            .insert("freePosts", json!({ "userId": "u1" }))
            .await
            .unwrap();
        let docs = store
            .query_by_field("collections", "userId", &json!("u1"))
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn get_all_returns_insertion_order() {
        let store = store().await;
        let first = store.insert("themes", json!({ "title": "風景" })).await.unwrap();
        let second = store.insert("themes", json!({ "title": "人物" })).await.unwrap();

        let docs = store.get_all("themes").await.unwrap();
        assert_eq!(
            docs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            [first.as_str(), second.as_str()]
        );
    }

    #[tokio::test]
    async fn update_merges_partial_fields() {
        let store = store().await;
        let id = store
            .insert(
                "collections",
                json!({ "userId": "u1", "comment": "前", "photoURL": "/a.jpg" }),
            )
            .await
            .unwrap();

        store
            .update("collections", &id, json!({ "comment": "後" }))
            .await
            .unwrap();

        let doc = store.get_by_id("collections", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["comment"], "後");
        assert_eq!(doc.fields["photoURL"], "/a.jpg");
        assert_eq!(doc.fields["userId"], "u1");
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_ids_are_not_found() {
        let store = store().await;
        let err = store
            .update("collections", "ghost", json!({ "comment": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));

        let err = store.delete("collections", "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }

    #[tokio::test]
    async fn delete_removes_the_document() {
        let store = store().await;
        let id = store
            .insert("collections", json!({ "userId": "u1" }))
            .await
            .unwrap();
        store.delete("collections", &id).await.unwrap();
        assert!(store.get_by_id("collections", &id).await.unwrap().is_none());

        let err = store.delete("collections", &id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }
}
