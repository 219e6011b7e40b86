//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! The backend is cut at exactly the boundary the application consumes:
//! an auth provider, a schemaless document store, and a blob store with
//! retrievable URLs.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::models::UserIdentity;

/// Identity contract.
///
/// `current_user` mirrors the managed SDK's client-side session; the
/// curator never reads it — handlers resolve the identity once and pass
/// it in explicitly.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<UserIdentity>;
    async fn sign_out(&self);
    fn current_user(&self) -> Option<UserIdentity>;
}

/// A schemaless persisted record. The application enforces its own schema
/// at the boundary (see [`crate::records`]).
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub fields: Value,
}

/// Data persistence contract, collection-oriented.
///
/// Per-document writes are assumed atomic; nothing here spans more than
/// one document, so there is no transaction surface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents in `collection` whose top-level `field` equals `value`.
    /// Result order is not significant.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>>;

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>>;

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Inserts `fields` as a new document and returns its generated id.
    async fn insert(&self, collection: &str, fields: Value) -> Result<String>;

    /// Merges `partial` into an existing document's top-level fields.
    /// Fails with `NotFound` when the id is absent.
    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<()>;

    /// Fails with `NotFound` when the id is absent (a double delete is a
    /// surfaced error, never a silent success).
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}

/// Blob storage contract for photo bytes.
///
/// Keys are namespaced `"<category>/<uid>/<epoch-ms>_<original-filename>"`;
/// see [`crate::records::blob_key`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Returns a durable retrieval URL for a previously stored blob.
    async fn get_download_url(&self, key: &str) -> Result<String>;
}
