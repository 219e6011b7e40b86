//! # ra-storage-local
//!
//! Local filesystem implementation of the `BlobStore` port. Blobs live
//! under a root directory laid out exactly like their keys
//! (`images/<uid>/<epoch-ms>_<name>`), and download URLs are the public
//! prefix the binary mounts that directory under.

use async_trait::async_trait;
use ra_core::error::{AppError, Result};
use ra_core::traits::BlobStore;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct LocalBlobStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Maps a key to its on-disk path. Keys are produced by the curator,
    /// but the store still refuses anything that could step outside its
    /// root.
    fn blob_path(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root_path.clone();
        for component in key.split('/') {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains('\\')
            {
                return Err(AppError::Storage(format!("invalid blob key: {key}")));
            }
            path.push(component);
        }
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let target = self.blob_path(key)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root_path.clone());

        fs::create_dir_all(&parent)
            .await
            .map_err(|e| AppError::Storage(format!("creating {}: {e}", parent.display())))?;
        fs::write(&target, &bytes)
            .await
            .map_err(|e| AppError::Storage(format!("writing {}: {e}", target.display())))?;

        log::debug!("stored {} bytes at {}", bytes.len(), target.display());
        Ok(())
    }

    async fn get_download_url(&self, key: &str) -> Result<String> {
        let target = self.blob_path(key)?;
        let exists = fs::try_exists(&target)
            .await
            .map_err(|e| AppError::Storage(format!("probing {}: {e}", target.display())))?;
        if !exists {
            return Err(AppError::Storage(format!("no blob stored at {key}")));
        }
        Ok(format!("{}/{key}", self.url_prefix))
    }
}
