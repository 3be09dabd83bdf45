//! Filesystem-based blob storage.
//!
//! Stores blobs as files under a base directory:
//! ```text
//! {base_path}/
//!   {owner}/
//!     {token_id}/
//!       image-1-{hash}.jpg
//! ```
//!
//! URLs are `{public_base_url}/{key}`, so whatever serves `base_path` at
//! `public_base_url` (the HTTP router by default) makes them retrievable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use super::{
    compute_hash, hash_to_hex, validate_key, BlobStore, BlobStoreError, BlobStoreType, Result,
    StoredBlob,
};

/// Filesystem-based blob store.
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    ///
    /// Creates the base directory if it doesn't exist.
    pub async fn new(base_path: impl AsRef<Path>, public_base_url: impl Into<String>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    fn url_for_key(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Extract the key from a URL produced by this store.
    fn key_from_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        let key = url
            .strip_prefix(self.public_base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                BlobStoreError::InvalidUrl(format!(
                    "URL is not under {}: {}",
                    self.public_base_url, url
                ))
            })?;
        validate_key(key)?;
        Ok(key)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        bytes: Bytes,
        _content_type: Option<&str>,
    ) -> Result<StoredBlob> {
        let key = format!("{}/{}", namespace, name);
        validate_key(&key)?;
        let path = self.path_for_key(&key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically using temp file + rename
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, &path).await?;

        let content_hash = hash_to_hex(&compute_hash(&bytes));
        debug!(key = %key, size = bytes.len(), "Stored blob");

        Ok(StoredBlob {
            url: self.url_for_key(&key),
            key,
            size: bytes.len() as u64,
            content_hash,
        })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let key = self.key_from_url(url)?;
        let path = self.path_for_key(key);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn storage_type(&self) -> BlobStoreType {
        BlobStoreType::Filesystem
    }
}
