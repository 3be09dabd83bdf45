//! Image blob storage.
//!
//! Redeemed images are written to a blob store under a per-token namespace
//! and referenced from the token by a stable retrieval URL.
//!
//! ## Storage Backends
//!
//! - `FilesystemBlobStore` - Local filesystem, served by the HTTP router
//! - `MemoryBlobStore` - In-process, with failure injection for tests
//! - `S3BlobStore` (feature: s3) - Amazon S3 or an S3-compatible service
//!
//! ## Orphan Cleanup
//!
//! Blobs that were uploaded but never attached to a token are sent to an
//! [`OrphanQueue`] and deleted by the [`OrphanReaper`] background task.

mod config;
mod filesystem;
mod memory;
mod reaper;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "s3")]
pub use config::S3StoreConfig;
pub use config::{BlobStoreConfig, BlobStoreType, FilesystemStoreConfig};
pub use filesystem::FilesystemBlobStore;
pub use memory::MemoryBlobStore;
pub use reaper::{orphan_channel, OrphanQueue, OrphanReaper};
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur during blob store operations.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    /// The backend could not be reached or failed mid-request.
    #[error("Failed to store blob: {0}")]
    StoreFailed(String),

    /// The backend refused the blob. Retrying the same request will not help.
    #[error("Blob rejected: {0}")]
    Rejected(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid blob name: {0}")]
    InvalidName(String),
}

impl BlobStoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreFailed(_) | Self::Io(_))
    }
}

/// Result type for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;

/// A blob that was durably written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Backend key, `{namespace}/{name}`.
    pub key: String,
    /// Public retrieval URL.
    pub url: String,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub content_hash: String,
}

/// Blob storage backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `{namespace}/{name}` and return its retrieval URL.
    ///
    /// Writing the same key twice replaces the earlier content.
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<StoredBlob>;

    /// Delete the blob behind a URL returned by `put`.
    ///
    /// Deleting a blob that no longer exists succeeds.
    async fn delete(&self, url: &str) -> Result<()>;

    /// Storage type for this backend.
    fn storage_type(&self) -> BlobStoreType;
}

/// Compute SHA-256 hash of a blob.
pub fn compute_hash(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().to_vec()
}

/// Format hash as hex string for names.
pub fn hash_to_hex(hash: &[u8]) -> String {
    hex::encode(hash)
}

/// File extension for an image content type, including the dot.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type.map(|ct| ct.trim().to_ascii_lowercase()) {
        Some(ct) if ct == "image/jpeg" || ct == "image/jpg" => ".jpg",
        Some(ct) if ct == "image/png" => ".png",
        Some(ct) if ct == "image/gif" => ".gif",
        Some(ct) if ct == "image/webp" => ".webp",
        Some(ct) if ct == "image/heic" => ".heic",
        _ => "",
    }
}

/// Map an arbitrary identifier onto a safe key segment.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, and the path-like
/// segments `""`, `.` and `..` are replaced outright.
pub fn safe_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Validate a `/`-separated key, segment by segment.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(BlobStoreError::InvalidName("empty key".to_string()));
    }
    for segment in key.split('/') {
        if safe_segment(segment) != segment {
            return Err(BlobStoreError::InvalidName(key.to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize a blob store based on configuration.
///
/// `server_base_url` is the HTTP API's public base URL; the filesystem store
/// derives `{server_base_url}/media` from it when no URL is configured.
///
/// # Errors
///
/// Returns error if the configured store type requires an unavailable feature.
pub async fn init_blob_store(
    config: &BlobStoreConfig,
    server_base_url: &str,
) -> std::result::Result<Arc<dyn BlobStore>, Box<dyn std::error::Error>> {
    use tracing::info;

    match config.store_type {
        BlobStoreType::Filesystem => {
            let public_base_url = config.filesystem.public_url(server_base_url);
            info!(
                path = %config.filesystem.base_path.display(),
                url = %public_base_url,
                "BlobStore: filesystem"
            );
            let store =
                FilesystemBlobStore::new(&config.filesystem.base_path, public_base_url).await?;
            Ok(Arc::new(store))
        }
        BlobStoreType::Memory => {
            info!("BlobStore: memory");
            Ok(Arc::new(MemoryBlobStore::new()))
        }
        #[cfg(feature = "s3")]
        BlobStoreType::S3 => {
            info!(
                bucket = %config.s3.bucket,
                prefix = ?config.s3.prefix,
                region = ?config.s3.region,
                endpoint = ?config.s3.endpoint,
                "BlobStore: s3"
            );
            let store = S3BlobStore::from_config(&config.s3).await?;
            Ok(Arc::new(store))
        }
    }
}
