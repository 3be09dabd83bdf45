//! Blob store configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Blob store type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobStoreType {
    /// Filesystem-based storage (local or mounted).
    #[default]
    Filesystem,
    /// In-process storage. Blobs are lost on restart.
    Memory,
    /// Amazon S3 (requires `s3` feature).
    #[cfg(feature = "s3")]
    S3,
}

/// Blob store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    /// Blob store type.
    #[serde(rename = "type")]
    pub store_type: BlobStoreType,

    /// How often the orphan reaper drains its queue, in seconds.
    pub orphan_sweep_interval_secs: u64,

    /// Filesystem store configuration.
    pub filesystem: FilesystemStoreConfig,

    /// S3 store configuration (requires `s3` feature).
    #[cfg(feature = "s3")]
    pub s3: S3StoreConfig,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            store_type: BlobStoreType::default(),
            orphan_sweep_interval_secs: default_orphan_sweep_interval_secs(),
            filesystem: FilesystemStoreConfig::default(),
            #[cfg(feature = "s3")]
            s3: S3StoreConfig::default(),
        }
    }
}

impl BlobStoreConfig {
    /// Get the orphan sweep interval duration.
    pub fn orphan_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_sweep_interval_secs.max(1))
    }
}

fn default_orphan_sweep_interval_secs() -> u64 {
    30
}

/// Filesystem blob store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemStoreConfig {
    /// Base directory for blob storage.
    /// Files are organized as `{base_path}/{owner}/{token_id}/{name}`.
    pub base_path: PathBuf,
    /// URL prefix under which `base_path` is reachable. When unset, the
    /// HTTP server serves the directory itself at `/media`.
    pub public_base_url: Option<String>,
}

impl Default for FilesystemStoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data/blobs"),
            public_base_url: None,
        }
    }
}

impl FilesystemStoreConfig {
    /// Whether the HTTP server should serve `base_path` at `/media`.
    pub fn served_locally(&self) -> bool {
        self.public_base_url.is_none()
    }

    /// Effective public URL prefix.
    pub fn public_url(&self, server_base_url: &str) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/media", server_base_url.trim_end_matches('/')),
        }
    }
}

/// S3 blob store configuration.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3StoreConfig {
    /// S3 bucket name.
    pub bucket: String,
    /// Optional key prefix within the bucket.
    pub prefix: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint URL (for S3-compatible services like MinIO).
    pub endpoint: Option<String>,
    /// Public URL prefix for objects, e.g. a CDN in front of the bucket.
    /// When unset, URLs are `https://{bucket}.s3.amazonaws.com/{key}`.
    pub public_base_url: Option<String>,
}

#[cfg(feature = "s3")]
impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            bucket: "photolink-images".to_string(),
            prefix: None,
            region: None,
            endpoint: None,
            public_base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_store_config_default() {
        let config = BlobStoreConfig::default();
        assert_eq!(config.store_type, BlobStoreType::Filesystem);
        assert_eq!(config.orphan_sweep_interval_secs, 30);
        assert_eq!(config.filesystem.base_path, PathBuf::from("./data/blobs"));
        assert!(config.filesystem.served_locally());
    }

    #[test]
    fn test_filesystem_public_url() {
        let mut config = FilesystemStoreConfig::default();
        assert_eq!(
            config.public_url("https://links.example/"),
            "https://links.example/media"
        );

        config.public_base_url = Some("https://cdn.example/photos/".to_string());
        assert_eq!(config.public_url("ignored"), "https://cdn.example/photos");
        assert!(!config.served_locally());
    }

    #[test]
    fn test_blob_store_config_deserialize_yaml() {
        let yaml = r#"
            type: memory
            orphan_sweep_interval_secs: 5
            filesystem:
              base_path: /tmp/blobs
        "#;

        let config: BlobStoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.store_type, BlobStoreType::Memory);
        assert_eq!(config.orphan_sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.filesystem.base_path, PathBuf::from("/tmp/blobs"));
    }
}
