//! Amazon S3 blob store.
//!
//! Stores blobs as objects in an S3 bucket:
//! ```text
//! s3://{bucket}/{prefix}/{owner}/{token_id}/{name}
//! ```

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::debug;

use super::{
    compute_hash, hash_to_hex, validate_key, BlobStore, BlobStoreError, BlobStoreType, Result,
    S3StoreConfig, StoredBlob,
};

/// S3-based blob store.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    public_base_url: String,
}

impl S3BlobStore {
    /// Create a store from configuration.
    ///
    /// Uses default credentials from the environment (AWS_ACCESS_KEY_ID,
    /// AWS_SECRET_ACCESS_KEY, or IAM role).
    pub async fn from_config(config: &S3StoreConfig) -> Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            config_loader = config_loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = config_loader.load().await;

        let client = match &config.endpoint {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true) // Required for MinIO and most S3-compatible services
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&sdk_config),
        };

        Ok(Self::with_client(client, config))
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, config: &S3StoreConfig) -> Self {
        let public_base_url = match &config.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.s3.amazonaws.com", config.bucket),
        };
        Self {
            client,
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            public_base_url,
        }
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }

    fn url_for_object(&self, object_key: &str) -> String {
        format!("{}/{}", self.public_base_url, object_key)
    }

    fn object_key_from_url<'a>(&self, url: &'a str) -> Result<&'a str> {
        url.strip_prefix(self.public_base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| {
                BlobStoreError::InvalidUrl(format!(
                    "URL doesn't match bucket {}: {}",
                    self.bucket, url
                ))
            })
    }
}

/// Timeouts, dispatch failures and 5xx responses are worth retrying.
fn classify<E>(err: &SdkError<E, HttpResponse>, operation: &str) -> BlobStoreError
where
    E: std::error::Error + 'static,
{
    let message = format!("S3 {} failed: {}", operation, err);
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            BlobStoreError::StoreFailed(message)
        }
        _ => {
            let server_side = err
                .raw_response()
                .map(|raw| raw.status().is_server_error())
                .unwrap_or(false);
            if server_side {
                BlobStoreError::StoreFailed(message)
            } else {
                BlobStoreError::Rejected(message)
            }
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        namespace: &str,
        name: &str,
        bytes: Bytes,
        content_type: Option<&str>,
    ) -> Result<StoredBlob> {
        let key = format!("{}/{}", namespace, name);
        validate_key(&key)?;
        let object_key = self.object_key(&key);
        let size = bytes.len() as u64;
        let content_hash = hash_to_hex(&compute_hash(&bytes));

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes));
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        request.send().await.map_err(|e| classify(&e, "upload"))?;

        debug!(key = %object_key, size, bucket = %self.bucket, "Stored blob in S3");

        Ok(StoredBlob {
            url: self.url_for_object(&object_key),
            key,
            size,
            content_hash,
        })
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let object_key = self.object_key_from_url(url)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|e| classify(&e, "delete"))?;
        Ok(())
    }

    fn storage_type(&self) -> BlobStoreType {
        BlobStoreType::S3
    }
}
