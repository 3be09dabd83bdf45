//! Redemption service: two image uploads followed by the single-use
//! transition.
//!
//! ```text
//! pending-upload --upload both--> uploading --redeem--> settled
//!        |                           |
//!        +-- upload failed ----------+-- lost race: blobs orphaned
//! ```
//!
//! The token store is touched only after both uploads succeed, so a failed
//! or abandoned redemption leaves the token `unused`. Blobs that were
//! written but never attached to a token go to the [`OrphanQueue`].

use std::fmt;
use std::sync::Arc;

use backon::Retryable;
use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{bounded, ServiceError, Timeouts};
use crate::blob_store::{
    compute_hash, extension_for, hash_to_hex, safe_segment, BlobStore, BlobStoreError,
    OrphanQueue, StoredBlob,
};
use crate::clock::Clock;
use crate::config::RetryConfig;
use crate::model::{ImagePair, Token, TokenId};
use crate::storage::{TokenStore, Transition};
use crate::utils::retry::upload_backoff;

/// One submitted image.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl ImageUpload {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Why an upload did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// 1-based position of the failed image.
    pub image: usize,
    pub reason: String,
    pub retryable: bool,
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upload of image {} failed: {}", self.image, self.reason)
    }
}

/// Result of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// The token is now used with these images.
    Redeemed(ImagePair),
    /// No such token.
    Expired,
    /// The token was already used. Its images are unchanged.
    AlreadyUsed,
    /// An upload failed before the token was touched; it is still unused.
    UploadFailed(UploadFailure),
}

/// Progress of a single redemption, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionPhase {
    PendingUpload,
    Uploading,
    Settled,
}

impl RedemptionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingUpload => "pending-upload",
            Self::Uploading => "uploading",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for RedemptionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redeems upload tokens.
pub struct RedemptionService {
    tokens: Arc<dyn TokenStore>,
    blobs: Arc<dyn BlobStore>,
    orphans: OrphanQueue,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    retry: RetryConfig,
}

impl RedemptionService {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        blobs: Arc<dyn BlobStore>,
        orphans: OrphanQueue,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            tokens,
            blobs,
            orphans,
            clock,
            timeouts,
            retry: RetryConfig::default(),
        }
    }

    /// Set the upload retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Read a token without changing it.
    pub async fn lookup(&self, token_id: &TokenId) -> Result<Option<Token>, ServiceError> {
        bounded("lookup_token", self.timeouts.store, self.tokens.lookup(token_id)).await
    }

    /// Upload `images` and mark the token used with their URLs.
    pub async fn redeem(
        &self,
        token_id: TokenId,
        images: [ImageUpload; 2],
    ) -> Result<RedeemOutcome, ServiceError> {
        for (index, image) in images.iter().enumerate() {
            if image.bytes.is_empty() {
                return Err(ServiceError::InvalidRequest(format!(
                    "image{} is empty",
                    index + 1
                )));
            }
        }

        let token = match self.lookup(&token_id).await? {
            None => {
                debug!(token_id = %token_id, "Redemption of unknown token");
                return Ok(RedeemOutcome::Expired);
            }
            Some(token) if !token.is_unused() => {
                debug!(token_id = %token_id, "Redemption of used token, nothing uploaded");
                return Ok(RedeemOutcome::AlreadyUsed);
            }
            Some(token) => token,
        };
        debug!(token_id = %token_id, phase = %RedemptionPhase::PendingUpload, "Redemption started");

        // Each attempt writes under its own keys so a losing attempt's cleanup
        // never removes blobs a winner attached.
        let attempt = Uuid::new_v4().simple().to_string();
        let namespace = format!(
            "{}/{}",
            safe_segment(token.owner.as_str()),
            token_id
        );
        let [first, second] = images;
        let (first, second) = futures::join!(
            self.upload(&namespace, &attempt, 1, first),
            self.upload(&namespace, &attempt, 2, second)
        );

        let (first, second) = match (first, second) {
            (Ok(first), Ok(second)) => (first, second),
            (first, second) => {
                let uploaded: Vec<String> = [&first, &second]
                    .into_iter()
                    .filter_map(|r| r.as_ref().ok().map(|blob| blob.url.clone()))
                    .collect();
                self.orphans.schedule(uploaded, "upload_failed");

                let failure = first
                    .err()
                    .or_else(|| second.err())
                    .unwrap_or_else(|| UploadFailure {
                        image: 0,
                        reason: "upload failed".to_string(),
                        retryable: true,
                    });
                warn!(
                    token_id = %token_id,
                    image = failure.image,
                    retryable = failure.retryable,
                    reason = %failure.reason,
                    "Redemption aborted before settling"
                );
                return Ok(RedeemOutcome::UploadFailed(failure));
            }
        };

        debug!(token_id = %token_id, phase = %RedemptionPhase::Uploading, "Images uploaded");
        let images = ImagePair::new(first.url, second.url);
        let urls = images.clone().into_vec();

        let transition = bounded(
            "redeem_token",
            self.timeouts.store,
            self.tokens.redeem(&token_id, images.clone(), self.clock.now()),
        )
        .await;

        match transition {
            Ok(Transition::Applied(_)) => {
                info!(
                    token_id = %token_id,
                    account_id = %token.owner,
                    phase = %RedemptionPhase::Settled,
                    "Token redeemed"
                );
                Ok(RedeemOutcome::Redeemed(images))
            }
            Ok(Transition::AlreadyUsed) => {
                info!(token_id = %token_id, "Token was redeemed concurrently");
                self.orphans.schedule(urls, "lost_race");
                Ok(RedeemOutcome::AlreadyUsed)
            }
            Ok(Transition::NotFound) => {
                self.orphans.schedule(urls, "token_missing");
                Ok(RedeemOutcome::Expired)
            }
            Err(ServiceError::Storage(e)) => {
                self.orphans.schedule(urls, "redeem_failed");
                Err(ServiceError::Storage(e))
            }
            Err(e) => {
                // The commit outcome is unknown; deleting could strip images
                // from a token that did settle.
                warn!(
                    token_id = %token_id,
                    error = %e,
                    "Redemption outcome unknown, blobs left for external sweep"
                );
                Err(e)
            }
        }
    }

    async fn upload(
        &self,
        namespace: &str,
        attempt: &str,
        index: usize,
        image: ImageUpload,
    ) -> Result<StoredBlob, UploadFailure> {
        let hash = hash_to_hex(&compute_hash(&image.bytes));
        let name = format!(
            "image-{}-{}-{}{}",
            index,
            &attempt[..12],
            &hash[..16],
            extension_for(image.content_type.as_deref())
        );
        let content_type = image.content_type.as_deref();

        let put = (|| async {
            self.blobs
                .put(namespace, &name, image.bytes.clone(), content_type)
                .await
        })
        .retry(upload_backoff(&self.retry))
        .when(BlobStoreError::is_transient)
        .notify(|e, delay| {
            warn!(image = index, error = %e, delay_ms = delay.as_millis() as u64, "Retrying upload");
        });

        match tokio::time::timeout(self.timeouts.upload, put).await {
            Ok(Ok(blob)) => {
                debug!(image = index, url = %blob.url, size = blob.size, "Image stored");
                Ok(blob)
            }
            Ok(Err(e)) => Err(UploadFailure {
                image: index,
                reason: e.to_string(),
                retryable: e.is_transient(),
            }),
            Err(_) => Err(UploadFailure {
                image: index,
                reason: format!("timed out after {}ms", self.timeouts.upload.as_millis()),
                retryable: true,
            }),
        }
    }
}
