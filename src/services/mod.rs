//! Application services: issuance, redemption, account management and
//! reconciliation.
//!
//! Services sit between the HTTP edge and the storage traits. Quota and
//! token-state outcomes come back as typed results; only infrastructure
//! faults surface as [`ServiceError`].

pub mod accounts;
pub mod issuance;
pub mod reconciliation;
pub mod redemption;

pub use accounts::{AccountService, RegisterOutcome, TierChange};
pub use issuance::{IssueOutcome, IssuanceService, IssuedLink};
pub use reconciliation::{ReconcileReport, Reconciler};
pub use redemption::{
    ImageUpload, RedeemOutcome, RedemptionPhase, RedemptionService, UploadFailure,
};

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::TimeoutConfig;
use crate::storage::StorageError;

/// Infrastructure failures raised by services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Timed out during {operation}")]
    Timeout { operation: &'static str },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(_) | Self::Timeout { .. } | Self::Internal(_) => true,
            Self::InvalidRequest(_) => false,
        }
    }
}

/// Resolved per-call deadlines.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub store: Duration,
    pub upload: Duration,
    pub identity: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}

impl From<&TimeoutConfig> for Timeouts {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            store: config.store(),
            upload: config.upload(),
            identity: config.identity(),
        }
    }
}

/// Run a storage call with a deadline.
///
/// A dropped SQLite transaction rolls back, so an elapsed deadline leaves
/// the record as it was before the call.
pub async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ServiceError::from),
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Store call timed out");
            Err(ServiceError::Timeout { operation })
        }
    }
}
