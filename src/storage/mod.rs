//! Document store interfaces and backends.
//!
//! Accounts and tokens live behind two traits. Each mutating operation is a
//! single per-record atomic unit inside the backend: the quota check and
//! increment in [`AccountStore::consume`], the `unused -> used` transition in
//! [`TokenStore::redeem`]. Backends that can span both records in one
//! transaction also implement [`AtomicIssuance`].
//!
//! Implementations:
//! - `MemoryStore`: in-process, per-key mutexes
//! - `SqliteStore`: SQLite via sqlx, `BEGIN IMMEDIATE` transactions

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};
use crate::ledger::{AccountSeed, ConsumeOutcome, Grant, QuotaDenied};
use crate::model::{Account, AccountId, ImagePair, RecipientMeta, Token, TokenId};
use crate::tier::TierPolicy;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Account persistence and the quota ledger's atomic operations.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Read an account.
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Insert an account if none exists with the same id.
    ///
    /// Returns false (and writes nothing) if the id is taken.
    async fn insert(&self, account: Account) -> Result<bool>;

    /// Change an account's tier. Counter and period boundary are untouched.
    async fn set_tier(&self, account_id: &AccountId, tier: &str) -> Result<Option<Account>>;

    /// Consume one issuance unit as a single atomic unit per account.
    ///
    /// Creates the account from `seed` if absent, rolls the period if `now`
    /// has crossed the boundary, and increments the counter only if the tier
    /// limit allows. A denial persists nothing.
    async fn consume(
        &self,
        seed: &AccountSeed,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<ConsumeOutcome>;

    /// Return one unit charged in the period ending at `period_reset_at`.
    async fn refund(&self, account_id: &AccountId, period_reset_at: DateTime<Utc>)
        -> Result<bool>;
}

/// Outcome of the conditional `unused -> used` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The token was unused and is now used with the given images.
    Applied(Token),
    /// The token was already used; nothing changed.
    AlreadyUsed,
    NotFound,
}

/// Token persistence.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Create a new unused token for `owner`.
    async fn create(
        &self,
        owner: &AccountId,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
    ) -> Result<Token>;

    async fn lookup(&self, token_id: &TokenId) -> Result<Option<Token>>;

    /// Mark the token used with `images`, only if it is still unused at
    /// commit time.
    async fn redeem(
        &self,
        token_id: &TokenId,
        images: ImagePair,
        now: DateTime<Utc>,
    ) -> Result<Transition>;

    /// Tokens owned by `owner`, newest first.
    async fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Token>>;
}

/// Result of a combined consume-and-create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issuance {
    Issued { token: Token, grant: Grant },
    Denied(QuotaDenied),
}

/// Quota consumption and token creation in one transaction.
#[async_trait]
pub trait AtomicIssuance: Send + Sync {
    /// Consume a unit for `seed` and, only if granted, create the token.
    /// Either both are persisted or neither is.
    async fn consume_and_create(
        &self,
        seed: &AccountSeed,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<Issuance>;
}

/// A quota unit charged without a token being produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedCharge {
    pub charge_id: Uuid,
    pub account_id: AccountId,
    /// Boundary of the period the unit was charged in.
    pub period_reset_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub reason: String,
}

impl OrphanedCharge {
    pub fn new(
        account_id: AccountId,
        period_reset_at: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            charge_id: Uuid::new_v4(),
            account_id,
            period_reset_at,
            recorded_at,
            reason: reason.into(),
        }
    }
}

/// How an orphaned charge was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The unit went back to the account.
    Refunded,
    /// Resolved without a refund: the period rolled or the counter is 0.
    Dropped,
    /// Resolved earlier, or not in the log.
    AlreadyResolved,
}

/// Durable log of orphaned charges awaiting reconciliation.
#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, charge: OrphanedCharge) -> Result<()>;

    /// Unresolved charges, oldest first.
    async fn pending(&self) -> Result<Vec<OrphanedCharge>>;

    /// Refund the charge and mark it resolved in one step.
    ///
    /// A charge that is already resolved settles as
    /// [`Settlement::AlreadyResolved`] and refunds nothing, so a retried call
    /// whose first attempt committed is harmless.
    async fn refund_and_resolve(
        &self,
        charge_id: &Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Settlement>;
}

// ============================================================================
// Factory
// ============================================================================

/// Handles onto an initialized storage backend.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<dyn TokenStore>,
    /// Present when the backend supports multi-record transactions and
    /// configuration allows using them.
    pub atomic_issuance: Option<Arc<dyn AtomicIssuance>>,
    pub reconciliation: Arc<dyn ReconciliationLog>,
}

impl Storage {
    /// Wire every handle to one backend object.
    pub fn from_backend<S>(backend: Arc<S>, multi_record_transactions: bool) -> Self
    where
        S: AccountStore + TokenStore + AtomicIssuance + ReconciliationLog + 'static,
    {
        let atomic_issuance: Option<Arc<dyn AtomicIssuance>> = if multi_record_transactions {
            Some(backend.clone())
        } else {
            None
        };
        Self {
            accounts: backend.clone(),
            tokens: backend.clone(),
            atomic_issuance,
            reconciliation: backend,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Storage, Box<dyn std::error::Error>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Storage::from_backend(
                Arc::new(MemoryStore::new()),
                config.multi_record_transactions,
            ))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            let store = SqliteStore::connect(&config.sqlite.path).await?;
            store.init().await?;
            Ok(Storage::from_backend(
                Arc::new(store),
                config.multi_record_transactions,
            ))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err("SQLite feature not enabled".into())
        }
    }
}
