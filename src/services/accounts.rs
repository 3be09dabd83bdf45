//! Account management: registration, tier selection and the dashboard reads.

use std::sync::Arc;

use tracing::info;

use super::{bounded, ServiceError, Timeouts};
use crate::identity::Identity;
use crate::ledger::{QuotaLedger, QuotaStatus};
use crate::model::{Account, AccountId, Token};
use crate::storage::TokenStore;
use crate::tier::DEFAULT_TIER;

/// Result of explicit registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(QuotaStatus),
    AlreadyRegistered,
    UnknownTier(String),
}

/// Result of a tier change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierChange {
    Changed(QuotaStatus),
    UnknownTier(String),
    NotRegistered,
}

pub struct AccountService {
    ledger: Arc<QuotaLedger>,
    tokens: Arc<dyn TokenStore>,
    timeouts: Timeouts,
}

impl AccountService {
    pub fn new(ledger: Arc<QuotaLedger>, tokens: Arc<dyn TokenStore>, timeouts: Timeouts) -> Self {
        Self {
            ledger,
            tokens,
            timeouts,
        }
    }

    /// Register the caller with `tier` (default tier if `None`).
    pub async fn register(
        &self,
        caller: &Identity,
        tier: Option<&str>,
    ) -> Result<RegisterOutcome, ServiceError> {
        let tier = tier.unwrap_or(DEFAULT_TIER);
        if !self.ledger.policy().is_known(tier) {
            return Ok(RegisterOutcome::UnknownTier(tier.to_string()));
        }

        let now = self.ledger.now();
        let account = Account::new(
            caller.account_id.clone(),
            caller.email.as_str(),
            tier,
            now,
        );
        let inserted = bounded(
            "insert_account",
            self.timeouts.store,
            self.ledger.accounts().insert(account.clone()),
        )
        .await?;

        if !inserted {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }
        info!(account_id = %caller.account_id, tier, "Account registered");
        Ok(RegisterOutcome::Registered(QuotaStatus::of(
            &account,
            now,
            self.ledger.policy(),
            true,
        )))
    }

    /// Move an account to another tier. The current period's counter and
    /// boundary carry over.
    pub async fn select_tier(
        &self,
        account_id: &AccountId,
        tier: &str,
    ) -> Result<TierChange, ServiceError> {
        if !self.ledger.policy().is_known(tier) {
            return Ok(TierChange::UnknownTier(tier.to_string()));
        }

        let updated = bounded(
            "set_tier",
            self.timeouts.store,
            self.ledger.accounts().set_tier(account_id, tier),
        )
        .await?;

        Ok(match updated {
            Some(account) => {
                info!(account_id = %account_id, tier, "Tier changed");
                TierChange::Changed(QuotaStatus::of(
                    &account,
                    self.ledger.now(),
                    self.ledger.policy(),
                    true,
                ))
            }
            None => TierChange::NotRegistered,
        })
    }

    pub async fn quota_status(&self, caller: &Identity) -> Result<QuotaStatus, ServiceError> {
        self.ledger.status(&caller.seed()).await
    }

    /// Tokens issued by `owner`, newest first.
    pub async fn list_tokens(&self, owner: &AccountId) -> Result<Vec<Token>, ServiceError> {
        bounded(
            "list_tokens",
            self.timeouts.store,
            self.tokens.list_by_owner(owner),
        )
        .await
    }
}
