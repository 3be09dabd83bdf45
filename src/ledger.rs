//! Quota ledger: per-account issuance counting.
//!
//! The decision logic ([`apply_consume`], [`apply_refund`]) is pure and
//! works on an in-memory [`Account`]. Storage backends run it inside their
//! own per-account transaction and persist the result only on a grant, which
//! is what makes `consume` atomic without any locking in this module.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::Clock;
use crate::model::{Account, AccountId};
use crate::services::{bounded, ServiceError, Timeouts};
use crate::storage::AccountStore;
use crate::tier::{TierPolicy, DEFAULT_TIER};

/// Identity of the account to charge, used to create it if absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSeed {
    pub account_id: AccountId,
    pub email: String,
}

impl AccountSeed {
    pub fn new(account_id: impl Into<AccountId>, email: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            email: email.into(),
        }
    }

    /// Account created on first use: default tier, empty counter.
    pub fn into_account(self, now: DateTime<Utc>) -> Account {
        Account::new(self.account_id, self.email, DEFAULT_TIER, now)
    }
}

/// One unit of quota was consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub limit: u32,
    pub issued: u32,
    pub remaining: u32,
    pub period_reset_at: DateTime<Utc>,
}

/// The account has no quota left this period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDenied {
    pub tier: String,
    pub limit: u32,
    pub issued: u32,
    pub period_reset_at: DateTime<Utc>,
}

impl std::fmt::Display for QuotaDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "monthly link limit reached for tier '{}': {}/{} issued, resets at {}",
            self.tier,
            self.issued,
            self.limit,
            self.period_reset_at.to_rfc3339()
        )
    }
}

/// Result of a consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Granted(Grant),
    Denied(QuotaDenied),
}

impl ConsumeOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Apply one consume step to `account`.
///
/// Rolls the period if `now` has crossed the boundary, then increments the
/// counter if the tier limit allows. On `Denied` the caller must discard
/// `account` (including any roll) rather than persist it.
pub fn apply_consume(
    account: &mut Account,
    now: DateTime<Utc>,
    policy: &TierPolicy,
) -> ConsumeOutcome {
    account.roll_period(now);

    let limit = account.limit(policy);
    if account.issued_this_period >= limit {
        return ConsumeOutcome::Denied(QuotaDenied {
            tier: account.tier.clone(),
            limit,
            issued: account.issued_this_period,
            period_reset_at: account.period_reset_at,
        });
    }

    account.issued_this_period += 1;
    ConsumeOutcome::Granted(Grant {
        limit,
        issued: account.issued_this_period,
        remaining: limit - account.issued_this_period,
        period_reset_at: account.period_reset_at,
    })
}

/// Return one unit charged in the period ending at `period_reset_at`.
///
/// A refund for a period that has already rolled over is dropped: the
/// counter it would have corrected no longer exists.
pub fn apply_refund(account: &mut Account, period_reset_at: DateTime<Utc>) -> bool {
    if account.period_reset_at != period_reset_at || account.issued_this_period == 0 {
        return false;
    }
    account.issued_this_period -= 1;
    true
}

/// Read-only view of an account's quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub account_id: AccountId,
    pub email: String,
    pub tier: String,
    pub limit: u32,
    pub issued: u32,
    pub remaining: u32,
    pub period_reset_at: DateTime<Utc>,
    /// False when the account has never been stored.
    pub registered: bool,
}

impl QuotaStatus {
    /// Status as of `now`, applying a pending period roll without writing it.
    pub fn of(account: &Account, now: DateTime<Utc>, policy: &TierPolicy, registered: bool) -> Self {
        let mut view = account.clone();
        view.roll_period(now);
        Self {
            account_id: view.account_id.clone(),
            email: view.email.clone(),
            tier: view.tier.clone(),
            limit: view.limit(policy),
            issued: view.issued_this_period,
            remaining: view.remaining(policy),
            period_reset_at: view.period_reset_at,
            registered,
        }
    }
}

/// Quota ledger bound to an account store, tier table and clock.
pub struct QuotaLedger {
    accounts: Arc<dyn AccountStore>,
    policy: Arc<TierPolicy>,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl QuotaLedger {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        policy: Arc<TierPolicy>,
        clock: Arc<dyn Clock>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            accounts,
            policy,
            clock,
            timeouts,
        }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Consume one issuance unit for the account, creating it if needed.
    pub async fn consume(&self, seed: &AccountSeed) -> Result<ConsumeOutcome, ServiceError> {
        let now = self.clock.now();
        bounded(
            "consume",
            self.timeouts.store,
            self.accounts.consume(seed, now, &self.policy),
        )
        .await
    }

    /// Current quota for `seed`; unregistered accounts report a fresh
    /// default-tier allowance.
    pub async fn status(&self, seed: &AccountSeed) -> Result<QuotaStatus, ServiceError> {
        let now = self.clock.now();
        let stored = bounded(
            "get_account",
            self.timeouts.store,
            self.accounts.get(&seed.account_id),
        )
        .await?;

        Ok(match stored {
            Some(account) => QuotaStatus::of(&account, now, &self.policy, true),
            None => QuotaStatus::of(&seed.clone().into_account(now), now, &self.policy, false),
        })
    }
}
