//! In-memory storage backend.
//!
//! Each account and token sits in its own `tokio::sync::Mutex` slot. The
//! outer maps are locked only long enough to find or insert a slot, so
//! operations on different keys never wait on each other while operations
//! on the same key run one at a time. Suitable for a single-instance
//! deployment and for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    AccountStore, AtomicIssuance, Issuance, OrphanedCharge, ReconciliationLog, Result, Settlement,
    StorageError, TokenStore, Transition,
};
use crate::ledger::{apply_consume, apply_refund, AccountSeed, ConsumeOutcome};
use crate::model::{Account, AccountId, ImagePair, RecipientMeta, Token, TokenId};
use crate::tier::TierPolicy;

type Slot<T> = Arc<Mutex<T>>;

struct ChargeEntry {
    charge: OrphanedCharge,
    resolved_at: Option<DateTime<Utc>>,
}

/// In-memory document store with per-key serialization.
#[derive(Default)]
pub struct MemoryStore {
    /// A slot may hold `None` while the first consume for an id is creating it.
    accounts: RwLock<HashMap<AccountId, Slot<Option<Account>>>>,
    tokens: RwLock<HashMap<TokenId, Slot<Token>>>,
    charges: Mutex<Vec<ChargeEntry>>,
    fail_on_create: AtomicBool,
    fail_on_redeem: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make token creation fail with `Unavailable`.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Make token redemption fail with `Unavailable`.
    pub fn set_fail_on_redeem(&self, fail: bool) {
        self.fail_on_redeem.store(fail, Ordering::SeqCst);
    }

    /// Store an account as-is, replacing any existing record.
    pub async fn put_account(&self, account: Account) {
        let slot = self.account_slot(&account.account_id).await;
        *slot.lock().await = Some(account);
    }

    async fn account_slot(&self, account_id: &AccountId) -> Slot<Option<Account>> {
        if let Some(slot) = self.accounts.read().await.get(account_id) {
            return Arc::clone(slot);
        }
        let mut accounts = self.accounts.write().await;
        Arc::clone(
            accounts
                .entry(account_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    async fn existing_account_slot(&self, account_id: &AccountId) -> Option<Slot<Option<Account>>> {
        self.accounts.read().await.get(account_id).cloned()
    }

    fn check_create(&self) -> Result<()> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "token creation disabled".to_string(),
            ));
        }
        Ok(())
    }

    async fn insert_token(&self, token: Token) {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.token_id, Arc::new(Mutex::new(token)));
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        match self.existing_account_slot(account_id).await {
            Some(slot) => Ok(slot.lock().await.clone()),
            None => Ok(None),
        }
    }

    async fn insert(&self, account: Account) -> Result<bool> {
        let slot = self.account_slot(&account.account_id).await;
        let mut stored = slot.lock().await;
        if stored.is_some() {
            return Ok(false);
        }
        *stored = Some(account);
        Ok(true)
    }

    async fn set_tier(&self, account_id: &AccountId, tier: &str) -> Result<Option<Account>> {
        let Some(slot) = self.existing_account_slot(account_id).await else {
            return Ok(None);
        };
        let mut stored = slot.lock().await;
        Ok(stored.as_mut().map(|account| {
            account.tier = tier.to_string();
            account.clone()
        }))
    }

    async fn consume(
        &self,
        seed: &AccountSeed,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<ConsumeOutcome> {
        let slot = self.account_slot(&seed.account_id).await;
        let mut stored = slot.lock().await;

        let mut next = stored
            .clone()
            .unwrap_or_else(|| seed.clone().into_account(now));
        let outcome = apply_consume(&mut next, now, policy);
        if outcome.is_granted() {
            *stored = Some(next);
        }
        Ok(outcome)
    }

    async fn refund(
        &self,
        account_id: &AccountId,
        period_reset_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(slot) = self.existing_account_slot(account_id).await else {
            return Ok(false);
        };
        let mut stored = slot.lock().await;
        Ok(stored
            .as_mut()
            .map(|account| apply_refund(account, period_reset_at))
            .unwrap_or(false))
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create(
        &self,
        owner: &AccountId,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
    ) -> Result<Token> {
        self.check_create()?;
        let token = Token::issue(owner.clone(), recipient, now);
        self.insert_token(token.clone()).await;
        Ok(token)
    }

    async fn lookup(&self, token_id: &TokenId) -> Result<Option<Token>> {
        let slot = self.tokens.read().await.get(token_id).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn redeem(
        &self,
        token_id: &TokenId,
        images: ImagePair,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if self.fail_on_redeem.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "token redemption disabled".to_string(),
            ));
        }
        let Some(slot) = self.tokens.read().await.get(token_id).cloned() else {
            return Ok(Transition::NotFound);
        };
        let mut token = slot.lock().await;
        if token.settle(images, now) {
            Ok(Transition::Applied(token.clone()))
        } else {
            Ok(Transition::AlreadyUsed)
        }
    }

    async fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Token>> {
        let slots: Vec<Slot<Token>> = self.tokens.read().await.values().cloned().collect();
        let mut owned = Vec::new();
        for slot in slots {
            let token = slot.lock().await;
            if &token.owner == owner {
                owned.push(token.clone());
            }
        }
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }
}

#[async_trait]
impl AtomicIssuance for MemoryStore {
    async fn consume_and_create(
        &self,
        seed: &AccountSeed,
        recipient: RecipientMeta,
        now: DateTime<Utc>,
        policy: &TierPolicy,
    ) -> Result<Issuance> {
        let slot = self.account_slot(&seed.account_id).await;
        let mut stored = slot.lock().await;

        let mut next = stored
            .clone()
            .unwrap_or_else(|| seed.clone().into_account(now));
        let grant = match apply_consume(&mut next, now, policy) {
            ConsumeOutcome::Granted(grant) => grant,
            ConsumeOutcome::Denied(denied) => return Ok(Issuance::Denied(denied)),
        };

        // Nothing is written until creation is known to succeed, and the
        // account slot stays locked until both writes are done.
        self.check_create()?;
        let token = Token::issue(seed.account_id.clone(), recipient, now);
        self.insert_token(token.clone()).await;
        *stored = Some(next);

        Ok(Issuance::Issued { token, grant })
    }
}

#[async_trait]
impl ReconciliationLog for MemoryStore {
    async fn record(&self, charge: OrphanedCharge) -> Result<()> {
        self.charges.lock().await.push(ChargeEntry {
            charge,
            resolved_at: None,
        });
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<OrphanedCharge>> {
        let charges = self.charges.lock().await;
        Ok(charges
            .iter()
            .filter(|entry| entry.resolved_at.is_none())
            .map(|entry| entry.charge.clone())
            .collect())
    }

    async fn refund_and_resolve(
        &self,
        charge_id: &Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<Settlement> {
        // The log lock is held across the refund so no other settle can
        // observe the charge as pending in between.
        let mut charges = self.charges.lock().await;
        let Some(entry) = charges.iter_mut().find(|entry| {
            &entry.charge.charge_id == charge_id && entry.resolved_at.is_none()
        }) else {
            return Ok(Settlement::AlreadyResolved);
        };

        let refunded = self
            .refund(&entry.charge.account_id, entry.charge.period_reset_at)
            .await?;
        entry.resolved_at = Some(resolved_at);
        Ok(if refunded {
            Settlement::Refunded
        } else {
            Settlement::Dropped
        })
    }
}
