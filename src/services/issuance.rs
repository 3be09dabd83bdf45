//! Issuance service: quota consumption coupled with token creation.
//!
//! When the store spans accounts and tokens in one transaction the charge
//! and the token are committed together. Otherwise the charge is committed
//! first; if creating the token then fails, the orphaned charge is written
//! to the reconciliation log and the caller gets a retryable error. A
//! timed-out create may still have committed, so it is never refunded.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{bounded, ServiceError, Timeouts};
use crate::identity::Identity;
use crate::ledger::{ConsumeOutcome, Grant, QuotaDenied, QuotaLedger};
use crate::model::{RecipientMeta, Token};
use crate::storage::{
    AtomicIssuance, Issuance, OrphanedCharge, ReconciliationLog, Storage, TokenStore,
};

/// A freshly issued upload link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedLink {
    pub token: Token,
    pub limit: u32,
    pub remaining: u32,
}

impl IssuedLink {
    fn new(token: Token, grant: &Grant) -> Self {
        Self {
            token,
            limit: grant.limit,
            remaining: grant.remaining,
        }
    }
}

/// Result of an issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(IssuedLink),
    /// Quota exhausted; no token was created.
    Denied(QuotaDenied),
}

/// Issues upload tokens against an account's monthly quota.
pub struct IssuanceService {
    ledger: Arc<QuotaLedger>,
    tokens: Arc<dyn TokenStore>,
    atomic: Option<Arc<dyn AtomicIssuance>>,
    reconciliation: Arc<dyn ReconciliationLog>,
    timeouts: Timeouts,
}

impl IssuanceService {
    pub fn new(ledger: Arc<QuotaLedger>, storage: &Storage, timeouts: Timeouts) -> Self {
        Self {
            ledger,
            tokens: Arc::clone(&storage.tokens),
            atomic: storage.atomic_issuance.clone(),
            reconciliation: Arc::clone(&storage.reconciliation),
            timeouts,
        }
    }

    /// Issue a link for a verified caller.
    pub async fn issue_link(
        &self,
        caller: &Identity,
        recipient: RecipientMeta,
    ) -> Result<IssueOutcome, ServiceError> {
        let outcome = match &self.atomic {
            Some(atomic) => self.issue_atomic(atomic.as_ref(), caller, recipient).await?,
            None => self.issue_compensating(caller, recipient).await?,
        };

        match &outcome {
            IssueOutcome::Issued(link) => info!(
                account_id = %caller.account_id,
                token_id = %link.token.token_id,
                limit = link.limit,
                remaining = link.remaining,
                "Issued upload link"
            ),
            IssueOutcome::Denied(denied) => info!(
                account_id = %caller.account_id,
                tier = %denied.tier,
                limit = denied.limit,
                issued = denied.issued,
                "Issuance denied: {}",
                denied
            ),
        }
        Ok(outcome)
    }

    async fn issue_atomic(
        &self,
        atomic: &dyn AtomicIssuance,
        caller: &Identity,
        recipient: RecipientMeta,
    ) -> Result<IssueOutcome, ServiceError> {
        let seed = caller.seed();
        let now = self.ledger.now();
        let issuance = bounded(
            "consume_and_create",
            self.timeouts.store,
            atomic.consume_and_create(&seed, recipient, now, self.ledger.policy()),
        )
        .await?;

        Ok(match issuance {
            Issuance::Issued { token, grant } => IssueOutcome::Issued(IssuedLink::new(token, &grant)),
            Issuance::Denied(denied) => IssueOutcome::Denied(denied),
        })
    }

    async fn issue_compensating(
        &self,
        caller: &Identity,
        recipient: RecipientMeta,
    ) -> Result<IssueOutcome, ServiceError> {
        let seed = caller.seed();
        let grant = match self.ledger.consume(&seed).await? {
            ConsumeOutcome::Granted(grant) => grant,
            ConsumeOutcome::Denied(denied) => return Ok(IssueOutcome::Denied(denied)),
        };

        let now = self.ledger.now();
        let created = bounded(
            "create_token",
            self.timeouts.store,
            self.tokens.create(&caller.account_id, recipient, now),
        )
        .await;

        match created {
            Ok(token) => {
                debug!(token_id = %token.token_id, "Token created after separate charge");
                Ok(IssueOutcome::Issued(IssuedLink::new(token, &grant)))
            }
            Err(e @ ServiceError::Timeout { .. }) => {
                // The token may exist; refunding the unit could overrun the limit.
                warn!(
                    target: "photolink::reconciliation",
                    account_id = %caller.account_id,
                    period_reset_at = %grant.period_reset_at,
                    error = %e,
                    "Token creation outcome unknown, charge kept"
                );
                Err(e)
            }
            Err(e) => {
                self.record_orphaned_charge(caller, &grant, &e).await;
                Err(e)
            }
        }
    }

    async fn record_orphaned_charge(&self, caller: &Identity, grant: &Grant, cause: &ServiceError) {
        let charge = OrphanedCharge::new(
            caller.account_id.clone(),
            grant.period_reset_at,
            self.ledger.now(),
            cause.to_string(),
        );
        let charge_id = charge.charge_id;

        warn!(
            target: "photolink::reconciliation",
            account_id = %caller.account_id,
            charge_id = %charge_id,
            period_reset_at = %grant.period_reset_at,
            error = %cause,
            "Quota charged but token creation failed"
        );

        let recorded = bounded(
            "record_orphaned_charge",
            self.timeouts.store,
            self.reconciliation.record(charge),
        )
        .await;
        if let Err(e) = recorded {
            error!(
                target: "photolink::reconciliation",
                account_id = %caller.account_id,
                charge_id = %charge_id,
                error = %e,
                "Failed to record orphaned charge"
            );
        }
    }
}
