//! Reconciler for orphaned quota charges.
//!
//! Drains the reconciliation log, refunding each charge whose period is
//! still current and marking it resolved in the same store transaction.
//! Charges from a period that has already rolled over are resolved without
//! a refund.

use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{bounded, ServiceError, Timeouts};
use crate::ledger::QuotaLedger;
use crate::storage::{OrphanedCharge, ReconciliationLog, Settlement};
use crate::utils::retry::reconciliation_backoff;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub refunded: usize,
    /// Resolved without a refund (period already rolled, or counter at 0).
    pub dropped: usize,
    /// Left pending for the next pass.
    pub failed: usize,
}

pub struct Reconciler {
    ledger: Arc<QuotaLedger>,
    log: Arc<dyn ReconciliationLog>,
    timeouts: Timeouts,
    interval: Duration,
}

impl Reconciler {
    pub fn new(ledger: Arc<QuotaLedger>, log: Arc<dyn ReconciliationLog>, timeouts: Timeouts) -> Self {
        Self {
            ledger,
            log,
            timeouts,
            interval: Duration::from_secs(300),
        }
    }

    /// Set custom pass interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn periodic reconciliation as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(report) if report == ReconcileReport::default() => {}
                    Ok(report) => info!(
                        target: "photolink::reconciliation",
                        refunded = report.refunded,
                        dropped = report.dropped,
                        failed = report.failed,
                        "Reconciliation pass complete"
                    ),
                    Err(e) => warn!(
                        target: "photolink::reconciliation",
                        error = %e,
                        "Reconciliation pass failed"
                    ),
                }
            }
        })
    }

    /// Process every pending charge once.
    pub async fn run_once(&self) -> Result<ReconcileReport, ServiceError> {
        let pending = bounded("pending_charges", self.timeouts.store, self.log.pending()).await?;
        let mut report = ReconcileReport::default();

        for charge in pending {
            match self.settle(&charge).await {
                Ok(Settlement::Refunded) => report.refunded += 1,
                Ok(Settlement::Dropped) => report.dropped += 1,
                Ok(Settlement::AlreadyResolved) => {}
                Err(e) => {
                    warn!(
                        target: "photolink::reconciliation",
                        charge_id = %charge.charge_id,
                        account_id = %charge.account_id,
                        error = %e,
                        "Failed to reconcile orphaned charge"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn settle(&self, charge: &OrphanedCharge) -> Result<Settlement, ServiceError> {
        let settlement = (|| async {
            bounded(
                "settle_charge",
                self.timeouts.store,
                self.log.refund_and_resolve(&charge.charge_id, self.ledger.now()),
            )
            .await
        })
        .retry(reconciliation_backoff())
        .when(ServiceError::is_retryable)
        .await?;

        info!(
            target: "photolink::reconciliation",
            charge_id = %charge.charge_id,
            account_id = %charge.account_id,
            settlement = ?settlement,
            "Orphaned charge resolved"
        );
        Ok(settlement)
    }
}
