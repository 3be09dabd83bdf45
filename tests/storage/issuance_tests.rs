//! AtomicIssuance and ReconciliationLog contract.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Barrier;

use photolink::storage::{
    AccountStore, AtomicIssuance, Issuance, OrphanedCharge, ReconciliationLog, Settlement,
    TokenStore,
};
use photolink::tier::TierPolicy;

use super::{at, fresh_seed, month_start, recipient};

// ============================================================================
// Atomic issuance
// ============================================================================

pub async fn test_consume_and_create_couples_both_writes<S>(store: &S)
where
    S: AtomicIssuance + AccountStore + TokenStore,
{
    let seed = fresh_seed();
    let outcome = store
        .consume_and_create(&seed, recipient("Grace"), at(2024, 3, 10), &TierPolicy::default())
        .await
        .unwrap();
    let Issuance::Issued { token, grant } = outcome else {
        panic!("expected issuance, got {:?}", outcome);
    };
    assert_eq!(grant.issued, 1);
    assert_eq!(grant.remaining, 9);
    assert_eq!(token.owner, seed.account_id);
    assert!(token.is_unused());

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 1);
    assert_eq!(
        store.lookup(&token.token_id).await.unwrap().unwrap(),
        token
    );
}

pub async fn test_consume_and_create_denied_creates_nothing<S>(store: &S)
where
    S: AtomicIssuance + AccountStore + TokenStore,
{
    let seed = fresh_seed();
    let policy = TierPolicy::new([("free", 1)]);
    let now = at(2024, 3, 10);

    store
        .consume_and_create(&seed, recipient("First"), now, &policy)
        .await
        .unwrap();
    let outcome = store
        .consume_and_create(&seed, recipient("Second"), now, &policy)
        .await
        .unwrap();
    let Issuance::Denied(denied) = outcome else {
        panic!("expected denial, got {:?}", outcome);
    };
    assert_eq!(denied.limit, 1);
    assert_eq!(denied.period_reset_at, month_start(2024, 4));

    let tokens = store.list_by_owner(&seed.account_id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].recipient.name, "First");
}

/// Racing issuers for the last unit: one token, one charge.
pub async fn test_concurrent_consume_and_create_never_overruns<S>(store: Arc<S>)
where
    S: AtomicIssuance + AccountStore + TokenStore + 'static,
{
    let seed = fresh_seed();
    let policy = Arc::new(TierPolicy::default());
    let now = at(2024, 3, 10);
    for n in 0..9 {
        store
            .consume_and_create(&seed, recipient(&format!("Early{}", n)), now, &policy)
            .await
            .unwrap();
    }

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let mut handles = Vec::new();
    for n in 0..callers {
        let store = Arc::clone(&store);
        let policy = Arc::clone(&policy);
        let barrier = Arc::clone(&barrier);
        let seed = seed.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store
                .consume_and_create(&seed, recipient(&format!("Late{}", n)), now, &policy)
                .await
                .unwrap()
        }));
    }

    let mut issued = 0;
    for handle in handles {
        if let Issuance::Issued { .. } = handle.await.unwrap() {
            issued += 1;
        }
    }
    assert_eq!(issued, 1);

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 10);
    assert_eq!(store.list_by_owner(&seed.account_id).await.unwrap().len(), 10);
}

// ============================================================================
// Reconciliation log
// ============================================================================

pub async fn test_reconciliation_log_pending_until_resolved<S: ReconciliationLog>(store: &S) {
    let account_id = fresh_seed().account_id;
    let first = OrphanedCharge::new(
        account_id.clone(),
        month_start(2024, 4),
        at(2024, 3, 10),
        "create_token: store unavailable",
    );
    let second = OrphanedCharge::new(
        account_id.clone(),
        month_start(2024, 4),
        at(2024, 3, 10) + Duration::minutes(5),
        "create_token: timeout",
    );
    // Recorded out of order; pending comes back oldest first.
    store.record(second.clone()).await.unwrap();
    store.record(first.clone()).await.unwrap();

    let mine = |charges: Vec<OrphanedCharge>| -> Vec<OrphanedCharge> {
        charges
            .into_iter()
            .filter(|c| c.account_id == account_id)
            .collect()
    };

    assert_eq!(
        mine(store.pending().await.unwrap()),
        vec![first.clone(), second.clone()]
    );

    store
        .refund_and_resolve(&first.charge_id, at(2024, 3, 11))
        .await
        .unwrap();
    assert_eq!(mine(store.pending().await.unwrap()), vec![second]);
}

/// Settling refunds the charged unit and resolves the charge together; a
/// second settle of the same charge refunds nothing.
pub async fn test_refund_and_resolve_applies_once<S>(store: &S)
where
    S: ReconciliationLog + AccountStore,
{
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    let now = at(2024, 3, 10);
    store.consume(&seed, now, &policy).await.unwrap();
    store.consume(&seed, now, &policy).await.unwrap();

    let charge = OrphanedCharge::new(
        seed.account_id.clone(),
        month_start(2024, 4),
        now,
        "create_token: store unavailable",
    );
    store.record(charge.clone()).await.unwrap();

    assert_eq!(
        store
            .refund_and_resolve(&charge.charge_id, at(2024, 3, 11))
            .await
            .unwrap(),
        Settlement::Refunded
    );
    assert_eq!(
        store
            .refund_and_resolve(&charge.charge_id, at(2024, 3, 12))
            .await
            .unwrap(),
        Settlement::AlreadyResolved
    );

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 1);
    assert!(!store
        .pending()
        .await
        .unwrap()
        .iter()
        .any(|c| c.charge_id == charge.charge_id));
}

/// A charge from a period that has since rolled is resolved untouched.
pub async fn test_refund_and_resolve_drops_rolled_period<S>(store: &S)
where
    S: ReconciliationLog + AccountStore,
{
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    store.consume(&seed, at(2024, 4, 2), &policy).await.unwrap();

    let charge = OrphanedCharge::new(
        seed.account_id.clone(),
        month_start(2024, 4),
        at(2024, 3, 10),
        "create_token: store unavailable",
    );
    store.record(charge.clone()).await.unwrap();

    assert_eq!(
        store
            .refund_and_resolve(&charge.charge_id, at(2024, 4, 3))
            .await
            .unwrap(),
        Settlement::Dropped
    );
    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 1);
    assert_eq!(account.period_reset_at, month_start(2024, 5));
}

/// Reconcilers racing on one charge refund it exactly once.
pub async fn test_concurrent_refund_and_resolve_refunds_once<S>(store: Arc<S>)
where
    S: ReconciliationLog + AccountStore + 'static,
{
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    let now = at(2024, 3, 10);
    for _ in 0..3 {
        store.consume(&seed, now, &policy).await.unwrap();
    }
    let charge = OrphanedCharge::new(
        seed.account_id.clone(),
        month_start(2024, 4),
        now,
        "create_token: store unavailable",
    );
    store.record(charge.clone()).await.unwrap();

    let callers = 4;
    let barrier = Arc::new(Barrier::new(callers));
    let mut handles = Vec::new();
    for _ in 0..callers {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let charge_id = charge.charge_id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.refund_and_resolve(&charge_id, at(2024, 3, 11)).await.unwrap()
        }));
    }

    let mut refunded = 0;
    for handle in handles {
        if handle.await.unwrap() == Settlement::Refunded {
            refunded += 1;
        }
    }
    assert_eq!(refunded, 1);

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 2);
}

/// Run the AtomicIssuance and ReconciliationLog contract against `Arc<S>`.
#[macro_export]
macro_rules! run_issuance_tests {
    ($store:expr) => {{
        use $crate::storage::issuance_tests::*;
        let store = $store;

        test_consume_and_create_couples_both_writes(&*store).await;
        println!("  test_consume_and_create_couples_both_writes: PASSED");

        test_consume_and_create_denied_creates_nothing(&*store).await;
        println!("  test_consume_and_create_denied_creates_nothing: PASSED");

        test_concurrent_consume_and_create_never_overruns(std::sync::Arc::clone(&store)).await;
        println!("  test_concurrent_consume_and_create_never_overruns: PASSED");

        test_reconciliation_log_pending_until_resolved(&*store).await;
        println!("  test_reconciliation_log_pending_until_resolved: PASSED");

        test_refund_and_resolve_applies_once(&*store).await;
        println!("  test_refund_and_resolve_applies_once: PASSED");

        test_refund_and_resolve_drops_rolled_period(&*store).await;
        println!("  test_refund_and_resolve_drops_rolled_period: PASSED");

        test_concurrent_refund_and_resolve_refunds_once(std::sync::Arc::clone(&store)).await;
        println!("  test_concurrent_refund_and_resolve_refunds_once: PASSED");
    }};
}
