//! AccountStore contract.

use std::sync::Arc;

use tokio::sync::Barrier;

use photolink::ledger::ConsumeOutcome;
use photolink::storage::AccountStore;
use photolink::tier::TierPolicy;

use super::{at, fresh_seed, month_start};

// ============================================================================
// Consume
// ============================================================================

pub async fn test_consume_creates_account_on_default_tier<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let policy = TierPolicy::default();

    let outcome = store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    let ConsumeOutcome::Granted(grant) = outcome else {
        panic!("expected grant, got {:?}", outcome);
    };
    assert_eq!(grant.limit, 10);
    assert_eq!(grant.issued, 1);
    assert_eq!(grant.remaining, 9);
    assert_eq!(grant.period_reset_at, month_start(2024, 4));

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.tier, "free");
    assert_eq!(account.issued_this_period, 1);
    assert_eq!(account.email, seed.email);
}

pub async fn test_consume_counts_to_limit_then_denies<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    let now = at(2024, 3, 10);

    for expected in 1..=10 {
        match store.consume(&seed, now, &policy).await.unwrap() {
            ConsumeOutcome::Granted(grant) => assert_eq!(grant.issued, expected),
            other => panic!("unit {} denied: {:?}", expected, other),
        }
    }

    let denied = store.consume(&seed, now, &policy).await.unwrap();
    let ConsumeOutcome::Denied(denied) = denied else {
        panic!("expected denial, got {:?}", denied);
    };
    assert_eq!(denied.tier, "free");
    assert_eq!(denied.limit, 10);
    assert_eq!(denied.issued, 10);

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 10);
}

pub async fn test_consume_rolls_period_once<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let policy = TierPolicy::default();

    for _ in 0..10 {
        store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    }

    // Dormant through April; the next boundary is June 1st, not May 1st.
    let outcome = store.consume(&seed, at(2024, 5, 20), &policy).await.unwrap();
    let ConsumeOutcome::Granted(grant) = outcome else {
        panic!("expected grant after the period rolled, got {:?}", outcome);
    };
    assert_eq!(grant.issued, 1);

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 1);
    assert_eq!(account.period_reset_at, month_start(2024, 6));
}

pub async fn test_denied_consume_persists_nothing<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let mut account = seed.clone().into_account(at(2024, 3, 1));
    account.tier = "legacy".to_string();
    assert!(store.insert(account.clone()).await.unwrap());

    // Unknown tiers have no allowance; the period roll must not be written.
    let outcome = store
        .consume(&seed, at(2024, 5, 2), &TierPolicy::default())
        .await
        .unwrap();
    assert!(!outcome.is_granted());
    assert_eq!(store.get(&seed.account_id).await.unwrap().unwrap(), account);
}

// ============================================================================
// Account management
// ============================================================================

pub async fn test_insert_refuses_existing_account<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let account = seed.clone().into_account(at(2024, 3, 1));
    assert!(store.insert(account.clone()).await.unwrap());

    let mut other = account.clone();
    other.tier = "premium".to_string();
    assert!(!store.insert(other).await.unwrap());
    assert_eq!(store.get(&seed.account_id).await.unwrap().unwrap(), account);
}

pub async fn test_set_tier_keeps_counter_and_boundary<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    for _ in 0..3 {
        store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    }
    let before = store.get(&seed.account_id).await.unwrap().unwrap();

    let updated = store
        .set_tier(&seed.account_id, "premium")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.tier, "premium");
    assert_eq!(updated.issued_this_period, 3);
    assert_eq!(updated.period_reset_at, before.period_reset_at);

    let missing = fresh_seed();
    assert!(store
        .set_tier(&missing.account_id, "basic")
        .await
        .unwrap()
        .is_none());
}

pub async fn test_refund_only_in_charged_period<S: AccountStore>(store: &S) {
    let seed = fresh_seed();
    let policy = TierPolicy::default();
    let outcome = store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    let ConsumeOutcome::Granted(first) = outcome else {
        panic!("expected grant, got {:?}", outcome);
    };
    store.consume(&seed, at(2024, 3, 11), &policy).await.unwrap();

    assert!(store
        .refund(&seed.account_id, first.period_reset_at)
        .await
        .unwrap());
    assert_eq!(
        store
            .get(&seed.account_id)
            .await
            .unwrap()
            .unwrap()
            .issued_this_period,
        1
    );

    // A unit from a period that already rolled is not returned.
    store.consume(&seed, at(2024, 4, 3), &policy).await.unwrap();
    assert!(!store
        .refund(&seed.account_id, first.period_reset_at)
        .await
        .unwrap());
    assert_eq!(
        store
            .get(&seed.account_id)
            .await
            .unwrap()
            .unwrap()
            .issued_this_period,
        1
    );
}

// ============================================================================
// Concurrency
// ============================================================================

/// Many callers race for the last unit; exactly one wins.
pub async fn test_concurrent_consume_never_overruns<S: AccountStore + 'static>(store: Arc<S>) {
    let seed = fresh_seed();
    let policy = Arc::new(TierPolicy::default());
    let now = at(2024, 3, 10);
    for _ in 0..9 {
        store.consume(&seed, now, &policy).await.unwrap();
    }

    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));
    let mut handles = Vec::new();
    for _ in 0..callers {
        let store = Arc::clone(&store);
        let policy = Arc::clone(&policy);
        let barrier = Arc::clone(&barrier);
        let seed = seed.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.consume(&seed, now, &policy).await.unwrap()
        }));
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_granted() {
            granted += 1;
        }
    }
    assert_eq!(granted, 1, "exactly one caller should get the last unit");

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, 10);
}

/// Racing callers all arrive after the boundary of a full period: the
/// counter resets once and every caller is charged against the new period.
pub async fn test_concurrent_roll_resets_once<S: AccountStore + 'static>(store: Arc<S>) {
    let seed = fresh_seed();
    let policy = Arc::new(TierPolicy::default());
    for _ in 0..10 {
        store.consume(&seed, at(2024, 3, 10), &policy).await.unwrap();
    }

    let callers = 6;
    let after_boundary = at(2024, 4, 2);
    let barrier = Arc::new(Barrier::new(callers));
    let mut handles = Vec::new();
    for _ in 0..callers {
        let store = Arc::clone(&store);
        let policy = Arc::clone(&policy);
        let barrier = Arc::clone(&barrier);
        let seed = seed.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            store.consume(&seed, after_boundary, &policy).await.unwrap()
        }));
    }

    let mut issued = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            ConsumeOutcome::Granted(grant) => {
                assert_eq!(grant.period_reset_at, month_start(2024, 5));
                issued.push(grant.issued);
            }
            ConsumeOutcome::Denied(denied) => panic!("unexpected denial: {:?}", denied),
        }
    }
    issued.sort_unstable();
    assert_eq!(issued, (1..=callers as u32).collect::<Vec<_>>());

    let account = store.get(&seed.account_id).await.unwrap().unwrap();
    assert_eq!(account.issued_this_period, callers as u32);
    assert_eq!(account.period_reset_at, month_start(2024, 5));
}

/// Run the AccountStore contract against `Arc<S>`.
#[macro_export]
macro_rules! run_account_store_tests {
    ($store:expr) => {{
        use $crate::storage::account_store_tests::*;
        let store = $store;

        test_consume_creates_account_on_default_tier(&*store).await;
        println!("  test_consume_creates_account_on_default_tier: PASSED");

        test_consume_counts_to_limit_then_denies(&*store).await;
        println!("  test_consume_counts_to_limit_then_denies: PASSED");

        test_consume_rolls_period_once(&*store).await;
        println!("  test_consume_rolls_period_once: PASSED");

        test_denied_consume_persists_nothing(&*store).await;
        println!("  test_denied_consume_persists_nothing: PASSED");

        test_insert_refuses_existing_account(&*store).await;
        println!("  test_insert_refuses_existing_account: PASSED");

        test_set_tier_keeps_counter_and_boundary(&*store).await;
        println!("  test_set_tier_keeps_counter_and_boundary: PASSED");

        test_refund_only_in_charged_period(&*store).await;
        println!("  test_refund_only_in_charged_period: PASSED");

        test_concurrent_consume_never_overruns(std::sync::Arc::clone(&store)).await;
        println!("  test_concurrent_consume_never_overruns: PASSED");

        test_concurrent_roll_resets_once(std::sync::Arc::clone(&store)).await;
        println!("  test_concurrent_roll_resets_once: PASSED");
    }};
}
