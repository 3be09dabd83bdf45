//! TokenStore contract.

use std::sync::Arc;

use tokio::sync::Barrier;

use photolink::model::{ImagePair, TokenId, TokenStatus};
use photolink::storage::{TokenStore, Transition};

use super::{at, fresh_seed, recipient};

pub async fn test_create_and_lookup<S: TokenStore>(store: &S) {
    let owner = fresh_seed().account_id;
    let created = store
        .create(&owner, recipient("Grace"), at(2024, 3, 10))
        .await
        .unwrap();
    assert_eq!(created.status(), TokenStatus::Unused);
    assert!(created.images().is_none());

    let found = store.lookup(&created.token_id).await.unwrap().unwrap();
    assert_eq!(found, created);
    assert_eq!(found.owner, owner);
    assert_eq!(found.recipient.bank_name.as_deref(), Some("First Savings"));

    assert!(store
        .lookup(&TokenId::generate())
        .await
        .unwrap()
        .is_none());
}

pub async fn test_redeem_applies_once<S: TokenStore>(store: &S) {
    let owner = fresh_seed().account_id;
    let token = store
        .create(&owner, recipient("Ada"), at(2024, 3, 10))
        .await
        .unwrap();

    let first = ImagePair::new("https://cdn/t/front", "https://cdn/t/back");
    let applied = store
        .redeem(&token.token_id, first.clone(), at(2024, 3, 11))
        .await
        .unwrap();
    let Transition::Applied(used) = applied else {
        panic!("expected first redemption to apply, got {:?}", applied);
    };
    assert_eq!(used.images(), Some(&first));
    assert_eq!(used.redeemed_at(), Some(at(2024, 3, 11)));

    let second = ImagePair::new("https://cdn/t/x", "https://cdn/t/y");
    assert_eq!(
        store
            .redeem(&token.token_id, second, at(2024, 3, 12))
            .await
            .unwrap(),
        Transition::AlreadyUsed
    );

    // The first submission's images stay attached.
    let stored = store.lookup(&token.token_id).await.unwrap().unwrap();
    assert_eq!(stored.status(), TokenStatus::Used);
    assert_eq!(stored.images(), Some(&first));
    assert_eq!(stored.created_at, at(2024, 3, 10));
}

pub async fn test_redeem_unknown_token<S: TokenStore>(store: &S) {
    let images = ImagePair::new("https://cdn/a", "https://cdn/b");
    assert_eq!(
        store
            .redeem(&TokenId::generate(), images, at(2024, 3, 10))
            .await
            .unwrap(),
        Transition::NotFound
    );
}

pub async fn test_list_by_owner_newest_first<S: TokenStore>(store: &S) {
    let owner = fresh_seed().account_id;
    let other = fresh_seed().account_id;

    let oldest = store.create(&owner, recipient("One"), at(2024, 3, 1)).await.unwrap();
    let newest = store.create(&owner, recipient("Three"), at(2024, 3, 20)).await.unwrap();
    let middle = store.create(&owner, recipient("Two"), at(2024, 3, 9)).await.unwrap();
    store.create(&other, recipient("Elsewhere"), at(2024, 3, 5)).await.unwrap();

    let ids: Vec<_> = store
        .list_by_owner(&owner)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.token_id)
        .collect();
    assert_eq!(ids, vec![newest.token_id, middle.token_id, oldest.token_id]);

    let nobody = fresh_seed().account_id;
    assert!(store.list_by_owner(&nobody).await.unwrap().is_empty());
}

/// Concurrent redemptions of one token; exactly one applies.
pub async fn test_concurrent_redeem_exactly_one<S: TokenStore + 'static>(store: Arc<S>) {
    let owner = fresh_seed().account_id;
    let token = store
        .create(&owner, recipient("Race"), at(2024, 3, 10))
        .await
        .unwrap();

    let callers = 6;
    let barrier = Arc::new(Barrier::new(callers));
    let mut handles = Vec::new();
    for n in 0..callers {
        let store = Arc::clone(&store);
        let barrier = Arc::clone(&barrier);
        let token_id = token.token_id;
        handles.push(tokio::spawn(async move {
            let images = ImagePair::new(
                format!("https://cdn/{}/front", n),
                format!("https://cdn/{}/back", n),
            );
            barrier.wait().await;
            (
                images.clone(),
                store.redeem(&token_id, images, at(2024, 3, 11)).await.unwrap(),
            )
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (images, transition) = handle.await.unwrap();
        match transition {
            Transition::Applied(_) => winners.push(images),
            Transition::AlreadyUsed => {}
            Transition::NotFound => panic!("token vanished during the race"),
        }
    }
    assert_eq!(winners.len(), 1, "exactly one redemption should apply");

    let stored = store.lookup(&token.token_id).await.unwrap().unwrap();
    assert_eq!(stored.images(), Some(&winners[0]));
}

/// Run the TokenStore contract against `Arc<S>`.
#[macro_export]
macro_rules! run_token_store_tests {
    ($store:expr) => {{
        use $crate::storage::token_store_tests::*;
        let store = $store;

        test_create_and_lookup(&*store).await;
        println!("  test_create_and_lookup: PASSED");

        test_redeem_applies_once(&*store).await;
        println!("  test_redeem_applies_once: PASSED");

        test_redeem_unknown_token(&*store).await;
        println!("  test_redeem_unknown_token: PASSED");

        test_list_by_owner_newest_first(&*store).await;
        println!("  test_list_by_owner_newest_first: PASSED");

        test_concurrent_redeem_exactly_one(std::sync::Arc::clone(&store)).await;
        println!("  test_concurrent_redeem_exactly_one: PASSED");
    }};
}
