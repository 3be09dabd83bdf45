//! In-memory storage contract tests.
//!
//! Run with: cargo test --test storage_memory

mod storage;

use std::sync::Arc;

use photolink::storage::MemoryStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_account_store() {
    println!("=== Memory AccountStore Tests ===");
    run_account_store_tests!(Arc::new(MemoryStore::new()));
    println!("=== All Memory AccountStore tests PASSED ===");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_token_store() {
    println!("=== Memory TokenStore Tests ===");
    run_token_store_tests!(Arc::new(MemoryStore::new()));
    println!("=== All Memory TokenStore tests PASSED ===");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_issuance() {
    println!("=== Memory Issuance Tests ===");
    run_issuance_tests!(Arc::new(MemoryStore::new()));
    println!("=== All Memory Issuance tests PASSED ===");
}
