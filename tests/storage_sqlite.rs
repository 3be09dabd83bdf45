//! SQLite storage contract tests.
//!
//! Run with: cargo test --test storage_sqlite --features sqlite
//!
//! Each test opens a fresh database file in a temporary directory, so no
//! external service is required.

mod storage;

use std::sync::Arc;

use tempfile::TempDir;

use photolink::storage::SqliteStore;

/// Set SQLITE_PATH to keep the database somewhere inspectable.
async fn connect_and_init() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = std::env::var("SQLITE_PATH").unwrap_or_else(|_| {
        dir.path()
            .join("photolink.db")
            .to_string_lossy()
            .into_owned()
    });
    println!("Opening: {}", path);

    let store = SqliteStore::connect(&path)
        .await
        .expect("Failed to open SQLite");
    store.init().await.expect("Failed to create tables");
    (dir, Arc::new(store))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_account_store() {
    println!("=== SQLite AccountStore Tests ===");
    let (_dir, store) = connect_and_init().await;
    run_account_store_tests!(store);
    println!("=== All SQLite AccountStore tests PASSED ===");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_token_store() {
    println!("=== SQLite TokenStore Tests ===");
    let (_dir, store) = connect_and_init().await;
    run_token_store_tests!(store);
    println!("=== All SQLite TokenStore tests PASSED ===");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_issuance() {
    println!("=== SQLite Issuance Tests ===");
    let (_dir, store) = connect_and_init().await;
    run_issuance_tests!(store);
    println!("=== All SQLite Issuance tests PASSED ===");
}
