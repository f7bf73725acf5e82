//! Concurrent deduction tests
//!
//! For balance B and N concurrent deductions of cost C, exactly
//! min(N, floor(B / C)) succeed and the final balance is B - C * successes.

use std::sync::Arc;

use futures::future::join_all;
use meterml_databases::{AccountStore, MemoryAccountStore, SqliteAccountStore, StoreError};
use tempfile::TempDir;

async fn run_concurrent_deductions(
    store: Arc<dyn AccountStore>,
    username: &str,
    attempts: usize,
    cost: u64,
) -> (usize, usize) {
    let tasks = (0..attempts).map(|_| {
        let store = Arc::clone(&store);
        let username = username.to_string();
        tokio::spawn(async move { store.try_deduct(&username, cost).await })
    });

    let mut successes = 0;
    let mut denials = 0;
    for outcome in join_all(tasks).await {
        match outcome.expect("task panicked") {
            Ok(_) => successes += 1,
            Err(StoreError::InsufficientCredit { .. }) => denials += 1,
            Err(other) => panic!("unexpected store error: {other}"),
        }
    }
    (successes, denials)
}

async fn assert_no_overdraft(store: Arc<dyn AccountStore>) {
    let cases: [(&str, u64, usize, u64); 4] = [
        ("exact", 50, 10, 5),
        ("remainder", 23, 20, 5),
        ("starved", 3, 8, 5),
        ("plenty", 1_000, 16, 1),
    ];

    for (username, balance, attempts, cost) in cases {
        store.create_account(username, "h", balance).await.unwrap();

        let (successes, denials) =
            run_concurrent_deductions(Arc::clone(&store), username, attempts, cost).await;

        let expected = attempts.min((balance / cost) as usize);
        assert_eq!(successes, expected, "successes for {username}");
        assert_eq!(denials, attempts - expected, "denials for {username}");
        assert_eq!(
            store.balance(username).await.unwrap(),
            balance - cost * successes as u64,
            "final balance for {username}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_store_never_overdraws() {
    assert_no_overdraft(Arc::new(MemoryAccountStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_store_never_overdraws() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("ledger.db").display());
    let store = SqliteAccountStore::connect(&url).await.unwrap();
    assert_no_overdraft(Arc::new(store)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_credit_and_deduct_are_linearizable() {
    let store: Arc<dyn AccountStore> = Arc::new(MemoryAccountStore::new());
    store.create_account("mixed", "h", 0).await.unwrap();

    let credits = (0..20).map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.credit("mixed", 5).await.map(|_| ()) })
    });
    for outcome in join_all(credits).await {
        outcome.unwrap().unwrap();
    }

    let (successes, _) = run_concurrent_deductions(Arc::clone(&store), "mixed", 30, 5).await;
    assert_eq!(successes, 20);
    assert_eq!(store.balance("mixed").await.unwrap(), 0);
}
