//! MeterML Databases Module
//!
//! Account persistence for the credit ledger. Two backends implement the
//! [`AccountStore`] contract:
//! - [`MemoryAccountStore`]: in-process per-key lock table
//! - [`SqliteAccountStore`]: durable store with conditional single-statement updates
//!
//! Both backends make `try_deduct` a single indivisible read-compare-subtract
//! step per identity, and neither serializes unrelated identities behind one lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryAccountStore;
pub use sqlite::SqliteAccountStore;

/// Errors raised by account stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("Insufficient credit: balance {balance}, cost {cost}")]
    InsufficientCredit { balance: u64, cost: u64 },

    #[error("Balance overflow for account: {0}")]
    BalanceOverflow(String),

    #[error("Database error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Public view of an account (the credential hash is never listed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Unique identity
    pub username: String,
    /// Current credit balance
    pub balance: u64,
}

/// Persistence contract for accounts and their balances
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account with an already-hashed credential
    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        balance: u64,
    ) -> StoreResult<AccountSummary>;

    /// Delete an account and its balance
    async fn remove_account(&self, username: &str) -> StoreResult<()>;

    /// Stored credential hash, or `None` for an unknown identity
    async fn credential(&self, username: &str) -> StoreResult<Option<String>>;

    /// Current balance
    async fn balance(&self, username: &str) -> StoreResult<u64>;

    /// Atomically subtract `cost` if the balance covers it, returning the new balance.
    ///
    /// On `InsufficientCredit` the balance is unchanged.
    async fn try_deduct(&self, username: &str, cost: u64) -> StoreResult<u64>;

    /// Atomically add `amount`, returning the new balance
    async fn credit(&self, username: &str, amount: u64) -> StoreResult<u64>;

    /// All accounts ordered by username
    async fn list_accounts(&self) -> StoreResult<Vec<AccountSummary>>;
}
