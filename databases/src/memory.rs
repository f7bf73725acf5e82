//! In-process account store
//!
//! Accounts live in a `DashMap` of per-account mutexes. The map shard lock is
//! held only long enough to clone the account handle; the balance itself is
//! guarded by the account's own mutex, so deductions on different identities
//! never wait on each other.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::{AccountStore, AccountSummary, StoreError, StoreResult};

#[derive(Debug)]
struct AccountCell {
    password_hash: String,
    balance: u64,
    /// Set under the lock when the account is removed, so a handle cloned
    /// before removal can no longer be charged.
    removed: bool,
}

/// Account store backed by a per-key lock table
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Arc<Mutex<AccountCell>>>,
}

impl MemoryAccountStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, username: &str) -> StoreResult<Arc<Mutex<AccountCell>>> {
        self.accounts
            .get(username)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))
    }

    /// Lock a live account. A poisoned mutex still holds a consistent balance
    /// because every mutation below is a single assignment.
    fn lock<'a>(
        cell: &'a Mutex<AccountCell>,
        username: &str,
    ) -> StoreResult<MutexGuard<'a, AccountCell>> {
        let guard = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.removed {
            return Err(StoreError::AccountNotFound(username.to_string()));
        }
        Ok(guard)
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
        balance: u64,
    ) -> StoreResult<AccountSummary> {
        match self.accounts.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AccountExists(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(AccountCell {
                    password_hash: password_hash.to_string(),
                    balance,
                    removed: false,
                })));
                debug!("Created in-memory account: {username}");
                Ok(AccountSummary {
                    username: username.to_string(),
                    balance,
                })
            }
        }
    }

    async fn remove_account(&self, username: &str) -> StoreResult<()> {
        let (_, cell) = self
            .accounts
            .remove(username)
            .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))?;
        let mut guard = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.removed = true;
        debug!("Removed in-memory account: {username}");
        Ok(())
    }

    async fn credential(&self, username: &str) -> StoreResult<Option<String>> {
        let Ok(cell) = self.handle(username) else {
            return Ok(None);
        };
        let guard = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok((!guard.removed).then(|| guard.password_hash.clone()))
    }

    async fn balance(&self, username: &str) -> StoreResult<u64> {
        let cell = self.handle(username)?;
        let guard = Self::lock(&cell, username)?;
        Ok(guard.balance)
    }

    async fn try_deduct(&self, username: &str, cost: u64) -> StoreResult<u64> {
        let cell = self.handle(username)?;
        let mut guard = Self::lock(&cell, username)?;
        if guard.balance < cost {
            return Err(StoreError::InsufficientCredit {
                balance: guard.balance,
                cost,
            });
        }
        guard.balance -= cost;
        Ok(guard.balance)
    }

    async fn credit(&self, username: &str, amount: u64) -> StoreResult<u64> {
        let cell = self.handle(username)?;
        let mut guard = Self::lock(&cell, username)?;
        guard.balance = guard
            .balance
            .checked_add(amount)
            .ok_or_else(|| StoreError::BalanceOverflow(username.to_string()))?;
        Ok(guard.balance)
    }

    async fn list_accounts(&self) -> StoreResult<Vec<AccountSummary>> {
        let handles: Vec<(String, Arc<Mutex<AccountCell>>)> = self
            .accounts
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut accounts: Vec<AccountSummary> = handles
            .into_iter()
            .filter_map(|(username, cell)| {
                let guard = cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                (!guard.removed).then(|| AccountSummary {
                    username,
                    balance: guard.balance,
                })
            })
            .collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(accounts)
    }
}
