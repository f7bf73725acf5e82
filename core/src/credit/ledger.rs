//! Credit ledger over an [`AccountStore`]

use meterml_databases::AccountStore;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};

/// Sole mutator of account balances
#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn AccountStore>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Subtract `cost` in one indivisible step, or fail with
    /// `InsufficientCredit` and leave the balance as it was
    pub async fn try_deduct(&self, identity: &str, cost: u64) -> CoreResult<u64> {
        let balance = self.store.try_deduct(identity, cost).await?;
        debug!("Deducted {} from {}, balance now {}", cost, identity, balance);
        Ok(balance)
    }

    /// Add at least one credit
    pub async fn credit(&self, identity: &str, amount: u64) -> CoreResult<u64> {
        if amount == 0 {
            return Err(CoreError::InvalidAmount(
                "top-up amount must be at least 1".to_string(),
            ));
        }
        let balance = self.store.credit(identity, amount).await?;
        info!("Credited {} to {}, balance now {}", amount, identity, balance);
        Ok(balance)
    }

    pub async fn balance(&self, identity: &str) -> CoreResult<u64> {
        Ok(self.store.balance(identity).await?)
    }
}
