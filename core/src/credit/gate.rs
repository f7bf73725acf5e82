//! Credit gate: credential check followed by an atomic charge

use serde::Serialize;
use tracing::{debug, warn};

use super::ledger::CreditLedger;
use super::verifier::CredentialVerifier;
use crate::error::{CoreError, CoreResult};

/// Operations that cost credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeteredOperation {
    Metadata,
    Train,
    Predict,
}

impl MeteredOperation {
    pub const fn cost(self) -> u64 {
        match self {
            MeteredOperation::Metadata => 1,
            MeteredOperation::Train => 1,
            MeteredOperation::Predict => 5,
        }
    }
}

impl std::fmt::Display for MeteredOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeteredOperation::Metadata => write!(f, "metadata"),
            MeteredOperation::Train => write!(f, "train"),
            MeteredOperation::Predict => write!(f, "predict"),
        }
    }
}

/// Proof that an identity was verified and charged.
///
/// Only [`CreditGate::authorize`] constructs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedIdentity {
    identity: String,
    charged: u64,
    remaining: u64,
}

impl AuthorizedIdentity {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn charged(&self) -> u64 {
        self.charged
    }

    /// Balance right after the charge
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

pub struct CreditGate {
    verifier: CredentialVerifier,
    ledger: CreditLedger,
}

impl CreditGate {
    pub fn new(verifier: CredentialVerifier, ledger: CreditLedger) -> Self {
        Self { verifier, ledger }
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Verify, then charge `cost`. A failed verification never reaches the
    /// ledger. The charge is final even if the caller's operation later fails.
    pub async fn authorize(
        &self,
        identity: &str,
        secret: &str,
        cost: u64,
    ) -> CoreResult<AuthorizedIdentity> {
        if !self.verifier.verify(identity, secret).await? {
            warn!("Rejected credentials for {}", identity);
            return Err(CoreError::Unauthorized);
        }

        let remaining = match self.ledger.try_deduct(identity, cost).await {
            Ok(remaining) => remaining,
            Err(CoreError::InsufficientCredit { balance, cost }) => {
                warn!("{} cannot afford {} credits (balance {})", identity, cost, balance);
                return Err(CoreError::InsufficientCredit { balance, cost });
            }
            // Removed between verification and charge
            Err(CoreError::AccountNotFound(_)) => return Err(CoreError::Unauthorized),
            Err(e) => return Err(e),
        };

        debug!("Authorized {} for {} credits", identity, cost);
        Ok(AuthorizedIdentity {
            identity: identity.to_string(),
            charged: cost,
            remaining,
        })
    }

    pub async fn authorize_operation(
        &self,
        identity: &str,
        secret: &str,
        operation: MeteredOperation,
    ) -> CoreResult<AuthorizedIdentity> {
        debug!("Metering {} for {}", operation, identity);
        self.authorize(identity, secret, operation.cost()).await
    }
}
