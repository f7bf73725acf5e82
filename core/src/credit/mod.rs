//! Credit metering: credential verification, the balance ledger and the gate
//! every metered operation passes through

pub mod gate;
pub mod ledger;
pub mod verifier;

pub use gate::{AuthorizedIdentity, CreditGate, MeteredOperation};
pub use ledger::CreditLedger;
pub use verifier::CredentialVerifier;
