//! MeterML API Module
//!
//! HTTP surface of the metered regression service. Metered routes take the
//! caller's credentials as `username` and `password` query parameters, so the
//! service must sit behind TLS termination.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod server;

pub use error::*;
pub use extract::*;
pub use handlers::*;
pub use models::*;
pub use server::*;
