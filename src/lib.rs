//! MeterML
//!
//! Command-line entry points for the metered regression service.

pub mod cli;
