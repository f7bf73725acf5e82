//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Metered regression service
#[derive(Debug, Parser)]
#[command(name = "meterml", version, about)]
pub struct Cli {
    /// TOML configuration file (defaults to ./meterml.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `meterml_core=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print command results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeArgs),

    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Add credit to an account
    Topup {
        username: String,
        amount: u64,
    },

    /// Show an account's balance
    Balance { username: String },

    /// Write the effective configuration to a TOML file
    InitConfig {
        #[arg(long, default_value = "meterml.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override `server.host`
    #[arg(long)]
    pub host: Option<String>,

    /// Override `server.port`
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create an account
    Add {
        username: String,

        #[arg(long)]
        password: String,

        /// Starting credit
        #[arg(long, default_value_t = 0)]
        balance: u64,
    },

    /// Delete an account
    Remove { username: String },

    /// List accounts and balances
    List,
}
