//! CLI command dispatch

use meterml_api::{ApiConfig, ApiServer};
use meterml_core::{AccountSummary, MeteredService, ServiceConfig};
use std::sync::Arc;
use tracing::info;

use crate::cli::args::{Cli, Command, ServeArgs, UserCommand};
use crate::cli::{Error, Result, EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_REJECTED, EXIT_SUCCESS};

/// Exit code wrapper for CLI operations
pub type ExitCode = i32;

/// Map a command result onto a process exit code
pub fn exit_code(result: &Result<()>) -> ExitCode {
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(Error::Config(_)) | Err(Error::Logging(_)) => EXIT_CONFIG_ERROR,
        Err(Error::Service(e)) if e.is_client_error() => EXIT_REJECTED,
        Err(_) => EXIT_FAILURE,
    }
}

/// Load configuration with command-line overrides applied
pub fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config =
        ServiceConfig::load(cli.config.as_deref()).map_err(|e| Error::Config(format!("{e:#}")))?;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Command::Serve(ServeArgs { host, port }) = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    Ok(config)
}

/// Run one command against `config`, writing results to `out`
pub async fn run(cli: Cli, config: ServiceConfig, out: &mut dyn std::io::Write) -> Result<()> {
    match cli.command {
        Command::InitConfig { path, force } => {
            if path.exists() && !force {
                return Err(Error::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )));
            }
            config
                .save(&path)
                .map_err(|e| Error::Config(format!("{e:#}")))?;
            writeln!(out, "Wrote configuration to {}", path.display())?;
        }
        Command::Serve(_) => {
            let service = connect(&config).await?;
            let server = ApiServer::new(ApiConfig::from(&config.server), service);
            server
                .start()
                .await
                .map_err(|e| Error::Server(format!("{e:#}")))?;
        }
        Command::User(UserCommand::Add {
            username,
            password,
            balance,
        }) => {
            let account = connect(&config)
                .await?
                .register(&username, &password, balance)
                .await?;
            print_account(out, &account, cli.json)?;
        }
        Command::User(UserCommand::Remove { username }) => {
            connect(&config).await?.remove(&username).await?;
            if cli.json {
                writeln!(out, "{}", serde_json::json!({ "removed": username }))?;
            } else {
                writeln!(out, "Removed {username}")?;
            }
        }
        Command::User(UserCommand::List) => {
            let accounts = connect(&config).await?.list_accounts().await?;
            if cli.json {
                writeln!(out, "{}", serde_json::to_string(&accounts)?)?;
            } else if accounts.is_empty() {
                writeln!(out, "No accounts")?;
            } else {
                for account in &accounts {
                    writeln!(out, "{:<24} {:>10}", account.username, account.balance)?;
                }
            }
        }
        Command::Topup { username, amount } => {
            let balance = connect(&config).await?.top_up(&username, amount).await?;
            print_account(out, &AccountSummary { username, balance }, cli.json)?;
        }
        Command::Balance { username } => {
            let balance = connect(&config).await?.balance(&username).await?;
            print_account(out, &AccountSummary { username, balance }, cli.json)?;
        }
    }

    Ok(())
}

async fn connect(config: &ServiceConfig) -> Result<Arc<MeteredService>> {
    let service = MeteredService::build(config).await?;
    info!(
        "Service ready (accounts: {}, artifact: {})",
        config.storage.database_url,
        config.storage.artifact_path.display()
    );
    Ok(Arc::new(service))
}

fn print_account(out: &mut dyn std::io::Write, account: &AccountSummary, json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string(account)?)?;
    } else {
        writeln!(out, "{}: {} credits", account.username, account.balance)?;
    }
    Ok(())
}
