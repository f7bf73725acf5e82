//! MeterML binary

use clap::Parser;
use meterml::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let config = match cli::dispatch::load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(cli::EXIT_CONFIG_ERROR);
        }
    };

    let log_guard = match cli::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(cli::EXIT_CONFIG_ERROR);
        }
    };

    let mut stdout = std::io::stdout();
    let result = cli::run(args, config, &mut stdout).await;
    if let Err(e) = &result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
    }

    let code = cli::exit_code(&result);
    drop(log_guard);
    std::process::exit(code);
}
