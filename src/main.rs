use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use moviedb::cli::{Cli, Command};
use moviedb::config::{load_config, print_schema};
use moviedb::startup;
use moviedb::utils::logger::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(Command::Schema) = cli.command {
        return match print_schema() {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error rendering configuration schema: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(Command::Migrate) => startup::migrate(&config).await,
        _ => startup::run(Arc::new(config)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting.");
            ExitCode::FAILURE
        }
    }
}
