use endless_key::cli::{Cli, Command};
use endless_key::commands;
use endless_key::error::AppError;
use endless_key::logger::initialize as LoggerInitialize;

use host_core::config::{HostConfig, resolve_host_paths};
use host_core::error::CoreError;
use host_core::runtime::HomeLayoutInitializer;
use host_core::runtime::home::LOGS_DIR;

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    // Before path resolution so ENDLESS_KEY_HOME may come from .env
    let env_file = dotenvy::dotenv().ok();

    let paths = resolve_host_paths().map_err(CoreError::from)?;

    let log_dir = paths.home.join(LOGS_DIR);
    create_dir_all(&log_dir).map_err(|e| AppError::App {
        message: format!("Failed to create log directory: {e}"),
        location: ErrorLocation::here(),
    })?;

    LoggerInitialize(&log_dir)?;

    info!("Endless Key host starting");
    if let Some(path) = env_file {
        info!("Loaded .env from {}", path.display());
    }
    info!("Home: {} ({})", paths.home.display(), paths.source);

    let config = HostConfig::load(&paths.config_dir).map_err(CoreError::from)?;

    match cli.command() {
        Command::Serve => commands::serve::run(&paths, &config).await,
        Command::Import { archive } => {
            commands::import::run(
                &archive,
                &paths.home,
                Arc::new(HomeLayoutInitializer::new(config.setup.clone())),
                commands::import::options_from_config(&config),
            )
            .await?;
            Ok(())
        }
        Command::Url { wait_secs } => {
            let url =
                commands::url::run(&paths.endpoint_file(), Duration::from_secs(wait_secs)).await?;
            println!("{url}");
            Ok(())
        }
    }
}
