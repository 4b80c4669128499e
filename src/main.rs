//! Activity engine CLI entry point.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::warn;

use activity_engine::cli::{commands, handle_error, Cli, Commands};
use activity_engine::domain::models::Config;
use activity_engine::infrastructure::config::ConfigLoader;
use activity_engine::infrastructure::logging::{cleanup_old_logs, LogConfig, LoggerImpl};

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let loaded = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    loaded.context("Failed to load configuration")
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let log_config = LogConfig::from(&config.logging);
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };
    if let Some(ref dir) = log_config.log_dir {
        if let Err(err) = cleanup_old_logs(dir, log_config.retention_days, Utc::now()).await {
            warn!(error = %err, "log retention cleanup failed");
        }
    }

    let json = cli.json;
    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, json).await,
        Commands::Activity(args) => commands::activity::execute(args, &config, json).await,
        Commands::Event(args) => commands::event::execute(args, &config, json).await,
        Commands::Schedule(args) => commands::schedule::execute(args, &config, json).await,
        Commands::Stats(args) => commands::stats::execute(args, &config, json).await,
        Commands::Rewards(args) => commands::rewards::execute(args, &config, json).await,
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
