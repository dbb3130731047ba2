//! collective-worker entry point.

use clap::Parser;

use collective_worker::cli::commands::{maintenance, migrate, rule, run, task, worker};
use collective_worker::cli::{handle_error, load_config, Cli, Commands};
use collective_worker::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    // Held until exit so buffered file output is flushed.
    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err.context("Failed to initialize logging"), cli.json),
    };

    let result = match cli.command {
        Commands::Migrate => migrate::execute(&config, cli.json).await,
        Commands::Worker => worker::execute(config).await,
        Commands::Sweep => maintenance::sweep(config, cli.json).await,
        Commands::Recover => maintenance::recover(config, cli.json).await,
        Commands::Task(args) => task::execute(args, config, cli.json).await,
        Commands::Rule(args) => rule::execute(args, config, cli.json).await,
        Commands::Run(args) => run::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
