//! dirwatch - run shell commands when files change
//!
//! Entry point for the dirwatch CLI.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dirwatch::observability::init_tracing;
use dirwatch::watcher::{
    executor_for, Dispatcher, Executor, FileWatcher, RuleStore, ShellCommand, WatchConfig,
    WatchLoop,
};
use dirwatch::{Config, Result};
use tokio_util::sync::CancellationToken;

/// Watches a file directory and runs a shell command
#[derive(Parser, Debug)]
#[command(name = "dirwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "DIRWATCH_CONFIG", default_value = "dirwatch.toml")]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(long, env = "DIRWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch with configuration file
    Watch,

    /// Developer utilities
    #[command(hide = true)]
    Dev {
        #[command(subcommand)]
        command: DevCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DevCommand {
    /// Dump the configuration
    Dump,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.log.level = level;
        config.validate()?;
    }

    match cli.command {
        Command::Watch => watch(config).await,
        Command::Dev {
            command: DevCommand::Dump,
        } => {
            println!("{}", config.dump()?);
            Ok(())
        }
    }
}

async fn watch(config: Config) -> Result<()> {
    let _log_guard = init_tracing(&config.log)?;

    tracing::info!(
        "dirwatch v{} starting with {} watcher(s)",
        env!("CARGO_PKG_VERSION"),
        config.watchers.len()
    );
    tracing::debug!(?config, "Configuration loaded");

    let rules = Arc::new(RuleStore::from_configs(&config.watchers, config.resolution));
    let executor = executor_for(
        config.execution,
        ShellCommand::new(&config.shell, &config.shell_cmd),
        config.workers,
    );
    let dispatcher = Dispatcher::new(
        rules,
        Arc::new(config.vars.clone()),
        Arc::clone(&executor),
    );

    let watch_config = WatchConfig {
        watch_dirs: config.watch_dirs(),
        ..Default::default()
    };
    let (watcher, stream) = FileWatcher::new(&watch_config)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        signal.cancel();
    });

    WatchLoop::new(stream, dispatcher).run(shutdown).await;
    drop(watcher);
    executor.drain().await;

    Ok(())
}
