//! AppUpdate CLI - download, check and install a newer package.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// AppUpdate
#[derive(Parser)]
#[command(name = "appupdate")]
#[command(about = "Self-update orchestrator: download, version-check and install a package")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ~/.appupdate/update.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the host platform version used to pick the tier
    #[arg(long, global = true)]
    host_version: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the package at URL and install it if it is newer
    Update {
        /// Package URL
        url: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,

        /// Milliseconds between status queries
        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },

    /// Compare a package archive with the installed version
    Check {
        /// Package archive (defaults to the configured artifact location)
        path: Option<PathBuf>,
    },

    /// Delete a leftover downloaded artifact
    Cleanup,

    /// Report whether the download service is usable, offering to re-enable it
    Service {
        /// Open the service settings if it is disabled
        #[arg(long)]
        enable: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    let config = commands::load_config(cli.config.as_deref(), cli.host_version);

    let result = match cli.command {
        Command::Update {
            url,
            timeout_secs,
            poll_interval_ms,
        } => commands::update(config, &url, timeout_secs, poll_interval_ms).await,
        Command::Check { path } => commands::check(config, path),
        Command::Cleanup => commands::cleanup(config),
        Command::Service { enable } => commands::service(config, enable),
        Command::Config { save } => commands::show_config(config, cli.config.as_deref(), save),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
