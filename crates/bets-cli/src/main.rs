//! Bets CLI - lottery bets batch submission client.

use anyhow::Result;
use bets_core::config::{LogFormat, LogLevel};
use bets_core::{ClientConfig, TransportError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Could not reach the server
    ConnectError = 2,
    /// Protocol error (oversized packet, bad response, dropped connection)
    ProtocolError = 3,
    /// Record source error (missing archive or entry)
    SourceError = 4,
    /// General runtime error
    RuntimeError = 10,
    /// Signal interrupt (SIGINT = 2, so 128 + 2 = 130)
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code.
    ///
    /// Library errors are matched by type; anything else falls back to
    /// inspecting the error message.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(e) = error.downcast_ref::<bets_core::Error>() {
            return match e {
                bets_core::Error::Config(_) | bets_core::Error::Io(_) => ExitCode::ConfigError,
                bets_core::Error::Transport(TransportError::Connect { .. }) => {
                    ExitCode::ConnectError
                }
                bets_core::Error::Transport(_)
                | bets_core::Error::Codec(_)
                | bets_core::Error::InvalidTransition { .. } => ExitCode::ProtocolError,
                bets_core::Error::Source(_) => ExitCode::SourceError,
            };
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("connect") {
            ExitCode::ConnectError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "bets")]
#[command(about = "Lottery bets batch submission client", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Identity and server overrides shared by every networked command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Override server address (host:port)
    #[arg(long, env = "CLI_SERVER_ADDRESS")]
    server: Option<String>,

    /// Override agency id
    #[arg(long, env = "CLI_ID")]
    agency: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream this agency's bets in batches, then query the results
    Run {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Override batch size
        #[arg(long, env = "CLI_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Override archive path
        #[arg(long)]
        archive: Option<PathBuf>,

        /// Read records from a plain delimited file instead of the archive
        #[arg(long, conflicts_with = "archive")]
        records: Option<PathBuf>,
    },

    /// Only ask the server for this agency's results
    Query {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Submit a single bet over the framed protocol
    SendOne {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[command(flatten)]
        bet: commands::send_one::BetArgs,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    // Try to load config for log settings (optional - falls back to defaults)
    let monitoring = config_path(&cli.config)
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| ClientConfig::from_toml_str(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    // Initialize logging
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new(monitoring.log_level.as_directive()),
            1 => EnvFilter::new(LogLevel::Debug.as_directive()),
            _ => EnvFilter::new(LogLevel::Trace.as_directive()),
        }
    };

    // Configure log format based on config
    match monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
    }

    match execute_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            let code = ExitCode::from_error(&e);
            if code == ExitCode::ConnectError {
                tracing::error!(error = %e, "Could not connect to server, exiting");
            } else {
                tracing::error!(error = %e, "Command failed");
            }
            code
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            connection,
            batch_size,
            archive,
            records,
        } => {
            let mut config = load_config(&cli.config, &connection)?;
            if let Some(size) = batch_size {
                config.batch.size = size;
            }
            if let Some(path) = archive {
                config.source.archive_path = path;
            }
            config.validate()?;

            let report = commands::run::run(config, records).await?;
            if report.cancelled {
                return Ok(ExitCode::SignalInterrupt);
            }
        }

        Commands::Query { connection } => {
            let config = load_config(&cli.config, &connection)?;
            config.validate()?;
            commands::query::run(config).await?;
        }

        Commands::SendOne { connection, bet } => {
            let config = load_config(&cli.config, &connection)?;
            config.validate()?;
            commands::send_one::run(config, bet).await?;
        }

        Commands::Validate => {
            let config = load_config(&cli.config, &ConnectionArgs::default())?;
            config.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(ExitCode::Success)
}

/// Explicit `--config`, or `config.toml` when it exists.
fn config_path(path: &Option<PathBuf>) -> Option<PathBuf> {
    match path {
        Some(path) => Some(path.clone()),
        None => {
            let default = PathBuf::from("config.toml");
            default.exists().then_some(default)
        }
    }
}

/// Load the config file (if any) and apply identity/server overrides.
///
/// Without a config file, both `--agency` and `--server` are required.
fn load_config(path: &Option<PathBuf>, overrides: &ConnectionArgs) -> Result<ClientConfig> {
    let mut config = match config_path(path) {
        Some(path) => {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                bets_core::Error::Config(format!("{}: {}", path.display(), e))
            })?;
            ClientConfig::from_toml_str(&content)?
        }
        None => match (&overrides.agency, &overrides.server) {
            (Some(agency), Some(server)) => ClientConfig::new(agency.clone(), server.clone()),
            _ => {
                return Err(bets_core::Error::Config(
                    "No config file found; --agency and --server are required".into(),
                )
                .into())
            }
        },
    };

    if let Some(server) = &overrides.server {
        config.server.address = server.clone();
    }
    if let Some(agency) = &overrides.agency {
        config.client.agency = agency.clone();
    }

    Ok(config)
}
