//! daylock - clock integrity and state continuity checks from the command line
//!
//! - `check-time`: run one time-integrity check
//! - `rehydrate`: run the rehydration gate for a user
//! - `watch`: run the full startup pipeline and follow state changes
//! - `history`: list a user's locally stored attempts
//! - `forget`: clear a user's rehydration flag on this install
//! - `config`: print the resolved configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use daylock_runtime::{init_tracing, DaylockConfig, Services, TrustView};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "daylock")]
#[command(about = "Clock integrity and state continuity for daily-content clients", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DAYLOCK_CONFIG")]
    config: Option<String>,

    /// Data directory (overrides configuration)
    #[arg(long, env = "DAYLOCK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides configuration)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one time-integrity check and print the result
    CheckTime,

    /// Restore a user's history if local data was lost
    Rehydrate {
        #[arg(short, long)]
        user: String,

        /// Ignore the completion flag and run again
        #[arg(long)]
        force: bool,
    },

    /// Run the startup pipeline, then print every state change until Ctrl-C
    Watch {
        #[arg(short, long)]
        user: String,
    },

    /// Show what local storage holds for a user
    History {
        #[arg(short, long)]
        user: String,

        /// Number of recent attempts to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Clear the rehydration flag for a user on this install
    Forget {
        #[arg(short, long)]
        user: String,
    },

    /// Print the resolved configuration
    Config,
}

async fn open(config: DaylockConfig) -> anyhow::Result<Services> {
    Services::open(config)
        .await
        .context("failed to open local storage")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        DaylockConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    init_tracing(&config.logging)?;

    match cli.command {
        Command::Config => print_json(&config)?,
        Command::CheckTime => {
            let services = open(config).await?;
            let authority = services.time_authority(services.time_sources()?);
            let result = authority.sync().await;
            authority.shutdown();
            print_json(&result)?;
        }
        Command::Rehydrate { user, force } => {
            let services = open(config).await?;
            let gate = services.rehydration_gate(&user);
            let status = if force {
                gate.retry_rehydration().await
            } else {
                gate.run().await
            };
            print_json(&status)?;
        }
        Command::Watch { user } => {
            let services = open(config).await?;
            let pipeline = services.trust_pipeline(&user, services.time_sources()?);
            let mut integrity = pipeline.integrity().subscribe();
            let mut rehydration = pipeline.rehydration().subscribe();

            let view = pipeline.start().await;
            print_view(&view);

            loop {
                tokio::select! {
                    changed = integrity.changed() => {
                        if changed.is_err() { break; }
                    }
                    changed = rehydration.changed() => {
                        if changed.is_err() { break; }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("interrupted");
                        break;
                    }
                }
                print_view(&pipeline.view());
            }
            pipeline.shutdown();
        }
        Command::History { user, limit } => {
            let services = open(config).await?;
            print_json(&services.history(&user, limit).await?)?;
        }
        Command::Forget { user } => {
            let services = open(config).await?;
            services.flag_store().clear(&user).await?;
            println!("cleared rehydration flag for {user}");
        }
    }

    Ok(())
}

fn print_view(view: &TrustView) {
    println!(
        "{} integrity={} overlay={:?} gameplay={}",
        view.integrity.authorized_date,
        view.integrity.status,
        view.overlay,
        if view.gameplay_released { "released" } else { "held" },
    );
}
