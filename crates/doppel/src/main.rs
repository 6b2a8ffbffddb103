// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Doppel - message aggregation and persona analysis pipeline.
//!
//! This is the binary entry point: configuration checks and replay of
//! message logs into SQLite storage.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod replay;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use doppel_config::{ConfigError, DoppelConfig};

/// Doppel - message aggregation and persona analysis pipeline.
#[derive(Parser, Debug)]
#[command(name = "doppel", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configuration, then print a summary.
    CheckConfig,
    /// Feed a JSONL message log through the ingestion pipeline.
    Replay {
        /// One JSON-encoded incoming message per line.
        #[arg(long)]
        input: PathBuf,
    },
}

fn load(path: Option<&PathBuf>) -> Result<DoppelConfig, Vec<ConfigError>> {
    match path {
        Some(path) => doppel_config::load_and_validate_path(path),
        None => doppel_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            doppel_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::CheckConfig) => {
            print!("{}", check::summarize(&config));
        }
        Some(Commands::Replay { input }) => {
            init_tracing(&config.agent.log_level);
            let cancel = shutdown::install_signal_handler();
            match replay::run_replay(config, &input, cancel).await {
                Ok(summary) => println!("{summary}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("doppel: use --help for available commands");
        }
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("doppel={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
