// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Zapline - WhatsApp webhook ingestion with contact-identity resolution.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod replay;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use zapline_config::ZaplineConfig;
use zapline_core::ProviderKind;

/// Zapline - WhatsApp webhook ingestion with contact-identity resolution.
#[derive(Parser, Debug)]
#[command(name = "zapline", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server.
    Serve,
    /// Replay a saved webhook payload through the ingestion pipeline.
    Ingest {
        /// Provider family the payload came from (cloud or gateway).
        #[arg(long)]
        provider: ProviderKind,
        /// Tenant the payload belongs to.
        #[arg(long)]
        tenant: String,
        /// JSON file holding one delivery, or one delivery per line.
        file: PathBuf,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> ZaplineConfig {
    let loaded = match path {
        Some(path) => zapline_config::load_and_validate_path(path),
        None => zapline_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            zapline_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Ingest {
            provider,
            tenant,
            file,
        }) => replay::run_ingest(config, provider, &tenant, &file).await,
        Some(Commands::CheckConfig) => {
            println!(
                "zapline: config ok (database={}, tenants={})",
                config.storage.database_path,
                config.tenants.len()
            );
            Ok(())
        }
        None => {
            println!("zapline: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over `log_level`.
pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("zapline={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
