//! huddle CLI — drives the peer-session layer over the loopback transport.
//!
//! `huddle demo` boots two sessions on an in-process hub and walks the
//! whole flow: discover → invite → accept → message (with ACK) → file
//! transfer → peer loss.

mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "huddle", version, about = "Local peer-session coordination")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run two sessions over the in-memory transport.
    Demo,
}

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing_stderr();
    let cli = Cli::parse();
    let config = huddle_session::load_config(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Demo) {
        Commands::Demo => demo::run(config).await,
    }
}
