//! ShareIt peer entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shareit-peer")]
#[command(about = "Send and receive files through a ShareIt session", version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Announce and send files to the peer that joins the session
    Send {
        /// Session id shared with the receiving peer
        #[arg(short, long)]
        session: String,

        /// Files to send
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Receive files into the download directory
    Receive {
        /// Session id shared with the sending peer
        #[arg(short, long)]
        session: String,

        /// Exit after this many files (default: run until Ctrl-C)
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ShareIt peer");

    let config = match &cli.config {
        Some(path) => config::Config::load_from(path)?,
        None => config::Config::load()?,
    };
    tracing::info!(signaling_url = %config.signaling_url, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, cli.command))?;

    tracing::info!("peer shut down cleanly");
    Ok(())
}
