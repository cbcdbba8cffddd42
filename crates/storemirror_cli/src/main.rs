//! Storemirror CLI
//!
//! Keeps a local mirror of remote stores' data current without
//! re-downloading everything on every run.
//!
//! # Commands
//!
//! - `pull` - incrementally fetch store data into per-resource changelogs
//! - `compact` - reorder and deduplicate changelog files in place

mod commands;
mod stores;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Mirror remote store data into local changelog files.
#[derive(Parser)]
#[command(name = "storemirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Incrementally pull store data into per-resource changelogs
    Pull(commands::pull::PullArgs),

    /// Reorder and deduplicate changelog files in place
    Compact {
        /// Changelog files to compact
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Pull(args) => commands::pull::run(args).await,
        Commands::Compact { files } => commands::compact::run(&files),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
