//! The `pull` subcommand: one run of incremental mirroring.

use crate::stores;
use clap::Args;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use storemirror_api::{CancelToken, Client, ClientConfig, DEFAULT_API_VERSION, DEFAULT_USER_AGENT};
use storemirror_sync::SyncTask;
use tracing::{info, warn};

/// Resources mirrored for every store unless overridden.
const DEFAULT_RESOURCES: [&str; 3] = ["orders", "products", "customers"];

/// Flags for the `pull` subcommand.
#[derive(Debug, Args)]
pub struct PullArgs {
    /// Path to the store configuration file (one JSON object per line)
    #[arg(long, default_value = "./stores.jsonl")]
    pub stores: PathBuf,

    /// Output directory for changelog files
    #[arg(long, default_value = "./out")]
    pub output: PathBuf,

    /// Resource to mirror for every store; repeatable
    #[arg(long = "resource", value_name = "NAME", default_values_t = DEFAULT_RESOURCES.map(String::from))]
    pub resources: Vec<String>,

    /// Log what would be fetched without calling the API
    #[arg(long)]
    pub dry_run: bool,

    /// API version to request
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// HTTP timeout per request, in seconds (some requests take a long time)
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Attempts per HTTP request before failing
    #[arg(long, default_value_t = 10)]
    pub retries: u32,

    /// Base delay in milliseconds before retrying a failed request
    /// (rate-limited requests wait what the server asks instead)
    #[arg(long, default_value_t = 100)]
    pub retry_delay_ms: u64,

    /// Ceiling in milliseconds for the random jitter added to retry delays
    #[arg(long, default_value_t = 100)]
    pub retry_jitter_ms: u64,

    /// User-Agent header for API requests
    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

/// Runs one pull over every configured store and resource.
pub async fn run(args: PullArgs) -> Result<(), Box<dyn Error>> {
    let stores = stores::load(&args.stores)?;
    if stores.is_empty() {
        warn!("no usable stores in {}", args.stores.display());
        return Ok(());
    }
    info!("loaded {} stores", stores.len());

    let cancel = CancelToken::new();
    spawn_signal_handler(cancel.clone());

    let mut tasks = Vec::new();
    for store in &stores {
        for resource in &args.resources {
            let config = ClientConfig::new(&store.store_id, &store.username, &store.password)
                .with_api_version(&args.api_version)
                .with_http_timeout(Duration::from_secs(args.timeout_secs))
                .with_retry_attempts(args.retries)
                .with_retry_delay(Duration::from_millis(args.retry_delay_ms))
                .with_retry_jitter(Duration::from_millis(args.retry_jitter_ms))
                .with_user_agent(&args.user_agent);

            // Each task's client gets its own child token: a write failure
            // stops that task's streams while siblings keep running, and
            // the run-level token still reaches everyone.
            let client = Client::from_config(config, cancel.child())?;
            tasks.push(SyncTask::new(client, resource, &args.output, args.dry_run));
        }
    }

    let stats = storemirror_sync::run_all(tasks).await?;
    info!(
        "completed {} tasks, {} records written",
        stats.tasks, stats.records_written
    );
    Ok(())
}

/// Trips the run-level cancellation flag on interrupt or terminate.
fn spawn_signal_handler(cancel: CancelToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("shutdown signal received, cancelling tasks");
        cancel.cancel();
    });
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
