//! Run-level orchestration across independent tasks.

use crate::error::{RunFailure, SyncError, TaskFailure};
use crate::task::SyncTask;
use storemirror_api::HttpTransport;
use tokio::task::JoinSet;
use tracing::info;

/// Outcome of a run in which every task completed cleanly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Tasks that completed without recorded errors.
    pub tasks: u64,
    /// Records appended across all tasks.
    pub records_written: u64,
}

/// Runs every task to completion, aggregating failures.
///
/// Tasks are independent: one failing never cancels another, and nothing
/// is retried across task boundaries. The run fails if any task failed,
/// carrying every task's accumulated errors.
pub async fn run_all<T: HttpTransport + 'static>(
    tasks: Vec<SyncTask<T>>,
) -> Result<RunStats, RunFailure> {
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(async move {
            let id = (task.store_id().to_owned(), task.resource().to_owned());
            (id, task.run().await)
        });
    }

    let mut stats = RunStats::default();
    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(written))) => {
                stats.tasks += 1;
                stats.records_written += written;
            }
            Ok((_, Err(failure))) => failures.push(failure),
            Err(err) => failures.push(TaskFailure {
                store_id: "unknown".to_owned(),
                resource: "unknown".to_owned(),
                errors: vec![SyncError::Aborted(err.to_string())],
            }),
        }
    }

    if failures.is_empty() {
        info!(
            "run complete: {} tasks, {} records written",
            stats.tasks, stats.records_written
        );
        Ok(stats)
    } else {
        Err(RunFailure { failures })
    }
}
