//! Error types for sync tasks and runs.

use std::fmt;
use storemirror_api::ApiError;
use storemirror_changelog::ChangelogError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// One failure recorded by a sync task.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The existing changelog could not be opened or scanned. Fatal for
    /// the task; the file is presumed suspect.
    #[error("changelog error: {0}")]
    Changelog(#[from] ChangelogError),

    /// A fetch stream failed after the client exhausted its retries.
    #[error("fetch error: {0}")]
    Fetch(#[from] ApiError),

    /// Appending a record failed. Fatal for the task; in-flight streams
    /// are cancelled.
    #[error("write error: {0}")]
    Write(#[source] ChangelogError),

    /// The task aborted before completing (panic or runtime shutdown).
    #[error("task aborted: {0}")]
    Aborted(String),
}

/// Everything that went wrong in one (store, resource) task.
#[derive(Debug)]
pub struct TaskFailure {
    /// The store the task was mirroring.
    pub store_id: String,
    /// The resource the task was mirroring.
    pub resource: String,
    /// Every error the task recorded, in order of occurrence.
    pub errors: Vec<SyncError>,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "{}/{}: {}", self.store_id, self.resource, self.errors[0]);
        }
        write!(
            f,
            "{}/{}: {} errors:",
            self.store_id,
            self.resource,
            self.errors.len()
        )?;
        for error in &self.errors {
            write!(f, "\n  * {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFailure {}

/// Aggregated failures across every task of a run.
#[derive(Debug, Default)]
pub struct RunFailure {
    /// One entry per failed task.
    pub failures: Vec<TaskFailure>,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.len() == 1 {
            return write!(f, "{}", self.failures[0]);
        }
        write!(f, "{} tasks failed:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_failure_lists_every_error() {
        let failure = TaskFailure {
            store_id: "acme".into(),
            resource: "orders".into(),
            errors: vec![
                SyncError::Aborted("first".into()),
                SyncError::Aborted("second".into()),
            ],
        };
        let text = failure.to_string();
        assert!(text.contains("acme/orders"));
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn single_error_renders_inline() {
        let failure = TaskFailure {
            store_id: "acme".into(),
            resource: "orders".into(),
            errors: vec![SyncError::Aborted("boom".into())],
        };
        assert_eq!(failure.to_string(), "acme/orders: task aborted: boom");
    }
}
