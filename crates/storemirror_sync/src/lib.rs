//! # Storemirror Sync
//!
//! Incremental synchronization of one store's resources into local
//! changelog files.
//!
//! Each [`SyncTask`] handles one (store, resource) pair per run:
//!
//! 1. Open the changelog (creating it if absent) and scan it for the
//!    oldest and newest `updated_at` watermarks.
//! 2. No watermarks: fetch the whole collection in one stream. Otherwise
//!    fetch both sides of the existing data concurrently (everything at
//!    or before the oldest watermark, and everything at or after the
//!    newest), fanned into one channel.
//! 3. Drain the channel through a single writer that owns the file,
//!    appending one record per line.
//!
//! Records at the stream boundaries may duplicate what is already on
//! disk; the offline compaction pass is responsible for collapsing them.
//!
//! Tasks are independent: a failure in one never cancels another, and
//! [`run_all`] aggregates every task's failures into one run-level error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod runner;
mod task;
mod watermark;

pub use error::{RunFailure, SyncError, SyncResult, TaskFailure};
pub use runner::{run_all, RunStats};
pub use task::{FetchPlan, SyncTask, TaskState, FETCH_PAGE_LIMIT};
pub use watermark::{open_and_scan, Watermarks};
