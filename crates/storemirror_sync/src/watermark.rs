//! Watermark detection over an existing changelog.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use std::fs::{File, OpenOptions};
use std::io::BufReader;
use std::path::Path;
use storemirror_changelog::{ChangelogError, ChangelogReader};
use tracing::{info, warn};

/// The oldest and newest `updated_at` observed in an existing changelog.
///
/// Both bounds are unset for an empty or newly created file, and for a
/// file whose records all lack a usable `updated_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermarks {
    /// Minimum observed `updated_at`.
    pub oldest: Option<DateTime<Utc>>,
    /// Maximum observed `updated_at`.
    pub newest: Option<DateTime<Utc>>,
}

impl Watermarks {
    /// Whether nothing usable was observed.
    pub fn is_empty(&self) -> bool {
        self.oldest.is_none() && self.newest.is_none()
    }

    fn observe(&mut self, ts: DateTime<Utc>) {
        if self.oldest.map_or(true, |oldest| ts < oldest) {
            self.oldest = Some(ts);
        }
        if self.newest.map_or(true, |newest| ts > newest) {
            self.newest = Some(ts);
        }
    }
}

/// Opens the changelog for read+append, creating it (and its parent
/// directories) if absent, and scans every existing record for watermarks.
///
/// Records without a usable `updated_at` are skipped with a warning; a
/// malformed record is fatal for the caller's task.
pub fn open_and_scan(path: &Path) -> SyncResult<(File, Watermarks)> {
    if !path.exists() {
        info!("{} does not exist, creating a new file", path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ChangelogError::from)?;
        }
    }

    let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(ChangelogError::from)?;

    let mut marks = Watermarks::default();
    let mut scanned = 0u64;
    for record in ChangelogReader::new(BufReader::new(&file)) {
        let record = record?;
        scanned += 1;
        match record.updated_at() {
            Some(ts) => marks.observe(ts),
            None => warn!("record has no usable updated_at: {}", record.raw()),
        }
    }

    info!(
        "scanned {scanned} records, oldest {}, newest {}",
        fmt_bound(marks.oldest),
        fmt_bound(marks.newest)
    );
    Ok((file, marks))
}

fn fmt_bound(bound: Option<DateTime<Utc>>) -> String {
    match bound {
        Some(ts) => ts.to_rfc3339(),
        None => "(none)".to_owned(),
    }
}
