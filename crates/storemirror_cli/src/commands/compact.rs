//! The `compact` subcommand: offline changelog maintenance.

use std::error::Error;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use storemirror_changelog::{compact, ChangelogError, CompactStats};
use tracing::{error, info};

/// Aggregated per-file compaction failures.
#[derive(Debug)]
pub struct CompactFailure {
    failures: Vec<(PathBuf, ChangelogError)>,
}

impl fmt::Display for CompactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.len() == 1 {
            let (path, err) = &self.failures[0];
            return write!(f, "error processing `{}`: {err}", path.display());
        }
        write!(f, "{} files failed:", self.failures.len())?;
        for (path, err) in &self.failures {
            write!(f, "\nerror processing `{}`: {err}", path.display())?;
        }
        Ok(())
    }
}

impl Error for CompactFailure {}

/// Compacts each file in place, aggregating failures across files.
pub fn run(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut failures = Vec::new();
    for path in files {
        info!("opening {}", path.display());
        match compact_file(path) {
            Ok(stats) => info!(
                "finished {}: kept {} of {} records, {} bytes",
                path.display(),
                stats.kept,
                stats.scanned,
                stats.new_len
            ),
            Err(err) => {
                error!("error processing `{}`: {err}", path.display());
                failures.push((path.clone(), err));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Box::new(CompactFailure { failures }))
    }
}

fn compact_file(path: &Path) -> Result<CompactStats, ChangelogError> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    compact(&mut file)
}
