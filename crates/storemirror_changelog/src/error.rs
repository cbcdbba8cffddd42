//! Error types for changelog reading, writing and compaction.

use thiserror::Error;

/// Result type for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// Errors that can occur while reading, writing or compacting a changelog.
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// I/O failure while reading or writing the file.
    #[error("changelog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A line that does not decode as a single JSON object.
    #[error("invalid changelog record: {reason}")]
    Decode {
        /// Why decoding failed.
        reason: String,
        /// Raw bytes of the offending input, kept for diagnostics.
        raw: Vec<u8>,
    },

    /// The rewritten file could not be truncated to its new length.
    #[error("unable to truncate {excess} trailing bytes after rewrite: {source}")]
    Truncate {
        /// The underlying storage failure.
        source: std::io::Error,
        /// How many trailing bytes were left behind.
        excess: u64,
    },
}

impl ChangelogError {
    /// Creates a decode error from a reason and the offending bytes.
    pub fn decode(reason: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self::Decode {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}
