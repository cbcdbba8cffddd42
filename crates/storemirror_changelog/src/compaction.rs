//! In-place changelog compaction: reorder, deduplicate, truncate.

use crate::error::{ChangelogError, ChangelogResult};
use crate::index::CompactionIndex;
use crate::reader::ChangelogReader;
use crate::writer::ChangelogWriter;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Storage handles that can drop bytes from their tail.
pub trait Truncate {
    /// Shortens the handle to `len` bytes.
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl Truncate for std::fs::File {
    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactStats {
    /// Records decoded from the original file.
    pub scanned: u64,
    /// Records surviving deduplication.
    pub kept: u64,
    /// Byte length before the rewrite.
    pub original_len: u64,
    /// Byte length after the rewrite.
    pub new_len: u64,
}

/// Rewrites a changelog in place: records sorted by `updated_at` ascending
/// (unknown timestamps last), exact-timestamp duplicates collapsed to the
/// first occurrence, trailing bytes truncated if the file shrank.
///
/// The rewrite happens in place, so a failure partway through can leave the
/// file mixed between old and new content; callers that need the original
/// preserved on failure must copy it first.
///
/// Idempotent as long as no two live records share an `updated_at`.
pub fn compact<F>(file: &mut F) -> ChangelogResult<CompactStats>
where
    F: Read + Write + Seek + Truncate,
{
    let original_len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    let mut index = CompactionIndex::new();
    let mut scanned = 0u64;
    for record in ChangelogReader::new(BufReader::new(&mut *file)) {
        index.insert(record?);
        scanned += 1;
    }

    file.seek(SeekFrom::Start(0))?;
    let kept = {
        let mut writer = ChangelogWriter::new(&mut *file);
        for record in index.iter() {
            writer.append(record)?;
        }
        writer.written()
    };

    let new_len = file.stream_position()?;
    if new_len < original_len {
        file.truncate(new_len)
            .map_err(|source| ChangelogError::Truncate {
                source,
                excess: original_len - new_len,
            })?;
    }

    debug!(scanned, kept, original_len, new_len, "compacted changelog");
    Ok(CompactStats {
        scanned,
        kept,
        original_len,
        new_len,
    })
}
