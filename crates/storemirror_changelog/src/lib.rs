//! # Storemirror Changelog
//!
//! The on-disk record format shared by the sync pipeline and the offline
//! maintenance pass: UTF-8 text, one JSON object per line, trailing newline
//! per record, no enclosing array.
//!
//! The same format serves both the live changelog (append-ordered, possibly
//! containing duplicates) and its compacted form (sorted by `updated_at`,
//! deduplicated). Payloads are opaque beyond the two timestamp fields.
//!
//! ## Components
//!
//! - [`Record`] - one changelog entry: optional `created_at`/`updated_at`
//!   timestamps plus the raw serialized object
//! - [`ChangelogReader`] - streaming line-by-line decoder
//! - [`ChangelogWriter`] - one-object-per-line encoder
//! - [`CompactionIndex`] - ordered, deduplicating index keyed by `updated_at`
//! - [`compact`] - the in-place reorder + dedup + truncate pass

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;
mod error;
mod index;
mod reader;
mod record;
mod writer;

pub use compaction::{compact, CompactStats, Truncate};
pub use error::{ChangelogError, ChangelogResult};
pub use index::CompactionIndex;
pub use reader::ChangelogReader;
pub use record::Record;
pub use writer::ChangelogWriter;
