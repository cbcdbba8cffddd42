//! One-object-per-line changelog encoder.

use crate::error::ChangelogResult;
use crate::record::Record;
use std::io::Write;

/// Appends records to a changelog, one serialized object per line.
pub struct ChangelogWriter<W> {
    sink: W,
    written: u64,
}

impl<W: Write> ChangelogWriter<W> {
    /// Creates a writer over a sink.
    pub fn new(sink: W) -> Self {
        Self { sink, written: 0 }
    }

    /// Writes one record followed by a newline.
    pub fn append(&mut self, record: &Record) -> ChangelogResult<()> {
        self.sink.write_all(record.raw().as_bytes())?;
        self.sink.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// How many records this writer has appended.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> ChangelogResult<()> {
        self.sink.flush()?;
        Ok(())
    }

    /// Consumes the writer, returning the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}
