//! Streaming changelog decoder.

use crate::error::ChangelogResult;
use crate::record::Record;
use std::io::BufRead;

/// Streams records out of a changelog, one line at a time.
///
/// Memory use is bounded by the longest line, not the file size. Blank
/// lines are tolerated and skipped; any other line that is not a single
/// JSON object ends the stream with a decode error. A truncated final line
/// (no trailing newline) is decoded like any other and fails if incomplete.
pub struct ChangelogReader<R> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> ChangelogReader<R> {
    /// Creates a reader over a buffered source.
    pub fn new(source: R) -> Self {
        Self {
            lines: source.lines(),
        }
    }
}

impl<R: BufRead> Iterator for ChangelogReader<R> {
    type Item = ChangelogResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Err(err) => return Some(Err(err.into())),
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Record::parse(&line)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChangelogError;
    use std::io::Cursor;

    fn read_all(input: &str) -> Vec<ChangelogResult<Record>> {
        ChangelogReader::new(Cursor::new(input.to_owned())).collect()
    }

    #[test]
    fn reads_records_in_order() {
        let input = "{\"id\":1}\n{\"id\":2}\n{\"id\":3}\n";
        let records: Vec<_> = read_all(input).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].raw(), "{\"id\":1}");
        assert_eq!(records[2].raw(), "{\"id\":3}");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let input = "{\"id\":1}\n\n{\"id\":2}\n";
        let records = read_all(input);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn truncated_final_line_is_a_decode_error() {
        let input = "{\"id\":1}\n{\"id\":";
        let results = read_all(input);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(ChangelogError::Decode { .. })));
    }

    #[test]
    fn non_object_line_is_a_decode_error() {
        let results = read_all("[1,2]\n");
        assert!(matches!(results[0], Err(ChangelogError::Decode { .. })));
    }
}
