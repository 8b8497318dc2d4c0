//! Sequential record sources.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::RawRecord;
use crate::error::{Error, Result};

/// Forward-only reader over the raw audit trail.
///
/// Implementations yield records in trail order and report `Ok(None)` once
/// the end of the trail is reached. There is no seeking; a fresh traversal
/// needs a fresh source (see [`TrailOpener`]).
pub trait RecordSource {
    /// Returns the next record, or `None` at end of trail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseFailed`] when the trail cannot be read further.
    fn next_record(&mut self) -> Result<Option<RawRecord>>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        (**self).next_record()
    }
}

/// Something that can start a new traversal of the trail.
pub trait TrailOpener {
    /// Source type produced for each traversal.
    type Source: RecordSource;

    /// Opens the trail from its beginning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] when the trail cannot be opened.
    fn open_trail(&self) -> Result<Self::Source>;
}

/// Record source over the Linux audit text format, one record per line.
///
/// Blank lines are skipped. A line whose header cannot be decoded ends the
/// traversal with [`Error::ParseFailed`].
///
/// ```
/// use std::io::Cursor;
/// use auditlog_core::trail::{RecordSource, TextSource};
///
/// let text = "type=USYS_CONFIG msg=audit(1.000:1): op=a res=success\n";
/// let mut source = TextSource::new(Cursor::new(text));
/// assert_eq!(source.next_record().unwrap().unwrap().serial(), 1);
/// assert!(source.next_record().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct TextSource<R> {
    reader: R,
    line_no: u64,
    buf: String,
}

impl TextSource<BufReader<File>> {
    /// Opens a trail file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceUnavailable`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            tracing::error!(path = %path.display(), %source, "failed to open audit trail");
            Error::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TextSource<R> {
    /// Wraps a buffered reader positioned at the start of a trail.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> RecordSource for TextSource<R> {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|e| Error::parse_failed(self.line_no + 1, e.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = self.buf.trim_end_matches(|c| c == '\n' || c == '\r');
            if line.trim().is_empty() {
                continue;
            }

            return RawRecord::parse(line)
                .map(Some)
                .map_err(|reason| Error::parse_failed(self.line_no, reason));
        }
    }
}

/// Record source over records already held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    records: VecDeque<RawRecord>,
}

impl MemorySource {
    /// Creates a source that yields `records` in order.
    pub fn new(records: impl IntoIterator<Item = RawRecord>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }

    /// Number of records not yet read.
    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl FromIterator<RawRecord> for MemorySource {
    fn from_iter<I: IntoIterator<Item = RawRecord>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl RecordSource for MemorySource {
    fn next_record(&mut self) -> Result<Option<RawRecord>> {
        Ok(self.records.pop_front())
    }
}
