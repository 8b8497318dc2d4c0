use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::cache::{EntryCache, EntryId};
use crate::entry::AuditLogEntry;

/// Error returned when sinking an entry fails.
///
/// # Examples
///
/// ```
/// use auditlog_core::{SinkError, SinkErrorKind};
///
/// let error = SinkError::with_message(SinkErrorKind::Io, "disk full");
/// assert_eq!(error.kind(), SinkErrorKind::Io);
/// assert_eq!(error.message(), Some("disk full"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError {
    kind: SinkErrorKind,
    message: Option<String>,
}

impl SinkError {
    /// Creates a new sink error with the specified kind.
    pub fn new(kind: SinkErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a new sink error with a custom message.
    pub fn with_message(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> SinkErrorKind {
        self.kind
    }

    /// Returns the error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    fn io(err: std::io::Error) -> Self {
        Self::with_message(SinkErrorKind::Io, err.to_string())
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(msg) = &self.message {
            write!(f, "sink error ({}): {}", self.kind, msg)
        } else {
            write!(f, "sink error ({})", self.kind)
        }
    }
}

impl std::error::Error for SinkError {}

/// Kind of sink error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// I/O error occurred during sink operation.
    Io,
    /// The entry could not be encoded.
    Serialize,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "I/O error"),
            Self::Serialize => write!(f, "serialization error"),
        }
    }
}

/// Destination for projected entries.
///
/// Parse strategies hand every selected entry to a sink, oldest first.
/// Sinks own what they receive; nothing is rolled back if a later entry
/// fails.
pub trait Sink {
    /// Accepts one entry.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the entry cannot be stored.
    fn sink(&mut self, entry: AuditLogEntry) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn sink(&mut self, entry: AuditLogEntry) -> Result<(), SinkError> {
        (**self).sink(entry)
    }
}

/// Sink that collects entries in memory.
///
/// # Examples
///
/// ```
/// use auditlog_core::{AuditLogEntry, AuditResult, Sink, VecSink};
///
/// let mut sink = VecSink::new();
/// sink.sink(AuditLogEntry::new("login", AuditResult::Success, 1)).unwrap();
/// assert_eq!(sink.len(), 1);
/// assert_eq!(sink.into_vec()[0].operation(), "login");
/// ```
#[derive(Debug, Default)]
pub struct VecSink {
    entries: Vec<AuditLogEntry>,
}

impl VecSink {
    /// Creates a new empty vector sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the sink.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the sink contains no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrowed view of the collected entries.
    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    /// Consumes the sink and returns the collected entries.
    pub fn into_vec(self) -> Vec<AuditLogEntry> {
        self.entries
    }
}

impl Sink for VecSink {
    fn sink(&mut self, entry: AuditLogEntry) -> Result<(), SinkError> {
        self.entries.push(entry);
        Ok(())
    }
}

/// Sink that serializes entries to a snapshot file, one JSON object per line.
///
/// The file is always written under a temporary name. A persistent sink
/// renames it over its final path in [`finish`](Self::finish), so a
/// descriptor handed out for an earlier snapshot keeps reading the earlier
/// content.
pub struct FileSink {
    writer: BufWriter<File>,
    temp: TempPath,
    keep_as: Option<PathBuf>,
    written: usize,
}

impl FileSink {
    /// Creates a snapshot that is kept at `path` once finished.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut sink = Self::temporary(dir)?;
        sink.keep_as = Some(path.to_path_buf());
        Ok(sink)
    }

    /// Creates an anonymous snapshot file in `dir`.
    ///
    /// The file is removed once the resulting [`SnapshotFile`] is dropped.
    pub fn temporary(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let (file, temp) = tempfile::Builder::new()
            .prefix("auditlog-")
            .suffix(".json")
            .tempfile_in(dir)
            .map_err(SinkError::io)?
            .into_parts();
        Ok(Self {
            writer: BufWriter::new(file),
            temp,
            keep_as: None,
            written: 0,
        })
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Number of entries written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the file and hands it over for export.
    pub fn finish(self) -> Result<SnapshotFile, SinkError> {
        let Self {
            mut writer,
            temp,
            keep_as,
            written,
        } = self;
        writer.flush().map_err(SinkError::io)?;
        drop(writer);

        let (path, temp) = match keep_as {
            Some(path) => {
                temp.persist(&path).map_err(|e| SinkError::io(e.error))?;
                (path, None)
            }
            None => (temp.to_path_buf(), Some(temp)),
        };

        Ok(SnapshotFile {
            path,
            temp,
            entries: written,
        })
    }
}

impl Sink for FileSink {
    fn sink(&mut self, entry: AuditLogEntry) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &entry).map_err(|e| {
            if e.is_io() {
                SinkError::with_message(SinkErrorKind::Io, e.to_string())
            } else {
                SinkError::with_message(SinkErrorKind::Serialize, e.to_string())
            }
        })?;
        self.writer.write_all(b"\n").map_err(SinkError::io)?;
        self.written += 1;
        Ok(())
    }
}

/// A completed snapshot file.
#[derive(Debug)]
pub struct SnapshotFile {
    path: PathBuf,
    temp: Option<TempPath>,
    entries: usize,
}

impl SnapshotFile {
    /// Location of the snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries in the snapshot.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Whether the file is removed when this value is dropped.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// Sink that publishes entries into the live [`EntryCache`].
pub struct CacheSink<'a> {
    cache: &'a mut EntryCache,
    published: Vec<EntryId>,
}

impl<'a> CacheSink<'a> {
    /// Creates a sink over `cache`.
    pub fn new(cache: &'a mut EntryCache) -> Self {
        Self {
            cache,
            published: Vec::new(),
        }
    }

    /// Identifiers assigned so far, in publish order.
    pub fn published(&self) -> &[EntryId] {
        &self.published
    }
}

impl Sink for CacheSink<'_> {
    fn sink(&mut self, entry: AuditLogEntry) -> Result<(), SinkError> {
        let id = self.cache.publish(entry);
        self.published.push(id);
        Ok(())
    }
}
