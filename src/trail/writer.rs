//! Producer side of the trail.

use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::fields::encode_value;
use super::source::{RecordSource, TextSource, TrailOpener};
use crate::entry::AuditResult;
use crate::error::{Error, Result};

/// Record type used for events appended through [`TrailWriter`].
pub const USYS_CONFIG: &str = "USYS_CONFIG";

/// A new structured event to append to the trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Operation name; must not be empty
    pub operation: String,
    /// Acting user
    pub username: String,
    /// Source address of the request
    pub address: String,
    /// Hostname of the requester
    pub hostname: String,
    /// Outcome
    pub result: AuditResult,
    /// Free-form detail
    pub detail: String,
}

/// Appends events to the audit trail.
pub trait TrailWriter {
    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] for values that cannot be recorded and
    /// [`Error::TrailWrite`] when the write itself fails.
    fn append(&self, event: &NewEvent) -> Result<()>;
}

/// An audit trail kept in a text file.
///
/// Serves as both the reader ([`TrailOpener`]) and the writer
/// ([`TrailWriter`]) for hosts without a kernel audit subsystem, and for
/// tests.
#[derive(Debug)]
pub struct FileTrail {
    path: PathBuf,
    next_serial: Cell<Option<u64>>,
}

impl FileTrail {
    /// Uses the trail file at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_serial: Cell::new(None),
        }
    }

    /// Returns the trail file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn take_serial(&self) -> Result<u64> {
        let serial = match self.next_serial.get() {
            Some(serial) => serial,
            None => self.scan_last_serial()? + 1,
        };
        self.next_serial.set(Some(serial + 1));
        Ok(serial)
    }

    /// Largest serial in the file, skipping lines whose header is unreadable.
    ///
    /// A read failure that does not advance past a line would hide every
    /// later serial, so it fails the append instead.
    fn scan_last_serial(&self) -> Result<u64> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::TrailWrite(e)),
        };
        let mut source = TextSource::new(BufReader::new(file));
        let mut last = 0;
        loop {
            let line_before = source.line_no();
            match source.next_record() {
                Ok(Some(record)) => last = last.max(record.serial()),
                Ok(None) => return Ok(last),
                Err(err) if source.line_no() > line_before => {
                    tracing::warn!(
                        path = %self.path.display(),
                        %err,
                        "skipping unreadable trail line"
                    );
                }
                Err(err) => {
                    tracing::error!(path = %self.path.display(), %err, "serial scan failed");
                    return Err(Error::TrailWrite(io::Error::new(
                        io::ErrorKind::InvalidData,
                        err.to_string(),
                    )));
                }
            }
        }
    }

    fn format_event(&self, event: &NewEvent, serial: u64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        format!(
            "type={} msg=audit({}.{:03}:{}): pid={} msg='op={} acct={} exe={} hostname={} addr={} terminal=? detail={} res={}'\n",
            USYS_CONFIG,
            now.as_secs(),
            now.subsec_millis(),
            serial,
            std::process::id(),
            encode_value(&event.operation),
            encode_value(&event.username),
            encode_value(&exe),
            encode_value(&event.hostname),
            encode_value(&event.address),
            encode_value(&event.detail),
            event.result.as_trail_str(),
        )
    }
}

impl TrailOpener for FileTrail {
    type Source = TextSource<BufReader<File>>;

    fn open_trail(&self) -> Result<Self::Source> {
        TextSource::open(&self.path)
    }
}

impl TrailWriter for FileTrail {
    fn append(&self, event: &NewEvent) -> Result<()> {
        if event.operation.trim().is_empty() {
            return Err(Error::InvalidField {
                field: "operation",
                reason: "must not be empty".to_string(),
            });
        }

        let serial = self.take_serial()?;
        let line = self.format_event(event, serial);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(Error::TrailWrite)?;
        file.write_all(line.as_bytes()).map_err(Error::TrailWrite)?;

        tracing::debug!(serial, operation = %event.operation, "appended audit event");
        Ok(())
    }
}
