use std::path::PathBuf;

use thiserror::Error;

use crate::sink::SinkError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that end the operation which raised them.
///
/// Per-event and per-field problems never show up here; they are logged and
/// the traversal moves on to the next event.
#[derive(Debug, Error)]
pub enum Error {
    /// The audit trail could not be opened.
    #[error("audit trail unavailable: {path}: {source}")]
    SourceUnavailable {
        /// Location of the trail
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Reading or decoding the trail failed part way through.
    ///
    /// Entries already handed to a sink stay where they are.
    #[error("audit trail parse failed at {position}: {reason}")]
    ParseFailed {
        /// 1-based line (or record) number where the failure happened
        position: u64,
        /// What went wrong
        reason: String,
    },

    /// A snapshot file could not be reopened for export.
    #[error("failed to open snapshot {path}: {source}")]
    OpenFailed {
        /// Snapshot file path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A sink rejected an entry.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Appending a new event to the trail failed.
    #[error("failed to append to audit trail: {0}")]
    TrailWrite(#[source] std::io::Error),

    /// A value handed to `record_event` cannot be represented in the trail.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Why the value was refused
        reason: String,
    },
}

impl Error {
    pub(crate) fn parse_failed(position: u64, reason: impl Into<String>) -> Self {
        Error::ParseFailed {
            position,
            reason: reason.into(),
        }
    }
}

/// A problem confined to a single event.
///
/// The event is dropped and the traversal continues with the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The event timestamp is not a valid unsigned 64-bit millisecond value.
    #[error("bad event timestamp '{0}'")]
    Timestamp(String),

    /// The result field is missing or not one of the known outcomes.
    #[error("unrecognized result '{0}'")]
    Result(String),
}
