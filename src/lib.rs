//! Audit trail parsing, a bounded live entry cache and snapshot export.
//!
//! This crate turns a host's security audit trail into typed
//! [`AuditLogEntry`] values and serves them two ways:
//! - **Snapshots**: the whole trail, or its most recent entries, written to a
//!   file and handed out as an open descriptor whose local copy is closed on
//!   the next event loop tick
//! - **Live cache**: a capacity-bounded set of recent entries, each published
//!   under its own identifier
//!
//! # Core Types
//!
//! - [`trail::RecordSource`]: sequential raw records, e.g. [`trail::TextSource`]
//! - [`EventAssembler`]: groups records sharing a serial into an [`AuditEvent`]
//! - [`EntryProjector`]: maps tracked events to [`AuditLogEntry`]
//! - [`ParseStrategy`]: full dump, most-recent-N, or cache hydration
//! - [`Sink`]: where selected entries go ([`VecSink`], [`FileSink`], [`CacheSink`])
//! - [`EntryCache`]: the live bounded cache
//! - [`Manager`]: the facade tying it together
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//! use auditlog_core::{Manager, ManagerConfig, TaskQueue};
//! use auditlog_core::trail::FileTrail;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("audit.log");
//! let mut trail = std::fs::File::create(&path).unwrap();
//! writeln!(trail, "type=USER_LOGIN msg=audit(1700000000.000:1): pid=9 msg='op=login acct=\"root\" addr=10.0.0.2 res=success'").unwrap();
//! writeln!(trail, "type=USER_LOGOUT msg=audit(1700000060.000:2): pid=9 msg='op=logout acct=\"root\" res=success'").unwrap();
//!
//! let queue = TaskQueue::new();
//! let config = ManagerConfig::new().with_snapshot_dir(dir.path());
//! let mut manager = Manager::new(FileTrail::new(&path), queue.clone(), config);
//!
//! manager.populate(10).unwrap();
//! assert_eq!(manager.cache().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assembler;
mod cache;
mod config;
mod entry;
mod error;
mod export;
mod manager;
mod projector;
mod sink;
mod strategy;
pub mod trail;

pub use assembler::{AuditEvent, AuditRecord, EventAssembler};
pub use cache::{
    EntryCache, EntryId, EntryPublisher, NoopPublisher, TracingPublisher, ENTRY_PATH_ROOT,
};
pub use config::{ManagerConfig, DEFAULT_POPULATE_BATCH};
pub use entry::{AuditLogEntry, AuditResult};
pub use error::{Error, FieldError, Result};
pub use export::{Deferrer, SnapshotExport, SnapshotReader, TaskQueue};
pub use manager::Manager;
pub use projector::{EntryProjector, DEFAULT_TRACKED_TYPES};
pub use sink::{CacheSink, FileSink, Sink, SinkError, SinkErrorKind, SnapshotFile, VecSink};
pub use strategy::{ParseReport, ParseStrategy, PopulateCursor};
