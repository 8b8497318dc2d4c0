//! Access to the raw audit trail.
//!
//! This module provides:
//! - `RecordSource`: forward-only reader over raw records
//! - `TrailOpener`: starts a fresh traversal for each request
//! - `TextSource` / `MemorySource`: bundled sources
//! - `TrailWriter` / `FileTrail`: the producer side used by `record_event`
//!
//! Only record headers are decoded here. Field bodies stay textual until the
//! assembler splits them.

mod fields;
mod record;
mod source;
mod writer;

pub use fields::{Field, split_fields};
pub(crate) use fields::is_arg_field;
pub use record::RawRecord;
pub use source::{MemorySource, RecordSource, TextSource, TrailOpener};
pub use writer::{FileTrail, NewEvent, TrailWriter, USYS_CONFIG};
