//! Grouping of raw records into logical events.
//!
//! One audited action may span several consecutive records that share a
//! serial number. The assembler reads ahead by exactly one record to find
//! where an event ends, and splits every record body into fields.

use crate::error::{Error, Result};
use crate::trail::{Field, RawRecord, RecordSource, split_fields};

/// One record of an assembled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    ordinal: usize,
    type_tag: String,
    fields: Vec<Field>,
    raw: String,
}

impl AuditRecord {
    fn from_raw(ordinal: usize, raw: RawRecord) -> Self {
        Self {
            ordinal,
            type_tag: raw.type_tag().to_string(),
            fields: split_fields(raw.body()),
            raw: raw.text().to_string(),
        }
    }

    /// Position of this record within its event, starting at 0.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Record type tag.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Fields in record order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The record exactly as it appeared in the trail.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }
}

/// A logical audited action.
///
/// All records share the event's serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    serial: u64,
    stamp: String,
    type_tag: String,
    records: Vec<AuditRecord>,
}

impl AuditEvent {
    fn start(first: RawRecord) -> Self {
        let mut event = Self {
            serial: first.serial(),
            stamp: first.stamp().to_string(),
            type_tag: first.type_tag().to_string(),
            records: Vec::new(),
        };
        event.push(first);
        event
    }

    fn push(&mut self, raw: RawRecord) {
        debug_assert_eq!(raw.serial(), self.serial);
        let ordinal = self.records.len();
        self.records.push(AuditRecord::from_raw(ordinal, raw));
    }

    /// Serial number shared by every record.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Undecoded wall-clock stamp (`<secs>.<millis>`).
    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// Type tag of the first record, which names the event.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Records in trail order; never empty.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Iterates fields across all records in trail order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.records.iter().flat_map(|r| r.fields.iter())
    }

    /// First value recorded for `name` anywhere in the event.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields()
            .find(|f| f.name() == Some(name))
            .and_then(Field::value)
    }
}

/// Lazy iterator of [`AuditEvent`]s over a [`RecordSource`].
///
/// A change of serial number or the end of the trail closes the current
/// event. Events of every type are produced; filtering happens in the
/// projector so record counts stay auditable.
///
/// A read failure that interrupts an open event does not discard it: the
/// event is yielded as it stands and the error follows on the next call.
/// After an error the iterator is fused and yields `None`.
pub struct EventAssembler<S> {
    source: S,
    lookahead: Option<RawRecord>,
    failed: Option<Error>,
    records_read: u64,
    done: bool,
}

impl<S: RecordSource> EventAssembler<S> {
    /// Wraps a record source.
    pub fn new(source: S) -> Self {
        Self {
            source,
            lookahead: None,
            failed: None,
            records_read: 0,
            done: false,
        }
    }

    /// Total raw records consumed so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn pull(&mut self) -> Result<Option<RawRecord>> {
        if let Some(record) = self.lookahead.take() {
            return Ok(Some(record));
        }
        let record = self.source.next_record()?;
        if record.is_some() {
            self.records_read += 1;
        }
        Ok(record)
    }

    fn next_event(&mut self) -> Result<Option<AuditEvent>> {
        let Some(first) = self.pull()? else {
            return Ok(None);
        };
        let mut event = AuditEvent::start(first);

        loop {
            match self.pull() {
                Ok(Some(record)) if record.serial() == event.serial => event.push(record),
                Ok(Some(record)) => {
                    self.lookahead = Some(record);
                    break;
                }
                Ok(None) => break,
                Err(err) => {
                    // The trail ends here; report it after this event.
                    self.failed = Some(err);
                    break;
                }
            }
        }

        tracing::trace!(
            serial = event.serial,
            records = event.records.len(),
            type_tag = %event.type_tag,
            "assembled event"
        );
        Ok(Some(event))
    }
}

impl<S: RecordSource> Iterator for EventAssembler<S> {
    type Item = Result<AuditEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Some(err) = self.failed.take() {
            self.done = true;
            return Some(Err(err));
        }
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::trail::{MemorySource, TextSource};
    use std::io::Cursor;

    fn source(serials: &[u64]) -> MemorySource {
        serials
            .iter()
            .map(|&s| RawRecord::new("USYS_CONFIG", "1.000", s, "op=x res=success"))
            .collect()
    }

    #[test]
    fn groups_consecutive_serials() {
        let events: Vec<AuditEvent> = EventAssembler::new(source(&[10, 10, 11]))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].serial(), 10);
        assert_eq!(events[0].records().len(), 2);
        assert_eq!(events[1].serial(), 11);
        assert_eq!(events[1].records().len(), 1);
    }

    #[test]
    fn record_ordinals_follow_trail_order() {
        let events: Vec<AuditEvent> = EventAssembler::new(source(&[5, 5, 5]))
            .collect::<Result<_>>()
            .unwrap();
        let ordinals: Vec<usize> = events[0].records().iter().map(|r| r.ordinal()).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn non_adjacent_repeats_are_separate_events() {
        let events: Vec<AuditEvent> = EventAssembler::new(source(&[1, 2, 1]))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn empty_trail_yields_nothing() {
        let mut assembler = EventAssembler::new(MemorySource::default());
        assert!(assembler.next().is_none());
        assert_eq!(assembler.records_read(), 0);
    }

    #[test]
    fn unknown_types_are_still_assembled() {
        let records = vec![
            RawRecord::new("SYSCALL", "1.000", 1, "arch=c000003e"),
            RawRecord::new("EXECVE", "1.000", 1, "argc=1 a0=\"ls\""),
            RawRecord::new("USYS_CONFIG", "2.000", 2, "op=x"),
        ];
        let mut assembler = EventAssembler::new(MemorySource::new(records));
        let first = assembler.next().unwrap().unwrap();
        assert_eq!(first.type_tag(), "SYSCALL");
        assert_eq!(first.field("a0"), Some("ls"));
        assert_eq!(first.records()[1].type_tag(), "EXECVE");
        assert!(assembler.next().is_some());
        assert_eq!(assembler.records_read(), 3);
    }

    #[test]
    fn raw_text_is_preserved() {
        let line = "type=USYS_CONFIG msg=audit(1.000:1): op=x custom=value";
        let mut assembler = EventAssembler::new(TextSource::new(Cursor::new(line)));
        let event = assembler.next().unwrap().unwrap();
        assert_eq!(event.records()[0].raw_text(), line);
    }

    #[test]
    fn read_error_ends_iteration_after_open_event() {
        let text = "type=A msg=audit(1.0:1): x=1\nnot a record\ntype=A msg=audit(1.0:2): x=1\n";
        let mut assembler = EventAssembler::new(TextSource::new(Cursor::new(text)));

        let event = assembler.next().unwrap().unwrap();
        assert_eq!(event.serial(), 1);
        assert!(matches!(
            assembler.next(),
            Some(Err(Error::ParseFailed { position: 2, .. }))
        ));
        assert!(assembler.next().is_none());
    }

    #[test]
    fn error_on_first_record_yields_no_event() {
        let mut assembler = EventAssembler::new(TextSource::new(Cursor::new("junk\n")));
        assert!(matches!(
            assembler.next(),
            Some(Err(Error::ParseFailed { position: 1, .. }))
        ));
        assert!(assembler.next().is_none());
    }
}
