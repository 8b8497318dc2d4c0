//! Traversal policies over the assemble → project pipeline.
//!
//! All three policies read the trail exactly once, front to back. They
//! differ only in which projected entries reach the sink:
//!
//! - [`ParseStrategy::All`]: every entry, in trail order
//! - [`ParseStrategy::Latest`]: the last `n` entries, oldest first, via a
//!   ring buffer of size `n`
//! - [`ParseStrategy::Populate`]: the `Latest` selection, written in
//!   budgeted steps through a [`PopulateCursor`]

use std::collections::VecDeque;

use crate::assembler::EventAssembler;
use crate::entry::AuditLogEntry;
use crate::error::Result;
use crate::projector::EntryProjector;
use crate::sink::Sink;
use crate::trail::RecordSource;

/// Selection policy for one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Every projected entry.
    All,
    /// The `n` most recent projected entries.
    Latest(usize),
    /// The `n` most recent projected entries, for cache hydration.
    Populate(usize),
}

/// Counters describing one traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    /// Events assembled from the trail
    pub events: usize,
    /// Events of untracked types
    pub skipped: usize,
    /// Tracked events dropped because a field could not be interpreted
    pub dropped: usize,
    /// Entries handed to the sink
    pub written: usize,
}

impl ParseStrategy {
    /// Runs the policy over `source`, writing the selection to `sink`.
    ///
    /// # Errors
    ///
    /// A trail failure aborts the run with [`Error::ParseFailed`]; entries
    /// already in the sink stay there. Sink failures surface as
    /// [`Error::Sink`].
    ///
    /// # Example
    ///
    /// ```
    /// use std::io::Cursor;
    /// use auditlog_core::{EntryProjector, ParseStrategy, VecSink};
    /// use auditlog_core::trail::TextSource;
    ///
    /// let trail = "\
    /// type=USYS_CONFIG msg=audit(1.000:1): op=a res=success
    /// type=USYS_CONFIG msg=audit(2.000:2): op=b res=success
    /// type=USYS_CONFIG msg=audit(3.000:3): op=c res=failed
    /// ";
    /// let mut sink = VecSink::new();
    /// let report = ParseStrategy::Latest(2)
    ///     .run(TextSource::new(Cursor::new(trail)), &EntryProjector::default(), &mut sink)
    ///     .unwrap();
    ///
    /// assert_eq!(report.written, 2);
    /// let ops: Vec<_> = sink.entries().iter().map(|e| e.operation()).collect();
    /// assert_eq!(ops, ["b", "c"]);
    /// ```
    ///
    /// [`Error::ParseFailed`]: crate::Error::ParseFailed
    /// [`Error::Sink`]: crate::Error::Sink
    pub fn run<S, K>(
        self,
        source: S,
        projector: &EntryProjector,
        mut sink: K,
    ) -> Result<ParseReport>
    where
        S: RecordSource,
        K: Sink,
    {
        tracing::debug!(strategy = ?self, "parse started");

        let report = match self {
            ParseStrategy::All => {
                let mut entries = Entries::new(source, projector);
                let mut written = 0;
                for entry in entries.by_ref() {
                    sink.sink(entry?)?;
                    written += 1;
                }
                ParseReport {
                    written,
                    ..entries.report()
                }
            }
            ParseStrategy::Latest(n) => {
                let (window, report) = latest(source, projector, n)?;
                let written = window.len();
                for entry in window {
                    sink.sink(entry)?;
                }
                ParseReport { written, ..report }
            }
            ParseStrategy::Populate(n) => {
                let mut cursor = PopulateCursor::new(source, projector, n)?;
                cursor.step(n, &mut sink)?;
                cursor.report()
            }
        };

        tracing::debug!(
            strategy = ?self,
            events = report.events,
            skipped = report.skipped,
            dropped = report.dropped,
            written = report.written,
            "parse finished"
        );
        Ok(report)
    }
}

/// Resumable writer for the `Populate` selection.
///
/// Construction drains the trail once, keeping the most recent `max_events`
/// entries. Each [`step`](Self::step) then writes up to `budget` of them,
/// oldest first, so a caller can fill a freshly cleared cache in bounded
/// chunks. A step that writes fewer entries than requested means the
/// selection is exhausted.
#[derive(Debug)]
pub struct PopulateCursor {
    pending: VecDeque<AuditLogEntry>,
    report: ParseReport,
}

impl PopulateCursor {
    /// Drains `source` and prepares the selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseFailed`](crate::Error::ParseFailed) if the
    /// trail cannot be read to the end.
    pub fn new<S: RecordSource>(
        source: S,
        projector: &EntryProjector,
        max_events: usize,
    ) -> Result<Self> {
        let (pending, report) = latest(source, projector, max_events)?;
        Ok(Self { pending, report })
    }

    /// Writes up to `budget` entries to `sink` and returns how many were
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sink`](crate::Error::Sink) if the sink fails; the
    /// failing entry is lost, earlier ones stay written.
    pub fn step<K: Sink>(&mut self, budget: usize, mut sink: K) -> Result<usize> {
        let mut written = 0;
        while written < budget {
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            sink.sink(entry)?;
            written += 1;
        }
        self.report.written += written;
        Ok(written)
    }

    /// Entries still waiting to be written.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Counters so far; `written` grows with every step.
    pub fn report(&self) -> ParseReport {
        self.report
    }
}

/// Drains the trail keeping only the last `n` entries.
fn latest<S: RecordSource>(
    source: S,
    projector: &EntryProjector,
    n: usize,
) -> Result<(VecDeque<AuditLogEntry>, ParseReport)> {
    // Grows with the entries actually seen; `n` may be far larger.
    let mut window = VecDeque::new();
    if n == 0 {
        return Ok((window, ParseReport::default()));
    }

    let mut entries = Entries::new(source, projector);
    for entry in entries.by_ref() {
        if window.len() == n {
            window.pop_front();
        }
        window.push_back(entry?);
    }
    Ok((window, entries.report()))
}

/// Iterator of projected entries, absorbing per-event errors.
struct Entries<'p, S> {
    events: EventAssembler<S>,
    projector: &'p EntryProjector,
    report: ParseReport,
}

impl<'p, S: RecordSource> Entries<'p, S> {
    fn new(source: S, projector: &'p EntryProjector) -> Self {
        Self {
            events: EventAssembler::new(source),
            projector,
            report: ParseReport::default(),
        }
    }

    fn report(&self) -> ParseReport {
        self.report
    }
}

impl<S: RecordSource> Iterator for Entries<'_, S> {
    type Item = Result<AuditLogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = match self.events.next()? {
                Ok(event) => event,
                Err(err) => {
                    tracing::error!(%err, "audit trail traversal aborted");
                    return Some(Err(err));
                }
            };
            self.report.events += 1;

            match self.projector.project(&event) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => self.report.skipped += 1,
                Err(err) => {
                    self.report.dropped += 1;
                    tracing::warn!(serial = event.serial(), %err, "dropping audit event");
                }
            }
        }
    }
}
