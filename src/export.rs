//! Snapshot export and deferred descriptor closing.
//!
//! An exported snapshot is handed to the transport as an open, read-only
//! [`File`]. The transport duplicates the descriptor while it marshals the
//! reply, so the local copy cannot be closed before the reply has gone out.
//! Instead it is parked in a single pending slot and closed by a callback
//! scheduled on the next iteration of the host event loop.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::rc::{Rc, Weak};

use crate::entry::AuditLogEntry;
use crate::error::{Error, Result};
use crate::sink::SnapshotFile;

/// Single-shot task scheduling on the host event loop.
///
/// Tasks must run on a later loop iteration than the one that deferred
/// them, in the order they were deferred. Deferring never blocks.
pub trait Deferrer {
    /// Schedules `task` for the next loop iteration.
    fn defer(&self, task: Box<dyn FnOnce()>);
}

impl<D: Deferrer + ?Sized> Deferrer for Rc<D> {
    fn defer(&self, task: Box<dyn FnOnce()>) {
        (**self).defer(task)
    }
}

/// A minimal event loop: a FIFO of deferred tasks.
///
/// Clones share the same queue, so the host keeps one handle to drive the
/// loop and gives another to the manager.
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use auditlog_core::{Deferrer, TaskQueue};
///
/// let queue = TaskQueue::new();
/// let ran = Rc::new(Cell::new(false));
/// let flag = ran.clone();
/// queue.defer(Box::new(move || flag.set(true)));
///
/// assert!(!ran.get());
/// assert_eq!(queue.run_pending(), 1);
/// assert!(ran.get());
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting for the next iteration.
    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Runs one loop iteration and returns how many tasks ran.
    ///
    /// Tasks deferred while this iteration runs wait for the next one.
    pub fn run_pending(&self) -> usize {
        let batch = std::mem::take(&mut *self.tasks.borrow_mut());
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }
}

impl Deferrer for TaskQueue {
    fn defer(&self, task: Box<dyn FnOnce()>) {
        self.tasks.borrow_mut().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

/// The local descriptor copy of an export awaiting its deferred close.
struct PendingExport {
    generation: u64,
    local: File,
    snapshot: SnapshotFile,
}

impl fmt::Debug for PendingExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExport")
            .field("generation", &self.generation)
            .field("path", &self.snapshot.path())
            .finish()
    }
}

type Slot = Rc<RefCell<Option<PendingExport>>>;

/// Hands snapshot files to the transport and schedules their closing.
///
/// At most one export is pending at any time. A new export replaces a
/// pending one that has not been closed yet; the replaced descriptor is
/// closed immediately and its scheduled callback becomes a no-op.
pub struct SnapshotExport<D> {
    deferrer: D,
    slot: Slot,
    generation: u64,
}

impl<D: Deferrer> SnapshotExport<D> {
    /// Creates an exporter scheduling closes through `deferrer`.
    pub fn new(deferrer: D) -> Self {
        Self {
            deferrer,
            slot: Rc::new(RefCell::new(None)),
            generation: 0,
        }
    }

    /// Opens a snapshot file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpenFailed`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<File> {
        let file = File::open(path).map_err(|source| {
            tracing::error!(path = %path.display(), %source, "failed to open snapshot");
            Error::OpenFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tracing::debug!(fd_path = %path.display(), "opened snapshot");
        Ok(file)
    }

    /// Exports `snapshot`: returns the descriptor for the transport and
    /// schedules the close of the local copy.
    ///
    /// The snapshot file itself lives until that close runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpenFailed`] if the file cannot be opened or its
    /// descriptor cannot be duplicated.
    pub fn export(&mut self, snapshot: SnapshotFile) -> Result<File> {
        let local = Self::open(snapshot.path())?;
        let handed = local.try_clone().map_err(|source| Error::OpenFailed {
            path: snapshot.path().to_path_buf(),
            source,
        })?;
        self.schedule_deferred_close(local, snapshot);
        Ok(handed)
    }

    /// Returns true while an exported descriptor is waiting to be closed.
    pub fn has_pending(&self) -> bool {
        self.slot.borrow().is_some()
    }

    fn schedule_deferred_close(&mut self, local: File, snapshot: SnapshotFile) {
        self.generation += 1;
        let generation = self.generation;

        let stale = self.slot.borrow_mut().replace(PendingExport {
            generation,
            local,
            snapshot,
        });
        if let Some(stale) = stale {
            tracing::warn!(
                generation = stale.generation,
                path = %stale.snapshot.path().display(),
                "replacing export whose deferred close has not run"
            );
        }

        let slot = Rc::downgrade(&self.slot);
        self.deferrer
            .defer(Box::new(move || close_pending(&slot, generation)));
    }
}

fn close_pending(slot: &Weak<RefCell<Option<PendingExport>>>, generation: u64) {
    let Some(cell) = slot.upgrade() else {
        return;
    };
    let mut slot = cell.borrow_mut();
    if slot.as_ref().map(|p| p.generation) != Some(generation) {
        return;
    }
    if let Some(pending) = slot.take() {
        tracing::debug!(
            generation,
            fd_path = %pending.snapshot.path().display(),
            "closing exported snapshot descriptor"
        );
        drop(pending.local);
    }
}

impl<D> fmt::Debug for SnapshotExport<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotExport")
            .field("pending", &*self.slot.borrow())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Streams entries back out of an exported snapshot.
///
/// ```
/// use std::io::Cursor;
/// use auditlog_core::SnapshotReader;
///
/// let text = r#"{"Operation":"login","Username":"root","Address":"","Hostname":"","Result":"Success","Detail":"","EventTimestamp":5,"MessageArgs":[]}"#;
/// let entries: Vec<_> = SnapshotReader::new(Cursor::new(text))
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(entries[0].username(), "root");
/// ```
pub struct SnapshotReader<R> {
    reader: BufReader<R>,
    line_no: u64,
    buf: String,
}

impl<R: Read> SnapshotReader<R> {
    /// Wraps a snapshot descriptor positioned at its start.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_no: 0,
            buf: String::new(),
        }
    }
}

impl<R: Read> Iterator for SnapshotReader<R> {
    type Item = Result<AuditLogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => self.line_no += 1,
                Err(e) => return Some(Err(Error::parse_failed(self.line_no + 1, e.to_string()))),
            }
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(line)
                    .map_err(|e| Error::parse_failed(self.line_no, e.to_string())),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditResult;
    use crate::sink::{FileSink, Sink};
    use std::cell::Cell;
    use std::io::Cursor;

    fn snapshot(dir: &Path, count: u64) -> SnapshotFile {
        let mut sink = FileSink::temporary(dir).unwrap();
        for n in 0..count {
            sink.sink(AuditLogEntry::new("op", AuditResult::Success, n))
                .unwrap();
        }
        sink.finish().unwrap()
    }

    #[test]
    fn task_queue_runs_in_order_on_next_tick() {
        let queue = TaskQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            queue.defer(Box::new(move || order.borrow_mut().push(n)));
        }
        assert_eq!(queue.pending(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn tasks_deferred_during_a_tick_wait_for_the_next() {
        let queue = TaskQueue::new();
        let hits = Rc::new(Cell::new(0));

        let inner_queue = queue.clone();
        let inner_hits = hits.clone();
        queue.defer(Box::new(move || {
            inner_hits.set(inner_hits.get() + 1);
            let again = inner_hits.clone();
            inner_queue.defer(Box::new(move || again.set(again.get() + 1)));
        }));

        queue.run_pending();
        assert_eq!(hits.get(), 1);
        queue.run_pending();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn export_defers_close_to_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new();
        let mut export = SnapshotExport::new(queue.clone());

        let file = export.export(snapshot(dir.path(), 2)).unwrap();
        assert!(export.has_pending());

        queue.run_pending();
        assert!(!export.has_pending());

        let entries: Vec<_> = SnapshotReader::new(file).collect::<Result<_>>().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn temporary_snapshot_removed_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new();
        let mut export = SnapshotExport::new(queue.clone());

        let snap = snapshot(dir.path(), 1);
        let path = snap.path().to_path_buf();
        let _file = export.export(snap).unwrap();
        assert!(path.exists());

        queue.run_pending();
        assert!(!path.exists());
    }

    #[test]
    fn new_export_replaces_stale_pending() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new();
        let mut export = SnapshotExport::new(queue.clone());

        let _first = export.export(snapshot(dir.path(), 1)).unwrap();
        let second = export.export(snapshot(dir.path(), 3)).unwrap();
        assert!(export.has_pending());

        // Both callbacks run; only the current one closes anything.
        assert_eq!(queue.run_pending(), 2);
        assert!(!export.has_pending());

        let entries: Vec<_> = SnapshotReader::new(second).collect::<Result<_>>().unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn stale_callback_does_not_close_newer_export() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new();
        let mut export = SnapshotExport::new(queue.clone());

        let _first = export.export(snapshot(dir.path(), 1)).unwrap();
        let pending_tasks = std::mem::take(&mut *queue.tasks.borrow_mut());
        let _second = export.export(snapshot(dir.path(), 1)).unwrap();

        for task in pending_tasks {
            task();
        }
        assert!(export.has_pending());
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = SnapshotExport::<TaskQueue>::open(&dir.path().join("gone.json"));
        assert!(matches!(result, Err(Error::OpenFailed { .. })));
    }

    #[test]
    fn reader_reports_bad_line() {
        let text = "\n{\"broken\": true}\n";
        let mut reader = SnapshotReader::new(Cursor::new(text));
        assert!(matches!(
            reader.next(),
            Some(Err(Error::ParseFailed { position: 2, .. }))
        ));
    }

    #[test]
    fn callback_after_exporter_dropped_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let queue = TaskQueue::new();
        let mut export = SnapshotExport::new(queue.clone());
        let _file = export.export(snapshot(dir.path(), 1)).unwrap();
        drop(export);
        assert_eq!(queue.run_pending(), 1);
    }
}
