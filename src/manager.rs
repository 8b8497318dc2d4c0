//! The manager facade: exports, cache hydration and event recording.

use std::fs::File;

use crate::cache::{EntryCache, EntryPublisher};
use crate::config::ManagerConfig;
use crate::entry::AuditResult;
use crate::error::Result;
use crate::export::{Deferrer, SnapshotExport};
use crate::projector::EntryProjector;
use crate::sink::{CacheSink, FileSink, SnapshotFile};
use crate::strategy::{ParseReport, ParseStrategy, PopulateCursor};
use crate::trail::{NewEvent, TrailOpener, TrailWriter};

const FULL_SNAPSHOT_NAME: &str = "auditLog.json";
const LATEST_SNAPSHOT_NAME: &str = "auditEntries.json";

/// Ties the trail, the live cache and snapshot export together.
///
/// Every operation runs to completion on the calling thread. The only
/// deferred work is closing the local copy of an exported descriptor, which
/// happens on the next tick of the loop behind the [`Deferrer`].
///
/// # Example
///
/// ```
/// use auditlog_core::{AuditResult, Manager, ManagerConfig, SnapshotReader, TaskQueue};
/// use auditlog_core::trail::FileTrail;
///
/// let dir = tempfile::tempdir().unwrap();
/// let queue = TaskQueue::new();
/// let config = ManagerConfig::new().with_snapshot_dir(dir.path());
/// let trail = FileTrail::new(dir.path().join("audit.log"));
/// let mut manager = Manager::new(trail, queue.clone(), config);
///
/// manager
///     .record_event("set-ntp", "root", "10.0.0.1", "bmc", AuditResult::Success, "")
///     .unwrap();
///
/// let file = manager.export_full().unwrap();
/// queue.run_pending();
///
/// let entries: Vec<_> = SnapshotReader::new(file).collect::<Result<_, _>>().unwrap();
/// assert_eq!(entries[0].operation(), "set-ntp");
/// ```
pub struct Manager<T, D> {
    trail: T,
    projector: EntryProjector,
    cache: EntryCache,
    export: SnapshotExport<D>,
    config: ManagerConfig,
}

impl<T: TrailOpener, D: Deferrer> Manager<T, D> {
    /// Creates a manager with an empty, zero-capacity cache.
    pub fn new(trail: T, deferrer: D, config: ManagerConfig) -> Self {
        Self {
            trail,
            projector: config.projector(),
            cache: EntryCache::new(),
            export: SnapshotExport::new(deferrer),
            config,
        }
    }

    /// Routes cache publication side effects to `publisher`.
    ///
    /// Replaces the cache, so call this before [`populate`](Self::populate).
    pub fn with_publisher(mut self, publisher: impl EntryPublisher + 'static) -> Self {
        self.cache = EntryCache::with_publisher(publisher);
        self
    }

    /// Exports every entry in the trail.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SourceUnavailable`], [`Error::ParseFailed`],
    /// [`Error::Sink`] or [`Error::OpenFailed`]. Nothing is handed out on
    /// failure.
    ///
    /// [`Error::SourceUnavailable`]: crate::Error::SourceUnavailable
    /// [`Error::ParseFailed`]: crate::Error::ParseFailed
    /// [`Error::Sink`]: crate::Error::Sink
    /// [`Error::OpenFailed`]: crate::Error::OpenFailed
    pub fn export_full(&mut self) -> Result<File> {
        let snapshot = self.snapshot(ParseStrategy::All, FULL_SNAPSHOT_NAME)?;
        self.export.export(snapshot)
    }

    /// Exports the `n` most recent entries, oldest first.
    ///
    /// # Errors
    ///
    /// Same as [`export_full`](Self::export_full).
    pub fn export_latest(&mut self, n: usize) -> Result<File> {
        let snapshot = self.snapshot(ParseStrategy::Latest(n), LATEST_SNAPSHOT_NAME)?;
        self.export.export(snapshot)
    }

    /// Refills the cache with the `max_events` most recent entries.
    ///
    /// The cache is cleared and its capacity set to `max_events` before the
    /// trail is read, so a failure leaves it empty or partly filled.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::SourceUnavailable`](crate::Error::SourceUnavailable)
    /// or [`Error::ParseFailed`](crate::Error::ParseFailed).
    pub fn populate(&mut self, max_events: usize) -> Result<ParseReport> {
        tracing::debug!(max_events, "populating entry cache");
        self.cache.clear();
        self.cache.set_max(max_events);
        if max_events == 0 {
            return Ok(ParseReport::default());
        }

        let source = self.trail.open_trail()?;
        let mut cursor = PopulateCursor::new(source, &self.projector, max_events)?;

        let batch = self.config.populate_batch();
        let mut left = max_events;
        while left > 0 {
            let budget = left.min(batch);
            let written = cursor.step(budget, CacheSink::new(&mut self.cache))?;
            left -= written;
            if written < budget {
                break;
            }
        }

        let report = cursor.report();
        tracing::debug!(
            max_events,
            written = report.written,
            dropped = report.dropped,
            "entry cache populated"
        );
        Ok(report)
    }

    /// The live entry cache.
    pub fn cache(&self) -> &EntryCache {
        &self.cache
    }

    /// Returns true while an exported descriptor awaits its deferred close.
    pub fn has_pending_export(&self) -> bool {
        self.export.has_pending()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn snapshot(&self, strategy: ParseStrategy, name: &str) -> Result<SnapshotFile> {
        let dir = self.config.snapshot_dir();
        let mut sink = if self.config.keep_snapshots() {
            FileSink::persistent(dir.join(name))?
        } else {
            FileSink::temporary(dir)?
        };

        // Latest(0) selects nothing; skip the trail entirely.
        if strategy != ParseStrategy::Latest(0) {
            let source = self.trail.open_trail()?;
            strategy.run(source, &self.projector, &mut sink)?;
        }

        let snapshot = sink.finish()?;
        tracing::debug!(
            strategy = ?strategy,
            entries = snapshot.entries(),
            fd_path = %snapshot.path().display(),
            "snapshot written"
        );
        Ok(snapshot)
    }
}

impl<T: TrailOpener + TrailWriter, D: Deferrer> Manager<T, D> {
    /// Appends a new event to the trail.
    ///
    /// The cache is not updated; the event shows up after the next
    /// [`populate`](Self::populate).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidField`](crate::Error::InvalidField) or
    /// [`Error::TrailWrite`](crate::Error::TrailWrite).
    pub fn record_event(
        &self,
        operation: &str,
        username: &str,
        address: &str,
        hostname: &str,
        result: AuditResult,
        detail: &str,
    ) -> Result<()> {
        let event = NewEvent {
            operation: operation.to_string(),
            username: username.to_string(),
            address: address.to_string(),
            hostname: hostname.to_string(),
            result,
            detail: detail.to_string(),
        };
        self.trail.append(&event)?;
        tracing::debug!(operation, username, %result, "audit event recorded");
        Ok(())
    }
}

impl<T, D> std::fmt::Debug for Manager<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("cache", &self.cache)
            .field("export", &self.export)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::export::{SnapshotReader, TaskQueue};
    use crate::trail::FileTrail;
    use std::io::Write;
    use std::path::Path;

    fn write_trail(path: &Path, count: u64) {
        let mut file = File::create(path).unwrap();
        for n in 1..=count {
            writeln!(
                file,
                "type=USYS_CONFIG msg=audit({}.000:{}): pid=1 msg='op=op-{} acct=\"root\" res=success'",
                n, n, n
            )
            .unwrap();
        }
    }

    fn setup(count: u64) -> (tempfile::TempDir, TaskQueue, Manager<FileTrail, TaskQueue>) {
        let dir = tempfile::tempdir().unwrap();
        let trail = dir.path().join("audit.log");
        write_trail(&trail, count);
        let queue = TaskQueue::new();
        let config = ManagerConfig::new().with_snapshot_dir(dir.path());
        let manager = Manager::new(FileTrail::new(trail), queue.clone(), config);
        (dir, queue, manager)
    }

    fn read_ops(file: File) -> Vec<String> {
        SnapshotReader::new(file)
            .map(|e| e.unwrap().operation().to_string())
            .collect()
    }

    #[test]
    fn export_latest_returns_most_recent() {
        let (_dir, queue, mut manager) = setup(5);
        let file = manager.export_latest(2).unwrap();
        assert!(manager.has_pending_export());
        queue.run_pending();
        assert!(!manager.has_pending_export());
        assert_eq!(read_ops(file), vec!["op-4", "op-5"]);
    }

    #[test]
    fn export_latest_zero_is_empty_even_without_trail() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig::new().with_snapshot_dir(dir.path());
        let mut manager = Manager::new(
            FileTrail::new(dir.path().join("missing.log")),
            TaskQueue::new(),
            config,
        );
        let file = manager.export_latest(0).unwrap();
        assert!(read_ops(file).is_empty());
    }

    #[test]
    fn populate_steps_in_batches() {
        let (dir, _queue, manager) = setup(10);
        let config = manager
            .config()
            .clone()
            .with_snapshot_dir(dir.path())
            .with_populate_batch(3);
        let mut manager = Manager::new(
            FileTrail::new(dir.path().join("audit.log")),
            TaskQueue::new(),
            config,
        );

        let report = manager.populate(8).unwrap();
        assert_eq!(report.written, 8);
        assert_eq!(manager.cache().len(), 8);
        assert_eq!(manager.cache().capacity(), 8);
        let first = manager.cache().entries().next().map(|(_, e)| e.operation().to_string());
        assert_eq!(first.as_deref(), Some("op-3"));
    }

    #[test]
    fn populate_with_full_range_limit() {
        let (_dir, _queue, mut manager) = setup(7);
        let limit = u32::MAX as usize;

        let report = manager.populate(limit).unwrap();
        assert_eq!(report.written, 7);
        assert_eq!(manager.cache().len(), 7);
        assert_eq!(manager.cache().capacity(), limit);
    }

    #[test]
    fn export_latest_with_full_range_limit() {
        let (_dir, queue, mut manager) = setup(3);
        let file = manager.export_latest(u32::MAX as usize).unwrap();
        queue.run_pending();
        assert_eq!(read_ops(file), vec!["op-1", "op-2", "op-3"]);
    }

    #[test]
    fn populate_replaces_previous_contents() {
        let (_dir, _queue, mut manager) = setup(4);
        manager.populate(4).unwrap();
        let before = manager.cache().ids();
        manager.populate(2).unwrap();
        let after = manager.cache().ids();

        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|id| !before.contains(id)));
    }

    #[test]
    fn populate_zero_empties_cache() {
        let (_dir, _queue, mut manager) = setup(3);
        manager.populate(3).unwrap();
        assert_eq!(manager.populate(0).unwrap(), ParseReport::default());
        assert!(manager.cache().is_empty());
        assert_eq!(manager.cache().capacity(), 0);
    }

    #[test]
    fn missing_trail_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig::new().with_snapshot_dir(dir.path());
        let mut manager = Manager::new(
            FileTrail::new(dir.path().join("missing.log")),
            TaskQueue::new(),
            config,
        );
        assert!(matches!(
            manager.export_full(),
            Err(Error::SourceUnavailable { .. })
        ));
        assert!(matches!(
            manager.populate(5),
            Err(Error::SourceUnavailable { .. })
        ));
        assert!(!manager.has_pending_export());
    }

    #[test]
    fn kept_snapshots_use_stable_names() {
        let (dir, queue, manager) = setup(2);
        let config = manager.config().clone().with_keep_snapshots(true);
        let mut manager = Manager::new(
            FileTrail::new(dir.path().join("audit.log")),
            queue.clone(),
            config,
        );

        manager.export_full().unwrap();
        manager.export_latest(1).unwrap();
        queue.run_pending();

        assert!(dir.path().join(FULL_SNAPSHOT_NAME).exists());
        assert!(dir.path().join(LATEST_SNAPSHOT_NAME).exists());
    }

    #[test]
    fn record_event_then_populate() {
        let (_dir, _queue, mut manager) = setup(1);
        manager
            .record_event("reboot", "admin", "10.0.0.9", "host", AuditResult::Failure, "forced")
            .unwrap();
        manager.populate(5).unwrap();

        let (_, latest) = manager.cache().entries().last().unwrap();
        assert_eq!(latest.operation(), "reboot");
        assert_eq!(latest.username(), "admin");
        assert_eq!(latest.result(), AuditResult::Failure);
        assert_eq!(latest.detail(), "forced");
    }
}
