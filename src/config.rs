//! Manager configuration.

use std::path::{Path, PathBuf};

use crate::projector::{EntryProjector, DEFAULT_TRACKED_TYPES};

/// Default number of entries written per populate step.
pub const DEFAULT_POPULATE_BATCH: usize = 64;

/// Settings for a [`Manager`](crate::Manager).
///
/// # Example
///
/// ```
/// use auditlog_core::ManagerConfig;
///
/// let config = ManagerConfig::new()
///     .with_snapshot_dir("/var/tmp")
///     .with_keep_snapshots(true)
///     .with_populate_batch(16)
///     .with_tracked_types(["USYS_CONFIG"]);
///
/// assert!(config.keep_snapshots());
/// assert_eq!(config.populate_batch(), 16);
/// assert_eq!(config.tracked_types(), ["USYS_CONFIG"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    snapshot_dir: PathBuf,
    keep_snapshots: bool,
    populate_batch: usize,
    tracked_types: Vec<String>,
}

impl ManagerConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory snapshot files are created in.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = dir.into();
        self
    }

    /// Keep snapshots at stable names instead of anonymous temp files.
    pub fn with_keep_snapshots(mut self, keep: bool) -> Self {
        self.keep_snapshots = keep;
        self
    }

    /// Maximum entries written per populate step. Zero is treated as one.
    pub fn with_populate_batch(mut self, batch: usize) -> Self {
        self.populate_batch = batch.max(1);
        self
    }

    /// Event type tags projected into entries.
    pub fn with_tracked_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tracked_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Snapshot directory.
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Whether snapshots are kept after their descriptor is closed.
    pub fn keep_snapshots(&self) -> bool {
        self.keep_snapshots
    }

    /// Populate step size.
    pub fn populate_batch(&self) -> usize {
        self.populate_batch
    }

    /// Tracked event type tags.
    pub fn tracked_types(&self) -> &[String] {
        &self.tracked_types
    }

    /// Builds the projector for the tracked types.
    pub fn projector(&self) -> EntryProjector {
        EntryProjector::new(self.tracked_types.iter().cloned())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: std::env::temp_dir(),
            keep_snapshots: false,
            populate_batch: DEFAULT_POPULATE_BATCH,
            tracked_types: DEFAULT_TRACKED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.snapshot_dir(), std::env::temp_dir());
        assert!(!config.keep_snapshots());
        assert_eq!(config.populate_batch(), DEFAULT_POPULATE_BATCH);
        assert_eq!(config.tracked_types(), DEFAULT_TRACKED_TYPES);
    }

    #[test]
    fn zero_batch_is_clamped() {
        assert_eq!(ManagerConfig::new().with_populate_batch(0).populate_batch(), 1);
    }

    #[test]
    fn projector_follows_tracked_types() {
        let projector = ManagerConfig::new()
            .with_tracked_types(["SYSCALL"])
            .projector();
        assert!(projector.tracks("SYSCALL"));
        assert!(!projector.tracks("USYS_CONFIG"));
    }
}
