//! Bounded, insertion-ordered cache of published entries.
//!
//! The cache is an arena of value-typed entries keyed by [`EntryId`].
//! Entries never refer back to the cache. Every insertion and removal is
//! reported to an [`EntryPublisher`], which is where the host's IPC layer
//! creates and retracts the corresponding objects.

use std::collections::VecDeque;
use std::fmt;

use crate::entry::AuditLogEntry;

/// Object path prefix under which cached entries are published.
pub const ENTRY_PATH_ROOT: &str = "/xyz/openbmc_project/logging/auditlog";

/// Identifier of a published entry, assigned in publish order.
///
/// Identifiers are never reused by a cache, not even after `clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl EntryId {
    /// Returns the publish-order index.
    pub fn index(&self) -> u64 {
        self.0
    }

    /// Object path the entry is published under.
    pub fn object_path(&self) -> String {
        format!("{}/{}", ENTRY_PATH_ROOT, self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives publication side effects from an [`EntryCache`].
pub trait EntryPublisher {
    /// An entry entered the cache.
    fn publish(&mut self, id: EntryId, entry: &AuditLogEntry);

    /// An entry left the cache (eviction, shrink or clear).
    fn retract(&mut self, id: EntryId);
}

/// Publisher that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl EntryPublisher for NoopPublisher {
    fn publish(&mut self, _id: EntryId, _entry: &AuditLogEntry) {}

    fn retract(&mut self, _id: EntryId) {}
}

/// Publisher that reports every change as a structured tracing event.
///
/// Useful as the publication hook when no bus is attached, and for
/// following cache churn in logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl EntryPublisher for TracingPublisher {
    fn publish(&mut self, id: EntryId, entry: &AuditLogEntry) {
        tracing::info!(
            target: "auditlog",
            path = %id.object_path(),
            operation = %entry.operation(),
            username = %entry.username(),
            address = %entry.address(),
            hostname = %entry.hostname(),
            result = %entry.result(),
            event_timestamp = entry.event_timestamp(),
            args = entry.message_args().len(),
            "audit entry published"
        );
    }

    fn retract(&mut self, id: EntryId) {
        tracing::info!(target: "auditlog", path = %id.object_path(), "audit entry retracted");
    }
}

/// Capacity-bounded store of published entries.
///
/// A new cache has capacity 0 and accepts nothing until [`set_max`] is
/// called.
///
/// # Invariants
///
/// - `len() <= capacity()` after every public call returns
/// - entries are kept oldest first; eviction always removes the oldest
///
/// # Example
///
/// ```
/// use auditlog_core::{AuditLogEntry, AuditResult, EntryCache};
///
/// let mut cache = EntryCache::new();
/// cache.set_max(2);
/// for ts in 1..=3 {
///     cache.publish(AuditLogEntry::new("login", AuditResult::Success, ts));
/// }
///
/// let kept: Vec<u64> = cache.entries().map(|(_, e)| e.event_timestamp()).collect();
/// assert_eq!(kept, vec![2, 3]);
/// ```
///
/// [`set_max`]: EntryCache::set_max
pub struct EntryCache {
    entries: VecDeque<(EntryId, AuditLogEntry)>,
    capacity: usize,
    next_index: u64,
    publisher: Box<dyn EntryPublisher>,
}

impl EntryCache {
    /// Creates an empty cache with capacity 0 and no publisher.
    pub fn new() -> Self {
        Self::with_publisher(NoopPublisher)
    }

    /// Creates an empty cache reporting to `publisher`.
    pub fn with_publisher(publisher: impl EntryPublisher + 'static) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: 0,
            next_index: 0,
            publisher: Box::new(publisher),
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sets the capacity, evicting the oldest entries if it shrank below
    /// the current size.
    pub fn set_max(&mut self, capacity: usize) {
        tracing::debug!(capacity, size = self.entries.len(), "entry cache resized");
        self.capacity = capacity;
        self.evict_to(capacity);
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!(size = self.entries.len(), "clearing entry cache");
        }
        self.evict_to(0);
    }

    /// Inserts `entry` as the newest element and returns its identifier.
    ///
    /// At capacity the oldest entry is evicted first. With capacity 0 the
    /// entry is discarded, but an identifier is still consumed and returned.
    pub fn publish(&mut self, entry: AuditLogEntry) -> EntryId {
        let id = EntryId(self.next_index);
        self.next_index += 1;

        if self.capacity == 0 {
            tracing::trace!(%id, "entry cache has no capacity, entry discarded");
            return id;
        }

        self.evict_to(self.capacity - 1);
        self.publisher.publish(id, &entry);
        self.entries.push_back((id, entry));
        id
    }

    /// Looks up an entry by identifier.
    pub fn get(&self, id: EntryId) -> Option<&AuditLogEntry> {
        // Ids are strictly increasing front to back.
        self.entries
            .binary_search_by_key(&id, |(entry_id, _)| *entry_id)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Iterates entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &AuditLogEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Identifiers oldest first.
    pub fn ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    fn evict_to(&mut self, limit: usize) {
        while self.entries.len() > limit {
            if let Some((id, _)) = self.entries.pop_front() {
                self.publisher.retract(id);
            }
        }
    }
}

impl Default for EntryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("next_index", &self.next_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::AuditResult;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Change {
        Published(u64),
        Retracted(u64),
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Change>>>);

    impl EntryPublisher for Recorder {
        fn publish(&mut self, id: EntryId, _entry: &AuditLogEntry) {
            self.0.borrow_mut().push(Change::Published(id.index()));
        }

        fn retract(&mut self, id: EntryId) {
            self.0.borrow_mut().push(Change::Retracted(id.index()));
        }
    }

    fn entry(ts: u64) -> AuditLogEntry {
        AuditLogEntry::new("op", AuditResult::Success, ts)
    }

    fn timestamps(cache: &EntryCache) -> Vec<u64> {
        cache.entries().map(|(_, e)| e.event_timestamp()).collect()
    }

    #[test]
    fn new_cache_accepts_nothing() {
        let mut cache = EntryCache::new();
        assert_eq!(cache.capacity(), 0);
        let first = cache.publish(entry(1));
        let second = cache.publish(entry(2));
        assert!(cache.is_empty());
        assert_ne!(first, second);
    }

    #[test]
    fn publish_evicts_oldest_at_capacity() {
        let mut cache = EntryCache::new();
        cache.set_max(3);
        for ts in 1..=5 {
            cache.publish(entry(ts));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(timestamps(&cache), vec![3, 4, 5]);
    }

    #[test]
    fn shrinking_evicts_immediately_and_is_idempotent() {
        let mut cache = EntryCache::new();
        cache.set_max(5);
        for ts in 1..=5 {
            cache.publish(entry(ts));
        }

        cache.set_max(2);
        assert_eq!(timestamps(&cache), vec![4, 5]);
        cache.set_max(2);
        assert_eq!(timestamps(&cache), vec![4, 5]);

        cache.set_max(10);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn clear_keeps_capacity_and_never_reuses_ids() {
        let mut cache = EntryCache::new();
        cache.set_max(4);
        let before = cache.publish(entry(1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);

        let after = cache.publish(entry(2));
        assert!(after > before);
    }

    #[test]
    fn get_finds_live_entries_only() {
        let mut cache = EntryCache::new();
        cache.set_max(1);
        let old = cache.publish(entry(1));
        let new = cache.publish(entry(2));
        assert!(cache.get(old).is_none());
        assert_eq!(cache.get(new).map(|e| e.event_timestamp()), Some(2));
    }

    #[test]
    fn publisher_sees_every_change_in_order() {
        let recorder = Recorder::default();
        let log = recorder.0.clone();
        let mut cache = EntryCache::with_publisher(recorder);

        cache.set_max(2);
        cache.publish(entry(1));
        cache.publish(entry(2));
        cache.publish(entry(3));
        cache.set_max(1);
        cache.clear();

        assert_eq!(
            *log.borrow(),
            vec![
                Change::Published(0),
                Change::Published(1),
                Change::Retracted(0),
                Change::Published(2),
                Change::Retracted(1),
                Change::Retracted(2),
            ]
        );
    }

    #[test]
    fn zero_capacity_publish_is_not_announced() {
        let recorder = Recorder::default();
        let log = recorder.0.clone();
        let mut cache = EntryCache::with_publisher(recorder);
        cache.publish(entry(1));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn object_paths_use_index() {
        let mut cache = EntryCache::new();
        cache.set_max(1);
        let id = cache.publish(entry(1));
        assert_eq!(id.object_path(), "/xyz/openbmc_project/logging/auditlog/0");
    }

    #[test]
    fn tracing_publisher_does_not_panic() {
        let mut cache = EntryCache::with_publisher(TracingPublisher);
        cache.set_max(1);
        cache.publish(entry(1));
        cache.publish(entry(2));
    }
}
