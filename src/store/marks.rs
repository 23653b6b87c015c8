//! Thread-Safe Mark Store with an Explicit Expiry Index
//!
//! This module implements the core storage for EmberMark: a concurrent map
//! of mark records plus a sorted index from expiry time to mark id.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: The record map is split into shards so writers for
//!    different ids never contend.
//! 2. **Explicit Expiry Index**: Record expiry is not independently
//!    observable from a plain map, so a `BTreeMap` keyed by
//!    `(expires_at_ms, id)` mirrors the TTL state and makes range queries
//!    ("everything expiring before now") cheap.
//! 3. **One Logical Entity**: The map and the index are two physical
//!    structures but callers only ever see `MarkStore` operations. The index
//!    is never handed out, so the two views cannot be driven apart by
//!    callers.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MarkStore                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐    ┌─────────────────┐  │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard N │    │   ExpiryIndex   │  │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │    │     RwLock      │  │
//! │  │ HashMap │ │ HashMap │ │ HashMap │    │ BTreeMap<(ms,id)>│ │
//! │  └─────────┘ └─────────┘ └─────────┘    └─────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `put` touches one shard and the index, in that order. The window
//! between the two writes is an accepted drift: a mark that made it into
//! the map but not the index is invisible to `get_active` until removed.
//! The reverse (index entry without a record) is tolerated by every reader.

use crate::model::Mark;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Number of shards for the record map.
/// The workload is small marks, so a modest shard count is plenty.
const NUM_SHARDS: usize = 16;

/// Cap on marks returned by a single active-range query.
pub const ACTIVE_QUERY_LIMIT: usize = 2000;

/// The main store for mark records.
///
/// Designed to be wrapped in an `Arc` and shared between request handlers
/// and the expiry sweeper. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use embermark::model::{Mark, MarkColor};
/// use embermark::store::MarkStore;
/// use chrono::Utc;
///
/// let store = MarkStore::new();
/// let mark = Mark::new(49.0, 28.0, MarkColor::Blue, None, Utc::now());
/// let id = mark.id.clone();
///
/// store.put(mark);
/// let active = store.get_active(Utc::now(), 100);
/// assert_eq!(active.len(), 1);
///
/// store.remove(&id);
/// assert!(store.get_active(Utc::now(), 100).is_empty());
/// ```
pub struct MarkStore {
    /// Sharded record storage, keyed by mark id
    shards: Vec<RwLock<HashMap<String, Mark>>>,

    /// Sorted expiry index: (expires_at in epoch ms, mark id).
    /// The tuple ordering gives ascending expiry with a lexicographic id
    /// tiebreak, which is exactly the ordering `get_active` must return.
    index: RwLock<BTreeMap<(i64, String), ()>>,

    /// Statistics: total puts
    put_count: AtomicU64,

    /// Statistics: total active-range queries
    query_count: AtomicU64,

    /// Statistics: total explicit removals that found a record
    removal_count: AtomicU64,

    /// Statistics: entries removed by expiry sweeps
    expired_count: AtomicU64,
}

impl std::fmt::Debug for MarkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkStore")
            .field("shards", &self.shards.len())
            .field("puts", &self.put_count.load(Ordering::Relaxed))
            .field("queries", &self.query_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MarkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect();

        Self {
            shards,
            index: RwLock::new(BTreeMap::new()),
            put_count: AtomicU64::new(0),
            query_count: AtomicU64::new(0),
            removal_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Determines which shard a mark id belongs to.
    #[inline]
    fn shard_index(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    #[inline]
    fn shard(&self, id: &str) -> &RwLock<HashMap<String, Mark>> {
        &self.shards[self.shard_index(id)]
    }

    /// Persists a mark and indexes it by its expiry instant.
    ///
    /// Two distinct writes: the record lands in its shard first, then the
    /// `(expires_at_ms, id)` pair lands in the index. If the process dies
    /// between them the mark is never returned by `get_active` and is
    /// reclaimed once its record is removed; this drift window is accepted,
    /// not rolled back.
    pub fn put(&self, mark: Mark) {
        self.put_count.fetch_add(1, Ordering::Relaxed);

        let score = mark.expires_at_ms();
        let id = mark.id.clone();

        {
            let mut records = self.shard(&id).write().unwrap();
            records.insert(id.clone(), mark);
        }

        let mut index = self.index.write().unwrap();
        index.insert((score, id), ());
    }

    /// Returns marks still alive at `now`, ordered ascending by expiry
    /// (ties broken by id), capped at `limit`.
    ///
    /// Candidates come from the index; an id whose record has already gone
    /// missing (removed before the index caught up) is silently skipped.
    pub fn get_active(&self, now: DateTime<Utc>, limit: usize) -> Vec<Mark> {
        self.query_count.fetch_add(1, Ordering::Relaxed);

        let now_ms = now.timestamp_millis();

        // Strictly-greater-than now: millisecond scores make `> now_ms`
        // equivalent to `>= now_ms + 1`.
        let candidates: Vec<(i64, String)> = {
            let index = self.index.read().unwrap();
            index
                .range((now_ms + 1, String::new())..)
                .take(limit)
                .map(|((score, id), _)| (*score, id.clone()))
                .collect()
        };

        let mut marks = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            let records = self.shard(&id).read().unwrap();
            if let Some(mark) = records.get(&id) {
                marks.push(mark.clone());
            }
        }

        marks
    }

    /// Deletes both the record and the index entry for `id`.
    ///
    /// Idempotent: removing an id that does not exist is a no-op, and a
    /// record without an index entry (or vice versa) is handled without
    /// error.
    ///
    /// # Returns
    ///
    /// Returns `true` if a record was actually removed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut records = self.shard(id).write().unwrap();
            records.remove(id)
        };

        match &removed {
            Some(mark) => {
                let mut index = self.index.write().unwrap();
                index.remove(&(mark.expires_at_ms(), mark.id.clone()));
                self.removal_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => {
                // The record may be gone while its index entry lingers
                // (the accepted drift). Sweep the index for the id so
                // explicit removal always restores the equivalence.
                let mut index = self.index.write().unwrap();
                index.retain(|(_, entry_id), _| entry_id != id);
                false
            }
        }
    }

    /// Removes every entry with an expiry at or before `now`, capped at
    /// `batch` entries, and returns the affected ids.
    ///
    /// Index entries are removed in one pass under the index lock; record
    /// deletion tolerates records that are already absent. Calling this
    /// twice for the same instant is harmless: the second call finds
    /// nothing. Used by the expiry sweeper only.
    pub fn take_expired(&self, now: DateTime<Utc>, batch: usize) -> Vec<String> {
        let now_ms = now.timestamp_millis();

        let expired: Vec<(i64, String)> = {
            let mut index = self.index.write().unwrap();
            let keys: Vec<(i64, String)> = index
                .range(..(now_ms + 1, String::new()))
                .take(batch)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                index.remove(key);
            }
            keys
        };

        let mut ids = Vec::with_capacity(expired.len());
        for (_, id) in expired {
            let mut records = self.shard(&id).write().unwrap();
            // Absent record means something else already deleted it; fine.
            records.remove(&id);
            ids.push(id);
        }

        if !ids.is_empty() {
            self.expired_count
                .fetch_add(ids.len() as u64, Ordering::Relaxed);
        }

        ids
    }

    /// Number of index entries currently held.
    pub fn len(&self) -> usize {
        self.index.read().unwrap().len()
    }

    /// Returns true if no marks are indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            indexed: self.len() as u64,
            puts: self.put_count.load(Ordering::Relaxed),
            queries: self.query_count.load(Ordering::Relaxed),
            removals: self.removal_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    /// Entries currently in the expiry index
    pub indexed: u64,
    /// Total put operations
    pub puts: u64,
    /// Total active-range queries
    pub queries: u64,
    /// Total explicit removals that found a record
    pub removals: u64,
    /// Total entries removed by expiry sweeps
    pub expired: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkColor, MARK_TTL_SECONDS};
    use chrono::Duration;

    fn mark_expiring_at(now: DateTime<Utc>, offset_secs: i64) -> Mark {
        // Creation time is back-dated so expires_at = now + offset.
        let created = now + Duration::seconds(offset_secs - MARK_TTL_SECONDS);
        Mark::new(49.0, 28.0, MarkColor::Blue, None, created)
    }

    #[test]
    fn put_then_get_active_returns_the_mark() {
        let store = MarkStore::new();
        let now = Utc::now();
        let mark = Mark::new(49.0, 28.0, MarkColor::Green, None, now);
        let id = mark.id.clone();

        store.put(mark);

        let active = store.get_active(now, ACTIVE_QUERY_LIMIT);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
    }

    #[test]
    fn get_active_orders_by_expiry_ascending() {
        let store = MarkStore::new();
        let now = Utc::now();

        let late = mark_expiring_at(now, 900);
        let early = mark_expiring_at(now, 300);
        let middle = mark_expiring_at(now, 600);

        store.put(late.clone());
        store.put(early.clone());
        store.put(middle.clone());

        let active = store.get_active(now, ACTIVE_QUERY_LIMIT);
        let ids: Vec<&str> = active.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![&early.id, &middle.id, &late.id]);
    }

    #[test]
    fn get_active_excludes_past_expiry_and_respects_limit() {
        let store = MarkStore::new();
        let now = Utc::now();

        store.put(mark_expiring_at(now, -5)); // already expired
        for _ in 0..10 {
            store.put(mark_expiring_at(now, 60));
        }

        let active = store.get_active(now, 4);
        assert_eq!(active.len(), 4);
        assert!(active.iter().all(|m| m.expires_at > now));
    }

    #[test]
    fn query_stays_bounded_above_the_cap() {
        let store = MarkStore::new();
        let now = Utc::now();

        for _ in 0..ACTIVE_QUERY_LIMIT + 100 {
            store.put(mark_expiring_at(now, 60));
        }

        let active = store.get_active(now, ACTIVE_QUERY_LIMIT);
        assert_eq!(active.len(), ACTIVE_QUERY_LIMIT);
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MarkStore::new();
        let now = Utc::now();
        let mark = Mark::new(1.0, 2.0, MarkColor::Blue, None, now);
        let id = mark.id.clone();

        store.put(mark);
        assert!(store.remove(&id));
        assert!(!store.remove(&id)); // second removal is a no-op
        assert!(!store.remove("never-existed"));
        assert!(store.is_empty());
    }

    #[test]
    fn take_expired_removes_from_both_structures() {
        let store = MarkStore::new();
        let now = Utc::now();

        let dead = mark_expiring_at(now, -10);
        let dead_id = dead.id.clone();
        let alive = mark_expiring_at(now, 600);

        store.put(dead);
        store.put(alive.clone());

        let removed = store.take_expired(now, 1000);
        assert_eq!(removed, vec![dead_id]);

        // Second pass over the same instant finds nothing.
        assert!(store.take_expired(now, 1000).is_empty());

        let active = store.get_active(now, ACTIVE_QUERY_LIMIT);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, alive.id);
    }

    #[test]
    fn take_expired_honors_the_batch_cap() {
        let store = MarkStore::new();
        let now = Utc::now();

        for _ in 0..25 {
            store.put(mark_expiring_at(now, -1));
        }

        assert_eq!(store.take_expired(now, 10).len(), 10);
        assert_eq!(store.take_expired(now, 10).len(), 10);
        assert_eq!(store.take_expired(now, 10).len(), 5);
    }

    #[test]
    fn missing_record_is_skipped_not_an_error() {
        let store = MarkStore::new();
        let now = Utc::now();
        let mark = mark_expiring_at(now, 60);
        let id = mark.id.clone();
        store.put(mark);

        // Simulate the record vanishing underneath the index.
        {
            let mut records = store.shard(&id).write().unwrap();
            records.remove(&id);
        }

        assert!(store.get_active(now, ACTIVE_QUERY_LIMIT).is_empty());

        // Explicit removal with only the index entry left still cleans up.
        store.remove(&id);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_puts_on_distinct_ids() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MarkStore::new());
        let now = Utc::now();
        let mut handles = vec![];

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.put(Mark::new(1.0, 2.0, MarkColor::Split, None, now));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 800);
        assert_eq!(store.stats().puts, 800);
    }
}
