//! Compliance-window cache.
//!
//! A per-aircraft cache of the trailing 30 days of records, so
//! compliance-window reads never hit the source of truth on the hot path.
//! The store itself is deliberately dumb (get/set/delete/keys plus
//! counters); TTL semantics and cache/store consistency are owned by
//! [`maintenance::CacheMaintenance`], the only code allowed to delete and
//! repopulate entries.

pub mod maintenance;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::record::FlightRecord;

/// Trailing window the cache covers, in days.
pub const WINDOW_DAYS: i64 = 30;

/// First flight date inside the trailing window ending today.
#[must_use]
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today - chrono::Duration::days(WINDOW_DAYS)
}

/// Serialized payload of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPayload {
    /// The aircraft this window belongs to.
    pub aircraft_id: i64,
    /// First flight date inside the window.
    pub window_start: NaiveDate,
    /// Records with a flight date inside the window.
    pub records: Vec<FlightRecord>,
    /// When the payload was built from the source of truth.
    pub refreshed_at: DateTime<Utc>,
}

impl WindowPayload {
    /// Number of records in the window.
    #[must_use]
    pub fn record_count(&self) -> i64 {
        self.records.len() as i64
    }
}

/// One stored entry: opaque payload plus its freshness window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// JSON-serialized [`WindowPayload`].
    pub payload: String,
    /// Instant the entry stops being fresh; `None` means no freshness
    /// window was set, which the eviction pass treats as stale.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Point-in-time counters for the performance report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored.
    pub keys: usize,
    /// Reads that found an entry.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Approximate payload bytes held.
    pub payload_bytes: usize,
}

impl CacheStats {
    /// Hit rate in percent; 100 when nothing was read yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            100.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.hits as f64 / total as f64 * 100.0
            }
        }
    }
}

/// Key-value contract for the compliance-window cache.
pub trait CacheStore: Send + Sync {
    /// Fetch an entry, counting a hit or miss. Expiry is not checked here;
    /// the maintenance job owns freshness.
    fn get(&self, aircraft_id: i64) -> Option<StoredEntry>;

    /// Store or replace an entry.
    fn set(&self, aircraft_id: i64, entry: StoredEntry);

    /// Remove an entry; returns whether one was present.
    fn delete(&self, aircraft_id: i64) -> bool;

    /// All aircraft ids with an entry.
    fn keys(&self) -> Vec<i64>;

    /// Current counters.
    fn stats(&self) -> CacheStats;
}

/// In-process cache store.
#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<i64, StoredEntry>>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, aircraft_id: i64) -> Option<StoredEntry> {
        let entry = self.entries.read().get(&aircraft_id).cloned();
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    fn set(&self, aircraft_id: i64, entry: StoredEntry) {
        self.entries.write().insert(aircraft_id, entry);
    }

    fn delete(&self, aircraft_id: i64) -> bool {
        self.entries.write().remove(&aircraft_id).is_some()
    }

    fn keys(&self) -> Vec<i64> {
        let mut keys: Vec<i64> = self.entries.read().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            keys: entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            payload_bytes: entries.values().map(|e| e.payload.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(payload: &str) -> StoredEntry {
        StoredEntry {
            payload: payload.to_string(),
            expires_at: Some(Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_set_get_delete() {
        let store = MemoryCacheStore::new();
        assert!(store.get(1).is_none());

        store.set(1, entry("payload-a"));
        assert_eq!(store.get(1).unwrap().payload, "payload-a");

        // Replacement, not duplication.
        store.set(1, entry("payload-b"));
        assert_eq!(store.get(1).unwrap().payload, "payload-b");
        assert_eq!(store.keys(), vec![1]);

        assert!(store.delete(1));
        assert!(!store.delete(1));
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_keys_sorted() {
        let store = MemoryCacheStore::new();
        store.set(9, entry("a"));
        store.set(2, entry("b"));
        store.set(5, entry("c"));
        assert_eq!(store.keys(), vec![2, 5, 9]);
    }

    #[test]
    fn test_stats_counters() {
        let store = MemoryCacheStore::new();
        store.set(1, entry("abcd"));

        store.get(1);
        store.get(1);
        store.get(2);

        let stats = store.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.payload_bytes, 4);
        assert!((stats.hit_rate() - 66.66).abs() < 1.0);
    }

    #[test]
    fn test_hit_rate_with_no_reads() {
        let store = MemoryCacheStore::new();
        assert!((store.stats().hit_rate() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_payload_round_trip() {
        let payload = WindowPayload {
            aircraft_id: 3,
            window_start: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
            records: vec![],
            refreshed_at: Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: WindowPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
        assert_eq!(back.record_count(), 0);
    }
}
