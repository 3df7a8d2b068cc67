//! Cache maintenance: eviction, preheating, integrity checks, repair.
//!
//! All freshness and consistency semantics live here. A maintenance pass
//! evicts expired entries (bounded scan), rebuilds windows for active
//! aircraft, and cross-checks a sample of entries against the source of
//! truth, repairing any mismatch by delete-then-rebuild. The performance
//! report runs last and is isolated from the other phases: its failure
//! never rolls back or blocks an eviction or preheat that already ran.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{window_start, CacheStats, CacheStore, StoredEntry, WindowPayload};
use crate::clock::Clock;
use crate::error::Result;
use crate::repository::RecordRepository;

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceSummary {
    /// Keys examined by the eviction scan.
    pub scanned: usize,
    /// Entries evicted as expired.
    pub evicted: usize,
    /// Windows rebuilt for active aircraft missing an entry.
    pub preheated: usize,
    /// Entries cross-checked against the source of truth.
    pub checked: usize,
    /// Entries found inconsistent and repaired.
    pub repaired: usize,
}

/// Owns the cache lifecycle on behalf of the scheduler and the CLI.
pub struct CacheMaintenance {
    repo: Arc<dyn RecordRepository>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    eviction_scan_limit: usize,
    integrity_sample_size: usize,
}

impl std::fmt::Debug for CacheMaintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheMaintenance")
            .field("ttl", &self.ttl)
            .field("eviction_scan_limit", &self.eviction_scan_limit)
            .field("integrity_sample_size", &self.integrity_sample_size)
            .finish_non_exhaustive()
    }
}

impl CacheMaintenance {
    /// Wire up the maintenance job.
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        ttl: chrono::Duration,
        eviction_scan_limit: usize,
        integrity_sample_size: usize,
    ) -> Self {
        Self {
            repo,
            store,
            clock,
            ttl,
            eviction_scan_limit,
            integrity_sample_size,
        }
    }

    /// One full maintenance pass: evict, preheat, integrity-check, report.
    ///
    /// # Errors
    ///
    /// Returns an error if the source of truth cannot be read; eviction
    /// already performed is not rolled back.
    pub async fn run(&self) -> Result<MaintenanceSummary> {
        let mut summary = self.evict();
        summary.preheated = self.preheat().await?;
        let (checked, repaired) = self.check_integrity().await?;
        summary.checked = checked;
        summary.repaired = repaired;

        self.report_performance();
        info!(
            scanned = summary.scanned,
            evicted = summary.evicted,
            preheated = summary.preheated,
            checked = summary.checked,
            repaired = summary.repaired,
            "cache maintenance pass finished"
        );
        Ok(summary)
    }

    /// Remove expired entries, examining at most the configured number of
    /// keys per pass. Entries without a freshness window count as stale.
    pub fn evict(&self) -> MaintenanceSummary {
        let now = self.clock.now();
        let mut summary = MaintenanceSummary::default();

        for key in self.store.keys().into_iter().take(self.eviction_scan_limit) {
            summary.scanned += 1;
            let Some(entry) = self.store.get(key) else {
                continue;
            };
            let expired = entry.expires_at.map_or(true, |at| at <= now);
            if expired && self.store.delete(key) {
                summary.evicted += 1;
                debug!(aircraft_id = key, "evicted expired cache entry");
            }
        }
        summary
    }

    /// Build windows for active aircraft that have no entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the aircraft registry or records cannot be read.
    pub async fn preheat(&self) -> Result<usize> {
        let cached: std::collections::HashSet<i64> = self.store.keys().into_iter().collect();
        let mut preheated = 0;

        for aircraft in self.repo.find_active_aircraft().await? {
            let Some(aircraft_id) = aircraft.id else {
                continue;
            };
            if cached.contains(&aircraft_id) {
                continue;
            }
            self.rebuild(aircraft_id).await?;
            preheated += 1;
        }
        Ok(preheated)
    }

    /// Cross-check a sample of cached windows against the source of truth,
    /// repairing every mismatch. Returns `(checked, repaired)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source of truth cannot be read.
    pub async fn check_integrity(&self) -> Result<(usize, usize)> {
        let now = self.clock.now();
        let since = window_start(now.date_naive());
        let mut checked = 0;
        let mut repaired = 0;

        for key in self.store.keys().into_iter().take(self.integrity_sample_size) {
            let Some(entry) = self.store.get(key) else {
                continue;
            };
            checked += 1;

            let consistent = match serde_json::from_str::<WindowPayload>(&entry.payload) {
                Ok(payload) => {
                    let expected = self.repo.count_window_records(key, since).await?;
                    payload.record_count() == expected && payload.window_start == since
                }
                Err(e) => {
                    warn!(aircraft_id = key, error = %e, "cache entry is not parseable");
                    false
                }
            };

            if !consistent {
                warn!(aircraft_id = key, "cache entry inconsistent, repairing");
                self.repair(key).await?;
                repaired += 1;
            }
        }
        Ok((checked, repaired))
    }

    /// Delete and rebuild one aircraft's entry. Safe to call repeatedly;
    /// each call converges on the same source-of-truth state.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read.
    pub async fn repair(&self, aircraft_id: i64) -> Result<()> {
        self.store.delete(aircraft_id);
        self.rebuild(aircraft_id).await
    }

    /// Log the store's counters. Never fails.
    pub fn report_performance(&self) {
        let stats = self.stats();
        info!(
            keys = stats.keys,
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            payload_bytes = stats.payload_bytes,
            "cache performance"
        );
    }

    /// Current store counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    async fn rebuild(&self, aircraft_id: i64) -> Result<()> {
        let now = self.clock.now();
        let since = window_start(now.date_naive());
        let records = self.repo.find_window_records(aircraft_id, since).await?;
        let count = records.len();

        let payload = WindowPayload {
            aircraft_id,
            window_start: since,
            records,
            refreshed_at: now,
        };
        self.store.set(
            aircraft_id,
            StoredEntry {
                payload: serde_json::to_string(&payload)?,
                expires_at: Some(now + self.ttl),
            },
        );
        debug!(aircraft_id, records = count, "cache window rebuilt");
        Ok(())
    }
}

/// Scheduler adapter for the maintenance pass.
#[derive(Debug)]
pub struct CacheMaintenanceJob(pub Arc<CacheMaintenance>);

#[async_trait::async_trait]
impl crate::scheduler::Job for CacheMaintenanceJob {
    fn name(&self) -> &'static str {
        "cache-maintenance"
    }

    async fn run(&self, _ctx: &crate::scheduler::RunContext) -> Result<()> {
        self.0.run().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::clock::ManualClock;
    use crate::record::{Aircraft, FlightRecord, RegulatoryClass};
    use crate::storage::SqliteRepository;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    struct Fixture {
        repo: Arc<SqliteRepository>,
        store: Arc<MemoryCacheStore>,
        clock: ManualClock,
        maintenance: CacheMaintenance,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let store = Arc::new(MemoryCacheStore::new());
        let clock = ManualClock::at(t0());
        let maintenance = CacheMaintenance::new(
            repo.clone(),
            store.clone(),
            Arc::new(clock.clone()),
            Duration::hours(24),
            1000,
            25,
        );
        Fixture {
            repo,
            store,
            clock,
            maintenance,
        }
    }

    async fn seed_aircraft(fx: &Fixture, registration: &str) -> i64 {
        fx.repo
            .insert_aircraft(&Aircraft::new(registration, RegulatoryClass::B))
            .await
            .unwrap()
    }

    async fn seed_record(fx: &Fixture, aircraft_id: i64, flight_date: NaiveDate) -> i64 {
        let record = FlightRecord::draft(aircraft_id, "pilot-01", flight_date);
        fx.repo.create_draft(&record).await.unwrap().id.unwrap()
    }

    fn parse_entry(fx: &Fixture, aircraft_id: i64) -> WindowPayload {
        let entry = fx.store.get(aircraft_id).unwrap();
        serde_json::from_str(&entry.payload).unwrap()
    }

    #[tokio::test]
    async fn test_preheat_builds_window_for_active_aircraft() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0001").await;
        seed_record(&fx, id, t0().date_naive()).await;
        seed_record(&fx, id, t0().date_naive() - Duration::days(5)).await;
        // Outside the trailing window.
        seed_record(&fx, id, t0().date_naive() - Duration::days(45)).await;

        assert_eq!(fx.maintenance.preheat().await.unwrap(), 1);

        let payload = parse_entry(&fx, id);
        assert_eq!(payload.record_count(), 2);
        assert_eq!(payload.window_start, window_start(t0().date_naive()));

        // Second pass finds the entry in place and builds nothing.
        assert_eq!(fx.maintenance.preheat().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_preheat_skips_inactive_aircraft() {
        let fx = fixture();
        let mut aircraft = Aircraft::new("NB0002", RegulatoryClass::B);
        aircraft.active = false;
        fx.repo.insert_aircraft(&aircraft).await.unwrap();

        assert_eq!(fx.maintenance.preheat().await.unwrap(), 0);
        assert!(fx.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_evict_respects_ttl_and_clock() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0003").await;
        fx.maintenance.preheat().await.unwrap();

        // Fresh entry stays.
        let summary = fx.maintenance.evict();
        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.evicted, 0);

        // Past the 24h ttl it goes.
        fx.clock.advance(Duration::hours(25));
        let summary = fx.maintenance.evict();
        assert_eq!(summary.evicted, 1);
        assert!(fx.store.get(id).is_none());
    }

    #[tokio::test]
    async fn test_evict_treats_missing_expiry_as_stale() {
        let fx = fixture();
        fx.store.set(
            7,
            StoredEntry {
                payload: "{}".to_string(),
                expires_at: None,
            },
        );

        assert_eq!(fx.maintenance.evict().evicted, 1);
    }

    #[tokio::test]
    async fn test_evict_scan_is_bounded() {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let store = Arc::new(MemoryCacheStore::new());
        let maintenance = CacheMaintenance::new(
            repo,
            store.clone(),
            Arc::new(ManualClock::at(t0())),
            Duration::hours(24),
            3,
            25,
        );
        for key in 0..10 {
            store.set(
                key,
                StoredEntry {
                    payload: String::new(),
                    expires_at: None,
                },
            );
        }

        let summary = maintenance.evict();
        assert_eq!(summary.scanned, 3);
        assert_eq!(summary.evicted, 3);
        assert_eq!(store.keys().len(), 7);
    }

    #[tokio::test]
    async fn test_integrity_check_repairs_stale_count() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0004").await;
        seed_record(&fx, id, t0().date_naive()).await;
        fx.maintenance.preheat().await.unwrap();

        // New record lands after the window was cached.
        seed_record(&fx, id, t0().date_naive()).await;

        let (checked, repaired) = fx.maintenance.check_integrity().await.unwrap();
        assert_eq!(checked, 1);
        assert_eq!(repaired, 1);
        assert_eq!(parse_entry(&fx, id).record_count(), 2);
    }

    #[tokio::test]
    async fn test_integrity_check_repairs_garbage_payload() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0005").await;
        fx.store.set(
            id,
            StoredEntry {
                payload: "not json".to_string(),
                expires_at: Some(t0() + Duration::hours(1)),
            },
        );

        let (_, repaired) = fx.maintenance.check_integrity().await.unwrap();
        assert_eq!(repaired, 1);
        assert_eq!(parse_entry(&fx, id).record_count(), 0);
    }

    #[tokio::test]
    async fn test_integrity_check_passes_consistent_entry() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0006").await;
        seed_record(&fx, id, t0().date_naive()).await;
        fx.maintenance.preheat().await.unwrap();

        let (checked, repaired) = fx.maintenance.check_integrity().await.unwrap();
        assert_eq!(checked, 1);
        assert_eq!(repaired, 0);
    }

    #[tokio::test]
    async fn test_repair_is_idempotent() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0007").await;
        seed_record(&fx, id, t0().date_naive()).await;

        fx.maintenance.repair(id).await.unwrap();
        let first = parse_entry(&fx, id);
        fx.maintenance.repair(id).await.unwrap();
        let second = parse_entry(&fx, id);

        assert_eq!(first.record_count(), second.record_count());
        assert_eq!(first.window_start, second.window_start);
    }

    #[tokio::test]
    async fn test_full_pass_summary() {
        let fx = fixture();
        let id = seed_aircraft(&fx, "NB0008").await;
        seed_record(&fx, id, t0().date_naive()).await;
        // A stale entry for a retired key.
        fx.store.set(
            999,
            StoredEntry {
                payload: String::new(),
                expires_at: None,
            },
        );

        let summary = fx.maintenance.run().await.unwrap();
        assert_eq!(summary.evicted, 1);
        assert_eq!(summary.preheated, 1);
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.repaired, 0);
    }
}
