//! Repository contract over the persistent store.
//!
//! The compliance engine never talks to a database directly; every query
//! and guarded mutation it needs is named here and implemented by the
//! SQLite adapter in [`crate::storage`]. Guarded mutations return `bool`
//! for "did the transition apply", so concurrent workers racing on the
//! same record resolve through the store, not in-process state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::record::{Aircraft, FlightRecord, RegulatoryClass, SignatureRecord};

/// A pending record paired with the regulatory tier of its aircraft.
///
/// Deadline queries need the tier to compute the grace period, so the
/// adapter joins it in rather than forcing one aircraft lookup per record.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    /// The pilot-signed, not yet operator-signed record.
    pub record: FlightRecord,
    /// Tier of the record's aircraft.
    pub class: RegulatoryClass,
}

/// Persistence contract for the compliance engine.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    // === Aircraft registry ===

    /// Insert an aircraft and return its assigned id.
    async fn insert_aircraft(&self, aircraft: &Aircraft) -> Result<i64>;

    /// Fetch one aircraft by id.
    async fn find_aircraft(&self, id: i64) -> Result<Option<Aircraft>>;

    /// All aircraft currently in service.
    async fn find_active_aircraft(&self) -> Result<Vec<Aircraft>>;

    // === Record lifecycle ===

    /// Insert a draft record, assigning its id and per-aircraft sequence
    /// number inside one transaction. Returns the stored record.
    async fn create_draft(&self, record: &FlightRecord) -> Result<FlightRecord>;

    /// Fetch one record by id.
    async fn find_record(&self, id: i64) -> Result<Option<FlightRecord>>;

    /// Update an existing record's content, enforcing the edit locks:
    /// rejected once pilot-signed except for the post-pilot field subset
    /// (maintenance notes, approver), which stays editable until the
    /// operator signs. Cancelled records are never editable.
    async fn update_record(&self, record: &FlightRecord) -> Result<()>;

    /// Cancel a record; allowed only before any signature.
    async fn cancel_record(&self, id: i64) -> Result<()>;

    /// Delete a record; allowed only while it is an uncancelled draft.
    async fn delete_draft(&self, id: i64) -> Result<()>;

    // === Signing transitions (guarded) ===

    /// Apply the pilot signature atomically. Returns `false` if the record
    /// was already pilot-signed or cancelled when the update ran.
    async fn mark_pilot_signed(
        &self,
        record_id: i64,
        at: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<bool>;

    /// Apply the operator signature atomically. Returns `false` unless the
    /// record was pilot-signed and not yet operator-signed.
    async fn mark_operator_signed(
        &self,
        record_id: i64,
        at: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<bool>;

    // === Signature facts (append-only) ===

    /// Append a signature fact and return it with its assigned id.
    async fn append_signature(&self, signature: &SignatureRecord) -> Result<SignatureRecord>;

    /// Fetch one signature fact by id.
    async fn find_signature(&self, id: i64) -> Result<Option<SignatureRecord>>;

    /// All signature facts for a record, oldest first.
    async fn find_signatures_for_record(&self, record_id: i64) -> Result<Vec<SignatureRecord>>;

    // === Deadline sweep queries ===

    /// All pilot-signed records still waiting for the operator signature,
    /// with their aircraft tier. Excludes cancelled records.
    async fn find_pilot_signed_not_operator_signed(&self) -> Result<Vec<PendingRecord>>;

    /// Pending records past their tier deadline at `now`.
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<PendingRecord>>;

    /// Pending records within `within_days` of their tier deadline at
    /// `now`, not yet overdue.
    async fn find_near_deadline(
        &self,
        now: DateTime<Utc>,
        within_days: i64,
    ) -> Result<Vec<PendingRecord>>;

    // === Sync state ===

    /// Fully signed, unsynced records with no recorded failure: fresh
    /// submission work. Excludes records claimed in flight.
    async fn find_unsynced(&self) -> Result<Vec<FlightRecord>>;

    /// Fully signed, unsynced records with a recorded failure: retry work.
    async fn find_failed_sync(&self) -> Result<Vec<FlightRecord>>;

    /// Claim a record for submission by setting its in-flight marker.
    /// Returns `false` if another worker holds the claim or the record is
    /// already synced.
    async fn claim_for_sync(&self, record_id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Records whose in-flight marker predates `cutoff`; abandoned claims
    /// from crashed workers.
    async fn find_stale_in_flight(&self, cutoff: DateTime<Utc>) -> Result<Vec<FlightRecord>>;

    /// Clear a record's in-flight marker without recording an outcome.
    async fn release_sync_claim(&self, record_id: i64) -> Result<()>;

    /// Record a successful submission: sets the synced flag, clears the
    /// failure message and in-flight marker, bumps the attempt counter.
    /// Returns `false` if the record was already synced.
    async fn mark_synced(&self, record_id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Record a failed submission: stores the failure message, bumps the
    /// attempt counter, clears the in-flight marker.
    async fn record_sync_failure(
        &self,
        record_id: i64,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Park a record out of automated sync with a reason, without counting
    /// an attempt. Used for integrity violations.
    async fn quarantine_record(&self, record_id: i64, reason: &str) -> Result<()>;

    /// Reset failure state (message, attempt counter) for the given
    /// records so the next sync run retries them.
    async fn reset_sync_failures(&self, record_ids: &[i64]) -> Result<usize>;

    // === Compliance report flag ===

    /// Set or clear the daily-report inclusion flag.
    async fn set_flagged_for_report(&self, record_id: i64, flagged: bool) -> Result<()>;

    /// Records currently flagged for the daily report.
    async fn find_flagged_for_report(&self) -> Result<Vec<FlightRecord>>;

    // === Compliance window (trailing 30 days) ===

    /// Count of an aircraft's records with a flight date on or after
    /// `since`. Excludes cancelled records.
    async fn count_window_records(&self, aircraft_id: i64, since: NaiveDate) -> Result<i64>;

    /// Count of fully signed records in the same window.
    async fn count_window_complete(&self, aircraft_id: i64, since: NaiveDate) -> Result<i64>;

    /// An aircraft's records in the window, oldest flight date first.
    async fn find_window_records(
        &self,
        aircraft_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<FlightRecord>>;

    /// Most recently completed (fully signed) records, up to `limit`, for
    /// the conformance audit sample.
    async fn find_completed_records(&self, limit: usize) -> Result<Vec<FlightRecord>>;
}
