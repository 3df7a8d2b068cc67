//! Canonical record hashing.
//!
//! The signable content of a flight record is serialized in a fixed field
//! order into a length-prefixed byte layout and digested with BLAKE3. The
//! layout never omits a field: absent optionals contribute an empty segment,
//! so the same field values always produce the same hash regardless of
//! process, locale, or time.

use crate::record::FlightRecord;
use chrono::{DateTime, SecondsFormat, Utc};

/// Compute the canonical content hash of a record, hex-encoded lowercase.
///
/// Covers the record's identity (aircraft and sequence) plus the seventeen
/// regulator-mandated fields. Signature, sync, and lifecycle state are
/// excluded so that signing a record does not change its own hash.
#[must_use]
pub fn canonical_hash(record: &FlightRecord) -> String {
    let mut hasher = blake3::Hasher::new();

    push(&mut hasher, &record.aircraft_id.to_string());
    push(&mut hasher, &record.sequence.to_string());

    push(&mut hasher, &record.pilot_in_command);
    push(&mut hasher, &record.flight_date.format("%Y-%m-%d").to_string());
    push(&mut hasher, &record.origin);
    push(&mut hasher, &record.destination);
    push_time(&mut hasher, record.engine_start_at);
    push_time(&mut hasher, record.takeoff_at);
    push_time(&mut hasher, record.landing_at);
    push_time(&mut hasher, record.engine_stop_at);
    push(&mut hasher, &record.ifr_minutes.to_string());
    push(&mut hasher, &record.fuel_quantity.to_string());
    push(&mut hasher, &record.fuel_unit);
    push(&mut hasher, &record.flight_nature);
    push(&mut hasher, &record.occupant_count.to_string());
    push_opt(&mut hasher, record.cargo.as_deref());
    push_opt(&mut hasher, record.incident_notes.as_deref());
    push_opt(&mut hasher, record.maintenance_notes.as_deref());
    push_opt(&mut hasher, record.approved_by.as_deref());

    hasher.finalize().to_hex().to_string()
}

/// Append one field as a length-prefixed segment.
///
/// The u32 length prefix keeps adjacent fields from running together, so
/// `("ab", "c")` and `("a", "bc")` hash differently.
fn push(hasher: &mut blake3::Hasher, value: &str) {
    let bytes = value.as_bytes();
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    hasher.update(&len.to_le_bytes());
    hasher.update(bytes);
}

/// Absent optionals serialize as an empty segment, never skipped.
fn push_opt(hasher: &mut blake3::Hasher, value: Option<&str>) {
    push(hasher, value.unwrap_or(""));
}

/// Timestamps serialize as RFC 3339 UTC with whole-second precision.
fn push_time(hasher: &mut blake3::Hasher, at: DateTime<Utc>) {
    push(hasher, &at.to_rfc3339_opts(SecondsFormat::Secs, true));
}
