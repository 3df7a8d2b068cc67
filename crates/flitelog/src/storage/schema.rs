//! `SQLite` schema definitions for flitelog.
//!
//! This module contains the SQL statements for creating and managing the
//! database schema.

/// SQL statement to create the aircraft registry table.
pub const CREATE_AIRCRAFT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aircraft (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    registration TEXT NOT NULL UNIQUE,
    class TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    next_sequence INTEGER NOT NULL DEFAULT 1
)
";

/// SQL statement to create the flight records table.
///
/// The per-aircraft sequence is unique and assigned inside the insert
/// transaction; timestamps are stored as RFC 3339 text.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    aircraft_id INTEGER NOT NULL REFERENCES aircraft(id),
    sequence INTEGER NOT NULL,
    pilot_in_command TEXT NOT NULL,
    flight_date TEXT NOT NULL,
    origin TEXT NOT NULL,
    destination TEXT NOT NULL,
    engine_start_at TEXT NOT NULL,
    takeoff_at TEXT NOT NULL,
    landing_at TEXT NOT NULL,
    engine_stop_at TEXT NOT NULL,
    ifr_minutes INTEGER NOT NULL DEFAULT 0,
    fuel_quantity REAL NOT NULL DEFAULT 0,
    fuel_unit TEXT NOT NULL,
    flight_nature TEXT NOT NULL,
    occupant_count INTEGER NOT NULL DEFAULT 1,
    cargo TEXT,
    incident_notes TEXT,
    maintenance_notes TEXT,
    approved_by TEXT,
    pilot_signed INTEGER NOT NULL DEFAULT 0,
    pilot_signed_at TEXT,
    operator_signed INTEGER NOT NULL DEFAULT 0,
    operator_signed_at TEXT,
    record_hash TEXT,
    synced_with_regulator INTEGER NOT NULL DEFAULT 0,
    last_sync_error TEXT,
    sync_attempts INTEGER NOT NULL DEFAULT 0,
    last_sync_attempt_at TEXT,
    sync_in_flight_since TEXT,
    flagged_for_report INTEGER NOT NULL DEFAULT 0,
    cancelled INTEGER NOT NULL DEFAULT 0,
    UNIQUE(aircraft_id, sequence)
)
";

/// SQL statement to create the append-only signatures table.
pub const CREATE_SIGNATURES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS signatures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id INTEGER NOT NULL REFERENCES records(id),
    kind TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    signed_at TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    origin_ip TEXT NOT NULL,
    client_info TEXT NOT NULL,
    UNIQUE(record_id, kind)
)
";

/// SQL statement to create an index for the deadline sweep scan.
pub const CREATE_PENDING_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_pending
ON records(pilot_signed, operator_signed, cancelled)
";

/// SQL statement to create an index for sync candidate queries.
pub const CREATE_SYNC_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_sync
ON records(synced_with_regulator, operator_signed, cancelled)
";

/// SQL statement to create an index for compliance-window queries.
pub const CREATE_WINDOW_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_window
ON records(aircraft_id, flight_date)
";

/// SQL statement to create an index on signature record lookups.
pub const CREATE_SIGNATURE_RECORD_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_signatures_record ON signatures(record_id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_AIRCRAFT_TABLE,
    CREATE_RECORDS_TABLE,
    CREATE_SIGNATURES_TABLE,
    CREATE_PENDING_INDEX,
    CREATE_SYNC_INDEX,
    CREATE_WINDOW_INDEX,
    CREATE_SIGNATURE_RECORD_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_records_table_contains_state_columns() {
        assert!(CREATE_RECORDS_TABLE.contains("pilot_signed INTEGER NOT NULL"));
        assert!(CREATE_RECORDS_TABLE.contains("operator_signed INTEGER NOT NULL"));
        assert!(CREATE_RECORDS_TABLE.contains("synced_with_regulator INTEGER NOT NULL"));
        assert!(CREATE_RECORDS_TABLE.contains("record_hash TEXT"));
        assert!(CREATE_RECORDS_TABLE.contains("UNIQUE(aircraft_id, sequence)"));
    }

    #[test]
    fn test_signatures_table_is_one_per_kind() {
        assert!(CREATE_SIGNATURES_TABLE.contains("UNIQUE(record_id, kind)"));
        assert!(CREATE_SIGNATURES_TABLE.contains("content_hash TEXT NOT NULL"));
    }

    #[test]
    fn test_metadata_table_structure() {
        assert!(CREATE_METADATA_TABLE.contains("key TEXT PRIMARY KEY"));
        assert!(CREATE_METADATA_TABLE.contains("value TEXT NOT NULL"));
    }
}
