//! Storage layer for flitelog.
//!
//! This module provides the `SQLite`-backed implementation of the
//! [`RecordRepository`] contract: the aircraft registry, the flight-record
//! state machine guards, the append-only signature log, and the sweep/sync
//! candidate queries. Signing and sync transitions are conditional UPDATEs,
//! so concurrent workers racing on the same record resolve at the row level.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::deadline;
use crate::error::{Error, Result};
use crate::record::{Aircraft, FlightRecord, RegulatoryClass, SignatureKind, SignatureRecord};
use crate::repository::{PendingRecord, RecordRepository};

/// Column list shared by every record query, in `row_to_record` order.
const RECORD_COLUMNS: &str = "\
    id, aircraft_id, sequence, pilot_in_command, flight_date, origin, \
    destination, engine_start_at, takeoff_at, landing_at, engine_stop_at, \
    ifr_minutes, fuel_quantity, fuel_unit, flight_nature, occupant_count, \
    cargo, incident_notes, maintenance_notes, approved_by, pilot_signed, \
    pilot_signed_at, operator_signed, operator_signed_at, record_hash, \
    synced_with_regulator, last_sync_error, sync_attempts, \
    last_sync_attempt_at, sync_in_flight_since, flagged_for_report, cancelled";

/// `SQLite`-backed repository.
///
/// The connection is serialized through a mutex; every trait method runs
/// one short synchronous transaction and never holds the lock across an
/// await point.
#[derive(Debug)]
pub struct SqliteRepository {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open or create a database at the given path.
    ///
    /// Creates the parent directories and database file if they don't
    /// exist, enables WAL mode, and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema
    /// initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL keeps sweep reads from blocking on sync writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Convert a database row to an `Aircraft`.
    fn row_to_aircraft(row: &rusqlite::Row) -> rusqlite::Result<Aircraft> {
        let class_str: String = row.get(2)?;
        let class = RegulatoryClass::from_code(&class_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown regulatory class: {class_str}").into(),
            )
        })?;

        Ok(Aircraft {
            id: Some(row.get(0)?),
            registration: row.get(1)?,
            class,
            active: row.get(3)?,
            next_sequence: row.get(4)?,
        })
    }

    /// Convert a database row to a `FlightRecord`.
    ///
    /// Column order must match [`RECORD_COLUMNS`].
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FlightRecord> {
        Ok(FlightRecord {
            id: Some(row.get(0)?),
            aircraft_id: row.get(1)?,
            sequence: row.get(2)?,
            pilot_in_command: row.get(3)?,
            flight_date: parse_date(row, 4)?,
            origin: row.get(5)?,
            destination: row.get(6)?,
            engine_start_at: parse_ts(row, 7)?,
            takeoff_at: parse_ts(row, 8)?,
            landing_at: parse_ts(row, 9)?,
            engine_stop_at: parse_ts(row, 10)?,
            ifr_minutes: get_u32(row, 11)?,
            fuel_quantity: row.get(12)?,
            fuel_unit: row.get(13)?,
            flight_nature: row.get(14)?,
            occupant_count: get_u32(row, 15)?,
            cargo: row.get(16)?,
            incident_notes: row.get(17)?,
            maintenance_notes: row.get(18)?,
            approved_by: row.get(19)?,
            pilot_signed: row.get(20)?,
            pilot_signed_at: parse_ts_opt(row, 21)?,
            operator_signed: row.get(22)?,
            operator_signed_at: parse_ts_opt(row, 23)?,
            record_hash: row.get(24)?,
            synced_with_regulator: row.get(25)?,
            last_sync_error: row.get(26)?,
            sync_attempts: get_u32(row, 27)?,
            last_sync_attempt_at: parse_ts_opt(row, 28)?,
            sync_in_flight_since: parse_ts_opt(row, 29)?,
            flagged_for_report: row.get(30)?,
            cancelled: row.get(31)?,
        })
    }

    /// Convert a joined records+aircraft row to a `PendingRecord`.
    ///
    /// The aircraft class is selected as column 32, after the record
    /// columns.
    fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<PendingRecord> {
        let record = Self::row_to_record(row)?;
        let class_str: String = row.get(32)?;
        let class = RegulatoryClass::from_code(&class_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                32,
                rusqlite::types::Type::Text,
                format!("unknown regulatory class: {class_str}").into(),
            )
        })?;
        Ok(PendingRecord { record, class })
    }

    /// Convert a database row to a `SignatureRecord`.
    fn row_to_signature(row: &rusqlite::Row) -> rusqlite::Result<SignatureRecord> {
        let kind_str: String = row.get(2)?;
        let kind = SignatureKind::from_code(&kind_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown signature kind: {kind_str}").into(),
            )
        })?;

        Ok(SignatureRecord {
            id: Some(row.get(0)?),
            record_id: row.get(1)?,
            kind,
            actor_id: row.get(3)?,
            signed_at: parse_ts(row, 4)?,
            content_hash: row.get(5)?,
            origin_ip: row.get(6)?,
            client_info: row.get(7)?,
        })
    }

    /// Fetch one record while already holding the connection lock.
    fn get_record(conn: &Connection, id: i64) -> Result<Option<FlightRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                [id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Query a list of records with the shared column list.
    fn query_records(
        conn: &Connection,
        where_clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<FlightRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE {where_clause}");
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All pilot-signed, not operator-signed records joined with their
    /// aircraft tier.
    fn query_pending(conn: &Connection) -> Result<Vec<PendingRecord>> {
        let columns: String = RECORD_COLUMNS
            .split(", ")
            .map(|c| format!("r.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns}, a.class FROM records r \
             JOIN aircraft a ON a.id = r.aircraft_id \
             WHERE r.pilot_signed = 1 AND r.operator_signed = 0 AND r.cancelled = 0 \
             ORDER BY r.pilot_signed_at ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let pending = stmt
            .query_map([], Self::row_to_pending)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pending)
    }
}

/// Parse a required RFC 3339 timestamp column.
fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse an optional RFC 3339 timestamp column.
fn parse_ts_opt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

/// Parse a `YYYY-MM-DD` date column.
fn parse_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Read a non-negative integer column into u32.
fn get_u32(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<u32> {
    let value: i64 = row.get(idx)?;
    Ok(u32::try_from(value).unwrap_or(0))
}

/// Whether a rusqlite error is a uniqueness/constraint violation.
fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[async_trait]
impl RecordRepository for SqliteRepository {
    async fn insert_aircraft(&self, aircraft: &Aircraft) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO aircraft (registration, class, active, next_sequence) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                aircraft.registration,
                aircraft.class.code(),
                aircraft.active,
                aircraft.next_sequence,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::conflict(format!(
                    "aircraft registration {} already exists",
                    aircraft.registration
                ))
            } else {
                e.into()
            }
        })?;
        Ok(conn.last_insert_rowid())
    }

    async fn find_aircraft(&self, id: i64) -> Result<Option<Aircraft>> {
        let conn = self.conn.lock();
        let aircraft = conn
            .query_row(
                "SELECT id, registration, class, active, next_sequence \
                 FROM aircraft WHERE id = ?1",
                [id],
                Self::row_to_aircraft,
            )
            .optional()?;
        Ok(aircraft)
    }

    async fn find_active_aircraft(&self) -> Result<Vec<Aircraft>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, registration, class, active, next_sequence \
             FROM aircraft WHERE active = 1 ORDER BY registration ASC",
        )?;
        let aircraft = stmt
            .query_map([], Self::row_to_aircraft)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(aircraft)
    }

    async fn create_draft(&self, record: &FlightRecord) -> Result<FlightRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let sequence: Option<i64> = tx
            .query_row(
                "SELECT next_sequence FROM aircraft WHERE id = ?1",
                [record.aircraft_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(sequence) = sequence else {
            return Err(Error::not_found("aircraft", record.aircraft_id));
        };

        tx.execute(
            "INSERT INTO records (\
                aircraft_id, sequence, pilot_in_command, flight_date, origin, \
                destination, engine_start_at, takeoff_at, landing_at, \
                engine_stop_at, ifr_minutes, fuel_quantity, fuel_unit, \
                flight_nature, occupant_count, cargo, incident_notes, \
                maintenance_notes, approved_by) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                record.aircraft_id,
                sequence,
                record.pilot_in_command,
                record.flight_date.format("%Y-%m-%d").to_string(),
                record.origin,
                record.destination,
                record.engine_start_at.to_rfc3339(),
                record.takeoff_at.to_rfc3339(),
                record.landing_at.to_rfc3339(),
                record.engine_stop_at.to_rfc3339(),
                i64::from(record.ifr_minutes),
                record.fuel_quantity,
                record.fuel_unit,
                record.flight_nature,
                i64::from(record.occupant_count),
                record.cargo,
                record.incident_notes,
                record.maintenance_notes,
                record.approved_by,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE aircraft SET next_sequence = next_sequence + 1 WHERE id = ?1",
            [record.aircraft_id],
        )?;
        tx.commit()?;

        let mut stored = record.clone();
        stored.id = Some(id);
        stored.sequence = sequence;
        debug!(record_id = id, sequence, "draft record created");
        Ok(stored)
    }

    async fn find_record(&self, id: i64) -> Result<Option<FlightRecord>> {
        let conn = self.conn.lock();
        Self::get_record(&conn, id)
    }

    async fn update_record(&self, record: &FlightRecord) -> Result<()> {
        let id = record
            .id
            .ok_or_else(|| Error::internal("cannot update a record without an id"))?;

        let conn = self.conn.lock();
        let existing =
            Self::get_record(&conn, id)?.ok_or(Error::not_found("flight record", id))?;

        if existing.cancelled {
            return Err(Error::conflict("record is cancelled"));
        }
        if existing.operator_signed {
            return Err(Error::conflict("record is operator-signed and immutable"));
        }
        if existing.pilot_signed {
            // Only the post-pilot subset stays editable after the pilot
            // signature; any other content change would invalidate the
            // signed hash and must be rejected.
            let core_unchanged = existing.pilot_in_command == record.pilot_in_command
                && existing.flight_date == record.flight_date
                && existing.origin == record.origin
                && existing.destination == record.destination
                && existing.engine_start_at == record.engine_start_at
                && existing.takeoff_at == record.takeoff_at
                && existing.landing_at == record.landing_at
                && existing.engine_stop_at == record.engine_stop_at
                && existing.ifr_minutes == record.ifr_minutes
                && (existing.fuel_quantity - record.fuel_quantity).abs() < f64::EPSILON
                && existing.fuel_unit == record.fuel_unit
                && existing.flight_nature == record.flight_nature
                && existing.occupant_count == record.occupant_count
                && existing.cargo == record.cargo
                && existing.incident_notes == record.incident_notes;
            if !core_unchanged {
                return Err(Error::conflict(
                    "record is pilot-signed; only maintenance notes and approver are editable",
                ));
            }
        }

        conn.execute(
            "UPDATE records SET \
                pilot_in_command = ?2, flight_date = ?3, origin = ?4, \
                destination = ?5, engine_start_at = ?6, takeoff_at = ?7, \
                landing_at = ?8, engine_stop_at = ?9, ifr_minutes = ?10, \
                fuel_quantity = ?11, fuel_unit = ?12, flight_nature = ?13, \
                occupant_count = ?14, cargo = ?15, incident_notes = ?16, \
                maintenance_notes = ?17, approved_by = ?18 \
             WHERE id = ?1",
            params![
                id,
                record.pilot_in_command,
                record.flight_date.format("%Y-%m-%d").to_string(),
                record.origin,
                record.destination,
                record.engine_start_at.to_rfc3339(),
                record.takeoff_at.to_rfc3339(),
                record.landing_at.to_rfc3339(),
                record.engine_stop_at.to_rfc3339(),
                i64::from(record.ifr_minutes),
                record.fuel_quantity,
                record.fuel_unit,
                record.flight_nature,
                i64::from(record.occupant_count),
                record.cargo,
                record.incident_notes,
                record.maintenance_notes,
                record.approved_by,
            ],
        )?;
        Ok(())
    }

    async fn cancel_record(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE records SET cancelled = 1 \
             WHERE id = ?1 AND pilot_signed = 0 AND cancelled = 0",
            [id],
        )?;
        if affected > 0 {
            return Ok(());
        }

        match Self::get_record(&conn, id)? {
            None => Err(Error::not_found("flight record", id)),
            Some(existing) if existing.cancelled => Err(Error::conflict("record already cancelled")),
            Some(_) => Err(Error::conflict("cannot cancel a signed record")),
        }
    }

    async fn delete_draft(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM records WHERE id = ?1 AND pilot_signed = 0 AND cancelled = 0",
            [id],
        )?;
        if affected > 0 {
            return Ok(());
        }

        match Self::get_record(&conn, id)? {
            None => Err(Error::not_found("flight record", id)),
            Some(_) => Err(Error::conflict("only uncancelled drafts can be deleted")),
        }
    }

    async fn mark_pilot_signed(
        &self,
        record_id: i64,
        at: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE records SET pilot_signed = 1, pilot_signed_at = ?2, record_hash = ?3 \
             WHERE id = ?1 AND pilot_signed = 0 AND cancelled = 0",
            params![record_id, at.to_rfc3339(), content_hash],
        )?;
        Ok(affected > 0)
    }

    async fn mark_operator_signed(
        &self,
        record_id: i64,
        at: DateTime<Utc>,
        content_hash: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE records SET operator_signed = 1, operator_signed_at = ?2, record_hash = ?3 \
             WHERE id = ?1 AND pilot_signed = 1 AND operator_signed = 0 AND cancelled = 0",
            params![record_id, at.to_rfc3339(), content_hash],
        )?;
        Ok(affected > 0)
    }

    async fn append_signature(&self, signature: &SignatureRecord) -> Result<SignatureRecord> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signatures \
                (record_id, kind, actor_id, signed_at, content_hash, origin_ip, client_info) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                signature.record_id,
                signature.kind.code(),
                signature.actor_id,
                signature.signed_at.to_rfc3339(),
                signature.content_hash,
                signature.origin_ip,
                signature.client_info,
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::conflict(format!(
                    "record {} already has a {} signature",
                    signature.record_id, signature.kind
                ))
            } else {
                e.into()
            }
        })?;

        let mut stored = signature.clone();
        stored.id = Some(conn.last_insert_rowid());
        Ok(stored)
    }

    async fn find_signature(&self, id: i64) -> Result<Option<SignatureRecord>> {
        let conn = self.conn.lock();
        let signature = conn
            .query_row(
                "SELECT id, record_id, kind, actor_id, signed_at, content_hash, \
                        origin_ip, client_info \
                 FROM signatures WHERE id = ?1",
                [id],
                Self::row_to_signature,
            )
            .optional()?;
        Ok(signature)
    }

    async fn find_signatures_for_record(&self, record_id: i64) -> Result<Vec<SignatureRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, record_id, kind, actor_id, signed_at, content_hash, \
                    origin_ip, client_info \
             FROM signatures WHERE record_id = ?1 ORDER BY id ASC",
        )?;
        let signatures = stmt
            .query_map([record_id], Self::row_to_signature)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(signatures)
    }

    async fn find_pilot_signed_not_operator_signed(&self) -> Result<Vec<PendingRecord>> {
        let conn = self.conn.lock();
        Self::query_pending(&conn)
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<PendingRecord>> {
        let conn = self.conn.lock();
        let pending = Self::query_pending(&conn)?;
        Ok(pending
            .into_iter()
            .filter(|p| deadline::overdue_days(p.record.pilot_signed_at, p.class, now) > 0)
            .collect())
    }

    async fn find_near_deadline(
        &self,
        now: DateTime<Utc>,
        within_days: i64,
    ) -> Result<Vec<PendingRecord>> {
        let conn = self.conn.lock();
        let pending = Self::query_pending(&conn)?;
        Ok(pending
            .into_iter()
            .filter(|p| {
                deadline::overdue_days(p.record.pilot_signed_at, p.class, now) == 0
                    && deadline::remaining_days(p.record.pilot_signed_at, p.class, now)
                        <= within_days
            })
            .collect())
    }

    async fn find_unsynced(&self) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        Self::query_records(
            &conn,
            "pilot_signed = 1 AND operator_signed = 1 AND synced_with_regulator = 0 \
             AND cancelled = 0 AND last_sync_error IS NULL AND sync_in_flight_since IS NULL \
             ORDER BY operator_signed_at ASC",
            [],
        )
    }

    async fn find_failed_sync(&self) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        Self::query_records(
            &conn,
            "synced_with_regulator = 0 AND cancelled = 0 AND last_sync_error IS NOT NULL \
             ORDER BY last_sync_attempt_at ASC",
            [],
        )
    }

    async fn claim_for_sync(&self, record_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE records SET sync_in_flight_since = ?2 \
             WHERE id = ?1 AND synced_with_regulator = 0 AND cancelled = 0 \
             AND sync_in_flight_since IS NULL",
            params![record_id, at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    async fn find_stale_in_flight(&self, cutoff: DateTime<Utc>) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        Self::query_records(
            &conn,
            "sync_in_flight_since IS NOT NULL AND sync_in_flight_since < ?1",
            [cutoff.to_rfc3339()],
        )
    }

    async fn release_sync_claim(&self, record_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET sync_in_flight_since = NULL WHERE id = ?1",
            [record_id],
        )?;
        Ok(())
    }

    async fn mark_synced(&self, record_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "UPDATE records SET synced_with_regulator = 1, last_sync_error = NULL, \
                sync_in_flight_since = NULL, sync_attempts = sync_attempts + 1, \
                last_sync_attempt_at = ?2 \
             WHERE id = ?1 AND synced_with_regulator = 0",
            params![record_id, at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    async fn record_sync_failure(
        &self,
        record_id: i64,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET last_sync_error = ?2, sync_in_flight_since = NULL, \
                sync_attempts = sync_attempts + 1, last_sync_attempt_at = ?3 \
             WHERE id = ?1",
            params![record_id, error, at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn quarantine_record(&self, record_id: i64, reason: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET last_sync_error = ?2, sync_in_flight_since = NULL \
             WHERE id = ?1",
            params![record_id, reason],
        )?;
        Ok(())
    }

    async fn reset_sync_failures(&self, record_ids: &[i64]) -> Result<usize> {
        let conn = self.conn.lock();
        let mut reset = 0;
        for id in record_ids {
            reset += conn.execute(
                "UPDATE records SET last_sync_error = NULL, sync_attempts = 0 \
                 WHERE id = ?1 AND synced_with_regulator = 0",
                [id],
            )?;
        }
        Ok(reset)
    }

    async fn set_flagged_for_report(&self, record_id: i64, flagged: bool) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE records SET flagged_for_report = ?2 WHERE id = ?1",
            params![record_id, flagged],
        )?;
        Ok(())
    }

    async fn find_flagged_for_report(&self) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        Self::query_records(&conn, "flagged_for_report = 1 ORDER BY id ASC", [])
    }

    async fn count_window_records(&self, aircraft_id: i64, since: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records \
             WHERE aircraft_id = ?1 AND flight_date >= ?2 AND cancelled = 0",
            params![aircraft_id, since.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn count_window_complete(&self, aircraft_id: i64, since: NaiveDate) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records \
             WHERE aircraft_id = ?1 AND flight_date >= ?2 AND cancelled = 0 \
             AND pilot_signed = 1 AND operator_signed = 1",
            params![aircraft_id, since.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn find_window_records(
        &self,
        aircraft_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        Self::query_records(
            &conn,
            "aircraft_id = ?1 AND flight_date >= ?2 AND cancelled = 0 \
             ORDER BY flight_date ASC, sequence ASC",
            params![aircraft_id, since.format("%Y-%m-%d").to_string()],
        )
    }

    async fn find_completed_records(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        let conn = self.conn.lock();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::query_records(
            &conn,
            "pilot_signed = 1 AND operator_signed = 1 AND cancelled = 0 \
             ORDER BY operator_signed_at DESC LIMIT ?1",
            [limit],
        )
    }
}

#[cfg(test)]
impl SqliteRepository {
    /// Run one statement directly, bypassing the edit locks. Lets
    /// tamper-detection tests mutate signed content the way an attacker
    /// with database access would.
    pub(crate) fn execute_raw(&self, sql: &str, id: i64) {
        let conn = self.conn.lock();
        conn.execute(sql, [id]).expect("raw statement failed");
    }
}
