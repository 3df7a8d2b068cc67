//! Core flight-log entities.
//!
//! This module defines the flight record, its signing and sync state, the
//! aircraft registry entry, and the append-only signature fact.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Regulatory tier of an aircraft's operating category.
///
/// The tier determines the operator-signature grace period counted from the
/// pilot signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegulatoryClass {
    /// Tier A: commercial passenger operations, 2-day deadline.
    A,
    /// Tier B: commercial cargo and aerial work, 15-day deadline.
    B,
    /// Tier C: private and training operations, 30-day deadline.
    C,
}

impl RegulatoryClass {
    /// Whole days allowed between pilot and operator signature.
    #[must_use]
    pub fn deadline_days(self) -> i64 {
        match self {
            Self::A => 2,
            Self::B => 15,
            Self::C => 30,
        }
    }

    /// The stable single-letter code for this tier.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    /// Parse a tier from its single-letter code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegulatoryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// An aircraft in the operator's fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aircraft {
    /// Unique identifier (assigned by the storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Tail number, unique within the fleet.
    pub registration: String,

    /// Regulatory tier determining the operator-signature deadline.
    pub class: RegulatoryClass,

    /// Whether the aircraft is currently in service.
    pub active: bool,

    /// Next record sequence number to assign for this aircraft.
    ///
    /// Bumped inside the record-insert transaction; sequence numbers are
    /// monotonically increasing and never reused.
    pub next_sequence: i64,
}

impl Aircraft {
    /// Create a new active aircraft with its sequence counter at 1.
    #[must_use]
    pub fn new(registration: impl Into<String>, class: RegulatoryClass) -> Self {
        Self {
            id: None,
            registration: registration.into(),
            class,
            active: true,
            next_sequence: 1,
        }
    }
}

/// The kind of signature applied to a flight record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    /// First signature, applied by the pilot-in-command.
    Pilot,
    /// Second and final signature, applied by the operator role.
    Operator,
}

impl SignatureKind {
    /// The stable string code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Pilot => "pilot",
            Self::Operator => "operator",
        }
    }

    /// Parse a signature kind from its string code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pilot" => Some(Self::Pilot),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// An append-only signature fact.
///
/// Created at the moment of a successful sign operation and never updated
/// or deleted afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Unique identifier (assigned by the storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The flight record this signature covers.
    pub record_id: i64,

    /// Pilot or operator signature.
    pub kind: SignatureKind,

    /// Identity of the signing actor.
    pub actor_id: String,

    /// When the signature was applied.
    pub signed_at: DateTime<Utc>,

    /// Canonical content hash of the record at signing time.
    pub content_hash: String,

    /// Network origin of the signing request.
    pub origin_ip: String,

    /// Client software identification string.
    pub client_info: String,
}

impl SignatureRecord {
    /// Create a new signature fact, not yet persisted.
    #[must_use]
    pub fn new(
        record_id: i64,
        kind: SignatureKind,
        actor_id: impl Into<String>,
        signed_at: DateTime<Utc>,
        content_hash: impl Into<String>,
        origin_ip: impl Into<String>,
        client_info: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            record_id,
            kind,
            actor_id: actor_id.into(),
            signed_at,
            content_hash: content_hash.into(),
            origin_ip: origin_ip.into(),
            client_info: client_info.into(),
        }
    }
}

/// Coarse compliance state of a flight record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    /// Unsigned and editable.
    Draft,
    /// Cancelled before any signature; inert.
    Cancelled,
    /// Pilot-signed, waiting for the operator signature.
    AwaitingOperator,
    /// Pilot-signed with two or fewer days left before the deadline.
    NearDeadline,
    /// Past the operator-signature deadline by at least one whole day.
    Overdue,
    /// Both signatures applied; terminal state.
    Complete,
}

impl std::fmt::Display for ComplianceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Cancelled => "cancelled",
            Self::AwaitingOperator => "awaiting_operator",
            Self::NearDeadline => "near_deadline",
            Self::Overdue => "overdue",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// A single flight-log entry.
///
/// The seventeen regulator-mandated fields (from `pilot_in_command` through
/// `approved_by`) form the signable content covered by the canonical hash.
/// They are editable only while the record is unsigned, except for
/// `maintenance_notes` and `approved_by`, which stay editable until the
/// operator signature is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Unique identifier (assigned by the storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// The aircraft this record belongs to.
    pub aircraft_id: i64,

    /// Per-aircraft sequence number, assigned at creation and never reused.
    pub sequence: i64,

    /// Identity of the pilot-in-command; the only actor allowed to apply
    /// the pilot signature.
    pub pilot_in_command: String,

    /// Date of the flight.
    pub flight_date: NaiveDate,

    /// Departure aerodrome code.
    pub origin: String,

    /// Arrival aerodrome code.
    pub destination: String,

    /// Engine start time.
    pub engine_start_at: DateTime<Utc>,

    /// Takeoff time.
    pub takeoff_at: DateTime<Utc>,

    /// Landing time.
    pub landing_at: DateTime<Utc>,

    /// Engine stop time.
    pub engine_stop_at: DateTime<Utc>,

    /// Minutes flown under instrument flight rules.
    pub ifr_minutes: u32,

    /// Fuel uplifted for the flight.
    pub fuel_quantity: f64,

    /// Unit of the fuel quantity.
    pub fuel_unit: String,

    /// Nature of the flight (e.g. commercial, training, ferry).
    pub flight_nature: String,

    /// Persons on board including crew.
    pub occupant_count: u32,

    /// Cargo description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cargo: Option<String>,

    /// Free-text incident notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_notes: Option<String>,

    /// Free-text maintenance notes; editable until the operator signs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_notes: Option<String>,

    /// Identity of the maintenance approver; editable until the operator
    /// signs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,

    /// Whether the pilot signature has been applied.
    pub pilot_signed: bool,

    /// When the pilot signature was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pilot_signed_at: Option<DateTime<Utc>>,

    /// Whether the operator signature has been applied.
    pub operator_signed: bool,

    /// When the operator signature was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_signed_at: Option<DateTime<Utc>>,

    /// Canonical content hash set by the most recent signature event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_hash: Option<String>,

    /// Whether the record has been filed with the regulator.
    pub synced_with_regulator: bool,

    /// Message of the most recent failed sync attempt, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_error: Option<String>,

    /// Number of sync attempts made so far.
    pub sync_attempts: u32,

    /// When the most recent sync attempt finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_attempt_at: Option<DateTime<Utc>>,

    /// Set while a submission attempt is underway; survives restarts so the
    /// connectivity probe can release abandoned claims.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_in_flight_since: Option<DateTime<Utc>>,

    /// Marked by overdue escalation for inclusion in the next daily
    /// compliance report.
    pub flagged_for_report: bool,

    /// Cancelled before any signature; excluded from sweeps and sync.
    pub cancelled: bool,
}

impl FlightRecord {
    /// Create a draft record for an aircraft.
    ///
    /// Flight times default to midnight of the flight date; callers fill in
    /// the remaining compliance fields before signing.
    #[must_use]
    pub fn draft(
        aircraft_id: i64,
        pilot_in_command: impl Into<String>,
        flight_date: NaiveDate,
    ) -> Self {
        let midnight = flight_date.and_time(NaiveTime::MIN).and_utc();
        Self {
            id: None,
            aircraft_id,
            sequence: 0,
            pilot_in_command: pilot_in_command.into(),
            flight_date,
            origin: String::new(),
            destination: String::new(),
            engine_start_at: midnight,
            takeoff_at: midnight,
            landing_at: midnight,
            engine_stop_at: midnight,
            ifr_minutes: 0,
            fuel_quantity: 0.0,
            fuel_unit: "liters".to_string(),
            flight_nature: "private".to_string(),
            occupant_count: 1,
            cargo: None,
            incident_notes: None,
            maintenance_notes: None,
            approved_by: None,
            pilot_signed: false,
            pilot_signed_at: None,
            operator_signed: false,
            operator_signed_at: None,
            record_hash: None,
            synced_with_regulator: false,
            last_sync_error: None,
            sync_attempts: 0,
            last_sync_attempt_at: None,
            sync_in_flight_since: None,
            flagged_for_report: false,
            cancelled: false,
        }
    }

    /// Whether the record is still an editable, uncancelled draft.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        !self.pilot_signed && !self.cancelled
    }

    /// Whether both signatures have been applied.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.pilot_signed && self.operator_signed
    }

    /// Whether the record is eligible for regulator submission.
    #[must_use]
    pub fn is_sync_eligible(&self) -> bool {
        self.is_fully_signed() && !self.synced_with_regulator && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn test_regulatory_class_deadline_days() {
        assert_eq!(RegulatoryClass::A.deadline_days(), 2);
        assert_eq!(RegulatoryClass::B.deadline_days(), 15);
        assert_eq!(RegulatoryClass::C.deadline_days(), 30);
    }

    #[test]
    fn test_regulatory_class_codes() {
        for class in [RegulatoryClass::A, RegulatoryClass::B, RegulatoryClass::C] {
            assert_eq!(RegulatoryClass::from_code(class.code()), Some(class));
            assert_eq!(class.to_string(), class.code());
        }
        assert_eq!(RegulatoryClass::from_code("D"), None);
        assert_eq!(RegulatoryClass::from_code(""), None);
    }

    #[test]
    fn test_signature_kind_codes() {
        assert_eq!(SignatureKind::Pilot.to_string(), "pilot");
        assert_eq!(SignatureKind::Operator.to_string(), "operator");
        assert_eq!(
            SignatureKind::from_code("pilot"),
            Some(SignatureKind::Pilot)
        );
        assert_eq!(
            SignatureKind::from_code("operator"),
            Some(SignatureKind::Operator)
        );
        assert_eq!(SignatureKind::from_code("witness"), None);
    }

    #[test]
    fn test_aircraft_new() {
        let aircraft = Aircraft::new("N123AB", RegulatoryClass::B);
        assert!(aircraft.id.is_none());
        assert_eq!(aircraft.registration, "N123AB");
        assert_eq!(aircraft.class, RegulatoryClass::B);
        assert!(aircraft.active);
        assert_eq!(aircraft.next_sequence, 1);
    }

    #[test]
    fn test_draft_defaults() {
        let record = FlightRecord::draft(7, "pilot-01", test_date());
        assert!(record.id.is_none());
        assert_eq!(record.aircraft_id, 7);
        assert_eq!(record.sequence, 0);
        assert_eq!(record.pilot_in_command, "pilot-01");
        assert!(record.is_draft());
        assert!(!record.is_fully_signed());
        assert!(!record.is_sync_eligible());
        assert!(record.record_hash.is_none());
        assert_eq!(record.takeoff_at, record.engine_start_at);
    }

    #[test]
    fn test_draft_state_transitions() {
        let mut record = FlightRecord::draft(1, "pilot-01", test_date());
        record.pilot_signed = true;
        assert!(!record.is_draft());
        assert!(!record.is_fully_signed());

        record.operator_signed = true;
        assert!(record.is_fully_signed());
        assert!(record.is_sync_eligible());

        record.synced_with_regulator = true;
        assert!(!record.is_sync_eligible());
    }

    #[test]
    fn test_cancelled_record_not_draft() {
        let mut record = FlightRecord::draft(1, "pilot-01", test_date());
        record.cancelled = true;
        assert!(!record.is_draft());
        assert!(!record.is_sync_eligible());
    }

    #[test]
    fn test_signature_record_new() {
        let signed_at = Utc::now();
        let sig = SignatureRecord::new(
            9,
            SignatureKind::Pilot,
            "pilot-01",
            signed_at,
            "abc123",
            "10.0.0.1",
            "flitelog-web/1.4",
        );
        assert!(sig.id.is_none());
        assert_eq!(sig.record_id, 9);
        assert_eq!(sig.kind, SignatureKind::Pilot);
        assert_eq!(sig.actor_id, "pilot-01");
        assert_eq!(sig.signed_at, signed_at);
        assert_eq!(sig.content_hash, "abc123");
    }

    #[test]
    fn test_compliance_state_display() {
        assert_eq!(ComplianceState::Draft.to_string(), "draft");
        assert_eq!(
            ComplianceState::AwaitingOperator.to_string(),
            "awaiting_operator"
        );
        assert_eq!(ComplianceState::NearDeadline.to_string(), "near_deadline");
        assert_eq!(ComplianceState::Overdue.to_string(), "overdue");
        assert_eq!(ComplianceState::Complete.to_string(), "complete");
        assert_eq!(ComplianceState::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_record_serialization_round_trip() {
        let mut record = FlightRecord::draft(3, "pilot-02", test_date());
        record.origin = "EDDF".to_string();
        record.destination = "LOWW".to_string();
        record.cargo = Some("spare parts, 120kg".to_string());

        let json = serde_json::to_string(&record).unwrap();
        let back: FlightRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_regulatory_class_serde_codes() {
        let json = serde_json::to_string(&RegulatoryClass::B).unwrap();
        assert_eq!(json, "\"B\"");
        let back: RegulatoryClass = serde_json::from_str("\"C\"").unwrap();
        assert_eq!(back, RegulatoryClass::C);
    }
}
