//! Operator-signature deadline arithmetic.
//!
//! Pure functions over the regulatory tier and the pilot-signature
//! timestamp. No I/O and no mutation; everything here is driven by a
//! caller-supplied `now` so sweeps and tests share the same math.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::record::{ComplianceState, FlightRecord, RegulatoryClass};

/// Days within which a pending record counts as "near deadline".
pub const NEAR_DEADLINE_DAYS: i64 = 2;

/// The absolute operator-signature deadline for a pilot-signed record.
#[must_use]
pub fn deadline_for(pilot_signed_at: DateTime<Utc>, class: RegulatoryClass) -> DateTime<Utc> {
    pilot_signed_at + Duration::days(class.deadline_days())
}

/// Whole days remaining until the deadline, floored at zero.
///
/// Returns zero when the record is not yet pilot-signed; such records are
/// not eligible for deadline tracking at all.
#[must_use]
pub fn remaining_days(
    pilot_signed_at: Option<DateTime<Utc>>,
    class: RegulatoryClass,
    now: DateTime<Utc>,
) -> i64 {
    let Some(signed_at) = pilot_signed_at else {
        return 0;
    };
    (deadline_for(signed_at, class) - now).num_days().max(0)
}

/// Whole days past the deadline, floored at zero.
///
/// Returns zero when the record is not yet pilot-signed.
#[must_use]
pub fn overdue_days(
    pilot_signed_at: Option<DateTime<Utc>>,
    class: RegulatoryClass,
    now: DateTime<Utc>,
) -> i64 {
    let Some(signed_at) = pilot_signed_at else {
        return 0;
    };
    (now - deadline_for(signed_at, class)).num_days().max(0)
}

/// Whether an operator signature applied at `now` would be accepted.
///
/// The deadline instant itself is still acceptable; one second past it is
/// not.
#[must_use]
pub fn within_deadline(
    pilot_signed_at: DateTime<Utc>,
    class: RegulatoryClass,
    now: DateTime<Utc>,
) -> bool {
    now <= deadline_for(pilot_signed_at, class)
}

/// Deadline position of a single record, as exposed to the API layer and
/// the CLI report output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadlineStatus {
    /// Coarse compliance state.
    pub state: ComplianceState,
    /// Regulatory tier the deadline derives from.
    pub class: RegulatoryClass,
    /// Absolute deadline, once the record is pilot-signed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Whole days remaining until the deadline.
    pub remaining_days: i64,
    /// Whole days past the deadline.
    pub overdue_days: i64,
}

/// Compute the deadline status of a record at `now`.
#[must_use]
pub fn deadline_status(
    record: &FlightRecord,
    class: RegulatoryClass,
    now: DateTime<Utc>,
) -> DeadlineStatus {
    let deadline = record.pilot_signed_at.map(|at| deadline_for(at, class));
    let remaining = remaining_days(record.pilot_signed_at, class, now);
    let overdue = overdue_days(record.pilot_signed_at, class, now);

    let state = if record.cancelled {
        ComplianceState::Cancelled
    } else if record.is_fully_signed() {
        ComplianceState::Complete
    } else if !record.pilot_signed {
        ComplianceState::Draft
    } else if overdue > 0 {
        ComplianceState::Overdue
    } else if remaining <= NEAR_DEADLINE_DAYS {
        ComplianceState::NearDeadline
    } else {
        ComplianceState::AwaitingOperator
    };

    DeadlineStatus {
        state,
        class,
        deadline,
        remaining_days: remaining,
        overdue_days: overdue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_deadline_for_each_tier() {
        assert_eq!(
            deadline_for(t0(), RegulatoryClass::A),
            t0() + Duration::days(2)
        );
        assert_eq!(
            deadline_for(t0(), RegulatoryClass::B),
            t0() + Duration::days(15)
        );
        assert_eq!(
            deadline_for(t0(), RegulatoryClass::C),
            t0() + Duration::days(30)
        );
    }

    #[test]
    fn test_remaining_and_overdue_table() {
        // (tier, days elapsed, expected remaining, expected overdue)
        let cases = [
            (RegulatoryClass::A, 0, 2, 0),
            (RegulatoryClass::A, 1, 1, 0),
            (RegulatoryClass::A, 2, 0, 0),
            (RegulatoryClass::A, 3, 0, 1),
            (RegulatoryClass::A, 10, 0, 8),
            (RegulatoryClass::B, 0, 15, 0),
            (RegulatoryClass::B, 10, 5, 0),
            (RegulatoryClass::B, 15, 0, 0),
            (RegulatoryClass::B, 16, 0, 1),
            (RegulatoryClass::C, 29, 1, 0),
            (RegulatoryClass::C, 31, 0, 1),
        ];

        for (class, elapsed, want_remaining, want_overdue) in cases {
            let now = t0() + Duration::days(elapsed);
            assert_eq!(
                remaining_days(Some(t0()), class, now),
                want_remaining,
                "remaining, tier {class} day {elapsed}"
            );
            assert_eq!(
                overdue_days(Some(t0()), class, now),
                want_overdue,
                "overdue, tier {class} day {elapsed}"
            );
        }
    }

    #[test]
    fn test_unsigned_record_has_no_deadline_tracking() {
        let now = t0() + Duration::days(100);
        assert_eq!(remaining_days(None, RegulatoryClass::A, now), 0);
        assert_eq!(overdue_days(None, RegulatoryClass::A, now), 0);
    }

    #[test]
    fn test_within_deadline_boundary() {
        let deadline = deadline_for(t0(), RegulatoryClass::A);
        assert!(within_deadline(t0(), RegulatoryClass::A, deadline));
        assert!(within_deadline(
            t0(),
            RegulatoryClass::A,
            deadline - Duration::seconds(1)
        ));
        assert!(!within_deadline(
            t0(),
            RegulatoryClass::A,
            deadline + Duration::seconds(1)
        ));
    }

    fn pending_record(pilot_signed_at: DateTime<Utc>) -> FlightRecord {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let mut record = FlightRecord::draft(1, "pilot-01", date);
        record.pilot_signed = true;
        record.pilot_signed_at = Some(pilot_signed_at);
        record
    }

    #[test]
    fn test_status_draft() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let record = FlightRecord::draft(1, "pilot-01", date);
        let status = deadline_status(&record, RegulatoryClass::B, t0());
        assert_eq!(status.state, ComplianceState::Draft);
        assert!(status.deadline.is_none());
        assert_eq!(status.remaining_days, 0);
        assert_eq!(status.overdue_days, 0);
    }

    #[test]
    fn test_status_awaiting_then_near_then_overdue() {
        let record = pending_record(t0());

        // Tier B, day 10: 5 days remaining, still normal.
        let status = deadline_status(&record, RegulatoryClass::B, t0() + Duration::days(10));
        assert_eq!(status.state, ComplianceState::AwaitingOperator);
        assert_eq!(status.remaining_days, 5);

        // Day 13: 2 days remaining, near deadline.
        let status = deadline_status(&record, RegulatoryClass::B, t0() + Duration::days(13));
        assert_eq!(status.state, ComplianceState::NearDeadline);
        assert_eq!(status.remaining_days, 2);

        // Day 16: one day overdue.
        let status = deadline_status(&record, RegulatoryClass::B, t0() + Duration::days(16));
        assert_eq!(status.state, ComplianceState::Overdue);
        assert_eq!(status.overdue_days, 1);
    }

    #[test]
    fn test_status_complete_and_cancelled_override_deadline() {
        let mut record = pending_record(t0());
        record.operator_signed = true;
        let status = deadline_status(&record, RegulatoryClass::A, t0() + Duration::days(10));
        assert_eq!(status.state, ComplianceState::Complete);

        let mut record = pending_record(t0());
        record.cancelled = true;
        let status = deadline_status(&record, RegulatoryClass::A, t0() + Duration::days(10));
        assert_eq!(status.state, ComplianceState::Cancelled);
    }
}
