//! Compliance reporting and conformance auditing.
//!
//! The daily report scores each active aircraft's trailing 30-day window
//! and ranks the fleet worst-first so attention lands where compliance is
//! weakest. Records escalated by the deadline sweep ride along once and
//! have their flag cleared. The conformance audit independently re-checks
//! a sample of completed records: signature hash still matches, deadline
//! was honored. Failures are quarantined, and a low score alerts the
//! liaison desk.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::cache::window_start;
use crate::clock::Clock;
use crate::deadline;
use crate::error::Result;
use crate::notify::{Notifier, RecipientGroup, Severity};
use crate::record::RegulatoryClass;
use crate::repository::RecordRepository;
use crate::scheduler::{Job, RunContext};
use crate::signing::SignatureService;
use crate::sync::QUARANTINE_PREFIX;

/// One aircraft's score in the daily report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AircraftCompliance {
    /// The scored aircraft.
    pub aircraft_id: i64,
    /// Tail number.
    pub registration: String,
    /// Regulatory tier.
    pub class: RegulatoryClass,
    /// Records in the trailing window.
    pub total: i64,
    /// Fully signed records in the window.
    pub complete: i64,
    /// Completion percentage; an empty window scores 100.
    pub rate: f64,
}

/// The daily fleet compliance report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// First flight date of the scored window.
    pub window_start: NaiveDate,
    /// Fleet scores, worst first.
    pub fleet: Vec<AircraftCompliance>,
    /// Fleet-wide completion percentage.
    pub overall_rate: f64,
    /// Records escalated as overdue since the last report.
    pub escalated_records: Vec<i64>,
}

/// Outcome of one conformance audit pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConformanceReport {
    /// When the audit ran.
    pub generated_at: DateTime<Utc>,
    /// Completed records sampled.
    pub sampled: usize,
    /// Records whose signature and deadline checks held.
    pub passed: usize,
    /// Records that failed a check and were quarantined.
    pub failed: usize,
    /// Pass percentage; an empty sample scores 100.
    pub score: f64,
}

/// Builds the daily report and runs the conformance audit.
pub struct ComplianceReporter {
    repo: Arc<dyn RecordRepository>,
    signing: Arc<SignatureService>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    sample_size: usize,
    critical_threshold: f64,
}

impl std::fmt::Debug for ComplianceReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceReporter")
            .field("sample_size", &self.sample_size)
            .field("critical_threshold", &self.critical_threshold)
            .finish_non_exhaustive()
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        100.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            part as f64 / whole as f64 * 100.0
        }
    }
}

impl ComplianceReporter {
    /// Wire up the reporter.
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        signing: Arc<SignatureService>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            repo,
            signing,
            audit,
            notifier,
            clock,
            sample_size: config.report.conformance_sample_size,
            critical_threshold: config.report.conformance_critical_threshold,
        }
    }

    /// Build the daily report and clear the escalation flags it consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or updated.
    pub async fn daily_report(&self, ctx: &RunContext) -> Result<ComplianceReport> {
        let now = self.clock.now();
        let since = window_start(now.date_naive());

        let mut fleet = Vec::new();
        let mut fleet_total = 0;
        let mut fleet_complete = 0;

        for aircraft in self.repo.find_active_aircraft().await? {
            if ctx.expired() {
                warn!("report time budget elapsed, ending run early");
                break;
            }
            let Some(aircraft_id) = aircraft.id else {
                continue;
            };
            let total = self.repo.count_window_records(aircraft_id, since).await?;
            let complete = self.repo.count_window_complete(aircraft_id, since).await?;
            fleet_total += total;
            fleet_complete += complete;
            fleet.push(AircraftCompliance {
                aircraft_id,
                registration: aircraft.registration,
                class: aircraft.class,
                total,
                complete,
                rate: percentage(complete, total),
            });
        }

        // Worst compliance first; ties broken by tail number for a stable
        // report order.
        fleet.sort_by(|a, b| {
            a.rate
                .partial_cmp(&b.rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.registration.cmp(&b.registration))
        });

        let mut escalated_records = Vec::new();
        for record in self.repo.find_flagged_for_report().await? {
            let Some(record_id) = record.id else {
                continue;
            };
            escalated_records.push(record_id);
            self.repo.set_flagged_for_report(record_id, false).await?;
        }

        let report = ComplianceReport {
            generated_at: now,
            window_start: since,
            overall_rate: percentage(fleet_complete, fleet_total),
            fleet,
            escalated_records,
        };

        info!(
            aircraft = report.fleet.len(),
            overall_rate = format!("{:.1}%", report.overall_rate),
            escalated = report.escalated_records.len(),
            "daily compliance report generated"
        );
        self.notifier
            .notify(
                RecipientGroup::RegulatorLiaison,
                Severity::Routine,
                "daily compliance report",
                &format!(
                    "fleet completion {:.1}% across {} aircraft, {} newly escalated record(s)",
                    report.overall_rate,
                    report.fleet.len(),
                    report.escalated_records.len()
                ),
            )
            .await?;
        Ok(report)
    }

    /// Re-check a sample of completed records. A record passes when its
    /// most recent signature hash still matches the content and the
    /// operator signature landed within the tier deadline. Failures are
    /// quarantined for manual review.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or updated.
    pub async fn conformance_audit(&self, ctx: &RunContext) -> Result<ConformanceReport> {
        let now = self.clock.now();
        let sample = self.repo.find_completed_records(self.sample_size).await?;

        let mut passed = 0;
        let mut failed = 0;

        for record in &sample {
            if ctx.expired() {
                warn!("conformance audit time budget elapsed, ending run early");
                break;
            }
            let Some(record_id) = record.id else {
                continue;
            };

            match self.check_record(record_id).await? {
                None => passed += 1,
                Some(reason) => {
                    failed += 1;
                    warn!(record_id, reason, "record failed conformance check");
                    self.repo
                        .quarantine_record(record_id, &format!("{QUARANTINE_PREFIX}: {reason}"))
                        .await?;
                    self.audit.record(
                        AuditEntry::new(now, "conformance_audit", "flight_record", record_id)
                            .failed(reason),
                    );
                }
            }
        }

        #[allow(clippy::cast_possible_wrap)]
        let report = ConformanceReport {
            generated_at: now,
            sampled: passed + failed,
            passed,
            failed,
            score: percentage(passed as i64, (passed + failed) as i64),
        };

        info!(
            sampled = report.sampled,
            failed = report.failed,
            score = format!("{:.1}%", report.score),
            "conformance audit finished"
        );
        if report.score < self.critical_threshold {
            self.notifier
                .notify(
                    RecipientGroup::RegulatorLiaison,
                    Severity::Critical,
                    "conformance score below threshold",
                    &format!(
                        "{} of {} sampled record(s) failed conformance, score {:.1}%",
                        report.failed, report.sampled, report.score
                    ),
                )
                .await?;
        }
        Ok(report)
    }

    /// `None` when the record conforms, otherwise the failure reason.
    async fn check_record(&self, record_id: i64) -> Result<Option<String>> {
        let signatures = self.repo.find_signatures_for_record(record_id).await?;
        let Some(latest) = signatures.last() else {
            return Ok(Some("completed record has no signature facts".to_string()));
        };
        let Some(signature_id) = latest.id else {
            return Ok(Some("latest signature fact has no id".to_string()));
        };

        if !self.signing.validate_integrity(signature_id).await? {
            return Ok(Some(
                "content no longer matches the latest signature hash".to_string(),
            ));
        }

        let status = self.signing.deadline_status(record_id).await?;
        let record = self
            .repo
            .find_record(record_id)
            .await?
            .ok_or_else(|| crate::error::Error::not_found("flight record", record_id))?;
        if let (Some(pilot_at), Some(operator_at)) =
            (record.pilot_signed_at, record.operator_signed_at)
        {
            if !deadline::within_deadline(pilot_at, status.class, operator_at) {
                return Ok(Some(format!(
                    "operator signature applied past the tier {} deadline",
                    status.class
                )));
            }
        }
        Ok(None)
    }
}

/// Scheduler adapter for the daily report.
#[derive(Debug)]
pub struct DailyReportJob(pub Arc<ComplianceReporter>);

#[async_trait::async_trait]
impl Job for DailyReportJob {
    fn name(&self) -> &'static str {
        "daily-report"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.daily_report(ctx).await.map(|_| ())
    }
}

/// Scheduler adapter for the conformance audit.
#[derive(Debug)]
pub struct ConformanceAuditJob(pub Arc<ComplianceReporter>);

#[async_trait::async_trait]
impl Job for ConformanceAuditJob {
    fn name(&self) -> &'static str {
        "conformance-audit"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.conformance_audit(ctx).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::hash::canonical_hash;
    use crate::notify::RecordingNotifier;
    use crate::record::{Aircraft, FlightRecord, SignatureKind, SignatureRecord};
    use crate::storage::SqliteRepository;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    struct Fixture {
        repo: Arc<SqliteRepository>,
        audit: MemoryAuditSink,
        notifier: RecordingNotifier,
        reporter: ComplianceReporter,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let audit = MemoryAuditSink::new();
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::at(t0());
        let signing = Arc::new(SignatureService::new(
            repo.clone(),
            Arc::new(audit.clone()),
            Arc::new(clock.clone()),
        ));
        let reporter = ComplianceReporter::new(
            repo.clone(),
            signing,
            Arc::new(audit.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            &Config::default(),
        );
        Fixture {
            repo,
            audit,
            notifier,
            reporter,
        }
    }

    fn next_registration() -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        format!("NR{:04}", COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    async fn seed_aircraft(fx: &Fixture) -> i64 {
        fx.repo
            .insert_aircraft(&Aircraft::new(next_registration(), RegulatoryClass::B))
            .await
            .unwrap()
    }

    async fn seed_draft(fx: &Fixture, aircraft_id: i64) -> i64 {
        let record = FlightRecord::draft(aircraft_id, "pilot-01", t0().date_naive());
        fx.repo.create_draft(&record).await.unwrap().id.unwrap()
    }

    /// Fully sign a record, appending the signature facts the conformance
    /// audit validates against.
    async fn seed_complete(fx: &Fixture, aircraft_id: i64, operator_delay: Duration) -> i64 {
        let record_id = seed_draft(fx, aircraft_id).await;

        let record = fx.repo.find_record(record_id).await.unwrap().unwrap();
        let pilot_hash = canonical_hash(&record);
        fx.repo
            .mark_pilot_signed(record_id, t0(), &pilot_hash)
            .await
            .unwrap();
        fx.repo
            .append_signature(&SignatureRecord::new(
                record_id,
                SignatureKind::Pilot,
                "pilot-01",
                t0(),
                &pilot_hash,
                "10.0.0.1",
                "test",
            ))
            .await
            .unwrap();

        let operator_at = t0() + operator_delay;
        let record = fx.repo.find_record(record_id).await.unwrap().unwrap();
        let operator_hash = canonical_hash(&record);
        fx.repo
            .mark_operator_signed(record_id, operator_at, &operator_hash)
            .await
            .unwrap();
        fx.repo
            .append_signature(&SignatureRecord::new(
                record_id,
                SignatureKind::Operator,
                "operator-01",
                operator_at,
                &operator_hash,
                "10.0.0.2",
                "test",
            ))
            .await
            .unwrap();
        record_id
    }

    fn ctx() -> RunContext {
        RunContext::new(None)
    }

    #[tokio::test]
    async fn test_daily_report_ranks_worst_first() {
        let fx = fixture();

        // One aircraft fully compliant, one at 50%.
        let good = seed_aircraft(&fx).await;
        seed_complete(&fx, good, Duration::hours(1)).await;

        let bad = seed_aircraft(&fx).await;
        seed_complete(&fx, bad, Duration::hours(1)).await;
        seed_draft(&fx, bad).await;

        let report = fx.reporter.daily_report(&ctx()).await.unwrap();
        assert_eq!(report.fleet.len(), 2);
        assert_eq!(report.fleet[0].aircraft_id, bad);
        assert!((report.fleet[0].rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(report.fleet[1].aircraft_id, good);
        assert!((report.fleet[1].rate - 100.0).abs() < f64::EPSILON);
        assert!((report.overall_rate - percentage(2, 3)).abs() < 0.01);

        let sent = fx.notifier.sent_to(RecipientGroup::RegulatorLiaison);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].severity, Severity::Routine);
    }

    #[tokio::test]
    async fn test_daily_report_empty_window_scores_full() {
        let fx = fixture();
        seed_aircraft(&fx).await;

        let report = fx.reporter.daily_report(&ctx()).await.unwrap();
        assert_eq!(report.fleet.len(), 1);
        assert!((report.fleet[0].rate - 100.0).abs() < f64::EPSILON);
        assert!((report.overall_rate - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_daily_report_consumes_escalation_flags() {
        let fx = fixture();
        let aircraft_id = seed_aircraft(&fx).await;
        let record_id = seed_draft(&fx, aircraft_id).await;
        fx.repo
            .set_flagged_for_report(record_id, true)
            .await
            .unwrap();

        let report = fx.reporter.daily_report(&ctx()).await.unwrap();
        assert_eq!(report.escalated_records, vec![record_id]);

        // Flag cleared; the next report starts clean.
        let report = fx.reporter.daily_report(&ctx()).await.unwrap();
        assert!(report.escalated_records.is_empty());
    }

    #[tokio::test]
    async fn test_conformance_audit_passes_clean_records() {
        let fx = fixture();
        let aircraft_id = seed_aircraft(&fx).await;
        seed_complete(&fx, aircraft_id, Duration::hours(2)).await;
        seed_complete(&fx, aircraft_id, Duration::days(3)).await;

        let report = fx.reporter.conformance_audit(&ctx()).await.unwrap();
        assert_eq!(report.sampled, 2);
        assert_eq!(report.failed, 0);
        assert!((report.score - 100.0).abs() < f64::EPSILON);
        assert!(fx.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_conformance_audit_quarantines_tampered_record() {
        let fx = fixture();
        let aircraft_id = seed_aircraft(&fx).await;
        let record_id = seed_complete(&fx, aircraft_id, Duration::hours(2)).await;
        fx.repo.execute_raw(
            "UPDATE records SET destination = 'TAMPERED' WHERE id = ?1",
            record_id,
        );

        let report = fx.reporter.conformance_audit(&ctx()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!((report.score - 0.0).abs() < f64::EPSILON);

        let record = fx.repo.find_record(record_id).await.unwrap().unwrap();
        assert!(record
            .last_sync_error
            .unwrap()
            .starts_with(QUARANTINE_PREFIX));

        // Score 0 is under the 95% default threshold.
        let critical = fx.notifier.sent_to(RecipientGroup::RegulatorLiaison);
        assert!(critical
            .iter()
            .any(|n| n.severity == Severity::Critical && n.subject.contains("conformance")));

        let failures = fx.audit.entries_for("conformance_audit");
        assert_eq!(failures.len(), 1);
        assert!(!failures[0].success);
    }

    #[tokio::test]
    async fn test_conformance_audit_flags_late_operator_signature() {
        let fx = fixture();
        let aircraft_id = seed_aircraft(&fx).await;
        // Tier B deadline is 15 days; this one was signed on day 20.
        seed_complete(&fx, aircraft_id, Duration::days(20)).await;

        let report = fx.reporter.conformance_audit(&ctx()).await.unwrap();
        assert_eq!(report.failed, 1);
        let failures = fx.audit.entries_for("conformance_audit");
        assert!(failures[0]
            .error
            .as_deref()
            .unwrap()
            .contains("past the tier"));
    }

    #[tokio::test]
    async fn test_conformance_audit_empty_sample_scores_full() {
        let fx = fixture();
        let report = fx.reporter.conformance_audit(&ctx()).await.unwrap();
        assert_eq!(report.sampled, 0);
        assert!((report.score - 100.0).abs() < f64::EPSILON);
        assert!(fx.notifier.sent().is_empty());
    }
}
