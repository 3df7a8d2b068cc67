//! Deadline sweep and operator reminders.
//!
//! The sweep walks pilot-signed records waiting for the operator
//! signature, escalates the ones past their tier deadline, and reminds
//! operators of the ones approaching it. Escalation happens once per
//! record, keyed off the report flag; reminders repeat every run on
//! purpose, since the scheduler gates the reminder job to business hours.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::clock::Clock;
use crate::deadline::{self, NEAR_DEADLINE_DAYS};
use crate::error::Result;
use crate::notify::{Notifier, RecipientGroup, Severity};
use crate::repository::{PendingRecord, RecordRepository};
use crate::scheduler::{Job, RunContext};

/// What one sweep run found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Overdue records examined.
    pub overdue: usize,
    /// Records newly escalated this run.
    pub escalated: usize,
}

/// Walks pending records against their operator-signature deadlines.
pub struct DeadlineSweep {
    repo: Arc<dyn RecordRepository>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DeadlineSweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineSweep").finish_non_exhaustive()
    }
}

impl DeadlineSweep {
    /// Wire up the sweep.
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            notifier,
            audit,
            clock,
        }
    }

    /// Escalate records past their deadline.
    ///
    /// A record is escalated exactly once: it is flagged for the next
    /// daily compliance report, audited, and its operators alerted. The
    /// liaison desk gets one summary per run that found new escalations.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or updated.
    pub async fn sweep(&self, ctx: &RunContext) -> Result<SweepSummary> {
        let now = self.clock.now();
        let mut summary = SweepSummary::default();

        for pending in self.repo.find_overdue(now).await? {
            if ctx.expired() {
                warn!("sweep time budget elapsed, ending run early");
                break;
            }
            summary.overdue += 1;
            if pending.record.flagged_for_report {
                continue;
            }
            self.escalate(&pending, now).await?;
            summary.escalated += 1;
        }

        if summary.escalated > 0 {
            self.notifier
                .notify(
                    RecipientGroup::RegulatorLiaison,
                    Severity::Critical,
                    "records past operator-signature deadline",
                    &format!(
                        "{} record(s) newly passed their operator-signature deadline",
                        summary.escalated
                    ),
                )
                .await?;
        }

        info!(
            overdue = summary.overdue,
            escalated = summary.escalated,
            "deadline sweep finished"
        );
        Ok(summary)
    }

    /// Remind operators of records within the near-deadline window.
    ///
    /// Reminders carry no sent-marker and repeat every run; the scheduler
    /// confines this job to business hours.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a reminder cannot
    /// be delivered.
    pub async fn notify_near_deadline(&self, ctx: &RunContext) -> Result<usize> {
        let now = self.clock.now();
        let mut notified = 0;

        for pending in self
            .repo
            .find_near_deadline(now, NEAR_DEADLINE_DAYS)
            .await?
        {
            if ctx.expired() {
                warn!("reminder time budget elapsed, ending run early");
                break;
            }
            let status = deadline::deadline_status(&pending.record, pending.class, now);
            let Some(record_id) = pending.record.id else {
                continue;
            };
            self.notifier
                .notify(
                    RecipientGroup::AircraftOperators {
                        aircraft_id: pending.record.aircraft_id,
                    },
                    Severity::Routine,
                    "operator signature due soon",
                    &format!(
                        "record {record_id} (flight {}) needs the operator signature within {} day(s)",
                        pending.record.flight_date, status.remaining_days
                    ),
                )
                .await?;
            notified += 1;
        }

        info!(notified, "near-deadline reminders sent");
        Ok(notified)
    }

    async fn escalate(&self, pending: &PendingRecord, now: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let Some(record_id) = pending.record.id else {
            return Ok(());
        };
        let status = deadline::deadline_status(&pending.record, pending.class, now);

        self.repo.set_flagged_for_report(record_id, true).await?;
        self.audit.record(
            AuditEntry::new(now, "overdue_escalation", "flight_record", record_id)
                .failed(format!("{} day(s) past deadline", status.overdue_days)),
        );
        self.notifier
            .notify(
                RecipientGroup::AircraftOperators {
                    aircraft_id: pending.record.aircraft_id,
                },
                Severity::Elevated,
                "operator signature overdue",
                &format!(
                    "record {record_id} (flight {}) is {} day(s) past its tier {} deadline",
                    pending.record.flight_date, status.overdue_days, pending.class
                ),
            )
            .await?;

        warn!(
            record_id,
            aircraft_id = pending.record.aircraft_id,
            overdue_days = status.overdue_days,
            "record escalated as overdue"
        );
        Ok(())
    }
}

/// Scheduler adapter for the escalation sweep.
#[derive(Debug)]
pub struct SweepJob(pub Arc<DeadlineSweep>);

#[async_trait::async_trait]
impl Job for SweepJob {
    fn name(&self) -> &'static str {
        "deadline-sweep"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.sweep(ctx).await.map(|_| ())
    }
}

/// Scheduler adapter for the business-hours reminder pass.
#[derive(Debug)]
pub struct NearDeadlineJob(pub Arc<DeadlineSweep>);

#[async_trait::async_trait]
impl Job for NearDeadlineJob {
    fn name(&self) -> &'static str {
        "near-deadline-reminders"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.notify_near_deadline(ctx).await.map(|_| ())
    }
}
