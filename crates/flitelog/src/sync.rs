//! Regulator sync: submission, retry backoff, reprocessing, connectivity.
//!
//! Fully signed records are submitted to the regulator one at a time.
//! Failures are durable: the attempt counter and failure message live on
//! the record row, so backoff survives restarts and multiple engine
//! instances share one retry state. Records that exhaust their attempts
//! are parked until the daily reprocessing pass resets them; records whose
//! content no longer matches their stored hash are quarantined and never
//! submitted automatically again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditSink};
use crate::clock::Clock;
use crate::error::Result;
use crate::hash;
use crate::notify::{Notifier, RecipientGroup, Severity};
use crate::record::FlightRecord;
use crate::regulator::RegulatorClient;
use crate::repository::RecordRepository;
use crate::scheduler::{Job, RunContext};

/// Failure message prefix marking a quarantined record. Quarantined
/// records are excluded from retries and from reprocessing resets.
pub const QUARANTINE_PREFIX: &str = "integrity violation";

/// Consecutive transport failures after which a run aborts early; the
/// regulator is presumed down and the rest of the queue would only burn
/// attempts.
const TRANSPORT_FAILURE_ABORT: usize = 3;

/// What one sync run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Records submitted (or attempted) this run.
    pub processed: usize,
    /// Submissions the regulator accepted.
    pub succeeded: usize,
    /// Submissions that failed, rejection and transport alike.
    pub failed: usize,
    /// Records quarantined for hash mismatches.
    pub quarantined: usize,
    /// Candidates skipped: backoff not elapsed, attempts exhausted, or
    /// claimed by another worker.
    pub skipped: usize,
}

/// Submits signed records to the regulator and manages retry state.
pub struct RegulatorSync {
    repo: Arc<dyn RecordRepository>,
    regulator: Arc<dyn RegulatorClient>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    submit_timeout: std::time::Duration,
    backoff_tiers: Vec<chrono::Duration>,
    max_attempts: u32,
    systemic_failure_threshold: usize,
    stale_in_flight: chrono::Duration,
}

impl std::fmt::Debug for RegulatorSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegulatorSync")
            .field("submit_timeout", &self.submit_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RegulatorSync {
    /// Wire up the sync job from configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        regulator: Arc<dyn RegulatorClient>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: &crate::config::Config,
    ) -> Self {
        Self {
            repo,
            regulator,
            audit,
            notifier,
            clock,
            submit_timeout: config.submit_timeout(),
            backoff_tiers: config.backoff_tiers(),
            max_attempts: config.sync.max_attempts,
            systemic_failure_threshold: config.sync.systemic_failure_threshold,
            stale_in_flight: config.stale_in_flight(),
        }
    }

    /// Submit every eligible record: fresh work first, then retries whose
    /// backoff has elapsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read; individual submission
    /// failures are recorded on the record, not propagated.
    pub async fn sync_pending(&self, ctx: &RunContext) -> Result<SyncSummary> {
        let now = self.clock.now();
        let mut summary = SyncSummary::default();
        let mut consecutive_transport_failures = 0;

        let mut candidates = self.repo.find_unsynced().await?;
        for record in self.repo.find_failed_sync().await? {
            if self.retry_due(&record, now) {
                candidates.push(record);
            } else {
                summary.skipped += 1;
            }
        }

        for record in candidates {
            if ctx.expired() {
                warn!("sync time budget elapsed, ending run early");
                break;
            }
            if consecutive_transport_failures >= TRANSPORT_FAILURE_ABORT {
                warn!(
                    failures = consecutive_transport_failures,
                    "regulator looks unreachable, aborting sync run"
                );
                break;
            }

            match self.submit_one(&record).await? {
                Submission::Accepted => {
                    summary.processed += 1;
                    summary.succeeded += 1;
                    consecutive_transport_failures = 0;
                }
                Submission::Rejected => {
                    summary.processed += 1;
                    summary.failed += 1;
                    consecutive_transport_failures = 0;
                }
                Submission::TransportFailure => {
                    summary.processed += 1;
                    summary.failed += 1;
                    consecutive_transport_failures += 1;
                }
                Submission::Quarantined => {
                    summary.processed += 1;
                    summary.quarantined += 1;
                }
                Submission::Skipped => summary.skipped += 1,
            }
        }

        if summary.failed > summary.succeeded
            && summary.processed > self.systemic_failure_threshold
        {
            self.notifier
                .notify(
                    RecipientGroup::RegulatorLiaison,
                    Severity::Critical,
                    "regulator sync failing systemically",
                    &format!(
                        "{} of {} submissions failed this run",
                        summary.failed, summary.processed
                    ),
                )
                .await?;
        }

        info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            quarantined = summary.quarantined,
            skipped = summary.skipped,
            "sync run finished"
        );
        Ok(summary)
    }

    /// Daily reprocessing pass: group failures by message for the log,
    /// reset the retry state of records that exhausted their attempts,
    /// then run a normal sync pass over everything now eligible.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or updated.
    pub async fn reprocess_failures(&self, ctx: &RunContext) -> Result<SyncSummary> {
        let failed = self.repo.find_failed_sync().await?;

        let mut by_message: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
        let mut to_reset = Vec::new();
        for record in &failed {
            let message = record.last_sync_error.as_deref().unwrap_or("unknown");
            *by_message.entry(message).or_insert(0) += 1;
            if message.starts_with(QUARANTINE_PREFIX) {
                continue;
            }
            if record.sync_attempts >= self.max_attempts {
                if let Some(id) = record.id {
                    to_reset.push(id);
                }
            }
        }
        for (message, count) in &by_message {
            info!(count, message, "failed sync group");
        }

        let reset = self.repo.reset_sync_failures(&to_reset).await?;
        info!(reset, total_failed = failed.len(), "reprocessing reset retry state");

        let mut summary = self.sync_pending(ctx).await?;
        summary.skipped += failed.len().saturating_sub(reset + summary.processed);
        Ok(summary)
    }

    /// Connectivity probe. Alerts the liaison desk when the regulator is
    /// unreachable and releases claims abandoned by crashed workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or updated.
    pub async fn probe_connectivity(&self) -> Result<bool> {
        let now = self.clock.now();

        // Stale claims are cleared on every probe, reachable or not.
        let cutoff = now - self.stale_in_flight;
        for record in self.repo.find_stale_in_flight(cutoff).await? {
            if let Some(id) = record.id {
                warn!(record_id = id, "releasing stale sync claim");
                self.repo.release_sync_claim(id).await?;
            }
        }

        let status = match self.regulator.check_connectivity().await {
            Ok(status) => status,
            Err(e) => crate::regulator::ConnectivityStatus {
                reachable: false,
                last_seen: None,
                error: Some(e.to_string()),
            },
        };

        if status.reachable {
            debug!("regulator reachable");
        } else {
            let detail = status.error.as_deref().unwrap_or("no detail");
            error!(error = detail, "regulator unreachable");
            self.notifier
                .notify(
                    RecipientGroup::RegulatorLiaison,
                    Severity::Critical,
                    "regulator endpoint unreachable",
                    detail,
                )
                .await?;
        }
        Ok(status.reachable)
    }

    /// Whether a failed record's backoff has elapsed and attempts remain.
    fn retry_due(&self, record: &FlightRecord, now: DateTime<Utc>) -> bool {
        if record
            .last_sync_error
            .as_deref()
            .is_some_and(|e| e.starts_with(QUARANTINE_PREFIX))
        {
            return false;
        }
        if record.sync_attempts >= self.max_attempts {
            return false;
        }
        let Some(last_attempt) = record.last_sync_attempt_at else {
            return true;
        };
        // Attempt N+1 waits out backoff tier N; the last tier repeats.
        #[allow(clippy::cast_possible_truncation)]
        let tier = (record.sync_attempts.max(1) as usize - 1).min(self.backoff_tiers.len() - 1);
        now >= last_attempt + self.backoff_tiers[tier]
    }

    async fn submit_one(&self, record: &FlightRecord) -> Result<Submission> {
        let now = self.clock.now();
        let Some(record_id) = record.id else {
            return Ok(Submission::Skipped);
        };

        // Hash check before anything leaves the building. A mismatch means
        // the content changed after signing; the record is parked for
        // manual review, no attempt is counted.
        let current_hash = hash::canonical_hash(record);
        if record.record_hash.as_deref() != Some(current_hash.as_str()) {
            error!(record_id, "record content does not match its signed hash");
            let reason = format!("{QUARANTINE_PREFIX}: content differs from signed hash");
            self.repo.quarantine_record(record_id, &reason).await?;
            self.audit.record(
                AuditEntry::new(now, "sync_submit", "flight_record", record_id)
                    .hash(current_hash)
                    .failed(reason),
            );
            self.notifier
                .notify(
                    RecipientGroup::RegulatorLiaison,
                    Severity::Critical,
                    "record quarantined before submission",
                    &format!("record {record_id} no longer matches its signed hash"),
                )
                .await?;
            return Ok(Submission::Quarantined);
        }

        if !self.repo.claim_for_sync(record_id, now).await? {
            debug!(record_id, "record claimed elsewhere, skipping");
            return Ok(Submission::Skipped);
        }

        let outcome = tokio::time::timeout(self.submit_timeout, self.regulator.submit(record)).await;
        let finished_at = self.clock.now();

        match outcome {
            Ok(Ok(outcome)) if outcome.accepted => {
                self.repo.mark_synced(record_id, finished_at).await?;
                self.audit.record(
                    AuditEntry::new(finished_at, "sync_submit", "flight_record", record_id)
                        .hash(current_hash),
                );
                info!(
                    record_id,
                    external_id = outcome.external_id.as_deref().unwrap_or(""),
                    "record accepted by regulator"
                );
                Ok(Submission::Accepted)
            }
            Ok(Ok(outcome)) => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "rejected without a reason".to_string());
                warn!(record_id, reason, "record rejected by regulator");
                self.repo
                    .record_sync_failure(record_id, &reason, finished_at)
                    .await?;
                self.audit.record(
                    AuditEntry::new(finished_at, "sync_submit", "flight_record", record_id)
                        .failed(reason),
                );
                Ok(Submission::Rejected)
            }
            Ok(Err(e)) => {
                warn!(record_id, error = %e, "submission failed at transport level");
                let message = e.to_string();
                self.repo
                    .record_sync_failure(record_id, &message, finished_at)
                    .await?;
                self.audit.record(
                    AuditEntry::new(finished_at, "sync_submit", "flight_record", record_id)
                        .failed(message),
                );
                Ok(Submission::TransportFailure)
            }
            Err(_) => {
                let message = format!(
                    "submission timed out after {}s",
                    self.submit_timeout.as_secs()
                );
                warn!(record_id, message, "submission timed out");
                self.repo
                    .record_sync_failure(record_id, &message, finished_at)
                    .await?;
                self.audit.record(
                    AuditEntry::new(finished_at, "sync_submit", "flight_record", record_id)
                        .failed(message),
                );
                Ok(Submission::TransportFailure)
            }
        }
    }
}

enum Submission {
    Accepted,
    Rejected,
    TransportFailure,
    Quarantined,
    Skipped,
}

/// Scheduler adapter for the periodic sync run.
#[derive(Debug)]
pub struct SyncJob(pub Arc<RegulatorSync>);

#[async_trait::async_trait]
impl Job for SyncJob {
    fn name(&self) -> &'static str {
        "regulator-sync"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.sync_pending(ctx).await.map(|_| ())
    }
}

/// Scheduler adapter for the daily reprocessing pass.
#[derive(Debug)]
pub struct ReprocessJob(pub Arc<RegulatorSync>);

#[async_trait::async_trait]
impl Job for ReprocessJob {
    fn name(&self) -> &'static str {
        "sync-reprocess"
    }

    async fn run(&self, ctx: &RunContext) -> Result<()> {
        self.0.reprocess_failures(ctx).await.map(|_| ())
    }
}

/// Scheduler adapter for the connectivity probe.
#[derive(Debug)]
pub struct ProbeJob(pub Arc<RegulatorSync>);

#[async_trait::async_trait]
impl Job for ProbeJob {
    fn name(&self) -> &'static str {
        "connectivity-probe"
    }

    async fn run(&self, _ctx: &RunContext) -> Result<()> {
        self.0.probe_connectivity().await.map(|_| ())
    }
}
