//! The two-step signing protocol.
//!
//! [`SignatureService`] applies the pilot and operator signatures, enforces
//! actor eligibility and the tier deadline, and re-validates hash integrity
//! on demand. Every attempt, accepted or rejected, produces exactly one
//! audit entry. State transitions go through the repository's guarded
//! updates, so two workers racing on the same record resolve at the row
//! level and the loser reports a conflict.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditSink, SignatureFlags};
use crate::clock::Clock;
use crate::deadline::{self, DeadlineStatus};
use crate::error::{Error, Result};
use crate::hash::canonical_hash;
use crate::record::{FlightRecord, SignatureKind, SignatureRecord};
use crate::repository::RecordRepository;

/// Context of a signing request, passed through from the API layer.
#[derive(Debug, Clone)]
pub struct SigningContext {
    /// Identity of the signing actor.
    pub actor_id: String,
    /// Network origin of the request.
    pub origin_ip: String,
    /// Client software identification string.
    pub client_info: String,
}

impl SigningContext {
    /// Create a signing context.
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        origin_ip: impl Into<String>,
        client_info: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            origin_ip: origin_ip.into(),
            client_info: client_info.into(),
        }
    }
}

/// Orchestrates pilot and operator signatures over the repository.
pub struct SignatureService {
    repo: Arc<dyn RecordRepository>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SignatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureService").finish_non_exhaustive()
    }
}

impl SignatureService {
    /// Create a signature service over the given collaborators.
    #[must_use]
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, audit, clock }
    }

    /// Apply the pilot signature to a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, `Forbidden` if the
    /// actor is not the record's pilot-in-command, and `Conflict` if the
    /// record is cancelled or already pilot-signed.
    pub async fn sign_as_pilot(
        &self,
        record_id: i64,
        ctx: &SigningContext,
    ) -> Result<SignatureRecord> {
        let record = match self.repo.find_record(record_id).await? {
            Some(record) => record,
            None => {
                return Err(self.reject(
                    "sign_as_pilot",
                    record_id,
                    ctx,
                    Error::not_found("flight record", record_id),
                ));
            }
        };

        if let Err(e) = Self::check_pilot_preconditions(&record, ctx) {
            return Err(self.reject("sign_as_pilot", record_id, ctx, e));
        }

        let now = self.clock.now();
        let hash = canonical_hash(&record);

        if !self.repo.mark_pilot_signed(record_id, now, &hash).await? {
            // Lost the race to a concurrent signer.
            return Err(self.reject(
                "sign_as_pilot",
                record_id,
                ctx,
                Error::conflict("record already pilot-signed"),
            ));
        }

        let signature = self
            .repo
            .append_signature(&SignatureRecord::new(
                record_id,
                SignatureKind::Pilot,
                ctx.actor_id.clone(),
                now,
                hash.clone(),
                ctx.origin_ip.clone(),
                ctx.client_info.clone(),
            ))
            .await?;

        self.audit.record(
            AuditEntry::new(now, "sign_as_pilot", "flight_record", record_id)
                .actor(&ctx.actor_id)
                .flags(
                    flags_of(&record),
                    SignatureFlags {
                        pilot_signed: true,
                        operator_signed: false,
                    },
                )
                .hash(&hash),
        );
        info!(record_id, actor = %ctx.actor_id, "pilot signature applied");
        Ok(signature)
    }

    /// Apply the operator signature to a record.
    ///
    /// The content hash is recomputed over the current content, since the
    /// post-pilot field subset may have changed since the pilot signed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record does not exist, `Conflict` if the
    /// pilot step is missing or the operator already signed, and
    /// `DeadlineExceeded` when past the tier deadline. The deadline is a
    /// hard stop; overdue records are handled by the escalation sweep.
    pub async fn sign_as_operator(
        &self,
        record_id: i64,
        ctx: &SigningContext,
    ) -> Result<SignatureRecord> {
        let record = match self.repo.find_record(record_id).await? {
            Some(record) => record,
            None => {
                return Err(self.reject(
                    "sign_as_operator",
                    record_id,
                    ctx,
                    Error::not_found("flight record", record_id),
                ));
            }
        };

        if let Err(e) = Self::check_operator_preconditions(&record) {
            return Err(self.reject("sign_as_operator", record_id, ctx, e));
        }
        // Checked above: operator preconditions require a pilot signature.
        let pilot_signed_at = record
            .pilot_signed_at
            .ok_or_else(|| Error::internal("pilot-signed record without timestamp"))?;

        let aircraft = self
            .repo
            .find_aircraft(record.aircraft_id)
            .await?
            .ok_or(Error::not_found("aircraft", record.aircraft_id))?;

        let now = self.clock.now();
        if !deadline::within_deadline(pilot_signed_at, aircraft.class, now) {
            let overdue = deadline::overdue_days(Some(pilot_signed_at), aircraft.class, now);
            return Err(self.reject(
                "sign_as_operator",
                record_id,
                ctx,
                Error::DeadlineExceeded {
                    record_id,
                    overdue_days: overdue.max(1),
                },
            ));
        }

        let hash = canonical_hash(&record);
        if !self.repo.mark_operator_signed(record_id, now, &hash).await? {
            return Err(self.reject(
                "sign_as_operator",
                record_id,
                ctx,
                Error::conflict("record already operator-signed"),
            ));
        }

        let signature = self
            .repo
            .append_signature(&SignatureRecord::new(
                record_id,
                SignatureKind::Operator,
                ctx.actor_id.clone(),
                now,
                hash.clone(),
                ctx.origin_ip.clone(),
                ctx.client_info.clone(),
            ))
            .await?;

        self.audit.record(
            AuditEntry::new(now, "sign_as_operator", "flight_record", record_id)
                .actor(&ctx.actor_id)
                .flags(
                    flags_of(&record),
                    SignatureFlags {
                        pilot_signed: true,
                        operator_signed: true,
                    },
                )
                .hash(&hash),
        );
        info!(record_id, actor = %ctx.actor_id, "operator signature applied");
        Ok(signature)
    }

    /// Recompute the hash of a signature's record and compare it to the
    /// hash stored at signing time.
    ///
    /// Returns `true` only on exact match. A mismatch is audited as an
    /// integrity failure but never corrected here; callers decide whether
    /// to quarantine the record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the signature or its record does not exist.
    pub async fn validate_integrity(&self, signature_id: i64) -> Result<bool> {
        let signature = self
            .repo
            .find_signature(signature_id)
            .await?
            .ok_or(Error::not_found("signature", signature_id))?;
        let record = self
            .repo
            .find_record(signature.record_id)
            .await?
            .ok_or(Error::not_found("flight record", signature.record_id))?;

        let current = canonical_hash(&record);
        let matches = current == signature.content_hash;

        let entry = AuditEntry::new(
            self.clock.now(),
            "validate_integrity",
            "signature",
            signature_id,
        )
        .hash(&current);
        if matches {
            self.audit.record(entry);
        } else {
            warn!(
                record_id = signature.record_id,
                signature_id, "signature hash no longer matches record content"
            );
            self.audit.record(entry.failed(format!(
                "stored hash {} does not match current content",
                signature.content_hash
            )));
        }
        Ok(matches)
    }

    /// Deadline position of a record, for the API layer and CLI output.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record or its aircraft does not exist.
    pub async fn deadline_status(&self, record_id: i64) -> Result<DeadlineStatus> {
        let record = self
            .repo
            .find_record(record_id)
            .await?
            .ok_or(Error::not_found("flight record", record_id))?;
        let aircraft = self
            .repo
            .find_aircraft(record.aircraft_id)
            .await?
            .ok_or(Error::not_found("aircraft", record.aircraft_id))?;
        Ok(deadline::deadline_status(
            &record,
            aircraft.class,
            self.clock.now(),
        ))
    }

    fn check_pilot_preconditions(record: &FlightRecord, ctx: &SigningContext) -> Result<()> {
        if record.cancelled {
            return Err(Error::conflict("record is cancelled"));
        }
        if record.pilot_in_command != ctx.actor_id {
            return Err(Error::forbidden(format!(
                "only pilot-in-command {} may sign this record",
                record.pilot_in_command
            )));
        }
        if record.pilot_signed {
            return Err(Error::conflict("record already pilot-signed"));
        }
        Ok(())
    }

    fn check_operator_preconditions(record: &FlightRecord) -> Result<()> {
        if record.cancelled {
            return Err(Error::conflict("record is cancelled"));
        }
        if !record.pilot_signed {
            return Err(Error::conflict("record is not pilot-signed yet"));
        }
        if record.operator_signed {
            return Err(Error::conflict("record already operator-signed"));
        }
        Ok(())
    }

    /// Audit a rejected attempt and hand the error back to the caller.
    fn reject(&self, operation: &str, record_id: i64, ctx: &SigningContext, error: Error) -> Error {
        self.audit.record(
            AuditEntry::new(self.clock.now(), operation, "flight_record", record_id)
                .actor(&ctx.actor_id)
                .failed(error.to_string()),
        );
        error
    }
}

fn flags_of(record: &FlightRecord) -> SignatureFlags {
    SignatureFlags {
        pilot_signed: record.pilot_signed,
        operator_signed: record.operator_signed,
    }
}
