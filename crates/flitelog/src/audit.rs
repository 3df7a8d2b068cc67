//! Audit trail for compliance operations.
//!
//! Every signing, sync, and escalation outcome is recorded as a structured
//! [`AuditEntry`]. Entries carry enough state to replay validation (actor,
//! signature flags, resulting hash) but never the full record content, to
//! bound log size.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Before/after snapshot of a record's signature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFlags {
    /// Whether the pilot signature was present.
    pub pilot_signed: bool,
    /// Whether the operator signature was present.
    pub operator_signed: bool,
}

/// A single audited operation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation finished.
    pub at: DateTime<Utc>,
    /// Operation name, e.g. `sign_as_pilot` or `sync_submit`.
    pub operation: String,
    /// Entity kind the operation acted on.
    pub entity_type: String,
    /// Identifier of the affected entity.
    pub entity_id: i64,
    /// Acting party, when the operation has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Signature flags before the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<SignatureFlags>,
    /// Signature flags after the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<SignatureFlags>,
    /// Content hash produced or checked by the operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Failure description for rejected operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEntry {
    /// Start building a successful entry for an operation on an entity.
    #[must_use]
    pub fn new(
        at: DateTime<Utc>,
        operation: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: i64,
    ) -> Self {
        Self {
            at,
            operation: operation.into(),
            entity_type: entity_type.into(),
            entity_id,
            actor_id: None,
            before: None,
            after: None,
            content_hash: None,
            success: true,
            error: None,
        }
    }

    /// Attach the acting party.
    #[must_use]
    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Attach before/after signature flags.
    #[must_use]
    pub fn flags(mut self, before: SignatureFlags, after: SignatureFlags) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }

    /// Attach the content hash involved in the operation.
    #[must_use]
    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Mark the entry as a failure with a reason.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Destination for audit entries.
///
/// Sinks must never fail the audited operation: recording is best-effort
/// and write errors are swallowed after logging.
pub trait AuditSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: AuditEntry);
}

/// Sink emitting entries as structured `tracing` events under the `audit`
/// target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        let json = serde_json::to_string(&entry)
            .unwrap_or_else(|_| "{\"operation\":\"serialize_failed\"}".to_string());
        info!(target: "audit", "{json}");
    }
}

/// Sink appending entries as JSON lines to a file.
#[derive(Debug)]
pub struct JsonFileAuditSink {
    file: Mutex<std::fs::File>,
}

impl JsonFileAuditSink {
    /// Open (or create) the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonFileAuditSink {
    fn record(&self, entry: AuditEntry) {
        use std::io::Write;

        let Ok(json) = serde_json::to_string(&entry) else {
            return;
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{json}") {
            tracing::warn!(error = %e, "failed to append audit entry");
        }
    }
}

/// In-memory sink used by tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Entries recorded for a given operation name.
    #[must_use]
    pub fn entries_for(&self, operation: &str) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.operation == operation)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}

/// Fan-out wrapper writing each entry to several sinks.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    /// Create a fan-out over the given sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl std::fmt::Debug for FanoutAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutAuditSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, entry: AuditEntry) {
        for sink in &self.sinks {
            sink.record(entry.clone());
        }
    }
}
