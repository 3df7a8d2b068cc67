//! Regulator submission capability.
//!
//! The regulator's wire protocol is pluggable; the core only depends on the
//! [`RegulatorClient`] contract. Two adapters ship behind it: a
//! file-exchange adapter writing one JSON envelope per record into a drop
//! directory, and a scriptable in-memory double for tests and dry runs.
//! The adapter is selected by configuration at startup.

mod file_exchange;
mod scripted;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, RegulatorMode};
use crate::error::Result;
use crate::record::FlightRecord;

pub use file_exchange::FileExchangeClient;
pub use scripted::{ScriptedRegulator, ScriptedResponse};

/// Outcome of one submission attempt.
///
/// Not persisted as its own entity; it is recorded into the audit log and
/// into the record's sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Whether the regulator accepted the record.
    pub accepted: bool,
    /// Correlation id assigned by the submission channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Rejection reason, when not accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt finished.
    pub attempted_at: DateTime<Utc>,
}

impl SyncOutcome {
    /// An accepted submission with its correlation id.
    #[must_use]
    pub fn accepted(external_id: impl Into<String>, attempted_at: DateTime<Utc>) -> Self {
        Self {
            accepted: true,
            external_id: Some(external_id.into()),
            error: None,
            attempted_at,
        }
    }

    /// A rejected submission with the regulator's reason.
    #[must_use]
    pub fn rejected(error: impl Into<String>, attempted_at: DateTime<Utc>) -> Self {
        Self {
            accepted: false,
            external_id: None,
            error: Some(error.into()),
            attempted_at,
        }
    }
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityStatus {
    /// Whether the regulator endpoint is reachable.
    pub reachable: bool,
    /// Last instant the endpoint was known reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Transport failure description, when unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Capability contract for the external regulator system.
///
/// `submit` returns `Ok` whenever the exchange completed, accepted or
/// rejected; transport-level failures (endpoint unreachable, I/O faults)
/// surface as `Err` and are retried by the sync job's backoff machinery.
#[async_trait]
pub trait RegulatorClient: Send + Sync {
    /// Submit one fully-signed record for official filing.
    async fn submit(&self, record: &FlightRecord) -> Result<SyncOutcome>;

    /// Verify the regulator endpoint is reachable.
    async fn check_connectivity(&self) -> Result<ConnectivityStatus>;
}

/// Build the configured regulator adapter.
///
/// # Errors
///
/// Returns an error if the file-exchange drop directory cannot be created.
pub fn from_config(config: &Config) -> Result<Arc<dyn RegulatorClient>> {
    match config.regulator.mode {
        RegulatorMode::FileExchange => Ok(Arc::new(FileExchangeClient::new(config.drop_dir())?)),
        RegulatorMode::Memory => Ok(Arc::new(ScriptedRegulator::new())),
    }
}
