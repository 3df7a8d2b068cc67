//! Notification capability.
//!
//! The core only needs "send a message to a recipient group"; actual
//! delivery (email, push) lives behind this trait in an adapter. The
//! log-backed implementation is the default for unattended deployments
//! without a delivery channel configured.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Result;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "group")]
pub enum RecipientGroup {
    /// The operator personnel responsible for one aircraft.
    AircraftOperators {
        /// The aircraft whose operators are addressed.
        aircraft_id: i64,
    },
    /// The staff handling regulator correspondence.
    RegulatorLiaison,
}

impl std::fmt::Display for RecipientGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AircraftOperators { aircraft_id } => {
                write!(f, "aircraft-operators/{aircraft_id}")
            }
            Self::RegulatorLiaison => f.write_str("regulator-liaison"),
        }
    }
}

/// How urgent a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine reminder, e.g. a near-deadline notice.
    Routine,
    /// Requires attention soon, e.g. an overdue record.
    Elevated,
    /// Systemic problem requiring immediate attention.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Routine => "routine",
            Self::Elevated => "elevated",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Delivery capability for notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send one message to a recipient group.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery channel fails; callers treat this
    /// as transient and rely on the next sweep re-sending.
    async fn notify(
        &self,
        group: RecipientGroup,
        severity: Severity,
        subject: &str,
        body: &str,
    ) -> Result<()>;
}

/// Notifier that writes messages to the log at a severity-matched level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        group: RecipientGroup,
        severity: Severity,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        match severity {
            Severity::Routine => info!(%group, subject, body, "notification"),
            Severity::Elevated => warn!(%group, subject, body, "notification"),
            Severity::Critical => error!(%group, subject, body, "notification"),
        }
        Ok(())
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    /// Addressed group.
    pub group: RecipientGroup,
    /// Urgency.
    pub severity: Severity,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
}

/// In-memory notifier used by tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
}

impl RecordingNotifier {
    /// Create an empty recording notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    /// Messages sent to one group.
    #[must_use]
    pub fn sent_to(&self, group: RecipientGroup) -> Vec<SentNotification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.group == group)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        group: RecipientGroup,
        severity: Severity,
        subject: &str,
        body: &str,
    ) -> Result<()> {
        self.sent.lock().push(SentNotification {
            group,
            severity,
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
