//! Scriptable in-memory regulator double.
//!
//! Tests and dry runs queue responses ahead of time and inspect the
//! submissions afterwards. With an empty queue every submission is
//! accepted, which is also the behavior of the `memory` adapter mode.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use super::{ConnectivityStatus, RegulatorClient, SyncOutcome};
use crate::error::{Error, Result};
use crate::record::FlightRecord;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Accept the submission.
    Accept,
    /// Complete the exchange with a rejection.
    Reject(String),
    /// Fail at the transport level; retried by the sync job.
    Unavailable(String),
}

#[derive(Debug, Default)]
struct State {
    responses: VecDeque<ScriptedResponse>,
    submissions: Vec<i64>,
    reachable: bool,
}

/// In-memory regulator recording submissions and replaying queued outcomes.
#[derive(Debug, Clone)]
pub struct ScriptedRegulator {
    state: Arc<Mutex<State>>,
}

impl Default for ScriptedRegulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRegulator {
    /// Create a regulator that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                reachable: true,
                ..State::default()
            })),
        }
    }

    /// Queue the next response.
    pub fn push(&self, response: ScriptedResponse) {
        self.state.lock().responses.push_back(response);
    }

    /// Queue `count` transport failures.
    pub fn push_unavailable(&self, count: usize, message: &str) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state
                .responses
                .push_back(ScriptedResponse::Unavailable(message.to_string()));
        }
    }

    /// Toggle what the connectivity probe reports.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Record ids submitted so far, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<i64> {
        self.state.lock().submissions.clone()
    }
}

#[async_trait]
impl RegulatorClient for ScriptedRegulator {
    async fn submit(&self, record: &FlightRecord) -> Result<SyncOutcome> {
        let record_id = record
            .id
            .ok_or_else(|| Error::internal("cannot submit a record without an id"))?;

        let response = {
            let mut state = self.state.lock();
            state.submissions.push(record_id);
            state
                .responses
                .pop_front()
                .unwrap_or(ScriptedResponse::Accept)
        };

        match response {
            ScriptedResponse::Accept => {
                Ok(SyncOutcome::accepted(Uuid::new_v4().to_string(), Utc::now()))
            }
            ScriptedResponse::Reject(reason) => Ok(SyncOutcome::rejected(reason, Utc::now())),
            ScriptedResponse::Unavailable(message) => Err(Error::external_unavailable(message)),
        }
    }

    async fn check_connectivity(&self) -> Result<ConnectivityStatus> {
        let reachable = self.state.lock().reachable;
        Ok(ConnectivityStatus {
            reachable,
            last_seen: reachable.then(Utc::now),
            error: (!reachable).then(|| "scripted outage".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record(id: i64) -> FlightRecord {
        let mut record = FlightRecord::draft(
            1,
            "pilot-01",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        record.id = Some(id);
        record
    }

    #[tokio::test]
    async fn test_accepts_by_default_and_records_submissions() {
        let regulator = ScriptedRegulator::new();

        let outcome = regulator.submit(&sample_record(1)).await.unwrap();
        assert!(outcome.accepted);
        assert!(outcome.external_id.is_some());

        regulator.submit(&sample_record(2)).await.unwrap();
        assert_eq!(regulator.submissions(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_replays_queued_responses_in_order() {
        let regulator = ScriptedRegulator::new();
        regulator.push(ScriptedResponse::Reject("bad fuel unit".to_string()));
        regulator.push_unavailable(1, "connection refused");

        let rejected = regulator.submit(&sample_record(1)).await.unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.error.as_deref(), Some("bad fuel unit"));

        let err = regulator.submit(&sample_record(1)).await.unwrap_err();
        assert!(err.is_retryable());

        // Queue drained; back to accepting.
        assert!(regulator.submit(&sample_record(1)).await.unwrap().accepted);
    }

    #[tokio::test]
    async fn test_connectivity_follows_toggle() {
        let regulator = ScriptedRegulator::new();
        assert!(regulator.check_connectivity().await.unwrap().reachable);

        regulator.set_reachable(false);
        let status = regulator.check_connectivity().await.unwrap();
        assert!(!status.reachable);
        assert!(status.error.is_some());
    }
}
