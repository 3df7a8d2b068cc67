//! File-exchange regulator adapter.
//!
//! Writes one JSON envelope per record into a drop directory that the
//! regulator's collector polls. The write goes to a temp file first and is
//! renamed into place, so the collector never sees a partial envelope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::{ConnectivityStatus, RegulatorClient, SyncOutcome};
use crate::error::{Error, Result};
use crate::record::FlightRecord;

/// The envelope written for each submitted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEnvelope {
    /// Correlation id for this submission.
    pub submission_id: String,
    /// When the envelope was written.
    pub submitted_at: DateTime<Utc>,
    /// The record being filed.
    pub record: FlightRecord,
}

/// Regulator adapter exchanging files through a drop directory.
#[derive(Debug)]
pub struct FileExchangeClient {
    drop_dir: PathBuf,
}

impl FileExchangeClient {
    /// Create the adapter, ensuring the drop directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(drop_dir: impl Into<PathBuf>) -> Result<Self> {
        let drop_dir = drop_dir.into();
        std::fs::create_dir_all(&drop_dir).map_err(|source| Error::DirectoryCreate {
            path: drop_dir.clone(),
            source,
        })?;
        Ok(Self { drop_dir })
    }

    /// The directory envelopes are written into.
    #[must_use]
    pub fn drop_dir(&self) -> &Path {
        &self.drop_dir
    }
}

#[async_trait]
impl RegulatorClient for FileExchangeClient {
    async fn submit(&self, record: &FlightRecord) -> Result<SyncOutcome> {
        let record_id = record
            .id
            .ok_or_else(|| Error::internal("cannot submit a record without an id"))?;

        let now = Utc::now();
        let submission_id = Uuid::new_v4().to_string();
        let envelope = SubmissionEnvelope {
            submission_id: submission_id.clone(),
            submitted_at: now,
            record: record.clone(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        let final_path = self.drop_dir.join(format!("record-{record_id}.json"));
        let tmp_path = self.drop_dir.join(format!(".record-{record_id}.tmp"));

        let write = || -> std::io::Result<()> {
            std::fs::write(&tmp_path, &json)?;
            std::fs::rename(&tmp_path, &final_path)
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&tmp_path);
            // Drop directory trouble is a transport fault, not a rejection.
            return Err(Error::external_unavailable(format!(
                "cannot write submission envelope: {e}"
            )));
        }

        debug!(record_id, %submission_id, path = %final_path.display(), "submission envelope written");
        Ok(SyncOutcome::accepted(submission_id, now))
    }

    async fn check_connectivity(&self) -> Result<ConnectivityStatus> {
        let probe = self.drop_dir.join(".connectivity-probe");
        let check = || -> std::io::Result<()> {
            std::fs::write(&probe, b"probe")?;
            std::fs::remove_file(&probe)
        };
        match check() {
            Ok(()) => Ok(ConnectivityStatus {
                reachable: true,
                last_seen: Some(Utc::now()),
                error: None,
            }),
            Err(e) => Ok(ConnectivityStatus {
                reachable: false,
                last_seen: None,
                error: Some(format!("drop directory not writable: {e}")),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlightRecord;
    use chrono::NaiveDate;

    fn temp_drop_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("flitelog_drop_{tag}_{}", std::process::id()))
    }

    fn sample_record(id: i64) -> FlightRecord {
        let mut record = FlightRecord::draft(
            1,
            "pilot-01",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        record.id = Some(id);
        record.sequence = 3;
        record.origin = "EDDF".to_string();
        record.destination = "LOWW".to_string();
        record
    }

    #[tokio::test]
    async fn test_submit_writes_envelope() {
        let dir = temp_drop_dir("submit");
        let client = FileExchangeClient::new(&dir).unwrap();

        let outcome = client.submit(&sample_record(7)).await.unwrap();
        assert!(outcome.accepted);
        let external_id = outcome.external_id.unwrap();

        let contents = std::fs::read_to_string(dir.join("record-7.json")).unwrap();
        let envelope: SubmissionEnvelope = serde_json::from_str(&contents).unwrap();
        assert_eq!(envelope.submission_id, external_id);
        assert_eq!(envelope.record.id, Some(7));
        assert_eq!(envelope.record.origin, "EDDF");

        // No temp file left behind.
        assert!(!dir.join(".record-7.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_submit_without_id_is_internal_error() {
        let dir = temp_drop_dir("noid");
        let client = FileExchangeClient::new(&dir).unwrap();

        let mut record = sample_record(1);
        record.id = None;
        assert!(client.submit(&record).await.is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_connectivity_ok_on_writable_dir() {
        let dir = temp_drop_dir("conn");
        let client = FileExchangeClient::new(&dir).unwrap();

        let status = client.check_connectivity().await.unwrap();
        assert!(status.reachable);
        assert!(status.last_seen.is_some());
        assert!(!dir.join(".connectivity-probe").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_connectivity_fails_on_missing_dir() {
        let dir = temp_drop_dir("gone");
        let client = FileExchangeClient::new(&dir).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let status = client.check_connectivity().await.unwrap();
        assert!(!status.reachable);
        assert!(status.error.is_some());
    }
}
