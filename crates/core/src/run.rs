use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactName;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Dump,
    Read,
    Upload,
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailedStage::Dump => "dump",
            FailedStage::Read => "read",
            FailedStage::Upload => "upload",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunStatus {
    Pending,
    Dumping,
    Dumped,
    Reading,
    Read,
    Uploading,
    Uploaded,
    Cleaning,
    Cleaned,
    Failed { stage: FailedStage, error: String },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Cleaned | RunStatus::Failed { .. })
    }
}

/// One execution of dump, upload and cleanup.
///
/// Lives only in memory for the duration of the run; nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRun {
    pub id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub local_path: PathBuf,
    pub remote_key: String,
    pub status: RunStatus,
    /// Location descriptor returned by the uploader on success.
    pub location: Option<String>,
    pub size_bytes: Option<u64>,
    pub content_hash: Option<String>,
    /// Non-fatal: never changes the run's outcome.
    pub cleanup_error: Option<String>,
}

impl BackupRun {
    pub fn new(triggered_at: DateTime<Utc>, artifact: ArtifactName) -> Self {
        Self {
            id: Uuid::new_v4(),
            triggered_at,
            local_path: artifact.local_path,
            remote_key: artifact.remote_key,
            status: RunStatus::Pending,
            location: None,
            size_bytes: None,
            content_hash: None,
            cleanup_error: None,
        }
    }

    pub fn advance(&mut self, status: RunStatus) {
        debug_assert!(!self.status.is_terminal(), "run already finished");
        self.status = status;
    }

    pub fn fail(&mut self, stage: FailedStage, error: impl fmt::Display) {
        self.advance(RunStatus::Failed {
            stage,
            error: error.to_string(),
        });
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Cleaned
    }

    pub fn failed_stage(&self) -> Option<FailedStage> {
        match &self.status {
            RunStatus::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sample_run() -> BackupRun {
        let now = Utc::now();
        BackupRun::new(now, ArtifactName::derive(Path::new("/tmp"), "backups/", now))
    }

    #[test]
    fn new_run_starts_pending_with_unique_id() {
        let a = sample_run();
        let b = sample_run();
        assert_eq!(a.status, RunStatus::Pending);
        assert_ne!(a.id, b.id);
        assert!(!a.succeeded());
    }

    #[test]
    fn failure_records_stage_and_message() {
        let mut run = sample_run();
        run.advance(RunStatus::Dumping);
        run.fail(FailedStage::Dump, "pg_dump exited with status 1");
        assert!(run.status.is_terminal());
        assert_eq!(run.failed_stage(), Some(FailedStage::Dump));
        match &run.status {
            RunStatus::Failed { error, .. } => assert!(error.contains("status 1")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let json = serde_json::to_string(&RunStatus::Failed {
            stage: FailedStage::Upload,
            error: "timeout".into(),
        })
        .expect("serialize");
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("\"stage\":\"upload\""));
    }
}
