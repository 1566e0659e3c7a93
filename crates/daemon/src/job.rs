use std::sync::Arc;

use chrono::{DateTime, Utc};
use pg_s3_backup_core::{ArtifactName, BackupRun, FailedStage, RunStatus};
use pg_s3_backup_dump::Dumper;
use pg_s3_backup_storage::{payload_digest, ArtifactStore, Removal, Uploader};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Runs dump, read, upload and cleanup for one trigger.
///
/// Every failure is terminal for its run and is reported through the returned
/// [`BackupRun`]; nothing propagates back to the scheduler.
#[derive(Clone)]
pub struct BackupJob {
    dumper: Arc<dyn Dumper>,
    uploader: Arc<dyn Uploader>,
    store: ArtifactStore,
    key_prefix: String,
}

impl BackupJob {
    pub fn new(
        dumper: Arc<dyn Dumper>,
        uploader: Arc<dyn Uploader>,
        store: ArtifactStore,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            dumper,
            uploader,
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub async fn trigger(&self) -> BackupRun {
        self.run(Utc::now()).await
    }

    pub async fn run(&self, triggered_at: DateTime<Utc>) -> BackupRun {
        let artifact = ArtifactName::derive(self.store.staging_dir(), &self.key_prefix, triggered_at);
        let mut run = BackupRun::new(triggered_at, artifact);
        let span = info_span!(
            "backup_run",
            run_id = %run.id,
            triggered_at = %triggered_at.to_rfc3339(),
        );
        self.execute(&mut run).instrument(span).await;
        run
    }

    async fn execute(&self, run: &mut BackupRun) {
        transition(run, RunStatus::Dumping);
        if let Err(e) = self.dumper.dump(&run.local_path).await {
            // a failed dump may still have left partial output behind
            self.cleanup(run).await;
            finish_failed(run, FailedStage::Dump, describe(e));
            return;
        }
        transition(run, RunStatus::Dumped);

        transition(run, RunStatus::Reading);
        let bytes = match self.store.read_all(&run.local_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if !e.is_missing() {
                    self.cleanup(run).await;
                }
                finish_failed(run, FailedStage::Read, describe(e));
                return;
            }
        };
        run.size_bytes = Some(bytes.len() as u64);
        run.content_hash = Some(payload_digest(&bytes));
        transition(run, RunStatus::Read);

        transition(run, RunStatus::Uploading);
        let uploaded = self.uploader.upload(bytes, &run.remote_key).await;
        if uploaded.is_ok() {
            transition(run, RunStatus::Uploaded);
        }

        transition(run, RunStatus::Cleaning);
        self.cleanup(run).await;

        match uploaded {
            Ok(location) => {
                run.location = Some(location);
                transition(run, RunStatus::Cleaned);
                info!(
                    remote_key = %run.remote_key,
                    location = run.location.as_deref().unwrap_or_default(),
                    size = run.size_bytes.unwrap_or_default(),
                    sha256 = run.content_hash.as_deref().unwrap_or_default(),
                    "backup uploaded"
                );
            }
            Err(e) => finish_failed(run, FailedStage::Upload, describe(e)),
        }
    }

    /// Best-effort; a cleanup failure never changes the run's outcome.
    async fn cleanup(&self, run: &mut BackupRun) {
        match self.store.remove(&run.local_path).await {
            Ok(Removal::Removed) => {}
            Ok(Removal::AlreadyAbsent) => {
                debug!(local_path = %run.local_path.display(), "staged artifact already gone")
            }
            Err(e) => {
                let message = describe(e);
                warn!(
                    local_path = %run.local_path.display(),
                    error = %message,
                    "failed to remove staged artifact"
                );
                run.cleanup_error = Some(message);
            }
        }
    }
}

fn transition(run: &mut BackupRun, status: RunStatus) {
    debug!(from = ?run.status, to = ?status, "run status");
    run.advance(status);
}

fn finish_failed(run: &mut BackupRun, stage: FailedStage, message: String) {
    error!(
        %stage,
        error = %message,
        local_path = %run.local_path.display(),
        remote_key = %run.remote_key,
        "backup run failed"
    );
    run.fail(stage, message);
}

fn describe<E>(err: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", anyhow::Error::new(err))
}
