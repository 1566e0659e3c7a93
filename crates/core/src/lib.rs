pub mod artifact;
pub mod run;

pub use artifact::{ArtifactName, DEFAULT_KEY_PREFIX};
pub use run::{BackupRun, FailedStage, RunStatus};
