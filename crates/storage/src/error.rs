use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("read staged artifact {}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ReadError {
    /// The staged file is gone, so there is nothing left to clean up.
    pub fn is_missing(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

#[derive(Debug, Error)]
#[error("remove staged artifact {}", .path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {key} to bucket {bucket} failed: {message}")]
    Transport {
        bucket: String,
        key: String,
        message: String,
    },
    #[error("upload of {key} did not finish within {limit:?}")]
    TimedOut { key: String, limit: Duration },
}
