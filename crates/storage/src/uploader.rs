use crate::UploadError;

/// Moves a staged artifact's bytes to remote object storage.
///
/// Implementations make exactly one attempt; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Stores `bytes` under `remote_key` and returns a location descriptor for logging.
    async fn upload(&self, bytes: Vec<u8>, remote_key: &str) -> Result<String, UploadError>;
}
