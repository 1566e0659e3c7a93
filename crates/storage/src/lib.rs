mod artifact_store;
mod checksum;
mod error;
pub mod s3;
pub mod uploader;

pub use artifact_store::{ArtifactStore, Removal};
pub use checksum::payload_digest;
pub use error::{CleanupError, ReadError, UploadError};
pub use s3::{RemoteTarget, S3Uploader};
pub use uploader::Uploader;
