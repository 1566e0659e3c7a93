use std::fmt;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use s3::config::{Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::{payload_digest, UploadError, Uploader};

/// Bucket and key layout for uploaded dumps. Fixed for the life of the process.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint (MinIO, Spaces); `None` means AWS.
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub key_prefix: String,
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RemoteTarget {
    /// URL-style descriptor of where `key` lives once uploaded.
    pub fn location(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Single-attempt `PutObject` uploader.
#[derive(Debug, Clone)]
pub struct S3Uploader {
    client: s3::Client,
    target: RemoteTarget,
    timeout: Option<Duration>,
}

impl S3Uploader {
    /// Builds a client for `target`. Static credentials are used when both
    /// halves are configured, otherwise the SDK's default provider chain.
    pub async fn connect(target: RemoteTarget) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(target.region.clone()));
        if let Some(endpoint) = &target.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&target.access_key_id, &target.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "Static",
            ));
        }
        let sdk_config = loader.load().await;

        // custom endpoints rarely support virtual-hosted buckets
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(target.endpoint.is_some())
            .build();

        debug!(bucket = %target.bucket, region = %target.region, "s3 client ready");
        Self {
            client: s3::Client::from_conf(s3_config),
            target,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    async fn put_object(&self, bytes: Vec<u8>, remote_key: &str) -> Result<(), UploadError> {
        let size = bytes.len();
        let checksum = payload_digest(&bytes);
        let response = self
            .client
            .put_object()
            .bucket(&self.target.bucket)
            .key(remote_key)
            .content_type("application/sql")
            .metadata("sha256", &checksum)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| UploadError::Transport {
                bucket: self.target.bucket.clone(),
                key: remote_key.to_owned(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(
            key = remote_key,
            size,
            sha256 = %checksum,
            etag = response.e_tag().unwrap_or_default(),
            "put_object acknowledged"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl Uploader for S3Uploader {
    async fn upload(&self, bytes: Vec<u8>, remote_key: &str) -> Result<String, UploadError> {
        info!(
            bucket = %self.target.bucket,
            key = remote_key,
            size = bytes.len(),
            "uploading staged artifact"
        );
        let put = self.put_object(bytes, remote_key);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, put)
                .await
                .map_err(|_| UploadError::TimedOut {
                    key: remote_key.to_owned(),
                    limit,
                })??,
            None => put.await?,
        }
        Ok(self.target.location(remote_key))
    }
}
