// collection-backup/src/backup/s3_upload.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::error::DisplayErrorContext;
use s3::operation::head_object::HeadObjectError;
use s3::primitives::ByteStream;

use crate::config::{AwsSettings, StorageConfig};
use crate::errors::{BackupError, Result};

/// Identifies where an uploaded object landed.
pub type LocationId = String;

/// Write-once object store scoped to a single bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata probe. `Ok(false)` means the key is definitely absent.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Writes a zero-length marker object at `key`.
    async fn put_empty(&self, key: &str) -> Result<()>;

    async fn put_blob(&self, key: &str, body: Vec<u8>) -> Result<LocationId>;
}

/// Loads the shared AWS SDK configuration. Static credentials are used when
/// both halves of the key pair are configured, otherwise the default
/// provider chain applies.
pub async fn load_sdk_config(aws: &AwsSettings, endpoint_url: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &aws.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(endpoint) = endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }
    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            None, // session_token
            None, // expiry
            "Static", // provider_name
        ));
    }
    loader.load().await
}

/// S3-compatible bucket (AWS S3, DigitalOcean Spaces, MinIO).
pub struct S3Store {
    client: s3::Client,
    bucket: String,
}

impl S3Store {
    pub async fn connect(aws: &AwsSettings, storage: &StorageConfig) -> Self {
        let sdk_config = load_sdk_config(aws, storage.endpoint_url.as_deref()).await;
        let mut builder = s3::config::Builder::from(&sdk_config);
        if storage.endpoint_url.is_some() {
            // custom endpoints rarely support virtual-hosted buckets
            builder = builder.force_path_style(true);
        }
        tracing::info!(
            bucket = %storage.bucket_name,
            endpoint = storage.endpoint_url.as_deref().unwrap_or("aws"),
            "Object store client ready"
        );
        S3Store {
            client: s3::Client::from_conf(builder.build()),
            bucket: storage.bucket_name.clone(),
        }
    }

    fn location_of(&self, key: &str) -> LocationId {
        format!("s3://{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn exists(&self, key: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(HeadObjectError::is_not_found) {
                    return Ok(false);
                }
                Err(BackupError::store(key, DisplayErrorContext(&err)))
            }
        }
    }

    async fn put_empty(&self, key: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|err| BackupError::store(key, DisplayErrorContext(&err)))?;
        Ok(())
    }

    async fn put_blob(&self, key: &str, body: Vec<u8>) -> Result<LocationId> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| BackupError::store(key, DisplayErrorContext(&err)))?;
        Ok(self.location_of(key))
    }
}
