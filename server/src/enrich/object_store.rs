//! Object-store interface (spec §6.4, §9): put-object with mime, and
//! pre-sign-GET with an expiry. No further store semantics are assumed.
//! Client setup follows the teacher's `blob_storage.rs` (S3-compatible
//! endpoint, explicit credentials, `behavior_version_latest`).

use std::time::Duration;

use anyhow::{Context, Result};
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("IMG_BUCKET_ENDPOINT").unwrap_or_default(),
            bucket: std::env::var("IMG_BUCKET").unwrap_or_else(|_| "relay-media".to_string()),
            access_key_id: std::env::var("IMG_BUCKET_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("IMG_BUCKET_SECRET_ACCESS_KEY").unwrap_or_default(),
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        }
    }
}

pub struct ObjectStore {
    client: S3Client,
    bucket: String,
}

impl ObjectStore {
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "relay-object-store",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .behavior_version_latest();
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint);
        }

        Ok(Self {
            client: S3Client::from_conf(builder.build()),
            bucket: config.bucket,
        })
    }

    /// Uploads `data` under `key` with the given content type. Overwrites
    /// are idempotent because enricher keys are content-addressed by
    /// the upstream file id (spec §4.E, §5).
    pub async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .context("failed to upload object")?;
        Ok(())
    }

    /// Pre-signs a GET URL valid for `expiry` (spec §4.H `fetchmsg`:
    /// "pre-signs each file URL against the object store with a 24-hour
    /// expiry").
    pub async fn presign_get(&self, key: &str, expiry: Duration) -> Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(expiry)?)
            .await
            .context("failed to presign object URL")?;
        Ok(presigned.uri().to_string())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}
