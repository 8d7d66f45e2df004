//! S3-compatible [`BlobStore`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::{validate_name, BlobStore, StorageError};

/// Where blobs live in the bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Key prefix; blobs are stored as `<root_dir>/<name>`.
    pub root_dir: String,
    /// Custom endpoint for S3-compatible providers.
    pub endpoint_url: Option<String>,
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    root_dir: String,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS configuration (env, profile).
    pub async fn from_env(config: S3Config) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        tracing::info!(
            bucket = %config.bucket,
            root_dir = %config.root_dir,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            "S3 blob store ready",
        );
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket,
            root_dir: config.root_dir.trim_matches('/').to_string(),
        }
    }

    fn key_for(&self, name: &str) -> Result<String, StorageError> {
        validate_name(name)?;
        Ok(object_key(&self.root_dir, name))
    }
}

/// `<root_dir>/<name>`, or just `<name>` with an empty prefix.
fn object_key(root_dir: &str, name: &str) -> String {
    if root_dir.is_empty() {
        name.to_string()
    } else {
        format!("{root_dir}/{name}")
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        let key = self.key_for(name)?;
        let len = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("audio/wav")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        tracing::debug!(key = %key, bytes = len, "Uploaded blob");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = self.key_for(name)?;
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => return Err(StorageError::S3(e.to_string())),
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        Ok(Some(data.into_bytes().to_vec()))
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let key = self.key_for(name)?;
        let exists = match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => false,
            Err(e) => return Err(StorageError::S3(e.to_string())),
        };
        if !exists {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::S3(e.to_string()))?;
        tracing::debug!(key = %key, "Deleted blob");
        Ok(true)
    }
}
