//! Document content storage.
//!
//! Contents live in an object store bucket keyed by document filename;
//! metadata lives in the backing store and the cache.

use std::sync::Arc;

use astral_api::ApiError;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use thiserror::Error;
use tracing::debug;

use crate::config::{BlobBackend, BlobConfig};

/// Errors from blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object store error: {0}")]
    Store(object_store::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<object_store::Error> for BlobError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::Store(other),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => ApiError::not_found("File doesn't exist"),
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Client for the document content bucket.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl BlobStorage {
    /// Build the store selected by `config.backend`.
    pub fn from_config(config: &BlobConfig) -> Result<Self, BlobError> {
        match config.backend {
            BlobBackend::S3 => Self::new_s3(config),
            BlobBackend::Memory => Ok(Self::in_memory(config.bucket.clone())),
        }
    }

    /// Connect to S3 or MinIO.
    pub fn new_s3(config: &BlobConfig) -> Result<Self, BlobError> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| BlobError::Config(format!("blob.{key} is required")))
        };

        let mut builder = AmazonS3Builder::new()
            .with_endpoint(required(&config.endpoint, "endpoint")?)
            .with_access_key_id(required(&config.access_key, "access_key")?)
            .with_secret_access_key(required(&config.secret_key, "secret_key")?)
            .with_bucket_name(&config.bucket)
            .with_region(config.region.as_deref().unwrap_or("us-east-1"));

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| BlobError::Config(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Process-local bucket, emptied on restart.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::new_from_store(Arc::new(InMemory::new()), bucket)
    }

    pub fn new_from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn put(&self, filename: &str, data: Bytes) -> Result<(), BlobError> {
        let size = data.len();
        self.store
            .put(&Path::from(filename), PutPayload::from(data))
            .await?;
        debug!(bucket = %self.bucket, filename, size, "stored blob");
        Ok(())
    }

    pub async fn get(&self, filename: &str) -> Result<Bytes, BlobError> {
        let result = self.store.get(&Path::from(filename)).await?;
        Ok(result.bytes().await?)
    }

    /// Remove a blob. Removing an absent blob succeeds.
    pub async fn delete(&self, filename: &str) -> Result<(), BlobError> {
        match self.store.delete(&Path::from(filename)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!(bucket = %self.bucket, filename, "deleted blob");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
