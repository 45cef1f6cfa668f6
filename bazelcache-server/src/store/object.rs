//! Object store implementation of BlobStore.
//!
//! Supports S3 and S3-compatibles (MinIO, R2), the local filesystem, and an
//! in-memory store for tests via the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use object_store::ObjectStore;
use object_store::buffered::BufWriter;
use object_store::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{BlobStore, ByteStream, StoreError, StoreResult};
use crate::config::{StoreBackend, StoreConfig};

/// Blob store backed by `object_store`.
pub struct ObjectBlobStore {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectBlobStore {
    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        let inner: Arc<dyn ObjectStore> = match config.backend {
            StoreBackend::Memory => Arc::new(object_store::memory::InMemory::new()),
            StoreBackend::File => {
                std::fs::create_dir_all(&config.bucket).map_err(|e| {
                    StoreError::InvalidConfig(format!(
                        "failed to create store directory {}: {}",
                        config.bucket, e
                    ))
                })?;
                Arc::new(
                    object_store::local::LocalFileSystem::new_with_prefix(&config.bucket)
                        .map_err(|e| {
                            StoreError::InvalidConfig(format!(
                                "failed to open local store at {}: {}",
                                config.bucket, e
                            ))
                        })?,
                )
            }
            StoreBackend::S3 => {
                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket)
                    .with_region(&config.region)
                    .with_virtual_hosted_style_request(!config.path_style);

                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }

                Arc::new(builder.build().map_err(|e| {
                    StoreError::InvalidConfig(format!("failed to create S3 client: {}", e))
                })?)
            }
        };

        Ok(Self { inner })
    }

    /// Wrap an existing object store.
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Create an in-memory store for testing.
    pub fn memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let path = Path::from(key);
        let result = self
            .inner
            .get(&path)
            .await
            .map_err(|e| StoreError::from_object_store(e, key))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StoreError::from_object_store(e, key))?;
        debug!(key, size = bytes.len(), "fetched object");
        Ok(bytes)
    }

    async fn put(&self, key: &str, mut body: ByteStream) -> StoreResult<()> {
        let path = Path::from(key);
        let mut upload = Upload::new(BufWriter::new(Arc::clone(&self.inner), path), key);
        let mut written = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    upload.abort().await;
                    return Err(StoreError::Body(e));
                }
            };
            written += chunk.len();
            if let Err(e) = upload.write(&chunk).await {
                upload.abort().await;
                return Err(StoreError::Upload(e));
            }
        }

        upload.complete().await.map_err(StoreError::Upload)?;

        debug!(key, size = written, "stored object");
        Ok(())
    }
}

/// In-progress upload for one key.
///
/// Dropped before [`Upload::complete`] (request timeout, client gone) it
/// aborts the upload on a spawned task, so no multipart parts are left
/// behind in the bucket.
struct Upload {
    writer: Option<BufWriter>,
    key: String,
}

impl Upload {
    fn new(writer: BufWriter, key: &str) -> Self {
        Self {
            writer: Some(writer),
            key: key.to_string(),
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(chunk).await,
            None => Err(std::io::Error::other("upload already finished")),
        }
    }

    /// Drop whatever was buffered or uploaded so far.
    async fn abort(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            abort_writer(&mut writer, &self.key).await;
        }
    }

    /// Flush the remaining bytes and finish the upload.
    ///
    /// The writer is released before shutting down: once shutdown starts
    /// the upload belongs to the completing request and cannot be aborted.
    async fn complete(mut self) -> std::io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(key = %key, "upload interrupted, aborting");
                handle.spawn(async move { abort_writer(&mut writer, &key).await });
            }
            Err(_) => warn!(key = %key, "upload interrupted outside a runtime, not aborted"),
        }
    }
}

async fn abort_writer(writer: &mut BufWriter, key: &str) {
    if let Err(e) = writer.abort().await {
        warn!(key, error = %e, "failed to abort upload");
    }
}
