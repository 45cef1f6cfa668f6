//! Backing Object Store
//!
//! Durable source of truth for every cache key. Reads are only issued by the
//! cache-miss loader; writes come straight from the PUT handler.

pub mod error;
pub mod object;

pub use error::{StoreError, StoreResult};
pub use object::ObjectBlobStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Request body handed to the store chunk by chunk
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Object Store Client contract
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the whole object stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Store `body` under `key`, replacing any previous object.
    async fn put(&self, key: &str, body: ByteStream) -> StoreResult<()>;
}
