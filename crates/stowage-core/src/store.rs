use std::sync::Arc;

use async_trait::async_trait;

use crate::bucket::Bucket;
use crate::error::{ErrorKind, StoreError, StoreResult};

/// Top-level handle to an object storage service.
///
/// All implementations must satisfy these invariants:
/// - A bucket name identifies one container from creation until deletion.
/// - Only empty buckets can be deleted.
/// - Listing is safe concurrently with creation and deletion.
/// - All failures are returned to the caller with bucket context, never
///   silently recovered.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create an empty bucket.
    ///
    /// Fails with [`ErrorKind::BucketAlreadyExists`] if the name is in use;
    /// the existing bucket is left untouched.
    async fn create_bucket(&self, name: &str) -> StoreResult<()>;

    /// Delete an empty bucket.
    ///
    /// Fails with [`ErrorKind::BucketNotFound`] if absent and with
    /// [`ErrorKind::BucketNotEmpty`] if it still holds objects.
    async fn delete_bucket(&self, name: &str) -> StoreResult<()>;

    /// List every bucket visible to the caller.
    ///
    /// Callers must not rely on the order.
    async fn list_buckets(&self) -> StoreResult<Vec<Arc<dyn Bucket>>>;

    /// Look up a single bucket by name.
    ///
    /// Default implementation scans `list_buckets()`. Backends may override
    /// with a direct lookup.
    async fn bucket(&self, name: &str) -> StoreResult<Arc<dyn Bucket>> {
        self.list_buckets()
            .await?
            .into_iter()
            .find(|bucket| bucket.name() == name)
            .ok_or_else(|| StoreError::bucket(name, ErrorKind::BucketNotFound))
    }
}
