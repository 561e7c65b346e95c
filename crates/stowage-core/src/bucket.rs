//! The [`Bucket`] trait: a named container of objects.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, StoreResult};
use crate::object::{BatchUpload, ObjectHeader, ObjectReader, ObjectSource, Owner, PutOptions};
use crate::page::{Listing, Page};

/// A named container of objects within an [`ObjectStore`](crate::ObjectStore).
///
/// Implementations must be thread-safe and tolerate concurrent calls on the
/// same handle. There are no cross-call transactions: a `head` followed by a
/// `get` may observe a deletion or replacement in between.
///
/// Failures carry object context (`object "key" in bucket "name": ...`)
/// and unwrap to the semantic [`ErrorKind`].
#[async_trait]
pub trait Bucket: Send + Sync + fmt::Debug {
    /// Name of the bucket, unique within its store.
    fn name(&self) -> &str;

    fn creation_time(&self) -> DateTime<Utc>;

    fn owner(&self) -> Option<&Owner>;

    /// List one page of objects whose key starts with `prefix`.
    ///
    /// A non-empty `delimiter` collapses keys sharing a segment after the
    /// prefix into a single virtual-directory entry. Pass `""` as `token` for
    /// the first page and the previous page's
    /// [`next_page`](Page::next_page) afterwards.
    async fn object_page(&self, prefix: &str, delimiter: &str, token: &str) -> StoreResult<Page>;

    /// Fetch an object's metadata without transferring its content.
    async fn head(&self, key: &str) -> StoreResult<ObjectHeader>;

    /// Open an object's content as it is at the moment the call resolves.
    async fn get(&self, key: &str) -> StoreResult<ObjectReader>;

    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: &mut dyn ObjectSource) -> StoreResult<()> {
        self.put_with(key, data, &PutOptions::default()).await
    }

    /// Write `data` under `key` with explicit header fields.
    async fn put_with(
        &self,
        key: &str,
        data: &mut dyn ObjectSource,
        options: &PutOptions,
    ) -> StoreResult<()>;

    /// Remove the object under `key`.
    ///
    /// Deleting a missing key fails with [`ErrorKind::ObjectNotFound`].
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Upload every item of `items`, returning the number written.
    ///
    /// Default implementation calls `put_with()` for each item and stops at
    /// the first failure. Backends may override with a bulk transport.
    async fn put_batch(
        &self,
        items: &mut (dyn Iterator<Item = BatchUpload> + Send),
    ) -> StoreResult<usize> {
        let mut written = 0;
        for mut item in items {
            self.put_with(&item.key, item.data.as_mut(), &item.options)
                .await?;
            written += 1;
        }
        Ok(written)
    }

    /// Returns `true` if an object exists under `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(err) if err.is(ErrorKind::ObjectNotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Follow continuation tokens until the last page and collect everything.
    async fn list_all(&self, prefix: &str, delimiter: &str) -> StoreResult<Listing> {
        let mut listing = Listing::default();
        let mut token = String::new();
        loop {
            let page = self.object_page(prefix, delimiter, &token).await?;
            let next = page.next_page().to_string();
            listing.extend(page);
            if next.is_empty() {
                return Ok(listing);
            }
            token = next;
        }
    }
}
