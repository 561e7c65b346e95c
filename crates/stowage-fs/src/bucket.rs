use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stowage_core::keys::check_key;
use stowage_core::{
    plan_page, Bucket, ErrorKind, Object, ObjectHeader, ObjectReader, ObjectSource, Owner, Page,
    PageQuery, PutOptions, StoreError, StoreResult,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedRwLockReadGuard};
use uuid::Uuid;

use crate::config::FsStoreConfig;
use crate::layout::{io_error, json_error, read_error, BucketLayout, BucketRecord};
use crate::store::{read_record, StoreLocks};

const COPY_BUFFER: usize = 64 * 1024;

/// A bucket of an [`FsObjectStore`](crate::FsObjectStore).
///
/// The handle is bound to one incarnation of the bucket: once the bucket is
/// deleted, even if a bucket of the same name is created later, every
/// operation fails with [`ErrorKind::BucketNotFound`].
pub struct FsBucket {
    record: BucketRecord,
    layout: BucketLayout,
    max_keys: usize,
    sync_data: bool,
    locks: Arc<StoreLocks>,
    writer: Arc<Mutex<()>>,
}

impl FsBucket {
    pub(crate) fn new(
        record: BucketRecord,
        layout: BucketLayout,
        config: &FsStoreConfig,
        locks: Arc<StoreLocks>,
    ) -> Self {
        let writer = locks.writer(&record.name);
        Self {
            record,
            layout,
            max_keys: config.max_keys.max(1),
            sync_data: config.sync_data,
            locks,
            writer,
        }
    }

    /// Directory holding this bucket.
    pub fn path(&self) -> &Path {
        self.layout.dir()
    }

    fn name_ref(&self) -> &str {
        &self.record.name
    }

    fn wrap(&self, err: impl Into<StoreError>) -> StoreError {
        StoreError::bucket(self.name_ref(), err)
    }

    fn wrap_object(&self, key: &str, err: impl Into<StoreError>) -> StoreError {
        StoreError::object(self.name_ref(), key, err)
    }

    /// Fail unless the bucket on disk is still the one this handle was
    /// created for.
    async fn ensure_live(&self) -> StoreResult<()> {
        match read_record(&self.layout).await {
            Ok(Some(record)) if record.id == self.record.id => Ok(()),
            Ok(_) => Err(self.wrap(ErrorKind::BucketNotFound)),
            Err(e) => Err(self.wrap(e)),
        }
    }

    /// Every readable header in the bucket, keyed by object key.
    async fn headers(&self) -> StoreResult<BTreeMap<String, ObjectHeader>> {
        let mut entries = tokio::fs::read_dir(self.layout.meta_dir())
            .await
            .map_err(|e| self.wrap(io_error(e)))?;
        let mut headers = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.wrap(io_error(e)))?
        {
            let path = entry.path();
            if !BucketLayout::is_meta(&path) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(self.wrap(io_error(e))),
            };
            match serde_json::from_slice::<ObjectHeader>(&bytes) {
                Ok(header) => {
                    headers.insert(header.key.clone(), header);
                }
                Err(e) => {
                    tracing::warn!(
                        bucket = %self.name_ref(),
                        path = %path.display(),
                        error = %e,
                        "skipping corrupt object header"
                    );
                }
            }
        }
        Ok(headers)
    }

    /// Copy `data` into a staging file, returning its size and MD5 digest.
    async fn stage_content(
        &self,
        data: &mut dyn ObjectSource,
        path: &Path,
    ) -> std::io::Result<(u64, Vec<u8>)> {
        let mut file = create_staged(path)?;
        let mut digest = md5::Context::new();
        let mut buf = vec![0u8; COPY_BUFFER];
        let mut size = 0u64;
        loop {
            let n = data.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            digest.consume(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        file.flush().await?;
        if self.sync_data {
            file.sync_all().await?;
        }
        Ok((size, digest.compute().0.to_vec()))
    }

    async fn stage_header(&self, header: &ObjectHeader, path: &Path) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(header).map_err(json_error)?;
        let mut file = create_staged(path).map_err(io_error)?;
        file.write_all(&json).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        if self.sync_data {
            file.sync_all().await.map_err(io_error)?;
        }
        Ok(())
    }

    async fn write_object(
        &self,
        key: &str,
        data: &mut dyn ObjectSource,
        options: &PutOptions,
        gate: OwnedRwLockReadGuard<()>,
    ) -> StoreResult<()> {
        let staging = Staging::new(&self.layout);
        let (size, etag) = self
            .stage_content(data, &staging.data)
            .await
            .map_err(io_error)?;
        let header = options.to_header(self.name_ref(), key, size, etag, Utc::now());
        self.stage_header(&header, &staging.meta).await?;

        // Once spawned the commit runs to completion with both locks held,
        // even if this future is dropped.
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let data_path = self.layout.data(key);
        let meta_path = self.layout.meta(key);
        tokio::task::spawn_blocking(move || {
            let _locks = (gate, writer);
            staging.commit(&data_path, &meta_path)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("commit task failed: {e}")))?
    }
}

/// Staging files of one upload. Removed on drop unless committed.
struct Staging {
    data: PathBuf,
    meta: PathBuf,
    committed: bool,
}

impl Staging {
    fn new(layout: &BucketLayout) -> Self {
        Self {
            data: layout.staging("data"),
            meta: layout.staging("json"),
            committed: false,
        }
    }

    /// Move content then header into place.
    fn commit(mut self, data: &Path, meta: &Path) -> StoreResult<()> {
        std::fs::rename(&self.data, data).map_err(io_error)?;
        std::fs::rename(&self.meta, meta).map_err(io_error)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in [&self.data, &self.meta] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove staging file"
                    );
                }
            }
        }
    }
}

/// Create a staging file without yielding, so a dropped put never races
/// its own cleanup.
fn create_staged(path: &Path) -> std::io::Result<tokio::fs::File> {
    std::fs::File::create(path).map(tokio::fs::File::from_std)
}

impl std::fmt::Debug for FsBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBucket")
            .field("name", &self.record.name)
            .field("path", &self.layout.dir())
            .field("created", &self.record.created)
            .finish()
    }
}

#[async_trait]
impl Bucket for FsBucket {
    fn name(&self) -> &str {
        &self.record.name
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.record.created
    }

    fn owner(&self) -> Option<&Owner> {
        self.record.owner.as_ref()
    }

    async fn object_page(&self, prefix: &str, delimiter: &str, token: &str) -> StoreResult<Page> {
        self.ensure_live().await?;
        let headers = self.headers().await?;

        let query = PageQuery::new(prefix, delimiter, token).with_max_keys(self.max_keys);
        let plan =
            plan_page(headers.keys().map(String::as_str), &query).map_err(|e| self.wrap(e))?;

        let objects = plan
            .keys
            .iter()
            .filter_map(|key| headers.get(key))
            .map(|header| {
                Arc::new(FsObject {
                    header: header.clone(),
                    layout: self.layout.clone(),
                    bucket_id: self.record.id,
                }) as Arc<dyn Object>
            })
            .collect();

        tracing::debug!(
            bucket = %self.name_ref(),
            prefix = %prefix,
            delimiter = %delimiter,
            count = plan.keys.len(),
            prefixes = plan.prefixes.len(),
            "listed page"
        );

        Ok(Page::new(objects, plan.prefixes, plan.next_page))
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHeader> {
        self.ensure_live().await?;
        load_header(&self.layout, key)
            .await
            .map_err(|e| self.wrap_object(key, e))
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectReader> {
        self.ensure_live().await?;
        open_content(&self.layout, self.name_ref(), key)
            .await
            .map_err(|e| self.wrap_object(key, e))
    }

    async fn put_with(
        &self,
        key: &str,
        data: &mut dyn ObjectSource,
        options: &PutOptions,
    ) -> StoreResult<()> {
        check_key(self.name_ref(), key)?;
        let gate = Arc::clone(&self.locks.gate).read_owned().await;
        self.ensure_live().await?;

        self.write_object(key, data, options, gate)
            .await
            .map_err(|e| self.wrap_object(key, e))?;

        tracing::debug!(bucket = %self.name_ref(), key = %key, "stored object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let _writer = self.writer.lock().await;
        self.ensure_live().await?;

        // The header goes first: without it the object is no longer listed.
        tokio::fs::remove_file(self.layout.meta(key))
            .await
            .map_err(|e| self.wrap_object(key, read_error(e)))?;
        match tokio::fs::remove_file(self.layout.data(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.wrap_object(key, io_error(e))),
        }

        tracing::debug!(bucket = %self.name_ref(), key = %key, "deleted object");
        Ok(())
    }
}

/// Listing entry of an [`FsBucket`], bound to the bucket incarnation it was
/// listed from.
struct FsObject {
    header: ObjectHeader,
    layout: BucketLayout,
    bucket_id: Uuid,
}

impl FsObject {
    fn wrap(&self, err: impl Into<StoreError>) -> StoreError {
        StoreError::object(&self.header.bucket, &self.header.key, err)
    }

    /// A handle from a deleted bucket sees no objects, even once a bucket of
    /// the same name is created again.
    async fn ensure_live(&self) -> StoreResult<()> {
        match read_record(&self.layout).await {
            Ok(Some(record)) if record.id == self.bucket_id => Ok(()),
            Ok(_) => Err(self.wrap(ErrorKind::ObjectNotFound)),
            Err(e) => Err(self.wrap(e)),
        }
    }
}

impl std::fmt::Debug for FsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObject")
            .field("bucket", &self.header.bucket)
            .field("key", &self.header.key)
            .field("size", &self.header.size)
            .finish()
    }
}

#[async_trait]
impl Object for FsObject {
    fn bucket(&self) -> &str {
        &self.header.bucket
    }

    fn key(&self) -> &str {
        &self.header.key
    }

    fn size(&self) -> u64 {
        self.header.size
    }

    fn mod_time(&self) -> DateTime<Utc> {
        self.header.mod_time
    }

    fn access_time(&self) -> DateTime<Utc> {
        self.header.access_time
    }

    fn etag(&self) -> &[u8] {
        &self.header.etag
    }

    fn storage_class(&self) -> &str {
        &self.header.storage_class
    }

    async fn head(&self) -> StoreResult<ObjectHeader> {
        self.ensure_live().await?;
        load_header(&self.layout, &self.header.key)
            .await
            .map_err(|e| self.wrap(e))
    }

    async fn open(&self) -> StoreResult<ObjectReader> {
        self.ensure_live().await?;
        open_content(&self.layout, &self.header.bucket, &self.header.key)
            .await
            .map_err(|e| self.wrap(e))
    }
}

/// Read the sidecar of `key`, reporting the content file's OS access time
/// when it is newer than the recorded one.
async fn load_header(layout: &BucketLayout, key: &str) -> StoreResult<ObjectHeader> {
    let bytes = tokio::fs::read(layout.meta(key)).await.map_err(read_error)?;
    let mut header: ObjectHeader = serde_json::from_slice(&bytes).map_err(json_error)?;
    if let Some(accessed) = accessed_at(&layout.data(key)).await {
        header.access_time = header.access_time.max(accessed);
    }
    Ok(header)
}

async fn open_content(layout: &BucketLayout, bucket: &str, key: &str) -> StoreResult<ObjectReader> {
    // An object is visible only once its header is in place.
    if !tokio::fs::try_exists(layout.meta(key))
        .await
        .map_err(io_error)?
    {
        return Err(ErrorKind::ObjectNotFound.into());
    }
    let file = tokio::fs::File::open(layout.data(key))
        .await
        .map_err(read_error)?;
    Ok(ObjectReader::new(bucket, key, file))
}

async fn accessed_at(path: &Path) -> Option<DateTime<Utc>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.accessed().ok().map(DateTime::<Utc>::from)
}
