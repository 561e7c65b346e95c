use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::bucket::Bucket;
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::keys::check_key;
use crate::object::{
    read_source, Object, ObjectHeader, ObjectReader, ObjectSource, Owner, PutOptions,
};
use crate::page::{plan_page, Page, PageQuery, DEFAULT_MAX_KEYS};
use crate::store::ObjectStore;

type BucketMap = BTreeMap<String, Arc<MemoryBucket>>;

/// In-memory, map-backed object store.
///
/// Intended for tests and embedding. Each store instance owns independent
/// state: a `RwLock` over the bucket map, and one `RwLock` per bucket over
/// its objects. Listings and reads share the locks; creating or deleting
/// buckets and inserting or removing keys take them exclusively.
pub struct InMemoryObjectStore {
    buckets: RwLock<BucketMap>,
    max_keys: usize,
    owner: Option<Owner>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            max_keys: DEFAULT_MAX_KEYS,
            owner: None,
        }
    }

    /// Limit listings to `max_keys` entries per page (at least one).
    pub fn with_page_size(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    /// Record `owner` as the owner of every bucket created from now on.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Number of buckets currently stored.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().map(|b| b.len()).unwrap_or(0)
    }

    /// Total content bytes across all buckets.
    pub fn total_bytes(&self) -> u64 {
        let Ok(buckets) = self.buckets.read() else {
            return 0;
        };
        buckets.values().map(|b| b.total_bytes()).sum()
    }

    fn read_buckets(&self) -> StoreResult<RwLockReadGuard<'_, BucketMap>> {
        self.buckets.read().map_err(|e| poisoned(&e))
    }

    fn write_buckets(&self) -> StoreResult<RwLockWriteGuard<'_, BucketMap>> {
        self.buckets.write().map_err(|e| poisoned(&e))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("bucket_count", &self.bucket_count())
            .field("max_keys", &self.max_keys)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        let mut buckets = self.write_buckets()?;
        if buckets.contains_key(name) {
            return Err(StoreError::bucket(name, ErrorKind::BucketAlreadyExists));
        }
        let bucket = MemoryBucket::new(name, self.owner.clone(), self.max_keys);
        buckets.insert(name.to_string(), Arc::new(bucket));
        tracing::info!(bucket = %name, "created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> StoreResult<()> {
        let mut buckets = self.write_buckets()?;
        let bucket = buckets
            .get(name)
            .ok_or_else(|| StoreError::bucket(name, ErrorKind::BucketNotFound))?;

        {
            let mut state = bucket.write_state()?;
            if !state.objects.is_empty() {
                return Err(StoreError::bucket(name, ErrorKind::BucketNotEmpty));
            }
            state.removed = true;
        }

        buckets.remove(name);
        tracing::info!(bucket = %name, "deleted bucket");
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<Arc<dyn Bucket>>> {
        let buckets = self.read_buckets()?;
        Ok(buckets
            .values()
            .map(|b| Arc::clone(b) as Arc<dyn Bucket>)
            .collect())
    }

    async fn bucket(&self, name: &str) -> StoreResult<Arc<dyn Bucket>> {
        let buckets = self.read_buckets()?;
        buckets
            .get(name)
            .map(|b| Arc::clone(b) as Arc<dyn Bucket>)
            .ok_or_else(|| StoreError::bucket(name, ErrorKind::BucketNotFound))
    }
}

/// A bucket of an [`InMemoryObjectStore`].
///
/// Handles stay valid after the bucket is deleted from its store, but every
/// operation on them then fails with [`ErrorKind::BucketNotFound`].
pub struct MemoryBucket {
    name: String,
    created: DateTime<Utc>,
    owner: Option<Owner>,
    max_keys: usize,
    state: Arc<RwLock<BucketState>>,
}

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, Arc<Entry>>,
    removed: bool,
}

/// One stored version. Replaced wholesale on overwrite, so readers holding
/// the old `Bytes` keep seeing the old content.
struct Entry {
    header: ObjectHeader,
    data: Bytes,
    access_time: Mutex<DateTime<Utc>>,
}

impl Entry {
    fn touch(&self) -> StoreResult<()> {
        let mut at = self.access_time.lock().map_err(|e| poisoned(&e))?;
        *at = Utc::now();
        Ok(())
    }

    fn header(&self) -> StoreResult<ObjectHeader> {
        let at = self.access_time.lock().map_err(|e| poisoned(&e))?;
        let mut header = self.header.clone();
        header.access_time = *at;
        Ok(header)
    }
}

impl MemoryBucket {
    fn new(name: &str, owner: Option<Owner>, max_keys: usize) -> Self {
        Self {
            name: name.to_string(),
            created: Utc::now(),
            owner,
            max_keys,
            state: Arc::new(RwLock::new(BucketState::default())),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    /// Returns `true` if the bucket holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total content bytes in this bucket.
    pub fn total_bytes(&self) -> u64 {
        self.state
            .read()
            .map(|s| s.objects.values().map(|e| e.header.size).sum())
            .unwrap_or(0)
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, BucketState>> {
        let state = self.state.read().map_err(|e| poisoned(&e))?;
        if state.removed {
            return Err(StoreError::bucket(&self.name, ErrorKind::BucketNotFound));
        }
        Ok(state)
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, BucketState>> {
        let state = self.state.write().map_err(|e| poisoned(&e))?;
        if state.removed {
            return Err(StoreError::bucket(&self.name, ErrorKind::BucketNotFound));
        }
        Ok(state)
    }

    fn entry(&self, key: &str) -> StoreResult<Arc<Entry>> {
        let state = self.read_state()?;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::object(&self.name, key, ErrorKind::ObjectNotFound))
    }
}

impl std::fmt::Debug for MemoryBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucket")
            .field("name", &self.name)
            .field("created", &self.created)
            .field("object_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    fn creation_time(&self) -> DateTime<Utc> {
        self.created
    }

    fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    async fn object_page(&self, prefix: &str, delimiter: &str, token: &str) -> StoreResult<Page> {
        let state = self.read_state()?;
        let query = PageQuery::new(prefix, delimiter, token).with_max_keys(self.max_keys);
        let plan = plan_page(state.objects.keys().map(String::as_str), &query)
            .map_err(|e| StoreError::bucket(&self.name, e))?;

        let objects = plan
            .keys
            .iter()
            .filter_map(|key| state.objects.get(key))
            .map(|entry| {
                Arc::new(MemoryObject::snapshot(entry, &self.state)) as Arc<dyn Object>
            })
            .collect();

        tracing::debug!(
            bucket = %self.name,
            prefix = %prefix,
            delimiter = %delimiter,
            count = plan.keys.len(),
            prefixes = plan.prefixes.len(),
            "listed page"
        );

        Ok(Page::new(objects, plan.prefixes, plan.next_page))
    }

    async fn head(&self, key: &str) -> StoreResult<ObjectHeader> {
        self.entry(key)?.header()
    }

    async fn get(&self, key: &str) -> StoreResult<ObjectReader> {
        let entry = self.entry(key)?;
        entry.touch()?;
        Ok(ObjectReader::new(&self.name, key, Cursor::new(entry.data.clone())))
    }

    async fn put_with(
        &self,
        key: &str,
        data: &mut dyn ObjectSource,
        options: &PutOptions,
    ) -> StoreResult<()> {
        check_key(&self.name, key)?;

        let content = read_source(data)
            .await
            .map_err(|e| StoreError::object(&self.name, key, e))?;
        let etag = md5::compute(&content).0.to_vec();
        let now = Utc::now();
        let header = options.to_header(&self.name, key, content.len() as u64, etag, now);
        let entry = Entry {
            header,
            data: content,
            access_time: Mutex::new(now),
        };

        let mut state = self.write_state()?;
        state.objects.insert(key.to_string(), Arc::new(entry));
        tracing::debug!(bucket = %self.name, key = %key, "stored object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.write_state()?;
        if state.objects.remove(key).is_none() {
            return Err(StoreError::object(&self.name, key, ErrorKind::ObjectNotFound));
        }
        tracing::debug!(bucket = %self.name, key = %key, "deleted object");
        Ok(())
    }
}

/// Listing entry of a [`MemoryBucket`].
///
/// Carries the metadata seen at listing time and resolves `head`/`open`
/// against the bucket's current state.
struct MemoryObject {
    header: ObjectHeader,
    state: Arc<RwLock<BucketState>>,
}

impl MemoryObject {
    fn snapshot(entry: &Entry, state: &Arc<RwLock<BucketState>>) -> Self {
        let header = entry.header().unwrap_or_else(|_| entry.header.clone());
        Self {
            header,
            state: Arc::clone(state),
        }
    }

    fn current(&self) -> StoreResult<Arc<Entry>> {
        let state = self.state.read().map_err(|e| poisoned(&e))?;
        state
            .objects
            .get(&self.header.key)
            .cloned()
            .ok_or_else(|| {
                StoreError::object(&self.header.bucket, &self.header.key, ErrorKind::ObjectNotFound)
            })
    }
}

impl std::fmt::Debug for MemoryObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObject")
            .field("bucket", &self.header.bucket)
            .field("key", &self.header.key)
            .field("size", &self.header.size)
            .finish()
    }
}

#[async_trait]
impl Object for MemoryObject {
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
        self.current()?.header()
    }

    async fn open(&self) -> StoreResult<ObjectReader> {
        let entry = self.current()?;
        entry.touch()?;
        Ok(ObjectReader::new(
            &self.header.bucket,
            &self.header.key,
            Cursor::new(entry.data.clone()),
        ))
    }
}

fn poisoned<E: std::fmt::Display>(err: &E) -> StoreError {
    StoreError::Backend(format!("lock poisoned: {err}"))
}
