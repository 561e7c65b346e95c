use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stowage_core::keys::validate_bucket_name;
use stowage_core::{Bucket, ErrorKind, ObjectStore, StoreError, StoreResult};
use tokio::sync::RwLock;

use crate::bucket::FsBucket;
use crate::config::FsStoreConfig;
use crate::layout::{io_error, json_error, BucketLayout, BucketRecord};

/// Locks shared by a store and every bucket handle it hands out.
#[derive(Default)]
pub(crate) struct StoreLocks {
    /// Held shared by writers, exclusively by `delete_bucket`.
    pub gate: Arc<RwLock<()>>,
    /// Per-bucket writer locks, keyed by bucket name.
    writers: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StoreLocks {
    pub fn writer(&self, bucket: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = self
            .writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(writers.entry(bucket.to_string()).or_default())
    }

    fn forget(&self, bucket: &str) {
        let mut writers = self
            .writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writers.remove(bucket);
    }
}

/// Object store persisting each bucket as a directory on local disk.
///
/// Writes are staged under the bucket's `tmp/` directory and renamed into
/// place, header last, so a crash never leaves a listed object without
/// content. Objects written by one process are visible to any other process
/// opening the same root.
pub struct FsObjectStore {
    config: FsStoreConfig,
    locks: Arc<StoreLocks>,
}

impl FsObjectStore {
    /// Open a store rooted at `config.root`.
    ///
    /// Creates the root directory when `create_root` is set; otherwise a
    /// missing root is an error.
    pub async fn open(config: FsStoreConfig) -> StoreResult<Self> {
        if config.create_root {
            tokio::fs::create_dir_all(&config.root)
                .await
                .map_err(io_error)?;
        } else if !tokio::fs::try_exists(&config.root).await.map_err(io_error)? {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("store root {} does not exist", config.root.display()),
            )));
        }
        tracing::debug!(root = %config.root.display(), "opened filesystem store");
        Ok(Self {
            config,
            locks: Arc::new(StoreLocks::default()),
        })
    }

    /// Open a store with default settings rooted at `root`.
    pub async fn open_dir(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open(FsStoreConfig::new(root)).await
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &FsStoreConfig {
        &self.config
    }

    async fn load(&self, name: &str) -> StoreResult<Option<FsBucket>> {
        let layout = BucketLayout::new(&self.config.root, name);
        let Some(record) = read_record(&layout).await? else {
            return Ok(None);
        };
        Ok(Some(FsBucket::new(
            record,
            layout,
            &self.config,
            Arc::clone(&self.locks),
        )))
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.config.root)
            .field("max_keys", &self.config.max_keys)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn create_bucket(&self, name: &str) -> StoreResult<()> {
        validate_bucket_name(name).map_err(|e| StoreError::bucket(name, e))?;
        let _gate = self.locks.gate.write().await;

        let layout = BucketLayout::new(&self.config.root, name);
        let wrap = |e: StoreError| StoreError::bucket(name, e);
        if read_record(&layout).await.map_err(wrap)?.is_some() {
            return Err(wrap(ErrorKind::BucketAlreadyExists.into()));
        }

        layout.create_dirs().await.map_err(|e| wrap(io_error(e)))?;
        let record = BucketRecord::new(name, self.config.owner.clone());
        let json = serde_json::to_vec_pretty(&record).map_err(|e| wrap(json_error(e)))?;
        let staged = layout.staging("json");
        tokio::fs::write(&staged, json)
            .await
            .map_err(|e| wrap(io_error(e)))?;
        tokio::fs::rename(&staged, layout.record())
            .await
            .map_err(|e| wrap(io_error(e)))?;

        tracing::info!(bucket = %name, root = %self.config.root.display(), "created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> StoreResult<()> {
        if validate_bucket_name(name).is_err() {
            return Err(StoreError::bucket(name, ErrorKind::BucketNotFound));
        }
        let _gate = self.locks.gate.write().await;

        let layout = BucketLayout::new(&self.config.root, name);
        let wrap = |e: StoreError| StoreError::bucket(name, e);
        if read_record(&layout).await.map_err(wrap)?.is_none() {
            return Err(wrap(ErrorKind::BucketNotFound.into()));
        }
        if has_objects(&layout).await.map_err(|e| wrap(io_error(e)))? {
            return Err(wrap(ErrorKind::BucketNotEmpty.into()));
        }

        // Drop the record first so a crash mid-removal leaves no live bucket.
        tokio::fs::remove_file(layout.record())
            .await
            .map_err(|e| wrap(io_error(e)))?;
        tokio::fs::remove_dir_all(layout.dir())
            .await
            .map_err(|e| wrap(io_error(e)))?;
        self.locks.forget(name);

        tracing::info!(bucket = %name, "deleted bucket");
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<Arc<dyn Bucket>>> {
        let mut entries = tokio::fs::read_dir(&self.config.root)
            .await
            .map_err(io_error)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            if !entry.file_type().await.map_err(io_error)?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut buckets: Vec<Arc<dyn Bucket>> = Vec::with_capacity(names.len());
        for name in names {
            match self.load(&name).await {
                Ok(Some(bucket)) => buckets.push(Arc::new(bucket)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(bucket = %name, error = %e, "skipping unreadable bucket");
                }
            }
        }
        Ok(buckets)
    }

    async fn bucket(&self, name: &str) -> StoreResult<Arc<dyn Bucket>> {
        // No bucket can exist under a name that fails validation.
        if validate_bucket_name(name).is_err() {
            return Err(StoreError::bucket(name, ErrorKind::BucketNotFound));
        }
        match self.load(name).await {
            Ok(Some(bucket)) => Ok(Arc::new(bucket)),
            Ok(None) => Err(StoreError::bucket(name, ErrorKind::BucketNotFound)),
            Err(e) => Err(StoreError::bucket(name, e)),
        }
    }
}

/// Read `bucket.json`, or `None` if the bucket does not exist.
pub(crate) async fn read_record(layout: &BucketLayout) -> StoreResult<Option<BucketRecord>> {
    match tokio::fs::read(layout.record()).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(json_error),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(e)),
    }
}

async fn has_objects(layout: &BucketLayout) -> std::io::Result<bool> {
    let mut entries = match tokio::fs::read_dir(layout.meta_dir()).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if BucketLayout::is_meta(&entry.path()) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Cursor;

    use stowage_core::Owner;

    use super::*;

    async fn open_temp() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open_dir(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_and_lookup_bucket() {
        let (dir, store) = open_temp().await;
        store.create_bucket("photos").await.unwrap();
        assert!(dir.path().join("photos").join("bucket.json").exists());

        let bucket = store.bucket("photos").await.unwrap();
        assert_eq!(bucket.name(), "photos");
        assert!(bucket.owner().is_none());
    }

    #[tokio::test]
    async fn create_bucket_twice_fails() {
        let (_dir, store) = open_temp().await;
        store.create_bucket("photos").await.unwrap();
        let created = store.bucket("photos").await.unwrap().creation_time();

        let err = store.create_bucket("photos").await.unwrap_err();
        assert!(err.is(ErrorKind::BucketAlreadyExists));
        assert_eq!(
            store.bucket("photos").await.unwrap().creation_time(),
            created
        );
    }

    #[tokio::test]
    async fn invalid_bucket_names_are_rejected() {
        let (_dir, store) = open_temp().await;
        for name in ["ab", "../escape", "UPPER", "has space"] {
            let err = store.create_bucket(name).await.unwrap_err();
            assert!(
                matches!(err.root(), StoreError::InvalidBucketName { .. }),
                "name {name:?}: {err}"
            );
        }
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn never_created_names_are_not_found() {
        let (_dir, store) = open_temp().await;
        for name in ["ab", "Upper", "never_created", "valid-but-absent"] {
            let err = store.delete_bucket(name).await.unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::BucketNotFound), "name {name:?}: {err}");
            let err = store.bucket(name).await.unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::BucketNotFound), "name {name:?}: {err}");
        }
    }

    #[tokio::test]
    async fn list_buckets_skips_foreign_directories() {
        let (dir, store) = open_temp().await;
        store.create_bucket("alpha").await.unwrap();
        store.create_bucket("beta").await.unwrap();
        std::fs::create_dir(dir.path().join("lost+found")).unwrap();
        std::fs::write(dir.path().join("README"), "not a bucket").unwrap();

        let names: BTreeSet<String> = store
            .list_buckets()
            .await
            .unwrap()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, BTreeSet::from(["alpha".to_string(), "beta".to_string()]));
    }

    #[tokio::test]
    async fn delete_bucket_lifecycle() {
        let (dir, store) = open_temp().await;
        let err = store.delete_bucket("missing").await.unwrap_err();
        assert!(err.is(ErrorKind::BucketNotFound));

        store.create_bucket("photos").await.unwrap();
        let bucket = store.bucket("photos").await.unwrap();
        let mut data = Cursor::new(b"jpeg".to_vec());
        bucket.put("a.jpg", &mut data).await.unwrap();

        let err = store.delete_bucket("photos").await.unwrap_err();
        assert!(err.is(ErrorKind::BucketNotEmpty));
        assert!(err.to_string().contains(r#"bucket "photos""#));

        bucket.delete("a.jpg").await.unwrap();
        store.delete_bucket("photos").await.unwrap();
        assert!(!dir.path().join("photos").exists());
        assert!(store.bucket("photos").await.unwrap_err().is(ErrorKind::BucketNotFound));
    }

    #[tokio::test]
    async fn recreated_bucket_invalidates_old_handles() {
        let (_dir, store) = open_temp().await;
        store.create_bucket("again").await.unwrap();
        let old = store.bucket("again").await.unwrap();
        store.delete_bucket("again").await.unwrap();
        store.create_bucket("again").await.unwrap();

        let mut data = Cursor::new(b"x".to_vec());
        let err = old.put("k", &mut data).await.unwrap_err();
        assert!(err.is(ErrorKind::BucketNotFound));

        let fresh = store.bucket("again").await.unwrap();
        assert!(fresh.creation_time() >= old.creation_time());
        assert!(fresh.list_all("", "").await.unwrap().objects.is_empty());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = FsStoreConfig::new(dir.path()).with_owner(Owner::new("7", "seven"));
        {
            let store = FsObjectStore::open(config.clone()).await.unwrap();
            store.create_bucket("durable").await.unwrap();
            let bucket = store.bucket("durable").await.unwrap();
            let mut data = Cursor::new(b"persisted".to_vec());
            bucket.put("k", &mut data).await.unwrap();
        }

        let store = FsObjectStore::open(config).await.unwrap();
        let bucket = store.bucket("durable").await.unwrap();
        assert_eq!(bucket.owner(), Some(&Owner::new("7", "seven")));
        let content = bucket.get("k").await.unwrap().into_bytes().await.unwrap();
        assert_eq!(&content[..], b"persisted");
    }

    #[tokio::test]
    async fn missing_root_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = FsStoreConfig {
            create_root: false,
            ..FsStoreConfig::new(dir.path().join("absent"))
        };
        let err = FsObjectStore::open(config).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[tokio::test]
    async fn debug_shows_root() {
        let (dir, store) = open_temp().await;
        let debug = format!("{store:?}");
        assert!(debug.contains("FsObjectStore"));
        assert!(debug.contains(&dir.path().display().to_string()));
    }
}
