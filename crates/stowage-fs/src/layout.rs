//! On-disk layout of a bucket directory.
//!
//! ```text
//! <root>/<bucket>/bucket.json               bucket record
//! <root>/<bucket>/data/<blake3(key)>        object content
//! <root>/<bucket>/meta/<blake3(key)>.json   ObjectHeader sidecar
//! <root>/<bucket>/tmp/                      staging for atomic writes
//! ```
//!
//! Keys are hashed into file names so that any valid key, including ones
//! containing `/` or exceeding the file-name limit, maps to a single flat
//! entry. The real key lives in the sidecar.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stowage_core::{ErrorKind, Owner, StoreError};
use uuid::Uuid;

pub(crate) const RECORD_FILE: &str = "bucket.json";
const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";
const TMP_DIR: &str = "tmp";
const META_EXT: &str = "json";

/// Contents of `bucket.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BucketRecord {
    /// Distinguishes a recreated bucket from the one deleted before it.
    pub id: Uuid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub owner: Option<Owner>,
}

impl BucketRecord {
    pub fn new(name: &str, owner: Option<Owner>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.to_string(),
            created: Utc::now(),
            owner,
        }
    }
}

/// Paths inside one bucket directory.
#[derive(Clone, Debug)]
pub(crate) struct BucketLayout {
    dir: PathBuf,
}

impl BucketLayout {
    pub fn new(root: &Path, bucket: &str) -> Self {
        Self {
            dir: root.join(bucket),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.join(DATA_DIR)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.dir.join(META_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.dir.join(TMP_DIR)
    }

    pub fn data(&self, key: &str) -> PathBuf {
        self.data_dir().join(file_stem(key))
    }

    pub fn meta(&self, key: &str) -> PathBuf {
        self.meta_dir()
            .join(format!("{}.{META_EXT}", file_stem(key)))
    }

    /// A fresh, unique staging path.
    pub fn staging(&self, suffix: &str) -> PathBuf {
        self.tmp_dir()
            .join(format!("{}.{suffix}", Uuid::now_v7().simple()))
    }

    /// Returns `true` for paths that look like header sidecars.
    pub fn is_meta(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == META_EXT)
    }

    /// Create the directory skeleton.
    pub async fn create_dirs(&self) -> io::Result<()> {
        for dir in [self.data_dir(), self.meta_dir(), self.tmp_dir()] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// File name for `key`: hex BLAKE3 of its bytes.
pub(crate) fn file_stem(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Map an OS error onto the store taxonomy.
pub(crate) fn io_error(err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied.into(),
        _ => StoreError::Io(err),
    }
}

/// Like [`io_error`], but a missing file means a missing object.
pub(crate) fn read_error(err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::ObjectNotFound.into(),
        _ => io_error(err),
    }
}

pub(crate) fn json_error(err: serde_json::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}
