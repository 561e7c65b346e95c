//! Filesystem backend for the stowage object storage contract.
//!
//! [`FsObjectStore`] keeps one directory per bucket under a configurable
//! root. Object content and a JSON header sidecar are written to a staging
//! area and renamed into place, so readers and listings only ever observe
//! complete objects.
//!
//! ```no_run
//! # async fn demo() -> stowage_core::StoreResult<()> {
//! use stowage_core::ObjectStore;
//! use stowage_fs::{FsObjectStore, FsStoreConfig};
//!
//! let store = FsObjectStore::open(FsStoreConfig::new("/var/lib/stowage")).await?;
//! store.create_bucket("backups").await?;
//! let bucket = store.bucket("backups").await?;
//! let mut data = std::io::Cursor::new(b"hello".to_vec());
//! bucket.put("2024/01/01.tar", &mut data).await?;
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod config;
mod layout;
pub mod store;

pub use bucket::FsBucket;
pub use config::FsStoreConfig;
pub use store::FsObjectStore;
