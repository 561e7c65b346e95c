//! Backend-agnostic object storage contract.
//!
//! This crate defines the uniform interface that every stowage backend
//! implements: an [`ObjectStore`] manages named [`Bucket`]s, a bucket holds
//! [`Object`]s addressed by string keys, and listings come back one [`Page`]
//! at a time with an opaque continuation token.
//!
//! # Backends
//!
//! - [`InMemoryObjectStore`] -- map-backed reference store for tests and embedding
//! - `stowage_fs::FsObjectStore` -- directory-per-bucket store on local disk
//!
//! # Contract
//!
//! 1. Bucket names are unique per store; only empty buckets can be deleted.
//! 2. A successful `put` is immediately visible to `get`, `head` and listings.
//! 3. An opened reader sees the content as of the moment it was opened.
//! 4. Listings are ascending by key; following tokens visits every key once.
//! 5. Failures carry bucket/object context and unwrap to an [`ErrorKind`].
//! 6. Every operation is a future; see [`cancel`] for deadlines and cancellation.

pub mod bucket;
pub mod cancel;
pub mod error;
pub mod keys;
pub mod memory;
pub mod object;
pub mod page;
pub mod store;

// Re-export primary types at crate root for ergonomic imports.
pub use bucket::Bucket;
pub use cancel::{with_cancellation, with_deadline, with_timeout, Cancellable};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use memory::{InMemoryObjectStore, MemoryBucket};
pub use object::{
    read_source, BatchUpload, Object, ObjectHeader, ObjectReader, ObjectSource, Owner,
    PutOptions, Sse, DEFAULT_MIME_TYPE, DEFAULT_STORAGE_CLASS,
};
pub use page::{plan_page, Listing, Page, PagePlan, PageQuery, DEFAULT_MAX_KEYS};
pub use store::ObjectStore;

// Runtime types that appear in the public API.
pub use tokio_util::sync::CancellationToken;
