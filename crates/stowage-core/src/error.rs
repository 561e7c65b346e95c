//! Error taxonomy shared by every backend.
//!
//! Failures fall into two groups:
//!
//! - a closed set of semantic kinds ([`ErrorKind`]) that callers branch on,
//!   optionally wrapped with bucket or object context;
//! - backend failures (I/O, transport, cancellation, malformed cursors) that
//!   sit outside the closed set and never report a kind.
//!
//! Kinds are compared by equality, never by parsing message text:
//!
//! ```
//! use stowage_core::{ErrorKind, StoreError};
//!
//! let err = StoreError::object("photos", "cat.png", ErrorKind::ObjectNotFound);
//! assert!(err.is(ErrorKind::ObjectNotFound));
//! assert_eq!(
//!     err.to_string(),
//!     r#"object "cat.png" in bucket "photos": object not found"#
//! );
//! ```

use thiserror::Error;

/// The closed set of semantic failure kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// The bucket does not exist.
    #[error("bucket not found")]
    BucketNotFound,

    /// A bucket with this name already exists.
    #[error("bucket already exists")]
    BucketAlreadyExists,

    /// The bucket still holds at least one object.
    #[error("bucket not empty")]
    BucketNotEmpty,

    /// No object exists under the key.
    #[error("object not found")]
    ObjectNotFound,

    /// The key violates the backend's naming rules.
    #[error("invalid object key")]
    InvalidKey,

    /// The caller is not authorized for the operation.
    #[error("permission denied")]
    PermissionDenied,
}

/// Errors returned by object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A bare semantic failure.
    #[error(transparent)]
    Kind(#[from] ErrorKind),

    /// A failure scoped to a bucket.
    #[error("bucket {bucket:?}: {source}")]
    Bucket {
        bucket: String,
        source: Box<StoreError>,
    },

    /// A failure scoped to an object within a bucket.
    #[error("object {key:?} in bucket {bucket:?}: {source}")]
    Object {
        bucket: String,
        key: String,
        source: Box<StoreError>,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A continuation token that no backend page ever produced.
    #[error("invalid page token: {0:?}")]
    InvalidPageToken(String),

    /// A bucket name the backend cannot represent.
    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: String },

    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transport or provider failure reported by a backend.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap `source` with bucket context.
    pub fn bucket(bucket: impl Into<String>, source: impl Into<StoreError>) -> Self {
        Self::Bucket {
            bucket: bucket.into(),
            source: Box::new(source.into()),
        }
    }

    /// Wrap `source` with bucket and object key context.
    pub fn object(
        bucket: impl Into<String>,
        key: impl Into<String>,
        source: impl Into<StoreError>,
    ) -> Self {
        Self::Object {
            bucket: bucket.into(),
            key: key.into(),
            source: Box::new(source.into()),
        }
    }

    /// The semantic kind behind any number of context wrappers.
    ///
    /// Returns `None` for backend failures outside the closed set.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Kind(kind) => Some(*kind),
            Self::Bucket { source, .. } | Self::Object { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// Returns `true` if this error unwraps to `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// Returns `true` for caller-initiated cancellation or an expired deadline.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled | Self::DeadlineExceeded => true,
            Self::Bucket { source, .. } | Self::Object { source, .. } => {
                source.is_cancellation()
            }
            _ => false,
        }
    }

    /// The innermost error with all context wrappers removed.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::Bucket { source, .. } | Self::Object { source, .. } => source.root(),
            other => other,
        }
    }
}

impl PartialEq<ErrorKind> for StoreError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.is(*other)
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn kind_messages() {
        let cases = [
            (ErrorKind::BucketNotFound, "bucket not found"),
            (ErrorKind::BucketAlreadyExists, "bucket already exists"),
            (ErrorKind::BucketNotEmpty, "bucket not empty"),
            (ErrorKind::ObjectNotFound, "object not found"),
            (ErrorKind::InvalidKey, "invalid object key"),
            (ErrorKind::PermissionDenied, "permission denied"),
        ];
        for (kind, expected) in cases {
            assert_eq!(kind.to_string(), expected);
            assert_eq!(StoreError::from(kind).to_string(), expected);
        }
    }

    #[test]
    fn bucket_wrapper_renders_and_unwraps() {
        let err = StoreError::bucket("test-bucket", ErrorKind::BucketNotFound);
        assert_eq!(err.to_string(), r#"bucket "test-bucket": bucket not found"#);
        assert_eq!(err.kind(), Some(ErrorKind::BucketNotFound));
        assert!(err.is(ErrorKind::BucketNotFound));
        assert!(!err.is(ErrorKind::ObjectNotFound));
    }

    #[test]
    fn object_wrapper_renders_and_unwraps() {
        let err = StoreError::object("test-bucket", "test-key", ErrorKind::ObjectNotFound);
        assert_eq!(
            err.to_string(),
            r#"object "test-key" in bucket "test-bucket": object not found"#
        );
        assert!(err.is(ErrorKind::ObjectNotFound));
        assert!(err == ErrorKind::ObjectNotFound);
    }

    #[test]
    fn bucket_wrapper_around_object_not_found() {
        let err = StoreError::bucket("b", ErrorKind::ObjectNotFound);
        assert!(err.to_string().contains(r#"bucket "b""#));
        assert!(err.is(ErrorKind::ObjectNotFound));
    }

    #[test]
    fn nested_wrappers_unwrap_to_kind() {
        let inner = StoreError::object("b", "k", ErrorKind::PermissionDenied);
        let outer = StoreError::bucket("b", inner);
        assert_eq!(outer.kind(), Some(ErrorKind::PermissionDenied));
        assert!(matches!(outer.root(), StoreError::Kind(ErrorKind::PermissionDenied)));
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = StoreError::object("b", "k", ErrorKind::ObjectNotFound);
        let source = err.source().expect("wrapper has a source");
        assert_eq!(source.to_string(), "object not found");
    }

    #[test]
    fn quoting_escapes_context() {
        let err = StoreError::object("b", "say \"hi\"", ErrorKind::InvalidKey);
        assert_eq!(
            err.to_string(),
            r#"object "say \"hi\"" in bucket "b": invalid object key"#
        );
    }

    #[test]
    fn backend_failures_have_no_kind() {
        let io = StoreError::from(std::io::Error::other("disk on fire"));
        assert_eq!(io.kind(), None);
        assert_eq!(StoreError::Cancelled.kind(), None);
        assert_eq!(StoreError::Backend("timeout".into()).kind(), None);
        assert_eq!(StoreError::InvalidPageToken("zz".into()).kind(), None);
    }

    #[test]
    fn cancellation_survives_wrapping() {
        let err = StoreError::object("b", "k", StoreError::DeadlineExceeded);
        assert!(err.is_cancellation());
        assert!(StoreError::Cancelled.is_cancellation());
        assert!(!StoreError::from(ErrorKind::ObjectNotFound).is_cancellation());
    }
}
