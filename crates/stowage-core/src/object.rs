//! Object identity, metadata, and content access.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, ReadBuf};

use crate::error::StoreResult;

/// Storage class assigned when the writer does not pick one.
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// MIME type assigned when the writer does not pick one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Identity owning a bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Unique identifier of the owner.
    pub id: String,
    /// Human-readable name of the owner.
    pub display_name: String,
}

impl Owner {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Server-side encryption descriptor.
///
/// All four values are opaque pass-through strings; nothing in this crate
/// interprets them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sse {
    /// Encryption algorithm (e.g. `AES256`).
    #[serde(rename = "algorithms")]
    pub algorithm: String,
    /// MD5 fingerprint of a customer-provided key.
    pub key_md5: String,
    /// KMS key identifier.
    pub kms_key_id: String,
    /// Encryption mode (e.g. `aws:kms`).
    pub server_side_encryption: String,
}

/// Complete metadata for an object, without its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHeader {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub access_time: DateTime<Utc>,
    /// Opaque content fingerprint, serialized as hex.
    #[serde(with = "hex::serde")]
    pub etag: Vec<u8>,
    pub mime_type: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Version id; empty when versioning is disabled.
    #[serde(default)]
    pub version: String,
    /// Redirect target; empty unless the object is a redirect marker.
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub server_side_encryption: Option<Sse>,
    pub storage_class: String,
}

impl ObjectHeader {
    /// The ETag rendered as lowercase hex.
    pub fn etag_hex(&self) -> String {
        hex::encode(&self.etag)
    }
}

/// Optional header fields supplied when writing an object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// Defaults to [`DEFAULT_MIME_TYPE`].
    pub mime_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Defaults to [`DEFAULT_STORAGE_CLASS`].
    pub storage_class: Option<String>,
    pub redirect: Option<String>,
    pub server_side_encryption: Option<Sse>,
}

impl PutOptions {
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = Some(class.into());
        self
    }

    pub fn with_sse(mut self, sse: Sse) -> Self {
        self.server_side_encryption = Some(sse);
        self
    }

    /// Build the header for freshly written content.
    ///
    /// Both timestamps are set to `now`; the version is left empty.
    pub fn to_header(
        &self,
        bucket: &str,
        key: &str,
        size: u64,
        etag: Vec<u8>,
        now: DateTime<Utc>,
    ) -> ObjectHeader {
        ObjectHeader {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            mod_time: now,
            access_time: now,
            etag,
            mime_type: self
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            metadata: self.metadata.clone(),
            version: String::new(),
            redirect: self.redirect.clone().unwrap_or_default(),
            server_side_encryption: self.server_side_encryption.clone(),
            storage_class: self
                .storage_class
                .clone()
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
        }
    }
}

/// Seekable byte source accepted by [`Bucket::put`](crate::Bucket::put).
///
/// Seekability lets a backend rewind and re-send the content when it retries
/// a transient failure.
pub trait ObjectSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ObjectSource for T {}

/// Read the remainder of `source` into memory.
pub async fn read_source(source: &mut dyn ObjectSource) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    source.read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// One item of a batch upload.
pub struct BatchUpload {
    pub key: String,
    pub data: Box<dyn ObjectSource>,
    pub options: PutOptions,
}

impl BatchUpload {
    pub fn new(key: impl Into<String>, data: impl ObjectSource + 'static) -> Self {
        Self {
            key: key.into(),
            data: Box::new(data),
            options: PutOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PutOptions) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Debug for BatchUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchUpload")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Content stream of one object, owned by the caller.
///
/// Backend resources (file handles, connections) are released when the
/// reader is dropped, on every exit path.
pub struct ObjectReader {
    bucket: String,
    key: String,
    inner: Pin<Box<dyn AsyncRead + Send>>,
}

impl ObjectReader {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        inner: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            inner: Box::pin(inner),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Drain the stream into memory, releasing the reader.
    pub async fn into_bytes(mut self) -> io::Result<Bytes> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for ObjectReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.inner.as_mut().poll_read(cx, buf)
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A stored object as returned by a listing.
///
/// The accessors describe the object as it was when the listing ran. A
/// handle is a lookup, not a lease: `head` and `open` fail with
/// [`ErrorKind::ObjectNotFound`](crate::ErrorKind::ObjectNotFound) if the
/// object has been deleted since.
#[async_trait]
pub trait Object: Send + Sync + fmt::Debug {
    /// Name of the bucket containing this object.
    fn bucket(&self) -> &str;

    /// Key of the object within its bucket.
    fn key(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    fn mod_time(&self) -> DateTime<Utc>;

    fn access_time(&self) -> DateTime<Utc>;

    /// Opaque content fingerprint.
    fn etag(&self) -> &[u8];

    fn storage_class(&self) -> &str;

    /// Fetch the full, current metadata without the content.
    async fn head(&self) -> StoreResult<ObjectHeader>;

    /// Open the current content for reading.
    async fn open(&self) -> StoreResult<ObjectReader>;
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample_header() -> ObjectHeader {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        PutOptions::default()
            .with_mime_type("text/plain")
            .with_metadata("author", "ada")
            .with_sse(Sse {
                algorithm: "AES256".into(),
                key_md5: "a1b2".into(),
                kms_key_id: "arn:kms:key/1".into(),
                server_side_encryption: "aws:kms".into(),
            })
            .to_header("docs", "notes/today.txt", 5, vec![0xde, 0xad], now)
    }

    #[test]
    fn header_defaults() {
        let now = Utc::now();
        let header = PutOptions::default().to_header("b", "k", 0, vec![], now);
        assert_eq!(header.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(header.storage_class, DEFAULT_STORAGE_CLASS);
        assert!(header.version.is_empty());
        assert!(header.redirect.is_empty());
        assert!(header.server_side_encryption.is_none());
        assert_eq!(header.mod_time, header.access_time);
    }

    #[test]
    fn header_json_roundtrip() {
        let header = sample_header();
        let json = serde_json::to_string(&header).unwrap();
        assert!(json.contains(r#""etag":"dead""#));
        assert!(json.contains(r#""algorithms":"AES256""#));
        assert!(json.contains(r#""kms_key_id":"arn:kms:key/1""#));
        let back: ObjectHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.etag_hex(), "dead");
    }

    #[test]
    fn sse_field_names() {
        let json = concat!(
            r#"{"algorithms":"AES256","key_md5":"m","#,
            r#""kms_key_id":"k","server_side_encryption":"s"}"#,
        );
        let sse: Sse = serde_json::from_str(json).unwrap();
        assert_eq!(sse.algorithm, "AES256");
        assert_eq!(sse.server_side_encryption, "s");
    }

    #[tokio::test]
    async fn reader_drains_inner_stream() {
        let reader = ObjectReader::new("b", "k", Cursor::new(b"hello".to_vec()));
        assert_eq!(reader.bucket(), "b");
        assert_eq!(reader.key(), "k");
        assert_eq!(&reader.into_bytes().await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn read_source_reads_from_current_position() {
        use tokio::io::AsyncSeekExt;

        let mut source = Cursor::new(b"skip-me:payload".to_vec());
        source.seek(io::SeekFrom::Start(8)).await.unwrap();
        let bytes = read_source(&mut source).await.unwrap();
        assert_eq!(&bytes[..], b"payload");
    }

    #[test]
    fn batch_upload_debug_hides_data() {
        let item = BatchUpload::new("k", Cursor::new(vec![1u8, 2, 3]));
        let debug = format!("{item:?}");
        assert!(debug.contains("BatchUpload"));
        assert!(debug.contains("\"k\""));
    }
}
