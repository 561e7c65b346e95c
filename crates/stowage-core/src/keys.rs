//! Object key and bucket name validation.
//!
//! Valid object keys:
//! - Must be non-empty
//! - Must be at most [`MAX_KEY_LEN`] bytes of UTF-8
//! - Must not contain control characters
//!
//! Bucket names only need validating where a backend maps them onto a
//! namespace with its own rules (directories, DNS labels). Valid names:
//! - Are 3 to 63 characters long
//! - Contain only lowercase ASCII letters, digits, `-` and `.`
//! - Start and end with a letter or digit
//! - Do not contain `..`

use std::fmt;

use crate::error::{ErrorKind, StoreError, StoreResult};

/// Longest accepted object key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Shortest accepted bucket name.
pub const MIN_BUCKET_NAME_LEN: usize = 3;

/// Longest accepted bucket name.
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// The rule an object key broke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyViolation {
    /// The key is the empty string.
    Empty,
    /// The key is longer than [`MAX_KEY_LEN`] bytes.
    TooLong { len: usize },
    /// The key contains a control character.
    ControlCharacter { ch: char, offset: usize },
}

impl fmt::Display for KeyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "key must not be empty"),
            Self::TooLong { len } => {
                write!(f, "key is {len} bytes, limit is {MAX_KEY_LEN}")
            }
            Self::ControlCharacter { ch, offset } => {
                write!(f, "control character {ch:?} at byte {offset}")
            }
        }
    }
}

/// Check an object key against the shared key rules.
///
/// # Examples
///
/// ```
/// use stowage_core::keys::{validate_key, KeyViolation};
///
/// assert!(validate_key("photos/2024/cat.png").is_ok());
/// assert_eq!(validate_key(""), Err(KeyViolation::Empty));
/// assert!(validate_key("line\nbreak").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), KeyViolation> {
    if key.is_empty() {
        return Err(KeyViolation::Empty);
    }
    if key.len() > MAX_KEY_LEN {
        return Err(KeyViolation::TooLong { len: key.len() });
    }
    if let Some((offset, ch)) = key.char_indices().find(|(_, ch)| ch.is_control()) {
        return Err(KeyViolation::ControlCharacter { ch, offset });
    }
    Ok(())
}

/// Validate `key` and convert a violation into an object-scoped
/// [`ErrorKind::InvalidKey`].
pub fn check_key(bucket: &str, key: &str) -> StoreResult<()> {
    validate_key(key).map_err(|violation| {
        tracing::debug!(bucket = %bucket, key = %key, %violation, "rejected object key");
        StoreError::object(bucket, key, ErrorKind::InvalidKey)
    })
}

/// Validate a bucket name for backends with DNS-style naming.
///
/// # Examples
///
/// ```
/// use stowage_core::keys::validate_bucket_name;
///
/// assert!(validate_bucket_name("my-bucket.v2").is_ok());
/// assert!(validate_bucket_name("ab").is_err());
/// assert!(validate_bucket_name("../escape").is_err());
/// ```
pub fn validate_bucket_name(name: &str) -> StoreResult<()> {
    let reject = |reason: &str| StoreError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() < MIN_BUCKET_NAME_LEN || name.len() > MAX_BUCKET_NAME_LEN {
        return Err(reject("must be between 3 and 63 characters"));
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !(ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-' || *ch == '.'))
    {
        return Err(reject(&format!("contains forbidden character: {ch:?}")));
    }

    let alnum = |ch: Option<char>| ch.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(reject("must start and end with a letter or digit"));
    }

    if name.contains("..") {
        return Err(reject("must not contain '..'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys() {
        assert!(validate_key("a").is_ok());
        assert!(validate_key("file1.txt").is_ok());
        assert!(validate_key("prefix/file3.txt").is_ok());
        assert!(validate_key("dir//double/slash").is_ok());
        assert!(validate_key("ünïcödé/ключ").is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN)).is_ok());
    }

    #[test]
    fn reject_empty_key() {
        assert_eq!(validate_key(""), Err(KeyViolation::Empty));
    }

    #[test]
    fn reject_long_key() {
        let key = "k".repeat(MAX_KEY_LEN + 1);
        assert_eq!(
            validate_key(&key),
            Err(KeyViolation::TooLong { len: MAX_KEY_LEN + 1 })
        );
    }

    #[test]
    fn length_counts_bytes_not_chars() {
        // 'é' is two bytes in UTF-8.
        let key = "é".repeat(MAX_KEY_LEN / 2 + 1);
        assert!(matches!(validate_key(&key), Err(KeyViolation::TooLong { .. })));
    }

    #[test]
    fn reject_control_characters() {
        assert_eq!(
            validate_key("a\0b"),
            Err(KeyViolation::ControlCharacter { ch: '\0', offset: 1 })
        );
        assert!(validate_key("tab\there").is_err());
        assert!(validate_key("new\nline").is_err());
        assert!(validate_key("del\u{7f}").is_err());
    }

    #[test]
    fn check_key_wraps_invalid_key() {
        let err = check_key("b", "").unwrap_err();
        assert!(err.is(ErrorKind::InvalidKey));
        assert_eq!(err.to_string(), r#"object "" in bucket "b": invalid object key"#);
    }

    #[test]
    fn valid_bucket_names() {
        assert!(validate_bucket_name("abc").is_ok());
        assert!(validate_bucket_name("my-bucket").is_ok());
        assert!(validate_bucket_name("logs.2024.eu").is_ok());
        assert!(validate_bucket_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn reject_bucket_name_length() {
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn reject_bucket_name_characters() {
        assert!(validate_bucket_name("Upper").is_err());
        assert!(validate_bucket_name("under_score").is_err());
        assert!(validate_bucket_name("has/slash").is_err());
        assert!(validate_bucket_name("has space").is_err());
    }

    #[test]
    fn reject_bucket_name_boundaries() {
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("trailing-").is_err());
        assert!(validate_bucket_name(".dot").is_err());
        assert!(validate_bucket_name("a..b").is_err());
    }

    #[test]
    fn bucket_name_error_is_not_a_sentinel() {
        let err = validate_bucket_name("..").unwrap_err();
        assert!(matches!(err, StoreError::InvalidBucketName { .. }));
        assert_eq!(err.kind(), None);
    }
}
