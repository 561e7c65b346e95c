use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stowage_core::{Owner, StoreError, StoreResult, DEFAULT_MAX_KEYS};

/// Configuration for [`FsObjectStore`](crate::FsObjectStore).
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// root = "/var/lib/stowage"
/// max_keys = 250
///
/// [owner]
/// id = "1001"
/// display_name = "backup"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsStoreConfig {
    /// Directory holding one subdirectory per bucket.
    pub root: PathBuf,
    /// Entries per listing page.
    pub max_keys: usize,
    /// Create `root` when it does not exist yet.
    pub create_root: bool,
    /// `fsync` staged files before renaming them into place.
    pub sync_data: bool,
    /// Recorded as the owner of newly created buckets.
    pub owner: Option<Owner>,
}

impl Default for FsStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_keys: DEFAULT_MAX_KEYS,
            create_root: true,
            sync_data: false,
            owner: None,
        }
    }
}

impl FsStoreConfig {
    /// Default configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse a TOML configuration document.
    pub fn from_toml(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_sync_data(mut self, sync_data: bool) -> Self {
        self.sync_data = sync_data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = FsStoreConfig::default();
        assert_eq!(c.root, PathBuf::from("."));
        assert_eq!(c.max_keys, 1000);
        assert!(c.create_root);
        assert!(!c.sync_data);
        assert!(c.owner.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = FsStoreConfig::from_toml(
            r#"
            root = "/srv/objects"
            max_keys = 50
            "#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/srv/objects"));
        assert_eq!(c.max_keys, 50);
        assert!(c.create_root);
    }

    #[test]
    fn owner_table() {
        let c = FsStoreConfig::from_toml(
            r#"
            [owner]
            id = "1001"
            display_name = "backup"
            "#,
        )
        .unwrap();
        assert_eq!(c.owner, Some(Owner::new("1001", "backup")));
    }

    #[test]
    fn malformed_toml_is_a_serialization_error() {
        let err = FsStoreConfig::from_toml("max_keys = \"many\"").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stowage.toml");
        std::fs::write(&path, "sync_data = true\n").unwrap();
        let c = FsStoreConfig::load(&path).unwrap();
        assert!(c.sync_data);
    }

    #[test]
    fn builders() {
        let c = FsStoreConfig::new("/tmp/x").with_max_keys(0).with_sync_data(true);
        assert_eq!(c.max_keys, 1);
        assert!(c.sync_data);
    }
}
