//! Key-value storage backends
//!
//! - `FileStorage`: one JSON map per app under the platform data dir (native)
//! - `MemoryStorage`: volatile fallback, also handy for tests
//!
//! The browser backend (`localStorage`) lives in `crate::wasm::storage`.

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::SdkResult;

#[async_trait(?Send)]
pub trait KeyValueStorage {
    async fn get_item(&self, key: &str) -> SdkResult<Option<String>>;
    async fn set_item(&self, key: &str, value: &str) -> SdkResult<()>;
    async fn remove_item(&self, key: &str) -> SdkResult<()>;
    async fn keys_with_prefix(&self, prefix: &str) -> SdkResult<Vec<String>>;
    /// False when values are lost on restart.
    fn is_persistent(&self) -> bool;
}

/// In-memory storage. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

#[async_trait(?Send)]
impl KeyValueStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> SdkResult<Option<String>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> SdkResult<()> {
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> SdkResult<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> SdkResult<Vec<String>> {
        Ok(self
            .items
            .borrow()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(feature = "native")]
pub use file::{resolve_root, FileStorage, ROOT_ENV};

#[cfg(feature = "native")]
mod file {
    use super::*;
    use crate::error::SdkError;
    use std::path::{Path, PathBuf};

    /// Overrides the storage root directory.
    pub const ROOT_ENV: &str = "CROSSWALLET_ROOT";

    const FILE_NAME: &str = "storage.json";

    /// Root precedence: explicit path, then `CROSSWALLET_ROOT`, then the local data dir.
    pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// File-backed storage. The whole map is cached and rewritten on every mutation;
    /// the cache only changes once the write has landed.
    #[derive(Clone)]
    pub struct FileStorage {
        path: PathBuf,
        items: Rc<RefCell<BTreeMap<String, String>>>,
    }

    impl FileStorage {
        pub fn open(root: &Path, app: &str) -> SdkResult<Self> {
            let dir = root.join(app);
            std::fs::create_dir_all(&dir)
                .map_err(|e| SdkError::Storage(format!("mkdir {}: {e}", dir.display())))?;
            let path = dir.join(FILE_NAME);
            let items = if path.exists() {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| SdkError::Storage(format!("read: {e}")))?;
                if raw.trim().is_empty() {
                    BTreeMap::new()
                } else {
                    serde_json::from_str(&raw)?
                }
            } else {
                BTreeMap::new()
            };
            tracing::debug!(path = %path.display(), entries = items.len(), "file storage opened");
            Ok(Self { path, items: Rc::new(RefCell::new(items)) })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Persist `next`, then make it the cached map.
        fn commit(&self, next: BTreeMap<String, String>) -> SdkResult<()> {
            let raw = serde_json::to_string_pretty(&next)?;
            let tmp = self.path.with_extension("json.tmp");
            std::fs::write(&tmp, raw).map_err(|e| SdkError::Storage(format!("write: {e}")))?;
            std::fs::rename(&tmp, &self.path).map_err(|e| SdkError::Storage(format!("rename: {e}")))?;
            *self.items.borrow_mut() = next;
            Ok(())
        }
    }

    #[async_trait(?Send)]
    impl KeyValueStorage for FileStorage {
        async fn get_item(&self, key: &str) -> SdkResult<Option<String>> {
            Ok(self.items.borrow().get(key).cloned())
        }

        async fn set_item(&self, key: &str, value: &str) -> SdkResult<()> {
            let mut next = self.items.borrow().clone();
            next.insert(key.to_string(), value.to_string());
            self.commit(next)
        }

        async fn remove_item(&self, key: &str) -> SdkResult<()> {
            let mut next = self.items.borrow().clone();
            if next.remove(key).is_none() {
                return Ok(());
            }
            self.commit(next)
        }

        async fn keys_with_prefix(&self, prefix: &str) -> SdkResult<Vec<String>> {
            Ok(self
                .items
                .borrow()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        fn is_persistent(&self) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        storage.set_item("a.one", "1").await.unwrap();
        storage.set_item("a.two", "2").await.unwrap();
        storage.set_item("b.one", "3").await.unwrap();

        assert_eq!(storage.get_item("a.one").await.unwrap().as_deref(), Some("1"));
        assert_eq!(storage.keys_with_prefix("a.").await.unwrap(), vec!["a.one", "a.two"]);

        storage.remove_item("a.one").await.unwrap();
        assert!(storage.get_item("a.one").await.unwrap().is_none());
        assert!(!storage.is_persistent());
    }

    #[tokio::test]
    async fn test_memory_storage_clones_share_state() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        storage.set_item("k", "v").await.unwrap();
        assert_eq!(clone.get_item("k").await.unwrap().as_deref(), Some("v"));
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        {
            let storage = FileStorage::open(dir.path(), "app").unwrap();
            storage.set_item("k", "v").await.unwrap();
            storage.set_item("gone", "x").await.unwrap();
            storage.remove_item("gone").await.unwrap();
            assert!(storage.is_persistent());
        }
        let reopened = FileStorage::open(dir.path(), "app").unwrap();
        assert_eq!(reopened.get_item("k").await.unwrap().as_deref(), Some("v"));
        assert!(reopened.get_item("gone").await.unwrap().is_none());
        assert!(reopened.path().ends_with("app/storage.json"));
    }

    #[cfg(feature = "native")]
    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        use crate::error::SdkError;

        let dir = tempfile::TempDir::new().expect("tempdir");
        let storage = FileStorage::open(dir.path(), "app").unwrap();
        storage.set_item("kept", "1").await.unwrap();

        // a directory where the temp file should go makes every write fail
        std::fs::create_dir(storage.path().with_extension("json.tmp")).unwrap();

        assert!(matches!(storage.set_item("k", "v").await, Err(SdkError::Storage(_))));
        assert!(storage.get_item("k").await.unwrap().is_none());

        assert!(storage.remove_item("kept").await.is_err());
        assert_eq!(storage.get_item("kept").await.unwrap().as_deref(), Some("1"));

        let reopened = FileStorage::open(dir.path(), "app").unwrap();
        assert!(reopened.get_item("k").await.unwrap().is_none());
        assert_eq!(reopened.get_item("kept").await.unwrap().as_deref(), Some("1"));
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_resolve_root_prefers_explicit() {
        let explicit = std::path::Path::new("/tmp/explicit");
        assert_eq!(resolve_root(Some(explicit)), explicit.to_path_buf());
    }
}
