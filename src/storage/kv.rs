//! Key/value namespaces for the local backend
//!
//! A namespace offers exactly three operations: `get`, `set` (whole-value
//! replacement) and `list` (prefix scan over keys). Two implementations:
//!
//! - [`MemoryNamespace`]: process memory, used by tests and throwaway sessions
//! - [`FileNamespace`]: one file per key in a data directory

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::error::{StorageError, StorageResult};

/// File extension for values written by [`FileNamespace`]
const VALUE_EXTENSION: &str = "json";

/// A flat string-to-string namespace
#[async_trait]
pub trait KeyValueNamespace: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// All keys starting with `prefix`, in lexical order
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// In-memory namespace
#[derive(Debug, Default)]
pub struct MemoryNamespace {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryNamespace {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueNamespace for MemoryNamespace {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Directory-backed namespace
///
/// Each key maps to `<dir>/<url-encoded key>.json`. Writes go to a temporary
/// file first and are renamed into place, so a reader never observes a
/// half-written value.
#[derive(Debug, Clone)]
pub struct FileNamespace {
    dir: PathBuf,
}

impl FileNamespace {
    /// Open (and create if needed) a namespace rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), VALUE_EXTENSION))
    }

    fn key_for(file_name: &str) -> Option<String> {
        let encoded = file_name.strip_suffix(&format!(".{}", VALUE_EXTENSION))?;
        urlencoding::decode(encoded).ok().map(|k| k.into_owned())
    }
}

#[async_trait]
impl KeyValueNamespace for FileNamespace {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(key) = Self::key_for(name) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_prefix_scan() {
        let ns = MemoryNamespace::new();
        ns.set("post:2", "b").await.unwrap();
        ns.set("post:1", "a").await.unwrap();
        ns.set("settings", "x").await.unwrap();
        ns.set("postscript", "y").await.unwrap();

        let keys = ns.list("post:").await.unwrap();
        assert_eq!(keys, vec!["post:1", "post:2"]);
        assert_eq!(ns.get("post:1").await.unwrap().as_deref(), Some("a"));
        assert_eq!(ns.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_set_replaces_whole_value() {
        let ns = MemoryNamespace::new();
        ns.set("k", "first").await.unwrap();
        ns.set("k", "second").await.unwrap();
        assert_eq!(ns.get("k").await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_file_namespace_round_trip() {
        let dir = tempdir().unwrap();
        let ns = FileNamespace::open(dir.path()).await.unwrap();

        ns.set("post:1700000000000", r#"{"author":"귀연"}"#)
            .await
            .unwrap();
        ns.set("other:1", "{}").await.unwrap();

        let keys = ns.list("post:").await.unwrap();
        assert_eq!(keys, vec!["post:1700000000000"]);

        let value = ns.get("post:1700000000000").await.unwrap().unwrap();
        assert!(value.contains("귀연"));
        assert_eq!(ns.get("post:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_namespace_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let ns = FileNamespace::open(dir.path()).await.unwrap();
            ns.set("post:1", "kept").await.unwrap();
        }
        let ns = FileNamespace::open(dir.path()).await.unwrap();
        assert_eq!(ns.get("post:1").await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn test_file_namespace_concurrent_writers_last_wins() {
        let dir = tempdir().unwrap();
        let a = FileNamespace::open(dir.path()).await.unwrap();
        let b = FileNamespace::open(dir.path()).await.unwrap();

        let writes = (0..20).map(|i| {
            let ns = if i % 2 == 0 { a.clone() } else { b.clone() };
            tokio::spawn(async move { ns.set("post:1", &i.to_string()).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        let value = a.get("post:1").await.unwrap().unwrap();
        assert!(value.parse::<u32>().unwrap() < 20);
        assert_eq!(a.list("post:").await.unwrap(), vec!["post:1"]);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_file_namespace_ignores_temp_files() {
        let dir = tempdir().unwrap();
        let ns = FileNamespace::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("post%3A9.tmp"), "partial").unwrap();
        assert!(ns.list("post:").await.unwrap().is_empty());
    }
}
