//! Keepsake Storage
//!
//! One storage capability, [`JournalStore`], with three backends selected at
//! construction time:
//!
//! - **local**: posts serialized whole into a key/value namespace
//!   (`post:<id>` → post with embedded comments)
//! - **sqlite**: relational `posts` / `comments` tables with cascading delete
//!   and a change feed; this is what the hosted API serves
//! - **remote**: HTTP client of the hosted API, realtime over WebSocket
//!
//! # Modules
//!
//! - **types**: Posts, comments and the local wire format
//! - **kv**: Key/value namespaces used by the local backend
//! - **local** / **hosted** / **remote**: the three backends
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use keepsake::storage::{JournalStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::open_in_memory()?;
//!
//!     let post = store.create_post("소영", "hello").await?;
//!     store.add_comment(&post.id, "귀연", "hi").await?;
//!
//!     let posts = store.list_posts().await?;
//!     assert_eq!(posts[0].comment_count, 1);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod hosted;
pub mod kv;
pub mod local;
pub mod remote;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use hosted::SqliteStore;
pub use kv::{FileNamespace, KeyValueNamespace, MemoryNamespace};
pub use local::LocalStore;
pub use remote::RemoteStore;
pub use types::{Comment, CommentId, Post, PostId, StoredComment, StoredPost};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::{BackendKind, StorageConfig};
use crate::feed::{Subscription, Table};

/// Which backend a store talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Local,
    Sqlite,
    Remote,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Local => "local",
            StoreKind::Sqlite => "sqlite",
            StoreKind::Remote => "remote",
        }
    }

    /// Relational backends (direct or over HTTP)
    pub fn is_hosted(&self) -> bool {
        !matches!(self, StoreKind::Local)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage capability shared by every backend
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Backend identity
    fn kind(&self) -> StoreKind;

    /// Whether `delete_post` / `delete_comment` are available
    fn supports_delete(&self) -> bool {
        self.kind().is_hosted()
    }

    /// All posts, most recent first, with comment counts
    async fn list_posts(&self) -> StorageResult<Vec<Post>>;

    /// Create a post authored by `author`
    async fn create_post(&self, author: &str, content: &str) -> StorageResult<Post>;

    /// Comments of a post, oldest first
    async fn list_comments(&self, post_id: &PostId) -> StorageResult<Vec<Comment>>;

    /// Append a comment to a post
    async fn add_comment(
        &self,
        post_id: &PostId,
        author: &str,
        content: &str,
    ) -> StorageResult<Comment>;

    /// Delete a post together with its comments
    async fn delete_post(&self, id: &PostId) -> StorageResult<()>;

    /// Delete a single comment
    async fn delete_comment(&self, id: &CommentId) -> StorageResult<()>;

    /// Open a change subscription for `table`
    ///
    /// Backends without change notification return `Ok(None)`.
    async fn subscribe(&self, table: Table) -> StorageResult<Option<Subscription>>;
}

/// Construct the backend selected by `config`
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn JournalStore>> {
    let store: Arc<dyn JournalStore> = match config.backend {
        BackendKind::Local => {
            let namespace = FileNamespace::open(&config.data_dir).await?;
            tracing::info!(dir = %config.data_dir, "Opened local journal");
            Arc::new(LocalStore::new(Arc::new(namespace)))
        }
        BackendKind::Sqlite => {
            let store = SqliteStore::open(&config.database_path)?;
            tracing::info!(path = %config.database_path, "Opened sqlite journal");
            Arc::new(store)
        }
        BackendKind::Remote => {
            let store = RemoteStore::new(config.remote_options())?;
            tracing::info!(url = %config.api_url, "Using remote journal");
            Arc::new(store)
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_store_kind() {
        assert!(!StoreKind::Local.is_hosted());
        assert!(StoreKind::Sqlite.is_hosted());
        assert!(StoreKind::Remote.is_hosted());
        assert_eq!(StoreKind::Remote.to_string(), "remote");
    }

    #[tokio::test]
    async fn test_open_store_by_backend() {
        let dir = tempdir().unwrap();

        let mut config = StorageConfig::default();
        config.data_dir = dir.path().join("local").to_string_lossy().to_string();
        config.database_path = dir.path().join("keepsake.db").to_string_lossy().to_string();

        config.backend = BackendKind::Local;
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.kind(), StoreKind::Local);
        assert!(!store.supports_delete());

        config.backend = BackendKind::Sqlite;
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.kind(), StoreKind::Sqlite);
        assert!(store.supports_delete());
    }
}
