//! Local backend
//!
//! Keeps every post as one self-contained JSON value under `post:<id>` in a
//! [`KeyValueNamespace`]. Comments live inside their post, so adding one is a
//! read-modify-write of the whole value.
//!
//! Writers sharing one `LocalStore` are serialized by an internal lock. Two
//! stores over the same namespace (two processes on one data directory) are
//! not coordinated: the last write wins and the other update is lost.
//!
//! This backend has no deletion and no change notification.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::feed::{Subscription, Table};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::kv::{KeyValueNamespace, MemoryNamespace};
use crate::storage::types::{
    now_millis, sort_newest_first, Comment, CommentId, Post, PostId, StoredComment, StoredPost,
    POST_KEY_PREFIX,
};
use crate::storage::{JournalStore, StoreKind};

/// Journal stored in a key/value namespace
pub struct LocalStore {
    namespace: Arc<dyn KeyValueNamespace>,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(namespace: Arc<dyn KeyValueNamespace>) -> Self {
        Self {
            namespace,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by process memory
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryNamespace::new()))
    }

    async fn read_post(&self, id: &PostId) -> StorageResult<StoredPost> {
        let value = self
            .namespace
            .get(&id.storage_key())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("post {}", id)))?;
        Ok(serde_json::from_str(&value)?)
    }

    async fn write_post(&self, post: &StoredPost) -> StorageResult<()> {
        let value = serde_json::to_string(post)?;
        self.namespace
            .set(&post.post_id().storage_key(), &value)
            .await
    }

    /// First free millisecond id at or after `now`
    async fn next_post_id(&self, now: i64) -> StorageResult<i64> {
        let mut candidate = now;
        while self
            .namespace
            .get(&PostId::new(candidate.to_string()).storage_key())
            .await?
            .is_some()
        {
            candidate += 1;
        }
        Ok(candidate)
    }
}

/// First free millisecond id at or after `now` among `comments`
fn next_comment_id(comments: &[StoredComment], now: i64) -> i64 {
    let mut candidate = now;
    while comments.iter().any(|c| c.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate
}

#[async_trait]
impl JournalStore for LocalStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Local
    }

    fn supports_delete(&self) -> bool {
        false
    }

    async fn list_posts(&self) -> StorageResult<Vec<Post>> {
        let keys = self.namespace.list(POST_KEY_PREFIX).await?;
        let mut posts = Vec::with_capacity(keys.len());

        for key in keys {
            let value = match self.namespace.get(&key).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable post");
                    continue;
                }
            };
            match serde_json::from_str::<StoredPost>(&value) {
                Ok(stored) => posts.push(stored.to_post()),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping unreadable post");
                }
            }
        }

        sort_newest_first(&mut posts);
        Ok(posts)
    }

    async fn create_post(&self, author: &str, content: &str) -> StorageResult<Post> {
        let _guard = self.write_lock.lock().await;

        let timestamp = self.next_post_id(now_millis()).await?;
        let stored = StoredPost::new(timestamp.to_string(), author, content, timestamp);
        self.write_post(&stored).await?;

        tracing::debug!(post_id = %stored.id, author = %author, "Created post");
        Ok(stored.to_post())
    }

    async fn list_comments(&self, post_id: &PostId) -> StorageResult<Vec<Comment>> {
        Ok(self.read_post(post_id).await?.to_comments())
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        author: &str,
        content: &str,
    ) -> StorageResult<Comment> {
        let _guard = self.write_lock.lock().await;

        let mut stored = self.read_post(post_id).await?;
        let timestamp = next_comment_id(&stored.comments, now_millis());
        let comment = StoredComment {
            id: timestamp.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            timestamp,
        };
        stored.comments.push(comment.clone());
        self.write_post(&stored).await?;

        tracing::debug!(post_id = %post_id, comment_id = %comment.id, "Added comment");
        Ok(comment.to_comment(post_id))
    }

    async fn delete_post(&self, _id: &PostId) -> StorageResult<()> {
        Err(StorageError::Unsupported {
            operation: "delete_post",
            backend: "local",
        })
    }

    async fn delete_comment(&self, _id: &CommentId) -> StorageResult<()> {
        Err(StorageError::Unsupported {
            operation: "delete_comment",
            backend: "local",
        })
    }

    async fn subscribe(&self, _table: Table) -> StorageResult<Option<Subscription>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::FileNamespace;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_then_list_puts_new_post_first() {
        let store = LocalStore::in_memory();

        store.create_post("귀연", "first").await.unwrap();
        let second = store.create_post("소영", "hello").await.unwrap();

        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, second.id);
        assert_eq!(posts[0].author, "소영");
        assert_eq!(posts[0].content, "hello");
        assert_eq!(posts[0].comment_count, 0);
    }

    #[tokio::test]
    async fn test_ids_unique_within_same_millisecond() {
        let store = LocalStore::in_memory();

        let mut ids = std::collections::HashSet::new();
        for i in 0..20 {
            let post = store.create_post("귀연", &format!("post {}", i)).await.unwrap();
            assert!(ids.insert(post.id));
        }
        assert_eq!(store.list_posts().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_comments_keep_insertion_order() {
        let store = LocalStore::in_memory();
        let post = store.create_post("소영", "hello").await.unwrap();

        for i in 0..5 {
            store
                .add_comment(&post.id, "귀연", &format!("comment {}", i))
                .await
                .unwrap();
        }

        let comments = store.list_comments(&post.id).await.unwrap();
        let contents: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["comment 0", "comment 1", "comment 2", "comment 3", "comment 4"]
        );

        let ids: std::collections::HashSet<_> = comments.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), 5);

        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts[0].comment_count, 5);
    }

    #[tokio::test]
    async fn test_comment_on_missing_post() {
        let store = LocalStore::in_memory();
        let err = store
            .add_comment(&PostId::new("404"), "귀연", "hi")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deletion_unsupported() {
        let store = LocalStore::in_memory();
        let post = store.create_post("귀연", "keep me").await.unwrap();

        let err = store.delete_post(&post.id).await.unwrap_err();
        assert!(matches!(err, StorageError::Unsupported { .. }));
        assert!(!store.supports_delete());
        assert_eq!(store.list_posts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let dir = tempdir().unwrap();
        let namespace = FileNamespace::open(dir.path()).await.unwrap();
        let store = LocalStore::new(Arc::new(namespace));
        store.create_post("소영", "still here").await.unwrap();

        std::fs::write(dir.path().join("post%3A1.json"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(dir.path().join("post%3A2.json"), "{not json").unwrap();

        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, "still here");
    }

    #[tokio::test]
    async fn test_no_change_feed() {
        let store = LocalStore::in_memory();
        assert!(store.subscribe(Table::Posts).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let store = LocalStore::in_memory();
        for i in 0..3 {
            store.create_post("소영", &format!("{}", i)).await.unwrap();
        }
        let first = store.list_posts().await.unwrap();
        let second = store.list_posts().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unreadable_entries_are_skipped() {
        let namespace = Arc::new(MemoryNamespace::new());
        namespace.set("post:1", "not json").await.unwrap();
        let store = LocalStore::new(namespace);

        store.create_post("귀연", "ok").await.unwrap();
        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, "ok");
    }

    #[tokio::test]
    async fn test_separate_stores_last_write_wins() {
        let namespace: Arc<dyn KeyValueNamespace> = Arc::new(MemoryNamespace::new());
        let a = LocalStore::new(Arc::clone(&namespace));
        let b = LocalStore::new(Arc::clone(&namespace));

        let post = a.create_post("소영", "shared").await.unwrap();

        // Both read the same value before either writes back.
        let mut from_a = a.read_post(&post.id).await.unwrap();
        let mut from_b = b.read_post(&post.id).await.unwrap();
        from_a.comments.push(StoredComment {
            id: "1".into(),
            author: "소영".into(),
            content: "from a".into(),
            timestamp: 1,
        });
        from_b.comments.push(StoredComment {
            id: "2".into(),
            author: "귀연".into(),
            content: "from b".into(),
            timestamp: 2,
        });
        a.write_post(&from_a).await.unwrap();
        b.write_post(&from_b).await.unwrap();

        let comments = a.list_comments(&post.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "from b");
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempdir().unwrap();
        let post_id = {
            let ns = FileNamespace::open(dir.path()).await.unwrap();
            let store = LocalStore::new(Arc::new(ns));
            let post = store.create_post("소영", "hello").await.unwrap();
            store.add_comment(&post.id, "귀연", "hi").await.unwrap();
            post.id
        };

        let ns = FileNamespace::open(dir.path()).await.unwrap();
        let store = LocalStore::new(Arc::new(ns));
        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comment_count, 1);

        let comments = store.list_comments(&post_id).await.unwrap();
        assert_eq!(comments[0].content, "hi");
    }
}
