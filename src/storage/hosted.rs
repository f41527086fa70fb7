//! Relational backend - SQLite-backed `posts` and `comments` tables
//!
//! Schema:
//!
//! ```text
//! posts(id TEXT PK, author, content, created_at INTEGER)
//! comments(id TEXT PK, post_id → posts(id) ON DELETE CASCADE, author, content, created_at)
//! ```
//!
//! Ordering is done by SQLite (`ORDER BY created_at`, rowid as tie-breaker).
//! Comment counts are one `COUNT(*)` per listed post.
//!
//! Every successful insert or delete is published on the store's
//! [`ChangeFeed`], which the API server forwards to WebSocket clients.

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, Subscription, Table};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{now_millis, Comment, CommentId, Post, PostId};
use crate::storage::{JournalStore, StoreKind};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY NOT NULL,
        author TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY NOT NULL,
        post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);
";

/// SQLite-backed journal with change notification
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    feed: ChangeFeed,
}

impl SqliteStore {
    /// Create or open a database file
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::from_connection(conn, Some(path))
    }

    /// Private database that lives as long as the store
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> StorageResult<Self> {
        // Cascading deletes only run with foreign keys enabled, per connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            feed: ChangeFeed::default(),
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Feed this store publishes its changes on
    pub fn change_feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Cheap liveness probe used by the health routes
    pub fn ping(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    fn select_posts(&self) -> StorageResult<Vec<Post>> {
        let conn = self.lock()?;

        let mut posts = {
            let mut stmt = conn.prepare_cached(
                "SELECT id, author, content, created_at FROM posts
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Post {
                    id: PostId::new(row.get::<_, String>(0)?),
                    author: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get(3)?,
                    comment_count: 0,
                })
            })?;
            let posts = rows.collect::<Result<Vec<_>, _>>()?;
            posts
        };

        let mut count_stmt =
            conn.prepare_cached("SELECT COUNT(*) FROM comments WHERE post_id = ?")?;
        for post in &mut posts {
            let count: i64 = count_stmt.query_row(params![post.id.as_str()], |row| row.get(0))?;
            post.comment_count = count.max(0) as usize;
        }

        Ok(posts)
    }

    fn insert_post(&self, author: &str, content: &str) -> StorageResult<Post> {
        let post = Post {
            id: PostId::new(Uuid::new_v4().to_string()),
            author: author.to_string(),
            content: content.to_string(),
            created_at: now_millis(),
            comment_count: 0,
        };

        self.lock()?.execute(
            "INSERT INTO posts (id, author, content, created_at) VALUES (?, ?, ?, ?)",
            params![post.id.as_str(), post.author, post.content, post.created_at],
        )?;

        Ok(post)
    }

    fn select_comments(&self, post_id: &PostId) -> StorageResult<Vec<Comment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, post_id, author, content, created_at FROM comments
             WHERE post_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![post_id.as_str()], |row| {
            Ok(Comment {
                id: CommentId::new(row.get::<_, String>(0)?),
                post_id: PostId::new(row.get::<_, String>(1)?),
                author: row.get(2)?,
                content: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let comments = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    fn insert_comment(
        &self,
        post_id: &PostId,
        author: &str,
        content: &str,
    ) -> StorageResult<Comment> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM posts WHERE id = ?",
                params![post_id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(StorageError::NotFound(format!("post {}", post_id)));
        }

        let comment = Comment {
            id: CommentId::new(Uuid::new_v4().to_string()),
            post_id: post_id.clone(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: now_millis(),
        };

        tx.execute(
            "INSERT INTO comments (id, post_id, author, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                comment.id.as_str(),
                comment.post_id.as_str(),
                comment.author,
                comment.content,
                comment.created_at
            ],
        )?;
        tx.commit()?;

        Ok(comment)
    }

    fn remove_post(&self, id: &PostId) -> StorageResult<()> {
        let removed = self
            .lock()?
            .execute("DELETE FROM posts WHERE id = ?", params![id.as_str()])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("post {}", id)));
        }
        Ok(())
    }

    fn remove_comment(&self, id: &CommentId) -> StorageResult<String> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let post_id: Option<String> = tx
            .query_row(
                "SELECT post_id FROM comments WHERE id = ?",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let post_id = post_id.ok_or_else(|| StorageError::NotFound(format!("comment {}", id)))?;

        tx.execute("DELETE FROM comments WHERE id = ?", params![id.as_str()])?;
        tx.commit()?;

        Ok(post_id)
    }
}

#[async_trait]
impl JournalStore for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    async fn list_posts(&self) -> StorageResult<Vec<Post>> {
        self.select_posts()
    }

    async fn create_post(&self, author: &str, content: &str) -> StorageResult<Post> {
        let post = self.insert_post(author, content)?;
        tracing::debug!(post_id = %post.id, author = %author, "Created post");
        self.feed
            .publish(ChangeEvent::post(ChangeKind::Insert, post.id.as_str()));
        Ok(post)
    }

    async fn list_comments(&self, post_id: &PostId) -> StorageResult<Vec<Comment>> {
        self.select_comments(post_id)
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        author: &str,
        content: &str,
    ) -> StorageResult<Comment> {
        let comment = self.insert_comment(post_id, author, content)?;
        tracing::debug!(post_id = %post_id, comment_id = %comment.id, "Added comment");
        self.feed.publish(ChangeEvent::comment(
            ChangeKind::Insert,
            comment.id.as_str(),
            post_id.as_str(),
        ));
        Ok(comment)
    }

    async fn delete_post(&self, id: &PostId) -> StorageResult<()> {
        self.remove_post(id)?;
        tracing::info!(post_id = %id, "Deleted post");
        self.feed
            .publish(ChangeEvent::post(ChangeKind::Delete, id.as_str()));
        Ok(())
    }

    async fn delete_comment(&self, id: &CommentId) -> StorageResult<()> {
        let post_id = self.remove_comment(id)?;
        tracing::info!(comment_id = %id, post_id = %post_id, "Deleted comment");
        self.feed
            .publish(ChangeEvent::comment(ChangeKind::Delete, id.as_str(), post_id));
        Ok(())
    }

    async fn subscribe(&self, table: Table) -> StorageResult<Option<Subscription>> {
        Ok(Some(self.feed.subscribe(table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_then_list_puts_new_post_first() {
        let store = SqliteStore::open_in_memory().unwrap();

        store.create_post("귀연", "older").await.unwrap();
        let post = store.create_post("소영", "hello").await.unwrap();

        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, post.id);
        assert_eq!(posts[0].author, "소영");
        assert_eq!(posts[0].content, "hello");
        assert_eq!(posts[0].comment_count, 0);
    }

    #[tokio::test]
    async fn test_comment_counts_and_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = store.create_post("소영", "hello").await.unwrap();
        let other = store.create_post("귀연", "other").await.unwrap();

        for i in 0..4 {
            store
                .add_comment(&post.id, "귀연", &format!("c{}", i))
                .await
                .unwrap();
        }
        store.add_comment(&other.id, "소영", "x").await.unwrap();

        let comments = store.list_comments(&post.id).await.unwrap();
        let contents: Vec<_> = comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["c0", "c1", "c2", "c3"]);
        assert!(comments.iter().all(|c| c.post_id == post.id));

        let posts = store.list_posts().await.unwrap();
        let counts: Vec<_> = posts.iter().map(|p| (p.content.as_str(), p.comment_count)).collect();
        assert_eq!(counts, vec![("other", 1), ("hello", 4)]);
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = store.create_post("소영", "bye").await.unwrap();
        store.add_comment(&post.id, "귀연", "hi").await.unwrap();

        store.delete_post(&post.id).await.unwrap();

        assert!(store.list_posts().await.unwrap().is_empty());
        assert!(store.list_comments(&post.id).await.unwrap().is_empty());

        let conn = store.lock().unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_delete_comment() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = store.create_post("소영", "hello").await.unwrap();
        let keep = store.add_comment(&post.id, "귀연", "keep").await.unwrap();
        let gone = store.add_comment(&post.id, "귀연", "gone").await.unwrap();

        store.delete_comment(&gone.id).await.unwrap();

        let comments = store.list_comments(&post.id).await.unwrap();
        assert_eq!(comments, vec![keep]);
        assert_eq!(store.list_posts().await.unwrap()[0].comment_count, 1);
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();

        let err = store
            .add_comment(&PostId::new("missing"), "귀연", "hi")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        assert!(store
            .delete_post(&PostId::new("missing"))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .delete_comment(&CommentId::new("missing"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_mutations_publish_changes() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut posts = store.subscribe(Table::Posts).await.unwrap().unwrap();
        let mut comments = store.subscribe(Table::Comments).await.unwrap().unwrap();

        let post = store.create_post("소영", "hello").await.unwrap();
        let comment = store.add_comment(&post.id, "귀연", "hi").await.unwrap();
        store.delete_comment(&comment.id).await.unwrap();
        store.delete_post(&post.id).await.unwrap();

        let event = posts.recv().await.unwrap();
        assert_eq!(event, ChangeEvent::post(ChangeKind::Insert, post.id.as_str()));
        let event = posts.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);

        let event = comments.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.post_id.as_deref(), Some(post.id.as_str()));
        let event = comments.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.id, comment.id.as_str());
    }

    #[tokio::test]
    async fn test_failed_write_publishes_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut comments = store.subscribe(Table::Comments).await.unwrap().unwrap();

        assert!(store
            .add_comment(&PostId::new("missing"), "귀연", "hi")
            .await
            .is_err());

        let post = store.create_post("소영", "hello").await.unwrap();
        store.add_comment(&post.id, "귀연", "hi").await.unwrap();

        // The first comment event seen is the successful one.
        let event = comments.recv().await.unwrap();
        assert_eq!(event.post_id.as_deref(), Some(post.id.as_str()));
    }

    #[tokio::test]
    async fn test_reopen_file_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("keepsake.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let post = store.create_post("소영", "hello").await.unwrap();
            store.add_comment(&post.id, "귀연", "hi").await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let posts = store.list_posts().await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comment_count, 1);
        store.ping().unwrap();
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.create_post("귀연", &i.to_string()).await.unwrap();
        }
        assert_eq!(
            store.list_posts().await.unwrap(),
            store.list_posts().await.unwrap()
        );
    }
}
