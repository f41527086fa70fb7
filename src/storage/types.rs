//! Core data types for the Keepsake journal
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Post`: A top-level journal entry with its comment count
//! - `Comment`: A reply attached to exactly one post
//! - `StoredPost` / `StoredComment`: The self-contained value the local
//!   backend keeps under `post:<id>`, comments embedded

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key prefix for posts in a key/value namespace
pub const POST_KEY_PREFIX: &str = "post:";

/// Identifier of a post, unique within the post collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

/// Identifier of a comment, unique within its collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(PostId);
string_id!(CommentId);

impl PostId {
    /// Key under which the local backend stores this post
    pub fn storage_key(&self) -> String {
        format!("{}{}", POST_KEY_PREFIX, self.0)
    }
}

/// A journal entry as shown in the post list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author: String,
    pub content: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    #[serde(default)]
    pub comment_count: usize,
}

impl Post {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

/// A reply attached to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: String,
    pub content: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl Comment {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

/// Serialized form of a post in the local backend
///
/// The field names match what the browser build of the journal wrote, so
/// existing exports load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPost {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default)]
    pub comments: Vec<StoredComment>,
}

/// Serialized form of a comment embedded in a `StoredPost`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredComment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: i64,
}

impl StoredPost {
    pub fn new(id: String, author: &str, content: &str, timestamp: i64) -> Self {
        Self {
            id,
            author: author.to_string(),
            content: content.to_string(),
            timestamp,
            comments: Vec::new(),
        }
    }

    pub fn post_id(&self) -> PostId {
        PostId::new(self.id.clone())
    }

    /// List view of this post
    pub fn to_post(&self) -> Post {
        Post {
            id: self.post_id(),
            author: self.author.clone(),
            content: self.content.clone(),
            created_at: self.timestamp,
            comment_count: self.comments.len(),
        }
    }

    /// Embedded comments in the order they were added
    pub fn to_comments(&self) -> Vec<Comment> {
        let post_id = self.post_id();
        self.comments
            .iter()
            .map(|c| c.to_comment(&post_id))
            .collect()
    }
}

impl StoredComment {
    pub fn to_comment(&self, post_id: &PostId) -> Comment {
        Comment {
            id: CommentId::new(self.id.clone()),
            post_id: post_id.clone(),
            author: self.author.clone(),
            content: self.content.clone(),
            created_at: self.timestamp,
        }
    }
}

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Most recent first, ties broken by the larger id
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
