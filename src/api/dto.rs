//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON, by the server
//! handlers and by the remote backend on the other end of the wire.

use serde::{Deserialize, Serialize};

use crate::storage::{Comment, Post};

// ============================================
// POST DTOs
// ============================================

/// Create post request
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePostRequest {
    /// Display name of the author
    pub author: String,
    /// Post body
    pub content: String,
}

/// Post list response
#[derive(Debug, Serialize, Deserialize)]
pub struct PostListResponse {
    /// Posts, most recent first
    pub posts: Vec<Post>,
    /// Total count
    pub total: usize,
}

impl From<Vec<Post>> for PostListResponse {
    fn from(posts: Vec<Post>) -> Self {
        Self {
            total: posts.len(),
            posts,
        }
    }
}

// ============================================
// COMMENT DTOs
// ============================================

/// Create comment request
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub author: String,
    pub content: String,
}

/// Comment list response
#[derive(Debug, Serialize, Deserialize)]
pub struct CommentListResponse {
    /// Comments, oldest first
    pub comments: Vec<Comment>,
    pub total: usize,
}

impl From<Vec<Comment>> for CommentListResponse {
    fn from(comments: Vec<Comment>) -> Self {
        Self {
            total: comments.len(),
            comments,
        }
    }
}

// ============================================
// ERROR DTOs
// ============================================

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", "unhealthy"
    pub status: String,
    /// Version string
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Component health checks
    pub checks: HealthChecks,
}

/// Individual component health checks
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database health
    pub database: ComponentHealth,
    /// Realtime channel health
    pub realtime: ComponentHealth,
}

/// Health status of a single component
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Status: "healthy", "degraded", "unhealthy"
    pub status: String,
    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Simple liveness/readiness response
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}
