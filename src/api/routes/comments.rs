//! Comment Routes
//!
//! - GET /api/v1/posts/:id/comments - Comments of a post, oldest first
//! - POST /api/v1/posts/:id/comments - Add a comment
//! - DELETE /api/v1/comments/:id - Delete a comment

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::posts::required;
use crate::api::dto::{CommentListResponse, CreateCommentRequest};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::storage::{Comment, CommentId, JournalStore, PostId};

/// GET /api/v1/posts/:id/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> ApiResult<Json<CommentListResponse>> {
    let comments = state.store.list_comments(&PostId::new(post_id)).await?;
    Ok(Json(comments.into()))
}

/// POST /api/v1/posts/:id/comments
///
/// 404 when the post does not exist.
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let author = required("author", &req.author)?;
    let content = required("content", &req.content)?;

    let comment = state
        .store
        .add_comment(&PostId::new(post_id), author, content)
        .await?;

    tracing::info!(
        comment_id = %comment.id,
        post_id = %comment.post_id,
        "Comment added"
    );

    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /api/v1/comments/:id
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = CommentId::new(id);
    state.store.delete_comment(&id).await?;

    tracing::info!(comment_id = %id, "Comment deleted");

    Ok(StatusCode::NO_CONTENT)
}
