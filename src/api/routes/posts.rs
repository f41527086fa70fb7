//! Post Routes
//!
//! - GET /api/v1/posts - List posts, most recent first
//! - POST /api/v1/posts - Create a post
//! - DELETE /api/v1/posts/:id - Delete a post and its comments

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::dto::{CreatePostRequest, PostListResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::{JournalStore, Post, PostId};

/// GET /api/v1/posts
pub async fn list_posts(State(state): State<Arc<AppState>>) -> ApiResult<Json<PostListResponse>> {
    let posts = state.store.list_posts().await?;
    Ok(Json(posts.into()))
}

/// POST /api/v1/posts
///
/// Returns 201 with the stored post.
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    let author = required("author", &req.author)?;
    let content = required("content", &req.content)?;

    let post = state.store.create_post(author, content).await?;

    tracing::info!(post_id = %post.id, author = %post.author, "Post created");

    Ok((StatusCode::CREATED, Json(post)))
}

/// DELETE /api/v1/posts/:id
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = PostId::new(id);
    state.store.delete_post(&id).await?;

    tracing::info!(post_id = %id, "Post deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// A required text field, rejected when blank and otherwise kept as sent
pub(crate) fn required<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(value)
}
