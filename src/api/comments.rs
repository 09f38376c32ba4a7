//! Comment API endpoints
//!
//! - GET /api/v1/articles/{slug}/comments - Threads of a published article
//! - POST /api/v1/articles/{slug}/comments - Add a comment or reply
//! - DELETE /api/v1/comments/{id} - Delete a comment and its replies

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Comment, CommentThread, CreateCommentInput};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/articles/{slug}/comments", get(list_comments))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/articles/{slug}/comments", post(create_comment))
        .route("/comments/{id}", delete(delete_comment))
}

/// GET /api/v1/articles/{slug}/comments
async fn list_comments(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Vec<CommentThread>>, ApiError> {
    let threads = state.engagement_service.list_comments(&slug).await?;
    Ok(Json(threads))
}

/// POST /api/v1/articles/{slug}/comments
async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .engagement_service
        .add_comment(&user.0, &slug, body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /api/v1/comments/{id}
async fn delete_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.engagement_service.delete_comment(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
