//! Article API endpoints
//!
//! Handles HTTP requests for articles and the approval workflow:
//! - GET /api/v1/articles - Role-aware feed (optional auth)
//! - GET /api/v1/articles/search - Search published articles
//! - GET /api/v1/articles/{slug} - Display an article (optional auth)
//! - POST /api/v1/articles - Create a draft
//! - PUT|DELETE /api/v1/articles/id/{id} - Edit or delete
//! - POST /api/v1/articles/id/{id}/transition - Workflow action
//! - POST /api/v1/articles/{slug}/like - Toggle a like
//! - GET /api/v1/approvals, POST /api/v1/approvals/{id} - Review queue
//! - GET /api/v1/feeds/articles - Articles of one publisher or journalist
//! - GET /api/v1/history - Reading history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PaginationQuery, TargetQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    Article, CreateArticleInput, LikeResult, PagedResult, ReadingHistoryEntry,
    UpdateArticleInput, WorkflowAction,
};
use crate::services::FeedQuery;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// Request body for a workflow transition
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: WorkflowAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Routes readable without signing in; the caller layers optional auth on top
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list_articles))
        .route("/articles/search", get(search_articles))
        .route("/articles/{slug}", get(get_article))
}

/// Routes that require a session
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/articles", post(create_article))
        .route("/articles/id/{id}", put(update_article).delete(delete_article))
        .route("/articles/id/{id}/transition", post(transition_article))
        .route("/articles/{slug}/like", post(toggle_like))
        .route("/approvals", get(approval_queue))
        .route("/approvals/{id}", post(review_article))
        .route("/feeds/articles", get(articles_by_target))
        .route("/history", get(reading_history))
}

/// GET /api/v1/articles
///
/// Query: `search`, `category`, `status`, `sort` (latest|popular|trending),
/// `all`, `page`, `page_size`.
async fn list_articles(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(feed): Query<FeedQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let result = state
        .article_service
        .list_feed(viewer.as_ref(), feed, &page.params())
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/articles/search?q=
async fn search_articles(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let result = state
        .article_service
        .search(&search.q, &page.params())
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/articles/{slug}
///
/// Counts a view and, for a signed-in reader, records reading history.
async fn get_article(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<Json<Article>, ApiError> {
    let article = state
        .article_service
        .get_by_slug(viewer.as_ref(), &slug)
        .await?;
    Ok(Json(article))
}

/// POST /api/v1/articles
async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateArticleInput>,
) -> Result<(StatusCode, Json<Article>), ApiError> {
    let article = state.article_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(article)))
}

/// PUT /api/v1/articles/id/{id}
async fn update_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<Article>, ApiError> {
    let article = state.article_service.update(&user.0, id, body).await?;
    Ok(Json(article))
}

/// DELETE /api/v1/articles/id/{id}
async fn delete_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/articles/id/{id}/transition
async fn transition_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<Article>, ApiError> {
    let article = state
        .article_service
        .transition(&user.0, id, body.action, body.reason)
        .await?;
    Ok(Json(article))
}

/// POST /api/v1/articles/{slug}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(slug): Path<String>,
) -> Result<Json<LikeResult>, ApiError> {
    let result = state.engagement_service.toggle_like(&user.0, &slug).await?;
    Ok(Json(result))
}

/// GET /api/v1/approvals
async fn approval_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let result = state
        .article_service
        .approval_queue(&user.0, &page.params())
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/approvals/{id}
///
/// Only `approve` and `reject` are accepted here.
async fn review_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<Article>, ApiError> {
    if !matches!(body.action, WorkflowAction::Approve | WorkflowAction::Reject) {
        return Err(ApiError::validation_error(
            "Action must be approve or reject",
        ));
    }
    let article = state
        .article_service
        .transition(&user.0, id, body.action, body.reason)
        .await?;
    Ok(Json(article))
}

/// GET /api/v1/feeds/articles?publisher_id= | ?journalist_id=
async fn articles_by_target(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<TargetQuery>,
) -> Result<Json<PagedResult<Article>>, ApiError> {
    let target = query.target()?;
    let result = state
        .article_service
        .list_by_subscription_target(target, &query.params())
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/history?limit=
async fn reading_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ReadingHistoryEntry>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let entries = state.engagement_service.history(&user.0, limit).await?;
    Ok(Json(entries))
}
