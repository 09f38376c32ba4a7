//! Newsletter API endpoints
//!
//! - GET|POST /api/v1/newsletters - List or create
//! - GET|PUT|DELETE /api/v1/newsletters/{id} - Read, edit or delete
//! - POST /api/v1/newsletters/{id}/send - Queue delivery to followers
//! - GET /api/v1/feeds/newsletters - Newsletters of one publisher or journalist

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{PaginationQuery, TargetQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreateNewsletterInput, Newsletter, NewsletterFilter, PagedResult, UpdateNewsletterInput,
};

#[derive(Debug, Deserialize)]
pub struct NewsletterListQuery {
    pub publisher_id: Option<i64>,
    pub created_by: Option<i64>,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/newsletters", get(list_newsletters).post(create_newsletter))
        .route(
            "/newsletters/{id}",
            get(get_newsletter)
                .put(update_newsletter)
                .delete(delete_newsletter),
        )
        .route("/newsletters/{id}/send", post(send_newsletter))
        .route("/feeds/newsletters", get(newsletters_by_target))
}

/// GET /api/v1/newsletters?publisher_id=&created_by=
async fn list_newsletters(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<NewsletterListQuery>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Newsletter>>, ApiError> {
    let filter = NewsletterFilter {
        publisher_id: query.publisher_id,
        created_by: query.created_by,
    };
    let result = state
        .newsletter_service
        .list(&filter, &page.params())
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/newsletters
async fn create_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateNewsletterInput>,
) -> Result<(StatusCode, Json<Newsletter>), ApiError> {
    let newsletter = state.newsletter_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(newsletter)))
}

/// GET /api/v1/newsletters/{id}
async fn get_newsletter(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Newsletter>, ApiError> {
    let newsletter = state.newsletter_service.get(id).await?;
    Ok(Json(newsletter))
}

/// PUT /api/v1/newsletters/{id}
async fn update_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNewsletterInput>,
) -> Result<Json<Newsletter>, ApiError> {
    let newsletter = state.newsletter_service.update(&user.0, id, body).await?;
    Ok(Json(newsletter))
}

/// DELETE /api/v1/newsletters/{id}
async fn delete_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.newsletter_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/newsletters/{id}/send
async fn send_newsletter(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Newsletter>, ApiError> {
    let newsletter = state.newsletter_service.send(&user.0, id).await?;
    Ok(Json(newsletter))
}

/// GET /api/v1/feeds/newsletters?publisher_id= | ?journalist_id=
async fn newsletters_by_target(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<TargetQuery>,
) -> Result<Json<PagedResult<Newsletter>>, ApiError> {
    let target = query.target()?;
    let result = state
        .newsletter_service
        .list_by_subscription_target(target, &query.params())
        .await?;
    Ok(Json(result))
}
