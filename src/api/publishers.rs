//! Publisher API endpoints
//!
//! - GET /api/v1/publishers - Publishers with subscriber and article counts
//! - GET /api/v1/publishers/{id} - One publisher with its members
//! - POST|DELETE /api/v1/publishers/{id}/members - Manage membership
//! - POST /api/v1/admin/publishers - Create (admin)
//! - PUT|DELETE /api/v1/admin/publishers/{id} - Update or delete (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreatePublisherInput, MemberRole, PagedResult, Publisher, PublisherMember, PublisherWithStats,
    UpdatePublisherInput,
};
use crate::services::PublisherDetail;

/// Request body for adding or removing a member
#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: i64,
    pub role: MemberRole,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/publishers", get(list_publishers))
        .route("/publishers/{id}", get(get_publisher))
        .route(
            "/publishers/{id}/members",
            post(add_member).delete(remove_member),
        )
}

/// Admin-only routes
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/publishers", post(create_publisher))
        .route("/publishers/{id}", put(update_publisher).delete(delete_publisher))
}

/// GET /api/v1/publishers
async fn list_publishers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<PagedResult<PublisherWithStats>>, ApiError> {
    let result = state
        .publisher_service
        .list(&user.0, &page.params())
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/publishers/{id}
async fn get_publisher(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PublisherDetail>, ApiError> {
    let detail = state.publisher_service.get(&user.0, id).await?;
    Ok(Json(detail))
}

/// POST /api/v1/publishers/{id}/members
async fn add_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<MemberRequest>,
) -> Result<Json<Vec<PublisherMember>>, ApiError> {
    let members = state
        .publisher_service
        .add_member(&user.0, id, body.user_id, body.role)
        .await?;
    Ok(Json(members))
}

/// DELETE /api/v1/publishers/{id}/members
async fn remove_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<MemberRequest>,
) -> Result<Json<Vec<PublisherMember>>, ApiError> {
    let members = state
        .publisher_service
        .remove_member(&user.0, id, body.user_id, body.role)
        .await?;
    Ok(Json(members))
}

/// POST /api/v1/admin/publishers
async fn create_publisher(
    State(state): State<AppState>,
    Json(body): Json<CreatePublisherInput>,
) -> Result<(StatusCode, Json<Publisher>), ApiError> {
    let publisher = state.publisher_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(publisher)))
}

/// PUT /api/v1/admin/publishers/{id}
async fn update_publisher(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePublisherInput>,
) -> Result<Json<Publisher>, ApiError> {
    let publisher = state.publisher_service.update(id, body).await?;
    Ok(Json(publisher))
}

/// DELETE /api/v1/admin/publishers/{id}
async fn delete_publisher(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.publisher_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
