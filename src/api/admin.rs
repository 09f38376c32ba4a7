//! Admin API endpoints
//!
//! All routes require the admin role:
//! - GET /api/v1/admin/users - List accounts
//! - GET|PUT|DELETE /api/v1/admin/users/{id} - Inspect, change role, delete
//! - GET /api/v1/admin/notifications - Outbox, optionally by status

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::AdminPaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Notification, NotificationStatus, PagedResult, User, UserRole};

/// Request body for changing a user's role
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub status: Option<NotificationStatus>,
}

/// Build the admin router; the caller applies the admin check
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/notifications", get(list_notifications))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<User>>, ApiError> {
    let users = state.user_service.list_users(&page.params()).await?;
    Ok(Json(users))
}

/// GET /api/v1/admin/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = state.user_service.get_user(id).await?;
    Ok(Json(user))
}

/// PUT /api/v1/admin/users/{id}
///
/// Memberships that no longer match the new role are dropped.
async fn update_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    if admin.0.id == id && body.role != UserRole::Admin {
        return Err(ApiError::validation_error("You cannot demote yourself"));
    }
    let user = state.user_service.set_role(id, body.role).await?;
    tracing::info!("{} set the role of {} to {}", admin.0.username, user.username, user.role);
    Ok(Json(user))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&admin.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/notifications?status=
async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Query(page): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<Notification>>, ApiError> {
    let notifications = state
        .notification_service
        .list(query.status, &page.params())
        .await?;
    Ok(Json(notifications))
}
