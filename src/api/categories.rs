//! Category API endpoints
//!
//! - GET /api/v1/categories - Active categories with article counts
//! - GET /api/v1/categories/{slug} - One category
//! - POST /api/v1/admin/categories - Create (editors and admins)
//! - PUT|DELETE /api/v1/admin/categories/{id} - Update or delete

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{Category, CreateCategoryInput, UpdateCategoryInput};

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{slug}", get(get_category))
}

/// Write routes; the caller applies the editor check
pub fn manage_router() -> Router<AppState> {
    Router::new()
        .route("/admin/categories", post(create_category))
        .route(
            "/admin/categories/{id}",
            put(update_category).delete(delete_category),
        )
}

/// GET /api/v1/categories
async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, ApiError> {
    let categories = state.category_service.list_active().await?;
    Ok(Json(categories))
}

/// GET /api/v1/categories/{slug}
async fn get_category(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.get_by_slug(&slug).await?;
    Ok(Json(category))
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/v1/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = state.category_service.update(id, body).await?;
    Ok(Json(category))
}

/// DELETE /api/v1/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
