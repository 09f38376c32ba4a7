//! Dashboard API endpoints
//!
//! - GET /api/v1/dashboard - Per-role summary for the current user
//! - GET /api/v1/analytics - Publishing analytics (editors and admins)

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::{Analytics, Dashboard};

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/analytics", get(analytics))
}

/// GET /api/v1/dashboard
async fn dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Dashboard>, ApiError> {
    let dashboard = state.dashboard_service.dashboard(&user.0).await?;
    Ok(Json(dashboard))
}

/// GET /api/v1/analytics
async fn analytics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Analytics>, ApiError> {
    let analytics = state.dashboard_service.analytics(&user.0).await?;
    Ok(Json(analytics))
}
