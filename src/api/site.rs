//! Site API endpoints
//!
//! - GET /api/v1/health - Database connectivity check

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::config::DatabaseDriver;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub driver: DatabaseDriver,
    pub version: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let check = async {
        state.pool.ping().await?;
        state.pool.server_version().await
    };
    let version = check.await.map_err(|e| {
        tracing::error!("Health check failed: {:#}", e);
        ApiError::internal_error("Database unavailable")
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        database: DatabaseHealth {
            driver: state.pool.driver(),
            version,
        },
    }))
}
