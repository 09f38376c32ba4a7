//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth and profile endpoints
//! - Articles, the approval queue, comments and likes
//! - Publishers, categories and subscriptions
//! - Newsletters and subscription feeds
//! - Dashboards and analytics
//! - Admin endpoints for users and the notification outbox

pub mod admin;
pub mod articles;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod dashboard;
pub mod middleware;
pub mod newsletters;
pub mod publishers;
pub mod site;
pub mod subscriptions;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router().merge(publishers::admin_router()))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Category management is open to editors as well
    let editor_routes = categories::manage_router()
        .route_layer(axum_middleware::from_fn(middleware::require_editor))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but no particular role)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(articles::protected_router())
        .merge(comments::protected_router())
        .merge(publishers::protected_router())
        .merge(subscriptions::protected_router())
        .merge(newsletters::protected_router())
        .merge(dashboard::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes that personalise output for signed-in users
    let reader_routes = articles::public_router()
        .merge(comments::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/categories", categories::public_router())
        .merge(subscriptions::public_router())
        .merge(site::router())
        .merge(reader_routes)
        .merge(admin_routes)
        .merge(editor_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // Cookie auth needs an explicit origin
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(_) => tracing::warn!("Ignoring invalid CORS origin: {}", cors_origin),
    }

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
