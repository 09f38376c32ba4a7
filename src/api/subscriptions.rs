//! Subscription API endpoints
//!
//! - GET /api/v1/subscriptions - What the current user follows
//! - POST /api/v1/subscriptions - Follow a publisher or journalist
//! - DELETE /api/v1/subscriptions - Stop following
//! - GET /api/v1/subscriptions/unsubscribe - Signed link from emails (public)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Subscription, SubscriptionTarget, TargetType};

/// Request body naming exactly one target
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub publisher_id: Option<i64>,
    pub journalist_id: Option<i64>,
}

impl SubscriptionRequest {
    fn target(&self) -> Result<SubscriptionTarget, ApiError> {
        SubscriptionTarget::from_ids(self.publisher_id, self.journalist_id)
            .map_err(ApiError::validation_error)
    }
}

/// Query of an emailed unsubscribe link
#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub user: i64,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub unsubscribed: bool,
    pub target: SubscriptionTarget,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/subscriptions/unsubscribe", get(unsubscribe_with_token))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route(
        "/subscriptions",
        get(list_subscriptions)
            .post(subscribe)
            .delete(unsubscribe),
    )
}

/// GET /api/v1/subscriptions
async fn list_subscriptions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let subscriptions = state.subscription_service.list(user.0.id).await?;
    Ok(Json(subscriptions))
}

/// POST /api/v1/subscriptions
async fn subscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let target = body.target()?;
    let subscription = state
        .subscription_service
        .subscribe(user.0.id, target)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// DELETE /api/v1/subscriptions
async fn unsubscribe(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<SubscriptionRequest>,
) -> Result<StatusCode, ApiError> {
    let target = body.target()?;
    state
        .subscription_service
        .unsubscribe(user.0.id, target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/subscriptions/unsubscribe?user=&type=&id=&token=
async fn unsubscribe_with_token(
    State(state): State<AppState>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let target = SubscriptionTarget::new(query.target_type, query.id);
    let unsubscribed = state
        .subscription_service
        .unsubscribe_with_token(query.user, target, &query.token)
        .await?;
    Ok(Json(UnsubscribeResponse {
        unsubscribed,
        target,
    }))
}
