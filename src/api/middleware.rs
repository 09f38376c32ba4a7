//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and its mapping from service errors
//! - Authentication (session token validation) and role checks

use anyhow::Context;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::create_cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxCategoryRepository, SqlxEngagementRepository,
    SqlxNewsletterRepository, SqlxNotificationRepository, SqlxPublisherRepository,
    SqlxSessionRepository, SqlxStatsRepository, SqlxSubscriptionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleService, ArticleServiceError, CategoryService, CategoryServiceError, DashboardService,
    DashboardServiceError, EngagementService, EngagementServiceError, LoginRateLimiter, Mailer,
    MarkdownRenderer, NewsletterService, NewsletterServiceError, NotificationService,
    NotificationServiceError, PublisherService, PublisherServiceError, SubscriptionService,
    SubscriptionServiceError, UnsubscribeTokens, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub publisher_service: Arc<PublisherService>,
    pub category_service: Arc<CategoryService>,
    pub article_service: Arc<ArticleService>,
    pub engagement_service: Arc<EngagementService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub notification_service: Arc<NotificationService>,
    pub newsletter_service: Arc<NewsletterService>,
    pub dashboard_service: Arc<DashboardService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// Wire every repository and service on top of a migrated pool.
    ///
    /// `config.site.secret_key` must already be set, see
    /// [`Config::ensure_secret_key`].
    pub fn new(pool: DynDatabasePool, config: &Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let secret_key = config
            .site
            .secret_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("site.secret_key is not set")?;
        let tokens = UnsubscribeTokens::new(secret_key)?;

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let publisher_repo = SqlxPublisherRepository::boxed(pool.clone());
        let category_repo = SqlxCategoryRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let engagement_repo = SqlxEngagementRepository::boxed(pool.clone());
        let subscription_repo = SqlxSubscriptionRepository::boxed(pool.clone());
        let notification_repo = SqlxNotificationRepository::boxed(pool.clone());
        let newsletter_repo = SqlxNewsletterRepository::boxed(pool.clone());
        let stats_repo = SqlxStatsRepository::boxed(pool.clone());

        let notification_service = Arc::new(
            NotificationService::new(
                notification_repo,
                subscription_repo.clone(),
                mailer,
                tokens.clone(),
                config.site.clone(),
                config.notifications.clone(),
            )
            .context("Failed to load notification templates")?,
        );

        let article_service = Arc::new(ArticleService::new(
            article_repo.clone(),
            publisher_repo.clone(),
            category_repo.clone(),
            user_repo.clone(),
            subscription_repo.clone(),
            engagement_repo.clone(),
            MarkdownRenderer::new(),
            notification_service.clone(),
        ));

        Ok(Self {
            user_service: Arc::new(UserService::with_session_expiration(
                user_repo.clone(),
                session_repo,
                publisher_repo.clone(),
                config.session.expiration_days,
            )),
            publisher_service: Arc::new(PublisherService::new(publisher_repo.clone(), user_repo.clone())),
            category_service: Arc::new(CategoryService::new(
                category_repo,
                create_cache(&config.cache),
            )),
            engagement_service: Arc::new(EngagementService::new(
                article_repo.clone(),
                engagement_repo.clone(),
            )),
            subscription_service: Arc::new(SubscriptionService::new(
                subscription_repo.clone(),
                publisher_repo.clone(),
                user_repo,
                tokens,
            )),
            newsletter_service: Arc::new(NewsletterService::new(
                newsletter_repo,
                publisher_repo.clone(),
                article_repo,
                notification_service.clone(),
            )),
            dashboard_service: Arc::new(DashboardService::new(
                stats_repo,
                engagement_repo,
                subscription_repo,
                publisher_repo,
                article_service.clone(),
            )),
            article_service,
            notification_service,
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            pool,
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The signed-in user on routes that also serve anonymous visitors
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn as_ref(&self) -> Option<&User> {
        self.0.as_ref()
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the underlying failure and hide it from the client
    fn internal(err: &anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<PublisherServiceError> for ApiError {
    fn from(err: PublisherServiceError) -> Self {
        match err {
            PublisherServiceError::NotFound => ApiError::not_found("Publisher not found"),
            PublisherServiceError::UserNotFound => ApiError::not_found("User not found"),
            PublisherServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PublisherServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            PublisherServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::NotFound => ApiError::not_found("Category not found"),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::Conflict(msg) => {
                ApiError::conflict(format!("Category already exists: {}", msg))
            }
            CategoryServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::NotFound => ApiError::not_found("Article not found"),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ArticleServiceError::InvalidTransition { from, action } => ApiError::with_details(
                "VALIDATION_ERROR",
                format!("Cannot {} an article that is {}", action, from),
                serde_json::json!({ "status": from, "action": action }),
            ),
            ArticleServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<EngagementServiceError> for ApiError {
    fn from(err: EngagementServiceError) -> Self {
        match err {
            EngagementServiceError::NotFound(msg) => ApiError::not_found(msg),
            EngagementServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            EngagementServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            EngagementServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<SubscriptionServiceError> for ApiError {
    fn from(err: SubscriptionServiceError) -> Self {
        match err {
            SubscriptionServiceError::NotFound => {
                ApiError::not_found("Subscription target not found")
            }
            SubscriptionServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SubscriptionServiceError::InvalidToken => {
                ApiError::forbidden("Invalid unsubscribe token")
            }
            SubscriptionServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(err: NotificationServiceError) -> Self {
        match err {
            NotificationServiceError::TemplateError(e) => ApiError::internal(&anyhow::Error::from(e)),
            NotificationServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<NewsletterServiceError> for ApiError {
    fn from(err: NewsletterServiceError) -> Self {
        match err {
            NewsletterServiceError::NotFound => ApiError::not_found("Newsletter not found"),
            NewsletterServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            NewsletterServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            NewsletterServiceError::Conflict(msg) => ApiError::conflict(msg),
            NewsletterServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

impl From<DashboardServiceError> for ApiError {
    fn from(err: DashboardServiceError) -> Self {
        match err {
            DashboardServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            DashboardServiceError::InternalError(e) => ApiError::internal(&e),
        }
    }
}

/// Extract session token from request headers.
///
/// A bearer token wins over the `session` cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
///
/// A missing or stale token lets the request through anonymously.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Editor authorization middleware (editors and admins)
pub async fn require_editor(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.can_review() {
        return Err(ApiError::forbidden("Editor privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}
