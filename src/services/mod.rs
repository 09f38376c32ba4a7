//! Services layer - Business logic
//!
//! This module contains the business logic of the newsdesk.
//! Services are responsible for:
//! - Enforcing role permissions and the editorial workflow
//! - Coordinating between repositories, cache and the notification outbox
//! - Handling validation and error cases

pub mod article;
pub mod category;
pub mod dashboard;
pub mod email;
pub mod engagement;
pub mod markdown;
pub mod newsletter;
pub mod notification;
pub mod password;
pub mod publisher;
pub mod rate_limiter;
pub mod slug;
pub mod subscription;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use article::{ArticleService, ArticleServiceError, FeedQuery};
pub use category::{CategoryService, CategoryServiceError};
pub use dashboard::{Analytics, Dashboard, DashboardService, DashboardServiceError};
pub use email::{create_mailer, LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use engagement::{EngagementService, EngagementServiceError};
pub use markdown::MarkdownRenderer;
pub use newsletter::{NewsletterService, NewsletterServiceError};
pub use notification::{DispatchReport, NotificationService, NotificationServiceError};
pub use password::{check_password_policy, hash_password, verify_password};
pub use publisher::{PublisherDetail, PublisherService, PublisherServiceError};
pub use rate_limiter::LoginRateLimiter;
pub use slug::{slugify, unique_slug};
pub use subscription::{SubscriptionService, SubscriptionServiceError, UnsubscribeTokens};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
