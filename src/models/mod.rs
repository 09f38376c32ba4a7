//! Data models
//!
//! Database entities, their enums and the input types accepted by services.

mod analytics;
mod article;
mod category;
mod comment;
mod newsletter;
mod notification;
mod pagination;
mod publisher;
mod session;
mod subscription;
mod user;

pub use analytics::{
    CategoryCount, DailyCount, EngagementTotals, GlobalCounts, JournalistStats, StatusCounts,
};
pub use article::{
    make_excerpt, normalize_tags, reading_time, split_tags, strip_html, Article, ArticleAuthor,
    ArticleFilter, ArticlePriority, ArticleScope, ArticleStatus, CreateArticleInput, FeedSort,
    UpdateArticleInput, WorkflowAction, CONTENT_MIN_LENGTH, EXCERPT_MAX_LENGTH,
    SUBTITLE_MAX_LENGTH, TITLE_MAX_LENGTH, TITLE_MIN_LENGTH,
};
pub use category::{
    is_valid_color, Category, CreateCategoryInput, UpdateCategoryInput, DEFAULT_CATEGORY_COLOR,
};
pub use comment::{
    build_threads, Comment, CommentThread, CreateCommentInput, LikeResult, ReadingHistoryEntry,
    COMMENT_MAX_LENGTH, COMMENT_MIN_LENGTH,
};
pub use newsletter::{
    CreateNewsletterInput, Newsletter, NewsletterFilter, NewsletterFrequency,
    UpdateNewsletterInput, NEWSLETTER_CONTENT_MIN_LENGTH, NEWSLETTER_TITLE_MAX_LENGTH,
    NEWSLETTER_TITLE_MIN_LENGTH,
};
pub use notification::{NewNotification, Notification, NotificationStatus};
pub use pagination::{ListParams, PagedResult};
pub use publisher::{
    CreatePublisherInput, MemberRole, Publisher, PublisherMember, PublisherWithStats,
    UpdatePublisherInput,
};
pub use session::Session;
pub use subscription::{Subscriber, Subscription, SubscriptionTarget, TargetType};
pub use user::{UpdateProfileInput, User, UserRole, MAX_BIO_LENGTH};
