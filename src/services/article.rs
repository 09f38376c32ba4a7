//! Article service
//!
//! Implements the editorial side of articles:
//! - create, edit and delete with per-role permissions
//! - the draft / submitted / published workflow
//! - role-aware feeds, search and the approval queue
//!
//! Derived fields (slug, rendered HTML, excerpt, reading time and
//! `published_at`) are recomputed here on every save, never by callers.

use crate::db::repositories::{
    ArticleRepository, CategoryRepository, EngagementRepository, PublisherRepository,
    SubscriptionRepository, UserRepository,
};
use crate::models::{
    make_excerpt, normalize_tags, reading_time, Article, ArticleFilter, ArticleScope,
    ArticleStatus, CreateArticleInput, FeedSort, ListParams, MemberRole, PagedResult,
    SubscriptionTarget, TargetType, UpdateArticleInput, User, UserRole, WorkflowAction,
    CONTENT_MIN_LENGTH, EXCERPT_MAX_LENGTH, SUBTITLE_MAX_LENGTH, TITLE_MAX_LENGTH,
    TITLE_MIN_LENGTH,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::notification::NotificationService;
use crate::services::slug::unique_slug;
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot {action} an article that is {from}")]
    InvalidTransition {
        from: ArticleStatus,
        action: WorkflowAction,
    },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Feed options chosen by the viewer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedQuery {
    pub search: Option<String>,
    /// Category slug
    pub category: Option<String>,
    pub status: Option<ArticleStatus>,
    #[serde(default)]
    pub sort: FeedSort,
    /// Readers with subscriptions see only followed sources unless set
    #[serde(default)]
    pub all: bool,
}

pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    user_repo: Arc<dyn UserRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    engagement_repo: Arc<dyn EngagementRepository>,
    markdown_renderer: MarkdownRenderer,
    notifications: Arc<NotificationService>,
}

impl ArticleService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        user_repo: Arc<dyn UserRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        engagement_repo: Arc<dyn EngagementRepository>,
        markdown_renderer: MarkdownRenderer,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            publisher_repo,
            category_repo,
            user_repo,
            subscription_repo,
            engagement_repo,
            markdown_renderer,
            notifications,
        }
    }

    /// Create a draft article. The creator becomes its first author.
    ///
    /// # Errors
    ///
    /// - `Forbidden` if the user may not write articles, or a journalist
    ///   names a publisher they are not affiliated with
    /// - `ValidationError` for bad fields, unknown category/publisher or
    ///   co-authors who are not journalists
    pub async fn create(
        &self,
        author: &User,
        input: CreateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        if !author.can_create_article() {
            return Err(ArticleServiceError::Forbidden(
                "Only journalists can write articles".to_string(),
            ));
        }

        let title = input.title.trim().to_string();
        validate_title(&title)?;
        validate_subtitle(&input.subtitle)?;
        validate_content(&input.content)?;
        validate_excerpt(&input.excerpt)?;
        let tags = normalize_tags(&input.tags).map_err(ArticleServiceError::ValidationError)?;

        if let Some(category_id) = input.category_id {
            self.check_category(category_id).await?;
        }
        if let Some(publisher_id) = input.publisher_id {
            self.check_publisher(author, publisher_id).await?;
        }
        let author_ids = self.author_ids(author, &input.co_author_ids).await?;

        let repo = self.repo.clone();
        let slug = unique_slug(&title, "article", move |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate, None).await }
        })
        .await?;

        let content_html = self.markdown_renderer.render(&input.content);
        let excerpt = derive_excerpt(&input.excerpt, &input.content);
        let now = Utc::now();

        let article = Article {
            id: 0,
            title,
            subtitle: input.subtitle.trim().to_string(),
            slug,
            reading_time: reading_time(&input.content),
            content: input.content,
            content_html,
            excerpt,
            category_id: input.category_id,
            category_slug: None,
            tags,
            publisher_id: input.publisher_id,
            publisher_name: None,
            authors: Vec::new(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            status: ArticleStatus::Draft,
            priority: input.priority,
            is_featured: input.is_featured,
            is_sticky: input.is_sticky,
            allow_comments: input.allow_comments,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            published_at: None,
        };

        let created = self
            .repo
            .create(&article, &author_ids)
            .await
            .context("Failed to create article")?;
        tracing::info!(article_id = created.id, author = %author.username, "Article created");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound)
    }

    /// Article for display.
    ///
    /// Unpublished articles are reported as not found unless the viewer
    /// wrote or may review them. Every display counts a view, and signed-in
    /// viewers get a reading history entry.
    pub async fn get_by_slug(
        &self,
        viewer: Option<&User>,
        slug: &str,
    ) -> Result<Article, ArticleServiceError> {
        let mut article = self.find_visible(viewer, slug).await?;

        self.repo
            .increment_view_count(article.id)
            .await
            .context("Failed to count view")?;
        article.view_count += 1;

        if let Some(viewer) = viewer {
            self.engagement_repo
                .record_read(viewer.id, article.id)
                .await
                .context("Failed to record reading history")?;
        }
        Ok(article)
    }

    /// Look up an article by slug with the display visibility rules, without
    /// counting a view
    pub async fn find_visible(
        &self,
        viewer: Option<&User>,
        slug: &str,
    ) -> Result<Article, ArticleServiceError> {
        let article = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get article")?
            .ok_or(ArticleServiceError::NotFound)?;

        if article.is_published() {
            return Ok(article);
        }
        let Some(user) = viewer else {
            return Err(ArticleServiceError::NotFound);
        };
        if article.is_authored_by(user.id) || self.can_review(user, &article).await? {
            Ok(article)
        } else {
            Err(ArticleServiceError::NotFound)
        }
    }

    /// Edit an article. Authors may edit until publication; reviewers may
    /// edit anything in their scope.
    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let mut article = self.get_by_id(id).await?;
        let is_reviewer = self.can_review(actor, &article).await?;
        let is_author = article.is_authored_by(actor.id);

        if !is_reviewer {
            if !is_author {
                return Err(ArticleServiceError::Forbidden(
                    "You cannot edit this article".to_string(),
                ));
            }
            if !article.status.is_editable_by_author() {
                return Err(ArticleServiceError::Forbidden(format!(
                    "A {} article can only be edited by an editor",
                    article.status
                )));
            }
        }

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            article.title = title;
        }
        if let Some(subtitle) = input.subtitle {
            validate_subtitle(&subtitle)?;
            article.subtitle = subtitle.trim().to_string();
        }
        if let Some(content) = input.content {
            validate_content(&content)?;
            article.content_html = self.markdown_renderer.render(&content);
            article.reading_time = reading_time(&content);
            article.content = content;
        }
        if let Some(excerpt) = input.excerpt {
            validate_excerpt(&excerpt)?;
            article.excerpt = excerpt.trim().to_string();
        }
        if article.excerpt.is_empty() {
            article.excerpt = make_excerpt(&article.content);
        }
        if let Some(tags) = input.tags {
            article.tags = normalize_tags(&tags).map_err(ArticleServiceError::ValidationError)?;
        }
        if let Some(category_id) = input.category_id {
            if let Some(id) = category_id {
                self.check_category(id).await?;
            }
            article.category_id = category_id;
        }
        if let Some(publisher_id) = input.publisher_id {
            if let Some(id) = publisher_id {
                if Some(id) != article.publisher_id {
                    self.check_publisher(actor, id).await?;
                }
            }
            article.publisher_id = publisher_id;
        }
        if let Some(priority) = input.priority {
            article.priority = priority;
        }
        if let Some(is_featured) = input.is_featured {
            article.is_featured = is_featured;
        }
        if let Some(is_sticky) = input.is_sticky {
            article.is_sticky = is_sticky;
        }
        if let Some(allow_comments) = input.allow_comments {
            article.allow_comments = allow_comments;
        }
        article.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&article)
            .await
            .context("Failed to update article")?;
        Ok(updated)
    }

    /// Move an article through the editorial workflow.
    ///
    /// Approving or rejecting stamps the reviewer on the article. The first
    /// time an article is published its followers are notified; a failure to
    /// queue those emails is logged and does not fail the transition.
    pub async fn transition(
        &self,
        actor: &User,
        id: i64,
        action: WorkflowAction,
        reason: Option<String>,
    ) -> Result<Article, ArticleServiceError> {
        let mut article = self.get_by_id(id).await?;
        let next = article
            .status
            .apply(action)
            .ok_or(ArticleServiceError::InvalidTransition {
                from: article.status,
                action,
            })?;

        let allowed = if action.requires_reviewer() {
            self.can_review(actor, &article).await?
        } else {
            article.is_authored_by(actor.id) || self.can_review(actor, &article).await?
        };
        if !allowed {
            return Err(ArticleServiceError::Forbidden(format!(
                "You cannot {} this article",
                action
            )));
        }

        let now = Utc::now();
        match action {
            WorkflowAction::Approve => {
                article.approved_by = Some(actor.id);
                article.approved_at = Some(now);
                article.rejection_reason = None;
            }
            WorkflowAction::Reject => {
                article.approved_by = Some(actor.id);
                article.approved_at = None;
                article.rejection_reason = reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty());
            }
            _ => {}
        }

        let first_publication = next == ArticleStatus::Published && article.published_at.is_none();
        if first_publication {
            article.published_at = Some(now);
        }
        article.status = next;
        article.updated_at = now;

        let updated = self
            .repo
            .update(&article)
            .await
            .context("Failed to update article status")?;
        tracing::info!(
            article_id = updated.id,
            action = %action,
            status = %updated.status,
            actor = %actor.username,
            "Article status changed"
        );

        if first_publication && updated.approved_by.is_some() {
            if let Err(e) = self.notifications.notify_article_published(&updated).await {
                tracing::error!(article_id = updated.id, "Failed to queue notifications: {}", e);
            }
        }
        Ok(updated)
    }

    /// Delete an article. Authors may delete anything not yet published;
    /// reviewers may delete anything in scope.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), ArticleServiceError> {
        let article = self.get_by_id(id).await?;
        let author_may_delete = article.is_authored_by(actor.id) && !article.is_published();
        if !author_may_delete && !self.can_review(actor, &article).await? {
            return Err(ArticleServiceError::Forbidden(
                "You cannot delete this article".to_string(),
            ));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete article")?;
        tracing::info!(article_id = id, actor = %actor.username, "Article deleted");
        Ok(())
    }

    /// Role-aware article listing
    pub async fn list_feed(
        &self,
        viewer: Option<&User>,
        query: FeedQuery,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let scope = match viewer {
            None => ArticleScope::Published,
            Some(user) => self.feed_scope(user, query.all).await?,
        };
        let filter = ArticleFilter {
            search: query.search.filter(|s| !s.trim().is_empty()),
            category_slug: query.category.filter(|s| !s.trim().is_empty()),
            status: query.status,
            sort: query.sort,
            ..Default::default()
        };
        self.list(&scope, &filter, params).await
    }

    /// Published articles matching `q` in the title, body, excerpt, tags or
    /// publisher name
    pub async fn search(
        &self,
        q: &str,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(PagedResult::new(Vec::new(), 0, params));
        }
        let filter = ArticleFilter {
            search: Some(q.to_string()),
            ..Default::default()
        };
        self.list(&ArticleScope::Published, &filter, params).await
    }

    /// Submitted articles the reviewer may approve
    pub async fn approval_queue(
        &self,
        reviewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let scope = self.review_scope(reviewer).await?;
        let filter = ArticleFilter {
            status: Some(ArticleStatus::Submitted),
            sort: FeedSort::Latest,
            ..Default::default()
        };
        self.list(&scope, &filter, params).await
    }

    /// Published articles of one publisher or journalist, newest first
    pub async fn list_by_subscription_target(
        &self,
        target: SubscriptionTarget,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let mut filter = ArticleFilter::default();
        match target {
            SubscriptionTarget::Publisher(id) => filter.publisher_id = Some(id),
            SubscriptionTarget::Journalist(id) => filter.author_id = Some(id),
        }
        self.list(&ArticleScope::Published, &filter, params).await
    }

    /// Whether the user may approve, reject, archive or restore the article.
    ///
    /// Admins review everything. Editors review the articles of publishers
    /// they manage and articles without a publisher.
    pub async fn can_review(&self, user: &User, article: &Article) -> Result<bool, ArticleServiceError> {
        match user.role {
            UserRole::Admin => Ok(true),
            UserRole::Editor => match article.publisher_id {
                None => Ok(true),
                Some(publisher_id) => Ok(self.managed_publishers(user.id).await?.contains(&publisher_id)),
            },
            _ => Ok(false),
        }
    }

    /// Scope of articles a reviewer works on
    pub async fn review_scope(&self, reviewer: &User) -> Result<ArticleScope, ArticleServiceError> {
        match reviewer.role {
            UserRole::Admin => Ok(ArticleScope::All),
            UserRole::Editor => Ok(ArticleScope::PublishedOrManaged {
                publisher_ids: self.managed_publishers(reviewer.id).await?,
            }),
            _ => Err(ArticleServiceError::Forbidden(
                "Only editors can review articles".to_string(),
            )),
        }
    }

    pub(crate) async fn list(
        &self,
        scope: &ArticleScope,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let (items, total) = self
            .repo
            .list(scope, filter, params)
            .await
            .context("Failed to list articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    async fn feed_scope(&self, user: &User, all: bool) -> Result<ArticleScope, ArticleServiceError> {
        match user.role {
            UserRole::Admin => Ok(ArticleScope::All),
            UserRole::Editor => self.review_scope(user).await,
            UserRole::Journalist => Ok(ArticleScope::PublishedOrAuthoredBy(user.id)),
            UserRole::Reader => {
                if all {
                    return Ok(ArticleScope::Published);
                }
                let subscriptions = self
                    .subscription_repo
                    .list_for_user(user.id)
                    .await
                    .context("Failed to load subscriptions")?;
                if subscriptions.is_empty() {
                    return Ok(ArticleScope::Published);
                }
                let (publishers, journalists): (Vec<_>, Vec<_>) = subscriptions
                    .iter()
                    .partition(|s| s.target_type == TargetType::Publisher);
                Ok(ArticleScope::PublishedFollowing {
                    publisher_ids: publishers.iter().map(|s| s.target_id).collect(),
                    journalist_ids: journalists.iter().map(|s| s.target_id).collect(),
                })
            }
        }
    }

    async fn managed_publishers(&self, editor_id: i64) -> Result<Vec<i64>, ArticleServiceError> {
        let ids = self
            .publisher_repo
            .publisher_ids_for_member(editor_id, MemberRole::Editor)
            .await
            .context("Failed to load managed publishers")?;
        Ok(ids)
    }

    async fn check_category(&self, category_id: i64) -> Result<(), ArticleServiceError> {
        self.category_repo
            .get_by_id(category_id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| ArticleServiceError::ValidationError("Unknown category".to_string()))?;
        Ok(())
    }

    /// The publisher must exist, and a journalist must write for it
    async fn check_publisher(&self, actor: &User, publisher_id: i64) -> Result<(), ArticleServiceError> {
        self.publisher_repo
            .get_by_id(publisher_id)
            .await
            .context("Failed to get publisher")?
            .ok_or_else(|| ArticleServiceError::ValidationError("Unknown publisher".to_string()))?;

        if actor.role == UserRole::Journalist {
            let affiliated = self
                .publisher_repo
                .publisher_ids_for_member(actor.id, MemberRole::Journalist)
                .await
                .context("Failed to load affiliated publishers")?;
            if !affiliated.contains(&publisher_id) {
                return Err(ArticleServiceError::Forbidden(
                    "You are not affiliated with this publisher".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Creator first, then distinct co-authors who must all be journalists
    async fn author_ids(&self, creator: &User, co_author_ids: &[i64]) -> Result<Vec<i64>, ArticleServiceError> {
        let mut ids = vec![creator.id];
        for &id in co_author_ids {
            if ids.contains(&id) {
                continue;
            }
            let user = self
                .user_repo
                .get_by_id(id)
                .await
                .context("Failed to get co-author")?;
            match user {
                Some(user) if user.role == UserRole::Journalist => ids.push(id),
                _ => {
                    return Err(ArticleServiceError::ValidationError(format!(
                        "Co-author {} is not a journalist",
                        id
                    )))
                }
            }
        }
        Ok(ids)
    }
}

fn derive_excerpt(excerpt: &str, content: &str) -> String {
    let excerpt = excerpt.trim();
    if excerpt.is_empty() {
        make_excerpt(content)
    } else {
        excerpt.to_string()
    }
}

fn validate_title(title: &str) -> Result<(), ArticleServiceError> {
    let len = title.chars().count();
    if !(TITLE_MIN_LENGTH..=TITLE_MAX_LENGTH).contains(&len) {
        return Err(ArticleServiceError::ValidationError(format!(
            "Title must be between {} and {} characters",
            TITLE_MIN_LENGTH, TITLE_MAX_LENGTH
        )));
    }
    Ok(())
}

fn validate_subtitle(subtitle: &str) -> Result<(), ArticleServiceError> {
    if subtitle.trim().chars().count() > SUBTITLE_MAX_LENGTH {
        return Err(ArticleServiceError::ValidationError(format!(
            "Subtitle cannot exceed {} characters",
            SUBTITLE_MAX_LENGTH
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), ArticleServiceError> {
    if content.trim().chars().count() < CONTENT_MIN_LENGTH {
        return Err(ArticleServiceError::ValidationError(format!(
            "Content must be at least {} characters",
            CONTENT_MIN_LENGTH
        )));
    }
    Ok(())
}

fn validate_excerpt(excerpt: &str) -> Result<(), ArticleServiceError> {
    if excerpt.trim().chars().count() > EXCERPT_MAX_LENGTH {
        return Err(ArticleServiceError::ValidationError(format!(
            "Excerpt cannot exceed {} characters",
            EXCERPT_MAX_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxCategoryRepository, SqlxEngagementRepository,
        SqlxPublisherRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::{NotificationStatus, Publisher};
    use crate::services::notification::tests::{service_with, RecordingMailer};
    use crate::services::test_support::{add_member, article_body, create_publisher, create_user, test_pool};

    pub(crate) fn article_service(pool: &DynDatabasePool, notifications: Arc<NotificationService>) -> ArticleService {
        ArticleService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxEngagementRepository::boxed(pool.clone()),
            MarkdownRenderer::new(),
            notifications,
        )
    }

    struct Fixture {
        pool: DynDatabasePool,
        service: ArticleService,
        notifications: Arc<NotificationService>,
        journalist: User,
        other_journalist: User,
        editor: User,
        outside_editor: User,
        reader: User,
        admin: User,
        herald: Publisher,
    }

    async fn setup() -> Fixture {
        let pool = test_pool().await;
        let notifications = Arc::new(service_with(&pool, Arc::new(RecordingMailer::default())));
        let journalist = create_user(&pool, "jane", UserRole::Journalist).await;
        let other_journalist = create_user(&pool, "jim", UserRole::Journalist).await;
        let editor = create_user(&pool, "ed", UserRole::Editor).await;
        let outside_editor = create_user(&pool, "eve", UserRole::Editor).await;
        let reader = create_user(&pool, "rita", UserRole::Reader).await;
        let admin = create_user(&pool, "root", UserRole::Admin).await;

        let herald = create_publisher(&pool, "The Herald").await;
        let gazette = create_publisher(&pool, "The Gazette").await;
        add_member(&pool, &herald, &journalist, MemberRole::Journalist).await;
        add_member(&pool, &herald, &editor, MemberRole::Editor).await;
        add_member(&pool, &gazette, &outside_editor, MemberRole::Editor).await;

        Fixture {
            service: article_service(&pool, notifications.clone()),
            pool,
            notifications,
            journalist,
            other_journalist,
            editor,
            outside_editor,
            reader,
            admin,
            herald,
        }
    }

    fn input(title: &str) -> CreateArticleInput {
        CreateArticleInput::new(title, article_body(title))
    }

    async fn published(fx: &Fixture, title: &str) -> Article {
        let article = fx
            .service
            .create(&fx.journalist, input(title).with_publisher(fx.herald.id))
            .await
            .unwrap();
        fx.service
            .transition(&fx.journalist, article.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        fx.service
            .transition(&fx.editor, article.id, WorkflowAction::Approve, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_derives_fields() {
        let fx = setup().await;
        let article = fx
            .service
            .create(&fx.journalist, input("Budget Vote Tonight").with_tags("politics, budget, Politics"))
            .await
            .unwrap();

        assert_eq!(article.slug, "budget-vote-tonight");
        assert_eq!(article.status, ArticleStatus::Draft);
        assert!(article.content_html.contains("<h1>"));
        assert_eq!(article.excerpt, article.content);
        assert_eq!(article.reading_time, 1);
        assert_eq!(article.tags, "politics, budget");
        assert!(article.is_authored_by(fx.journalist.id));
        assert!(article.published_at.is_none());

        let again = fx
            .service
            .create(&fx.journalist, input("Budget Vote Tonight"))
            .await
            .unwrap();
        assert_eq!(again.slug, "budget-vote-tonight-1");
    }

    #[tokio::test]
    async fn test_create_permissions_and_validation() {
        let fx = setup().await;

        assert!(matches!(
            fx.service.create(&fx.reader, input("Reader Story")).await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service
                .create(&fx.other_journalist, input("Not My Outlet").with_publisher(fx.herald.id))
                .await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service
                .create(&fx.journalist, CreateArticleInput::new("Short", "too short"))
                .await,
            Err(ArticleServiceError::ValidationError(_))
        ));
        assert!(matches!(
            fx.service.create(&fx.journalist, input("Hi")).await,
            Err(ArticleServiceError::ValidationError(_))
        ));

        let mut with_reader = input("Co-written Piece");
        with_reader.co_author_ids = vec![fx.reader.id];
        assert!(matches!(
            fx.service.create(&fx.journalist, with_reader).await,
            Err(ArticleServiceError::ValidationError(_))
        ));

        let mut co_written = input("Co-written Piece");
        co_written.co_author_ids = vec![fx.other_journalist.id, fx.journalist.id];
        let article = fx.service.create(&fx.journalist, co_written).await.unwrap();
        assert_eq!(article.authors.len(), 2);
    }

    #[tokio::test]
    async fn test_workflow_and_notification() {
        let fx = setup().await;
        let subs = SqlxSubscriptionRepository::new(fx.pool.clone());
        subs.subscribe(fx.reader.id, SubscriptionTarget::Publisher(fx.herald.id))
            .await
            .unwrap();

        let article = fx
            .service
            .create(&fx.journalist, input("Council Approves Park").with_publisher(fx.herald.id))
            .await
            .unwrap();

        // approving a draft is not a valid transition
        assert!(matches!(
            fx.service
                .transition(&fx.editor, article.id, WorkflowAction::Approve, None)
                .await,
            Err(ArticleServiceError::InvalidTransition { .. })
        ));

        let submitted = fx
            .service
            .transition(&fx.journalist, article.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        assert_eq!(submitted.status, ArticleStatus::Submitted);

        // journalists cannot approve, editors of other publishers neither
        assert!(matches!(
            fx.service
                .transition(&fx.journalist, article.id, WorkflowAction::Approve, None)
                .await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service
                .transition(&fx.outside_editor, article.id, WorkflowAction::Approve, None)
                .await,
            Err(ArticleServiceError::Forbidden(_))
        ));

        let approved = fx
            .service
            .transition(&fx.editor, article.id, WorkflowAction::Approve, None)
            .await
            .unwrap();
        assert_eq!(approved.status, ArticleStatus::Published);
        assert_eq!(approved.approved_by, Some(fx.editor.id));
        let published_at = approved.published_at.expect("published_at set");

        let queued = fx
            .notifications
            .list(Some(NotificationStatus::Pending), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(queued.total, 1);
        assert_eq!(queued.items[0].recipient, fx.reader.email);

        // archive and restore keep the first publication date and do not notify again
        fx.service
            .transition(&fx.editor, article.id, WorkflowAction::Archive, None)
            .await
            .unwrap();
        let restored = fx
            .service
            .transition(&fx.editor, article.id, WorkflowAction::Restore, None)
            .await
            .unwrap();
        assert_eq!(restored.published_at, Some(published_at));
        let queued = fx
            .notifications
            .list(None, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(queued.total, 1);
    }

    #[tokio::test]
    async fn test_reject_records_reviewer_and_reason() {
        let fx = setup().await;
        let article = fx
            .service
            .create(&fx.journalist, input("Disputed Claims"))
            .await
            .unwrap();
        fx.service
            .transition(&fx.journalist, article.id, WorkflowAction::Submit, None)
            .await
            .unwrap();

        // independent articles are reviewable by any editor
        let rejected = fx
            .service
            .transition(
                &fx.outside_editor,
                article.id,
                WorkflowAction::Reject,
                Some("Needs sources".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ArticleStatus::Rejected);
        assert_eq!(rejected.approved_by, Some(fx.outside_editor.id));
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Needs sources"));

        // the author revises and resubmits
        let resubmitted = fx
            .service
            .transition(&fx.journalist, article.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        assert_eq!(resubmitted.status, ArticleStatus::Submitted);
    }

    #[tokio::test]
    async fn test_update_permissions() {
        let fx = setup().await;
        let draft = fx
            .service
            .create(&fx.journalist, input("Draft Headline"))
            .await
            .unwrap();

        let updated = fx
            .service
            .update(
                &fx.journalist,
                draft.id,
                UpdateArticleInput::default().with_title("Better Headline"),
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Better Headline");
        assert_eq!(updated.slug, "draft-headline");

        assert!(matches!(
            fx.service
                .update(&fx.other_journalist, draft.id, UpdateArticleInput::default().with_title("Hijacked"))
                .await,
            Err(ArticleServiceError::Forbidden(_))
        ));

        let live = published(&fx, "Live Story").await;
        assert!(matches!(
            fx.service
                .update(&fx.journalist, live.id, UpdateArticleInput::default().with_title("Quiet Change"))
                .await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        let fixed = fx
            .service
            .update(&fx.editor, live.id, UpdateArticleInput::default().with_title("Corrected Story"))
            .await
            .unwrap();
        assert_eq!(fixed.title, "Corrected Story");
    }

    #[tokio::test]
    async fn test_delete_permissions() {
        let fx = setup().await;
        let draft = fx.service.create(&fx.journalist, input("Scrapped Idea")).await.unwrap();
        assert!(matches!(
            fx.service.delete(&fx.reader, draft.id).await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        fx.service.delete(&fx.journalist, draft.id).await.unwrap();

        let live = published(&fx, "Permanent Record").await;
        assert!(matches!(
            fx.service.delete(&fx.journalist, live.id).await,
            Err(ArticleServiceError::Forbidden(_))
        ));
        fx.service.delete(&fx.admin, live.id).await.unwrap();
        assert!(matches!(
            fx.service.get_by_id(live.id).await,
            Err(ArticleServiceError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_by_slug_visibility_and_views() {
        let fx = setup().await;
        let draft = fx
            .service
            .create(&fx.journalist, input("Secret Draft").with_publisher(fx.herald.id))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.get_by_slug(None, &draft.slug).await,
            Err(ArticleServiceError::NotFound)
        ));
        assert!(matches!(
            fx.service.get_by_slug(Some(&fx.reader), &draft.slug).await,
            Err(ArticleServiceError::NotFound)
        ));
        assert!(matches!(
            fx.service.get_by_slug(Some(&fx.outside_editor), &draft.slug).await,
            Err(ArticleServiceError::NotFound)
        ));
        assert!(fx.service.get_by_slug(Some(&fx.journalist), &draft.slug).await.is_ok());
        assert!(fx.service.get_by_slug(Some(&fx.editor), &draft.slug).await.is_ok());

        let live = published(&fx, "Open Story").await;
        fx.service.get_by_slug(None, &live.slug).await.unwrap();
        let seen = fx.service.get_by_slug(Some(&fx.reader), &live.slug).await.unwrap();
        assert_eq!(seen.view_count, 2);

        let history = SqlxEngagementRepository::new(fx.pool.clone())
            .list_history(fx.reader.id, 10)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].article_id, live.id);
    }

    #[tokio::test]
    async fn test_feed_scopes() {
        let fx = setup().await;
        let live = published(&fx, "Herald Front Page").await;
        let draft = fx.service.create(&fx.other_journalist, input("Jim Draft")).await.unwrap();
        let indie = fx.service.create(&fx.other_journalist, input("Jim Published")).await.unwrap();
        fx.service
            .transition(&fx.other_journalist, indie.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        fx.service
            .transition(&fx.admin, indie.id, WorkflowAction::Approve, None)
            .await
            .unwrap();
        let params = ListParams::default();

        let anon = fx.service.list_feed(None, FeedQuery::default(), &params).await.unwrap();
        assert_eq!(anon.total, 2);

        let mine = fx
            .service
            .list_feed(Some(&fx.other_journalist), FeedQuery::default(), &params)
            .await
            .unwrap();
        assert_eq!(mine.total, 3);
        assert!(mine.items.iter().any(|a| a.id == draft.id));

        let admin = fx.service.list_feed(Some(&fx.admin), FeedQuery::default(), &params).await.unwrap();
        assert_eq!(admin.total, 3);

        // a reader following the Herald sees only Herald articles unless asking for all
        SqlxSubscriptionRepository::new(fx.pool.clone())
            .subscribe(fx.reader.id, SubscriptionTarget::Publisher(fx.herald.id))
            .await
            .unwrap();
        let following = fx
            .service
            .list_feed(Some(&fx.reader), FeedQuery::default(), &params)
            .await
            .unwrap();
        assert_eq!(following.total, 1);
        assert_eq!(following.items[0].id, live.id);

        let everything = fx
            .service
            .list_feed(
                Some(&fx.reader),
                FeedQuery {
                    all: true,
                    ..Default::default()
                },
                &params,
            )
            .await
            .unwrap();
        assert_eq!(everything.total, 2);
    }

    #[tokio::test]
    async fn test_search_and_queue() {
        let fx = setup().await;
        published(&fx, "Harbour Bridge Reopens").await;
        let pending = fx
            .service
            .create(&fx.journalist, input("Pending Review").with_publisher(fx.herald.id))
            .await
            .unwrap();
        fx.service
            .transition(&fx.journalist, pending.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        let params = ListParams::default();

        assert_eq!(fx.service.search("", &params).await.unwrap().total, 0);
        assert_eq!(fx.service.search("harbour", &params).await.unwrap().total, 1);
        assert_eq!(fx.service.search("herald", &params).await.unwrap().total, 1);
        // submitted articles never show up in search
        assert_eq!(fx.service.search("pending", &params).await.unwrap().total, 0);
        for wildcard in ["%", "_", "__"] {
            assert_eq!(fx.service.search(wildcard, &params).await.unwrap().total, 0);
        }

        let queue = fx.service.approval_queue(&fx.editor, &params).await.unwrap();
        assert_eq!(queue.total, 1);
        assert_eq!(queue.items[0].id, pending.id);
        assert_eq!(fx.service.approval_queue(&fx.outside_editor, &params).await.unwrap().total, 0);
        assert!(matches!(
            fx.service.approval_queue(&fx.journalist, &params).await,
            Err(ArticleServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_list_by_subscription_target() {
        let fx = setup().await;
        published(&fx, "Herald Exclusive").await;
        fx.service.create(&fx.journalist, input("Unfinished Work")).await.unwrap();
        let params = ListParams::default();

        let by_publisher = fx
            .service
            .list_by_subscription_target(SubscriptionTarget::Publisher(fx.herald.id), &params)
            .await
            .unwrap();
        assert_eq!(by_publisher.total, 1);

        let by_journalist = fx
            .service
            .list_by_subscription_target(SubscriptionTarget::Journalist(fx.journalist.id), &params)
            .await
            .unwrap();
        assert_eq!(by_journalist.total, 1);

        let nobody = fx
            .service
            .list_by_subscription_target(SubscriptionTarget::Journalist(fx.other_journalist.id), &params)
            .await
            .unwrap();
        assert_eq!(nobody.total, 0);
    }
}
