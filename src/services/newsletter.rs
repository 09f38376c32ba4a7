//! Newsletter service
//!
//! Newsletters bundle published articles into one email to the followers
//! of a publisher, or of the journalist who wrote the newsletter when it has
//! no publisher. Sending goes through the notification outbox.

use crate::db::repositories::{ArticleRepository, NewsletterRepository, PublisherRepository};
use crate::models::{
    CreateNewsletterInput, ListParams, MemberRole, Newsletter, NewsletterFilter, PagedResult,
    SubscriptionTarget, UpdateNewsletterInput, User, UserRole, NEWSLETTER_CONTENT_MIN_LENGTH,
    NEWSLETTER_TITLE_MAX_LENGTH, NEWSLETTER_TITLE_MIN_LENGTH,
};
use crate::services::notification::{NewsletterLink, NotificationService};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum NewsletterServiceError {
    #[error("Newsletter not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct NewsletterService {
    repo: Arc<dyn NewsletterRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    article_repo: Arc<dyn ArticleRepository>,
    notifications: Arc<NotificationService>,
}

impl NewsletterService {
    pub fn new(
        repo: Arc<dyn NewsletterRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        article_repo: Arc<dyn ArticleRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            repo,
            publisher_repo,
            article_repo,
            notifications,
        }
    }

    pub async fn create(
        &self,
        actor: &User,
        input: CreateNewsletterInput,
    ) -> Result<Newsletter, NewsletterServiceError> {
        if !actor.can_create_newsletter() {
            return Err(NewsletterServiceError::Forbidden(
                "Only journalists and editors can create newsletters".to_string(),
            ));
        }

        let title = input.title.trim().to_string();
        validate_title(&title)?;
        validate_content(&input.content)?;
        if let Some(publisher_id) = input.publisher_id {
            self.check_publisher(actor, publisher_id).await?;
        }
        self.check_articles(&input.article_ids).await?;

        let now = Utc::now();
        let newsletter = Newsletter {
            id: 0,
            title,
            content: input.content,
            frequency: input.frequency,
            publisher_id: input.publisher_id,
            created_by: Some(actor.id),
            article_ids: dedup(input.article_ids),
            scheduled_for: input.scheduled_for,
            sent_at: None,
            sent_count: 0,
            open_count: 0,
            click_count: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create(&newsletter)
            .await
            .context("Failed to create newsletter")?;
        tracing::info!(newsletter_id = created.id, actor = %actor.username, "Newsletter created");
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Newsletter, NewsletterServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get newsletter")?
            .ok_or(NewsletterServiceError::NotFound)
    }

    /// Newsletters newest first
    pub async fn list(
        &self,
        filter: &NewsletterFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Newsletter>, NewsletterServiceError> {
        let (items, total) = self
            .repo
            .list(filter, params)
            .await
            .context("Failed to list newsletters")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Newsletters of a publisher, or written by a journalist
    pub async fn list_by_subscription_target(
        &self,
        target: SubscriptionTarget,
        params: &ListParams,
    ) -> Result<PagedResult<Newsletter>, NewsletterServiceError> {
        let filter = match target {
            SubscriptionTarget::Publisher(id) => NewsletterFilter {
                publisher_id: Some(id),
                created_by: None,
            },
            SubscriptionTarget::Journalist(id) => NewsletterFilter {
                publisher_id: None,
                created_by: Some(id),
            },
        };
        self.list(&filter, params).await
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateNewsletterInput,
    ) -> Result<Newsletter, NewsletterServiceError> {
        let mut newsletter = self.get(id).await?;
        check_can_edit(actor, &newsletter)?;
        if newsletter.is_sent() {
            return Err(NewsletterServiceError::Conflict(
                "A sent newsletter cannot be edited".to_string(),
            ));
        }

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            newsletter.title = title;
        }
        if let Some(content) = input.content {
            validate_content(&content)?;
            newsletter.content = content;
        }
        if let Some(frequency) = input.frequency {
            newsletter.frequency = frequency;
        }
        if let Some(article_ids) = input.article_ids {
            self.check_articles(&article_ids).await?;
            newsletter.article_ids = dedup(article_ids);
        }
        if let Some(scheduled_for) = input.scheduled_for {
            newsletter.scheduled_for = Some(scheduled_for);
        }
        newsletter.updated_at = Utc::now();

        let updated = self
            .repo
            .update(&newsletter)
            .await
            .context("Failed to update newsletter")?;
        Ok(updated)
    }

    /// Creators may delete until the newsletter is sent; editors and admins
    /// at any time
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), NewsletterServiceError> {
        let newsletter = self.get(id).await?;
        check_can_edit(actor, &newsletter)?;
        if newsletter.is_sent() && !actor.can_review() {
            return Err(NewsletterServiceError::Conflict(
                "A sent newsletter cannot be deleted".to_string(),
            ));
        }

        self.repo
            .delete(id)
            .await
            .context("Failed to delete newsletter")?;
        Ok(())
    }

    /// Queue the newsletter for every follower and mark it sent
    pub async fn send(&self, actor: &User, id: i64) -> Result<Newsletter, NewsletterServiceError> {
        let newsletter = self.get(id).await?;
        check_can_edit(actor, &newsletter)?;
        self.deliver(newsletter).await
    }

    /// Send every unsent newsletter whose schedule has passed. Returns how
    /// many were sent; failures are logged and the rest still go out.
    pub async fn dispatch_due(&self) -> Result<usize, NewsletterServiceError> {
        let due = self
            .repo
            .list_due(Utc::now())
            .await
            .context("Failed to list due newsletters")?;

        let mut sent = 0;
        for newsletter in due {
            let id = newsletter.id;
            match self.deliver(newsletter).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::error!(newsletter_id = id, "Failed to send scheduled newsletter: {}", e),
            }
        }
        Ok(sent)
    }

    async fn deliver(&self, newsletter: Newsletter) -> Result<Newsletter, NewsletterServiceError> {
        if newsletter.is_sent() {
            return Err(NewsletterServiceError::Conflict(
                "Newsletter has already been sent".to_string(),
            ));
        }

        let target = match (newsletter.publisher_id, newsletter.created_by) {
            (Some(publisher_id), _) => Some(SubscriptionTarget::Publisher(publisher_id)),
            (None, Some(creator)) => Some(SubscriptionTarget::Journalist(creator)),
            (None, None) => None,
        };
        let recipients = match target {
            Some(target) => self
                .notifications
                .recipients(&[target])
                .await
                .map_err(|e| anyhow::anyhow!(e))?,
            None => Vec::new(),
        };

        let links = self.article_links(&newsletter.article_ids).await?;
        let queued = self
            .notifications
            .newsletter_notifications(&newsletter, &links, &recipients)
            .map_err(|e| anyhow::anyhow!(e))?;

        // The stamp and the outbox rows commit together; a concurrent second send loses
        let stamped = self
            .repo
            .mark_sent(newsletter.id, Utc::now(), &queued)
            .await
            .context("Failed to send newsletter")?;
        if !stamped {
            return Err(NewsletterServiceError::Conflict(
                "Newsletter has already been sent".to_string(),
            ));
        }
        tracing::info!(newsletter_id = newsletter.id, recipients = queued.len(), "Newsletter queued");

        self.get(newsletter.id).await
    }

    async fn article_links(&self, ids: &[i64]) -> Result<Vec<NewsletterLink>, NewsletterServiceError> {
        let mut links = Vec::with_capacity(ids.len());
        for &id in ids {
            let article = self
                .article_repo
                .get_by_id(id)
                .await
                .context("Failed to get newsletter article")?;
            if let Some(article) = article.filter(|a| a.is_published()) {
                links.push(NewsletterLink {
                    url: self.notifications.article_url(&article.slug),
                    title: article.title,
                });
            }
        }
        Ok(links)
    }

    async fn check_publisher(&self, actor: &User, publisher_id: i64) -> Result<(), NewsletterServiceError> {
        self.publisher_repo
            .get_by_id(publisher_id)
            .await
            .context("Failed to get publisher")?
            .ok_or_else(|| NewsletterServiceError::ValidationError("Unknown publisher".to_string()))?;

        if actor.role == UserRole::Journalist {
            let affiliated = self
                .publisher_repo
                .publisher_ids_for_member(actor.id, MemberRole::Journalist)
                .await
                .context("Failed to load affiliated publishers")?;
            if !affiliated.contains(&publisher_id) {
                return Err(NewsletterServiceError::Forbidden(
                    "You are not affiliated with this publisher".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Only published articles can be linked
    async fn check_articles(&self, ids: &[i64]) -> Result<(), NewsletterServiceError> {
        for &id in ids {
            let published = self
                .article_repo
                .get_by_id(id)
                .await
                .context("Failed to get article")?
                .is_some_and(|a| a.is_published());
            if !published {
                return Err(NewsletterServiceError::ValidationError(format!(
                    "Article {} is not published",
                    id
                )));
            }
        }
        Ok(())
    }
}

fn check_can_edit(actor: &User, newsletter: &Newsletter) -> Result<(), NewsletterServiceError> {
    if actor.can_review() || newsletter.created_by == Some(actor.id) {
        Ok(())
    } else {
        Err(NewsletterServiceError::Forbidden(
            "You cannot manage this newsletter".to_string(),
        ))
    }
}

fn validate_title(title: &str) -> Result<(), NewsletterServiceError> {
    let len = title.chars().count();
    if !(NEWSLETTER_TITLE_MIN_LENGTH..=NEWSLETTER_TITLE_MAX_LENGTH).contains(&len) {
        return Err(NewsletterServiceError::ValidationError(format!(
            "Title must be between {} and {} characters",
            NEWSLETTER_TITLE_MIN_LENGTH, NEWSLETTER_TITLE_MAX_LENGTH
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), NewsletterServiceError> {
    if content.trim().chars().count() < NEWSLETTER_CONTENT_MIN_LENGTH {
        return Err(NewsletterServiceError::ValidationError(format!(
            "Content must be at least {} characters",
            NEWSLETTER_CONTENT_MIN_LENGTH
        )));
    }
    Ok(())
}

fn dedup(mut ids: Vec<i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxNewsletterRepository, SqlxPublisherRepository,
        SqlxSubscriptionRepository, SubscriptionRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::{CreateArticleInput, NotificationStatus, Publisher, WorkflowAction};
    use crate::services::article::tests::article_service;
    use crate::services::notification::tests::{service_with, RecordingMailer};
    use crate::services::test_support::{
        add_member, article_body, create_publisher, create_user, test_pool,
    };
    use chrono::Duration;

    const CONTENT: &str = "This week in review: the stories that mattered most to our readers.";

    struct Fixture {
        pool: DynDatabasePool,
        service: NewsletterService,
        notifications: Arc<NotificationService>,
        journalist: User,
        outsider: User,
        editor: User,
        reader: User,
        herald: Publisher,
    }

    async fn setup() -> Fixture {
        let pool = test_pool().await;
        let notifications = Arc::new(service_with(&pool, Arc::new(RecordingMailer::default())));
        let journalist = create_user(&pool, "jane", UserRole::Journalist).await;
        let outsider = create_user(&pool, "jim", UserRole::Journalist).await;
        let editor = create_user(&pool, "ed", UserRole::Editor).await;
        let reader = create_user(&pool, "rita", UserRole::Reader).await;
        let herald = create_publisher(&pool, "The Herald").await;
        add_member(&pool, &herald, &journalist, MemberRole::Journalist).await;

        Fixture {
            service: NewsletterService::new(
                SqlxNewsletterRepository::boxed(pool.clone()),
                SqlxPublisherRepository::boxed(pool.clone()),
                SqlxArticleRepository::boxed(pool.clone()),
                notifications.clone(),
            ),
            pool,
            notifications,
            journalist,
            outsider,
            editor,
            reader,
            herald,
        }
    }

    fn input(title: &str) -> CreateNewsletterInput {
        CreateNewsletterInput::new(title, CONTENT)
    }

    #[tokio::test]
    async fn test_create_permissions_and_validation() {
        let fx = setup().await;

        assert!(matches!(
            fx.service.create(&fx.reader, input("Reader Weekly")).await,
            Err(NewsletterServiceError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.create(&fx.journalist, CreateNewsletterInput::new("Weekly", "short")).await,
            Err(NewsletterServiceError::ValidationError(_))
        ));

        let mut foreign = input("Herald Weekly");
        foreign.publisher_id = Some(fx.herald.id);
        assert!(matches!(
            fx.service.create(&fx.outsider, foreign.clone()).await,
            Err(NewsletterServiceError::Forbidden(_))
        ));
        let created = fx.service.create(&fx.journalist, foreign).await.unwrap();
        assert_eq!(created.created_by, Some(fx.journalist.id));
        assert!(!created.is_sent());

        let mut draft_link = input("Links Weekly");
        let draft = article_service(&fx.pool, fx.notifications.clone())
            .create(&fx.journalist, CreateArticleInput::new("Unpublished Piece", article_body("drafts")))
            .await
            .unwrap();
        draft_link.article_ids = vec![draft.id];
        assert!(matches!(
            fx.service.create(&fx.journalist, draft_link).await,
            Err(NewsletterServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_send_queues_followers_once() {
        let fx = setup().await;
        let articles = article_service(&fx.pool, fx.notifications.clone());
        let article = articles
            .create(&fx.journalist, CreateArticleInput::new("Linked Story", article_body("links")))
            .await
            .unwrap();
        articles
            .transition(&fx.journalist, article.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        articles
            .transition(&fx.editor, article.id, WorkflowAction::Approve, None)
            .await
            .unwrap();

        SqlxSubscriptionRepository::new(fx.pool.clone())
            .subscribe(fx.reader.id, SubscriptionTarget::Journalist(fx.journalist.id))
            .await
            .unwrap();

        let mut with_links = input("Jane's Picks");
        with_links.article_ids = vec![article.id, article.id];
        let newsletter = fx.service.create(&fx.journalist, with_links).await.unwrap();
        assert_eq!(newsletter.article_ids, vec![article.id]);

        assert!(matches!(
            fx.service.send(&fx.outsider, newsletter.id).await,
            Err(NewsletterServiceError::Forbidden(_))
        ));
        let sent = fx.service.send(&fx.journalist, newsletter.id).await.unwrap();
        assert!(sent.is_sent());
        assert_eq!(sent.sent_count, 1);

        let queued = fx
            .notifications
            .list(Some(NotificationStatus::Pending), &ListParams::default())
            .await
            .unwrap();
        let mail = queued
            .items
            .iter()
            .find(|n| n.newsletter_id == Some(newsletter.id))
            .expect("newsletter queued");
        assert_eq!(mail.subject, "Jane's Picks");
        assert!(mail.body.contains("/articles/linked-story"));

        assert!(matches!(
            fx.service.send(&fx.journalist, newsletter.id).await,
            Err(NewsletterServiceError::Conflict(_))
        ));
        assert!(matches!(
            fx.service
                .update(
                    &fx.journalist,
                    newsletter.id,
                    UpdateNewsletterInput {
                        title: Some("Too Late Now".to_string()),
                        ..Default::default()
                    },
                )
                .await,
            Err(NewsletterServiceError::Conflict(_))
        ));
        assert!(matches!(
            fx.service.delete(&fx.journalist, newsletter.id).await,
            Err(NewsletterServiceError::Conflict(_))
        ));
        fx.service.delete(&fx.editor, newsletter.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_due_sends_scheduled_only() {
        let fx = setup().await;
        let mut due = input("Due Newsletter");
        due.scheduled_for = Some(Utc::now() - Duration::minutes(5));
        let due = fx.service.create(&fx.journalist, due).await.unwrap();
        let mut later = input("Later Newsletter");
        later.scheduled_for = Some(Utc::now() + Duration::days(1));
        let later = fx.service.create(&fx.journalist, later).await.unwrap();

        assert_eq!(fx.service.dispatch_due().await.unwrap(), 1);
        assert!(fx.service.get(due.id).await.unwrap().is_sent());
        assert!(!fx.service.get(later.id).await.unwrap().is_sent());
        assert_eq!(fx.service.dispatch_due().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_subscription_target() {
        let fx = setup().await;
        let mut herald = input("Herald Weekly");
        herald.publisher_id = Some(fx.herald.id);
        fx.service.create(&fx.journalist, herald).await.unwrap();
        fx.service.create(&fx.outsider, input("Jim's Notes")).await.unwrap();
        let params = ListParams::default();

        let by_publisher = fx
            .service
            .list_by_subscription_target(SubscriptionTarget::Publisher(fx.herald.id), &params)
            .await
            .unwrap();
        assert_eq!(by_publisher.total, 1);
        let by_outsider = fx
            .service
            .list_by_subscription_target(SubscriptionTarget::Journalist(fx.outsider.id), &params)
            .await
            .unwrap();
        assert_eq!(by_outsider.total, 1);
        assert_eq!(by_outsider.items[0].title, "Jim's Notes");
    }
}
