//! Notification service
//!
//! Publication emails are not sent inline. The triggering request renders
//! one message per recipient into the notification outbox, and the
//! dispatcher loop started by `serve` (or the `notify` command) drains it
//! through the configured [`Mailer`].

use crate::config::{NotificationConfig, SiteConfig};
use crate::db::repositories::{NotificationRepository, SubscriptionRepository};
use crate::models::{
    Article, ListParams, NewNotification, Newsletter, Notification, NotificationStatus,
    PagedResult, Subscriber, SubscriptionTarget,
};
use crate::services::email::{Mailer, OutgoingEmail};
use crate::services::subscription::UnsubscribeTokens;
use anyhow::Context;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tera::Tera;

const ARTICLE_TEMPLATE: &str = "article_published.txt";
const NEWSLETTER_TEMPLATE: &str = "newsletter.txt";

const ARTICLE_BODY: &str = r#"Hello,

A new article has been published on {{ site_name }}:

{{ title }}
{% if subtitle %}{{ subtitle }}
{% endif %}
{{ excerpt }}

Read it here: {{ article_url }}

You are receiving this email because you follow {{ target_label }}.
Unsubscribe: {{ unsubscribe_url }}
"#;

const NEWSLETTER_BODY: &str = r#"{{ title }}

{{ content }}
{% for article in articles %}
- {{ article.title }}: {{ article.url }}{% endfor %}

You are receiving this email because you follow {{ target_label }}.
Unsubscribe: {{ unsubscribe_url }}
"#;

#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Article linked from a newsletter email
#[derive(Debug, Clone, Serialize)]
pub struct NewsletterLink {
    pub title: String,
    pub url: String,
}

pub struct NotificationService {
    notification_repo: Arc<dyn NotificationRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    mailer: Arc<dyn Mailer>,
    tokens: UnsubscribeTokens,
    templates: Tera,
    site: SiteConfig,
    config: NotificationConfig,
}

impl NotificationService {
    pub fn new(
        notification_repo: Arc<dyn NotificationRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        mailer: Arc<dyn Mailer>,
        tokens: UnsubscribeTokens,
        site: SiteConfig,
        config: NotificationConfig,
    ) -> Result<Self, NotificationServiceError> {
        let mut templates = Tera::default();
        templates.add_raw_templates(vec![
            (ARTICLE_TEMPLATE, ARTICLE_BODY),
            (NEWSLETTER_TEMPLATE, NEWSLETTER_BODY),
        ])?;

        Ok(Self {
            notification_repo,
            subscription_repo,
            mailer,
            tokens,
            templates,
            site,
            config,
        })
    }

    pub fn article_url(&self, slug: &str) -> String {
        format!("{}/articles/{}", self.site.base_url(), urlencoding::encode(slug))
    }

    pub fn unsubscribe_url(&self, user_id: i64, target: SubscriptionTarget) -> String {
        format!(
            "{}/api/v1/subscriptions/unsubscribe?user={}&type={}&id={}&token={}",
            self.site.base_url(),
            user_id,
            target.target_type(),
            target.id(),
            self.tokens.sign(user_id, target)
        )
    }

    /// Subscribers of every target, first match per user, skipping users
    /// without an email address
    pub async fn recipients(
        &self,
        targets: &[SubscriptionTarget],
    ) -> Result<Vec<Subscriber>, NotificationServiceError> {
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        for target in targets {
            let subscribers = self
                .subscription_repo
                .subscribers_of(*target)
                .await
                .context("Failed to load subscribers")?;
            for subscriber in subscribers {
                if subscriber.email.trim().is_empty() {
                    continue;
                }
                if seen.insert(subscriber.user_id) {
                    recipients.push(subscriber);
                }
            }
        }
        Ok(recipients)
    }

    /// Queue "new article" emails for the followers of the article's
    /// publisher and authors. Returns how many were queued.
    pub async fn notify_article_published(
        &self,
        article: &Article,
    ) -> Result<usize, NotificationServiceError> {
        let mut targets = Vec::with_capacity(article.authors.len() + 1);
        if let Some(publisher_id) = article.publisher_id {
            targets.push(SubscriptionTarget::Publisher(publisher_id));
        }
        targets.extend(
            article
                .authors
                .iter()
                .map(|a| SubscriptionTarget::Journalist(a.id)),
        );

        let recipients = self.recipients(&targets).await?;
        if recipients.is_empty() {
            return Ok(0);
        }

        let subject = format!("New Article Published: {}", article.title);
        let article_url = self.article_url(&article.slug);
        let mut queued = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let mut ctx = tera::Context::new();
            ctx.insert("site_name", &self.site.name);
            ctx.insert("title", &article.title);
            ctx.insert("subtitle", &article.subtitle);
            ctx.insert("excerpt", &article.excerpt);
            ctx.insert("article_url", &article_url);
            ctx.insert("target_label", &self.target_label(article, recipient.target));
            ctx.insert(
                "unsubscribe_url",
                &self.unsubscribe_url(recipient.user_id, recipient.target),
            );
            let body = self.templates.render(ARTICLE_TEMPLATE, &ctx)?;

            queued.push(NewNotification {
                user_id: recipient.user_id,
                article_id: Some(article.id),
                newsletter_id: None,
                recipient: recipient.email.clone(),
                subject: subject.clone(),
                body,
            });
        }

        let count = self
            .notification_repo
            .enqueue_many(&queued)
            .await
            .context("Failed to queue notifications")?;
        tracing::info!(article_id = article.id, count, "Queued article notifications");
        Ok(count)
    }

    /// Render one newsletter email per recipient, ready to be queued
    pub fn newsletter_notifications(
        &self,
        newsletter: &Newsletter,
        articles: &[NewsletterLink],
        recipients: &[Subscriber],
    ) -> Result<Vec<NewNotification>, NotificationServiceError> {
        let mut queued = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let mut ctx = tera::Context::new();
            ctx.insert("title", &newsletter.title);
            ctx.insert("content", &newsletter.content);
            ctx.insert("articles", articles);
            ctx.insert("target_label", &format!("this {}", recipient.target.target_type()));
            ctx.insert(
                "unsubscribe_url",
                &self.unsubscribe_url(recipient.user_id, recipient.target),
            );
            let body = self.templates.render(NEWSLETTER_TEMPLATE, &ctx)?;

            queued.push(NewNotification {
                user_id: recipient.user_id,
                article_id: None,
                newsletter_id: Some(newsletter.id),
                recipient: recipient.email.clone(),
                subject: newsletter.title.clone(),
                body,
            });
        }
        Ok(queued)
    }

    /// Send one batch of pending notifications.
    ///
    /// Mail failures are recorded on the row and never returned as errors;
    /// only outbox access failures are.
    pub async fn dispatch_pending(&self) -> Result<DispatchReport, NotificationServiceError> {
        let pending = self
            .notification_repo
            .fetch_pending(self.config.batch_size)
            .await
            .context("Failed to fetch pending notifications")?;

        let mut report = DispatchReport::default();
        for notification in pending {
            let email = OutgoingEmail {
                to: notification.recipient.clone(),
                subject: notification.subject.clone(),
                body: notification.body.clone(),
            };
            match self.mailer.send(&email).await {
                Ok(()) => {
                    self.notification_repo
                        .mark_sent(notification.id)
                        .await
                        .context("Failed to mark notification sent")?;
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        notification_id = notification.id,
                        mailer = self.mailer.name(),
                        "Failed to send notification: {:#}",
                        e
                    );
                    self.notification_repo
                        .record_failure(notification.id, &format!("{:#}", e), self.config.max_attempts)
                        .await
                        .context("Failed to record notification failure")?;
                    report.failed += 1;
                }
            }
        }

        if report.sent > 0 || report.failed > 0 {
            tracing::info!(sent = report.sent, failed = report.failed, "Notification dispatch finished");
        }
        Ok(report)
    }

    pub async fn list(
        &self,
        status: Option<NotificationStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Notification>, NotificationServiceError> {
        let (items, total) = self
            .notification_repo
            .list(status, params)
            .await
            .context("Failed to list notifications")?;
        Ok(PagedResult::new(items, total, params))
    }

    fn target_label(&self, article: &Article, target: SubscriptionTarget) -> String {
        match target {
            SubscriptionTarget::Publisher(_) => article
                .publisher_name
                .clone()
                .unwrap_or_else(|| "this publisher".to_string()),
            SubscriptionTarget::Journalist(id) => article
                .authors
                .iter()
                .find(|a| a.id == id)
                .map(|a| a.full_name.clone())
                .unwrap_or_else(|| "this journalist".to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxNotificationRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{ArticleAuthor, ArticlePriority, ArticleStatus, User, UserRole};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records messages instead of sending them; fails for addresses in `reject`
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub reject: Vec<String>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
            if self.reject.contains(&email.to) {
                return Err(anyhow!("mailbox unavailable"));
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    pub(crate) fn service_with(pool: &DynDatabasePool, mailer: Arc<dyn Mailer>) -> NotificationService {
        NotificationService::new(
            SqlxNotificationRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            mailer,
            UnsubscribeTokens::new("test-secret").unwrap(),
            SiteConfig {
                url: "https://news.example.com/".to_string(),
                ..Default::default()
            },
            NotificationConfig::default(),
        )
        .unwrap()
    }

    fn article(journalist: &User) -> Article {
        let now = Utc::now();
        Article {
            id: 1,
            title: "Breaking Story".to_string(),
            subtitle: String::new(),
            slug: "breaking-story".to_string(),
            content: String::new(),
            content_html: String::new(),
            excerpt: "Something happened".to_string(),
            category_id: None,
            category_slug: None,
            tags: String::new(),
            publisher_id: None,
            publisher_name: None,
            authors: vec![ArticleAuthor {
                id: journalist.id,
                username: journalist.username.clone(),
                full_name: journalist.full_name(),
            }],
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            status: ArticleStatus::Published,
            priority: ArticlePriority::Normal,
            is_featured: false,
            is_sticky: false,
            allow_comments: true,
            reading_time: 1,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            published_at: Some(now),
        }
    }

    async fn setup() -> (DynDatabasePool, User, Vec<User>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let subs = SqlxSubscriptionRepository::boxed(pool.clone());

        let journalist = users
            .create(&User::new("writer", "writer@example.com", "h", UserRole::Journalist))
            .await
            .unwrap();
        let mut readers = Vec::new();
        for (name, email) in [("alice", "alice@example.com"), ("bob", "bob@example.com"), ("ghost", "")] {
            let reader = users
                .create(&User::new(name, email, "h", UserRole::Reader))
                .await
                .unwrap();
            subs.subscribe(reader.id, SubscriptionTarget::Journalist(journalist.id))
                .await
                .unwrap();
            readers.push(reader);
        }
        (pool, journalist, readers)
    }

    #[tokio::test]
    async fn test_notify_article_published_queues_per_recipient() {
        let (pool, journalist, _) = setup().await;
        let service = service_with(&pool, Arc::new(RecordingMailer::default()));

        let count = service.notify_article_published(&article(&journalist)).await.unwrap();
        // the reader without an email is skipped
        assert_eq!(count, 2);

        let queued = service
            .list(Some(NotificationStatus::Pending), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(queued.total, 2);
        let first = &queued.items[0];
        assert_eq!(first.subject, "New Article Published: Breaking Story");
        assert!(first
            .body
            .contains("https://news.example.com/articles/breaking-story"));
        assert!(first.body.contains("/api/v1/subscriptions/unsubscribe?user="));
    }

    #[tokio::test]
    async fn test_recipients_are_deduplicated() {
        let (pool, journalist, readers) = setup().await;
        let service = service_with(&pool, Arc::new(RecordingMailer::default()));

        let targets = [
            SubscriptionTarget::Journalist(journalist.id),
            SubscriptionTarget::Journalist(journalist.id),
        ];
        let recipients = service.recipients(&targets).await.unwrap();
        assert_eq!(recipients.len(), 2);
        assert!(recipients.iter().all(|r| r.user_id != readers[2].id));
    }

    #[tokio::test]
    async fn test_dispatch_marks_sent_and_retries_failures() {
        let (pool, journalist, _) = setup().await;
        let mailer = Arc::new(RecordingMailer {
            reject: vec!["bob@example.com".to_string()],
            ..Default::default()
        });
        let service = service_with(&pool, mailer.clone());
        service.notify_article_published(&article(&journalist)).await.unwrap();

        let report = service.dispatch_pending().await.unwrap();
        assert_eq!(report, DispatchReport { sent: 1, failed: 1 });
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        // bob stays pending until max_attempts is reached
        for _ in 1..NotificationConfig::default().max_attempts {
            let report = service.dispatch_pending().await.unwrap();
            assert_eq!(report.failed, 1);
        }
        let failed = service
            .list(Some(NotificationStatus::Failed), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.items[0].attempts, NotificationConfig::default().max_attempts);
        assert!(failed.items[0].last_error.is_some());

        let report = service.dispatch_pending().await.unwrap();
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_unsubscribe_url_is_signed() {
        let (pool, _, _) = setup().await;
        let service = service_with(&pool, Arc::new(RecordingMailer::default()));
        let target = SubscriptionTarget::Publisher(4);
        let url = service.unsubscribe_url(9, target);
        let token = UnsubscribeTokens::new("test-secret").unwrap().sign(9, target);
        assert_eq!(
            url,
            format!(
                "https://news.example.com/api/v1/subscriptions/unsubscribe?user=9&type=publisher&id=4&token={}",
                token
            )
        );
    }

    #[tokio::test]
    async fn test_article_url_encodes_slug() {
        let (pool, _, _) = setup().await;
        let service = service_with(&pool, Arc::new(RecordingMailer::default()));
        assert_eq!(
            service.article_url("café-news"),
            "https://news.example.com/articles/caf%C3%A9-news"
        );
    }
}
