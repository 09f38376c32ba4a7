//! Per-role dashboards and editorial analytics

use crate::db::repositories::{
    EngagementRepository, PublisherRepository, StatsRepository, SubscriptionRepository,
};
use crate::models::{
    Article, ArticleFilter, ArticleScope, CategoryCount, DailyCount, GlobalCounts,
    JournalistStats, ListParams, MemberRole, ReadingHistoryEntry, StatusCounts, TargetType, User,
    UserRole,
};
use crate::services::article::{ArticleService, ArticleServiceError, FeedQuery};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const ANALYTICS_DAYS: i64 = 30;
const TOP_JOURNALISTS: i64 = 10;
const RECENT_ARTICLES: u32 = 5;
const HISTORY_ENTRIES: i64 = 10;
const PENDING_ARTICLES: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum DashboardServiceError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<ArticleServiceError> for DashboardServiceError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::Forbidden(msg) => DashboardServiceError::Forbidden(msg),
            ArticleServiceError::InternalError(e) => DashboardServiceError::InternalError(e),
            other => DashboardServiceError::InternalError(anyhow::anyhow!(other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReaderDashboard {
    pub articles_read: i64,
    pub likes: i64,
    pub publisher_subscriptions: i64,
    pub journalist_subscriptions: i64,
    pub recent_articles: Vec<Article>,
    pub history: Vec<ReadingHistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalistDashboard {
    pub articles: StatusCounts,
    pub total_views: i64,
    pub total_likes: i64,
    pub recent_articles: Vec<Article>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditorDashboard {
    pub managed_publishers: usize,
    pub pending_approvals: i64,
    pub approved_this_month: i64,
    pub pending_articles: Vec<Article>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub counts: GlobalCounts,
    pub articles: StatusCounts,
}

/// Dashboard contents depend on the viewer's role
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Reader(ReaderDashboard),
    Journalist(JournalistDashboard),
    Editor(EditorDashboard),
    Admin(AdminDashboard),
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    /// One entry per day, oldest first, ending today
    pub daily_published: Vec<DailyCount>,
    pub categories: Vec<CategoryCount>,
    pub top_journalists: Vec<JournalistStats>,
}

pub struct DashboardService {
    stats_repo: Arc<dyn StatsRepository>,
    engagement_repo: Arc<dyn EngagementRepository>,
    subscription_repo: Arc<dyn SubscriptionRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    articles: Arc<ArticleService>,
}

impl DashboardService {
    pub fn new(
        stats_repo: Arc<dyn StatsRepository>,
        engagement_repo: Arc<dyn EngagementRepository>,
        subscription_repo: Arc<dyn SubscriptionRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        articles: Arc<ArticleService>,
    ) -> Self {
        Self {
            stats_repo,
            engagement_repo,
            subscription_repo,
            publisher_repo,
            articles,
        }
    }

    pub async fn dashboard(&self, user: &User) -> Result<Dashboard, DashboardServiceError> {
        let dashboard = match user.role {
            UserRole::Reader => Dashboard::Reader(self.reader_dashboard(user).await?),
            UserRole::Journalist => Dashboard::Journalist(self.journalist_dashboard(user).await?),
            UserRole::Editor => Dashboard::Editor(self.editor_dashboard(user).await?),
            UserRole::Admin => Dashboard::Admin(AdminDashboard {
                counts: self
                    .stats_repo
                    .global_counts()
                    .await
                    .context("Failed to load global counts")?,
                articles: self
                    .stats_repo
                    .status_counts(None)
                    .await
                    .context("Failed to load article counts")?,
            }),
        };
        Ok(dashboard)
    }

    /// Publication trend, category mix and top journalists. Editors and
    /// admins only.
    pub async fn analytics(&self, user: &User) -> Result<Analytics, DashboardServiceError> {
        if !user.can_review() {
            return Err(DashboardServiceError::Forbidden(
                "Analytics are available to editors only".to_string(),
            ));
        }

        let today = Utc::now().date_naive();
        let first_day = today - Duration::days(ANALYTICS_DAYS - 1);
        let since = start_of_day(first_day);
        let stamps = self
            .stats_repo
            .published_since(since)
            .await
            .context("Failed to load publication dates")?;

        Ok(Analytics {
            daily_published: daily_buckets(today, ANALYTICS_DAYS, &stamps),
            categories: self
                .stats_repo
                .category_distribution()
                .await
                .context("Failed to load category distribution")?,
            top_journalists: self
                .stats_repo
                .top_journalists(TOP_JOURNALISTS)
                .await
                .context("Failed to load top journalists")?,
        })
    }

    async fn reader_dashboard(&self, user: &User) -> Result<ReaderDashboard, DashboardServiceError> {
        let publisher_subscriptions = self
            .subscription_repo
            .count_for_user(user.id, TargetType::Publisher)
            .await
            .context("Failed to count publisher subscriptions")?;
        let journalist_subscriptions = self
            .subscription_repo
            .count_for_user(user.id, TargetType::Journalist)
            .await
            .context("Failed to count journalist subscriptions")?;
        let recent_articles = if publisher_subscriptions + journalist_subscriptions > 0 {
            self.articles
                .list_feed(Some(user), FeedQuery::default(), &ListParams::new(1, RECENT_ARTICLES))
                .await?
                .items
        } else {
            Vec::new()
        };

        Ok(ReaderDashboard {
            articles_read: self
                .engagement_repo
                .count_history(user.id)
                .await
                .context("Failed to count reading history")?,
            likes: self
                .engagement_repo
                .count_likes_by_user(user.id)
                .await
                .context("Failed to count likes")?,
            publisher_subscriptions,
            journalist_subscriptions,
            recent_articles,
            history: self
                .engagement_repo
                .list_history(user.id, HISTORY_ENTRIES)
                .await
                .context("Failed to load reading history")?,
        })
    }

    async fn journalist_dashboard(&self, user: &User) -> Result<JournalistDashboard, DashboardServiceError> {
        let totals = self
            .stats_repo
            .author_totals(user.id)
            .await
            .context("Failed to load engagement totals")?;
        let filter = ArticleFilter {
            author_id: Some(user.id),
            ..Default::default()
        };
        let recent = self
            .articles
            .list(&ArticleScope::All, &filter, &ListParams::new(1, RECENT_ARTICLES))
            .await?;

        Ok(JournalistDashboard {
            articles: self
                .stats_repo
                .status_counts(Some(user.id))
                .await
                .context("Failed to load article counts")?,
            total_views: totals.views,
            total_likes: totals.likes,
            recent_articles: recent.items,
        })
    }

    async fn editor_dashboard(&self, user: &User) -> Result<EditorDashboard, DashboardServiceError> {
        let managed = self
            .publisher_repo
            .publisher_ids_for_member(user.id, MemberRole::Editor)
            .await
            .context("Failed to load managed publishers")?;
        let pending = self
            .articles
            .approval_queue(user, &ListParams::new(1, PENDING_ARTICLES))
            .await?;
        let month_start = start_of_month(Utc::now().date_naive());

        Ok(EditorDashboard {
            managed_publishers: managed.len(),
            pending_approvals: pending.total,
            approved_this_month: self
                .stats_repo
                .count_approved_by_since(user.id, month_start)
                .await
                .context("Failed to count reviewed articles")?,
            pending_articles: pending.items,
        })
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn start_of_month(today: NaiveDate) -> DateTime<Utc> {
    start_of_day(today.with_day(1).unwrap_or(today))
}

/// Count timestamps per UTC day for the `days` days ending `today`.
/// Days without publications are present with a zero count.
pub fn daily_buckets(today: NaiveDate, days: i64, stamps: &[DateTime<Utc>]) -> Vec<DailyCount> {
    let mut counts: HashMap<NaiveDate, i64> = HashMap::new();
    for stamp in stamps {
        *counts.entry(stamp.date_naive()).or_default() += 1;
    }

    (0..days)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyCount {
                date,
                count: counts.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxEngagementRepository, SqlxPublisherRepository, SqlxStatsRepository,
        SqlxSubscriptionRepository,
    };
    use crate::models::{CreateArticleInput, SubscriptionTarget, WorkflowAction};
    use crate::services::article::tests::article_service;
    use crate::services::notification::tests::{service_with, RecordingMailer};
    use crate::services::test_support::{
        add_member, article_body, create_publisher, create_user, test_pool,
    };

    #[test]
    fn test_daily_buckets_fill_gaps() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let at = |d: u32, h: u32| Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap();
        let stamps = vec![at(10, 1), at(10, 23), at(8, 12), at(1, 0)];

        let buckets = daily_buckets(today, 7, &stamps);
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(buckets[6].date, today);
        assert_eq!(buckets[6].count, 2);
        assert_eq!(buckets[4].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 3);
    }

    #[test]
    fn test_start_of_month() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            start_of_month(day),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_dashboards_per_role() {
        let pool = test_pool().await;
        let articles = Arc::new(article_service(
            &pool,
            Arc::new(service_with(&pool, Arc::new(RecordingMailer::default()))),
        ));
        let service = DashboardService::new(
            SqlxStatsRepository::boxed(pool.clone()),
            SqlxEngagementRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            articles.clone(),
        );

        let journalist = create_user(&pool, "jane", UserRole::Journalist).await;
        let editor = create_user(&pool, "ed", UserRole::Editor).await;
        let reader = create_user(&pool, "rita", UserRole::Reader).await;
        let admin = create_user(&pool, "root", UserRole::Admin).await;
        let herald = create_publisher(&pool, "The Herald").await;
        add_member(&pool, &herald, &editor, MemberRole::Editor).await;

        let live = articles
            .create(
                &journalist,
                CreateArticleInput::new("Published Piece", article_body("published")),
            )
            .await
            .unwrap();
        articles
            .transition(&journalist, live.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        articles
            .transition(&editor, live.id, WorkflowAction::Approve, None)
            .await
            .unwrap();
        let waiting = articles
            .create(&journalist, CreateArticleInput::new("Waiting Piece", article_body("waiting")))
            .await
            .unwrap();
        articles
            .transition(&journalist, waiting.id, WorkflowAction::Submit, None)
            .await
            .unwrap();

        SqlxSubscriptionRepository::new(pool.clone())
            .subscribe(reader.id, SubscriptionTarget::Journalist(journalist.id))
            .await
            .unwrap();
        articles.get_by_slug(Some(&reader), &live.slug).await.unwrap();

        match service.dashboard(&reader).await.unwrap() {
            Dashboard::Reader(d) => {
                assert_eq!(d.publisher_subscriptions, 0);
                assert_eq!(d.journalist_subscriptions, 1);
                assert_eq!(d.articles_read, 1);
                assert_eq!(d.recent_articles.len(), 1);
                assert_eq!(d.history.len(), 1);
            }
            other => panic!("unexpected dashboard {:?}", other),
        }

        match service.dashboard(&journalist).await.unwrap() {
            Dashboard::Journalist(d) => {
                assert_eq!(d.articles.total, 2);
                assert_eq!(d.articles.published, 1);
                assert_eq!(d.articles.submitted, 1);
                assert_eq!(d.total_views, 1);
                assert_eq!(d.recent_articles.len(), 2);
            }
            other => panic!("unexpected dashboard {:?}", other),
        }

        match service.dashboard(&editor).await.unwrap() {
            Dashboard::Editor(d) => {
                assert_eq!(d.managed_publishers, 1);
                assert_eq!(d.pending_approvals, 1);
                assert_eq!(d.pending_articles[0].id, waiting.id);
                assert_eq!(d.approved_this_month, 1);
            }
            other => panic!("unexpected dashboard {:?}", other),
        }

        match service.dashboard(&admin).await.unwrap() {
            Dashboard::Admin(d) => {
                assert_eq!(d.counts.users, 4);
                assert_eq!(d.counts.published_articles, 1);
                assert_eq!(d.counts.pending_articles, 1);
            }
            other => panic!("unexpected dashboard {:?}", other),
        }

        let json = serde_json::to_value(service.dashboard(&reader).await.unwrap()).unwrap();
        assert_eq!(json["role"], "reader");

        assert!(matches!(
            service.analytics(&reader).await,
            Err(DashboardServiceError::Forbidden(_))
        ));
        let analytics = service.analytics(&editor).await.unwrap();
        assert_eq!(analytics.daily_published.len(), 30);
        assert_eq!(analytics.daily_published.last().map(|d| d.count), Some(1));
        assert_eq!(analytics.top_journalists[0].user_id, journalist.id);
    }

    async fn approved_this_month(service: &DashboardService, editor: &User) -> i64 {
        match service.dashboard(editor).await.unwrap() {
            Dashboard::Editor(d) => d.approved_this_month,
            other => panic!("unexpected dashboard {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_editor_dashboard_counts_only_approvals() {
        let pool = test_pool().await;
        let articles = Arc::new(article_service(
            &pool,
            Arc::new(service_with(&pool, Arc::new(RecordingMailer::default()))),
        ));
        let service = DashboardService::new(
            SqlxStatsRepository::boxed(pool.clone()),
            SqlxEngagementRepository::boxed(pool.clone()),
            SqlxSubscriptionRepository::boxed(pool.clone()),
            SqlxPublisherRepository::boxed(pool.clone()),
            articles.clone(),
        );
        let journalist = create_user(&pool, "jane", UserRole::Journalist).await;
        let editor = create_user(&pool, "ed", UserRole::Editor).await;

        let piece = articles
            .create(&journalist, CreateArticleInput::new("Contested Piece", article_body("contested")))
            .await
            .unwrap();
        articles
            .transition(&journalist, piece.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        articles
            .transition(&editor, piece.id, WorkflowAction::Reject, Some("Needs sources".into()))
            .await
            .unwrap();
        assert_eq!(approved_this_month(&service, &editor).await, 0);

        articles
            .transition(&journalist, piece.id, WorkflowAction::Submit, None)
            .await
            .unwrap();
        articles
            .transition(&editor, piece.id, WorkflowAction::Approve, None)
            .await
            .unwrap();
        assert_eq!(approved_this_month(&service, &editor).await, 1);

        // An approval from an earlier month stays out even when the article changes now
        sqlx::query("UPDATE articles SET approved_at = ? WHERE id = ?")
            .bind(Utc.with_ymd_and_hms(2020, 1, 15, 0, 0, 0).unwrap())
            .bind(piece.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        articles
            .transition(&editor, piece.id, WorkflowAction::Archive, None)
            .await
            .unwrap();
        assert_eq!(approved_this_month(&service, &editor).await, 0);
    }
}
