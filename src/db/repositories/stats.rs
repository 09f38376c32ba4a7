//! Statistics repository
//!
//! Read-only aggregate queries behind the dashboards and analytics.
//! MySQL returns `SUM()` as DECIMAL, so sums are cast back to integers.

use super::{bind_mysql, bind_sqlite, BindValue};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    ArticleStatus, CategoryCount, EngagementTotals, GlobalCounts, JournalistStats, StatusCounts,
    UserRole,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// Statistics repository trait
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Article counts per status, optionally limited to one author's articles
    async fn status_counts(&self, author_id: Option<i64>) -> Result<StatusCounts>;

    /// Views and likes summed over an author's articles
    async fn author_totals(&self, author_id: i64) -> Result<EngagementTotals>;

    /// Articles a reviewer approved since `since`
    async fn count_approved_by_since(&self, reviewer_id: i64, since: DateTime<Utc>)
        -> Result<i64>;

    /// `published_at` of every article published since `since`
    async fn published_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>>;

    /// Published articles per category, largest first
    async fn category_distribution(&self) -> Result<Vec<CategoryCount>>;

    /// Journalists ranked by published article count
    async fn top_journalists(&self, limit: i64) -> Result<Vec<JournalistStats>>;

    async fn global_counts(&self) -> Result<GlobalCounts>;
}

/// SQLx-based statistics repository implementation
pub struct SqlxStatsRepository {
    pool: DynDatabasePool,
}

impl SqlxStatsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn StatsRepository> {
        Arc::new(Self::new(pool))
    }

    /// `SUM(expr)` as a non-null integer in the active dialect
    fn sum(&self, expr: &str) -> String {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => format!("COALESCE(SUM({}), 0)", expr),
            DatabaseDriver::Mysql => format!("CAST(COALESCE(SUM({}), 0) AS SIGNED)", expr),
        }
    }

    async fn count(&self, sql: &str, binds: &[BindValue]) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), binds)
                .fetch_one(self.pool.sqlite()?)
                .await
                .with_context(|| format!("Failed to run count query: {}", sql))?
                .get("count"),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), binds)
                .fetch_one(self.pool.mysql()?)
                .await
                .with_context(|| format!("Failed to run count query: {}", sql))?
                .get("count"),
        };
        Ok(count)
    }
}

fn published() -> BindValue {
    BindValue::Text(ArticleStatus::Published.as_str().to_string())
}

fn display_name(username: &str, first_name: &str, last_name: &str) -> String {
    let name = format!("{} {}", first_name.trim(), last_name.trim());
    match name.trim() {
        "" => username.to_string(),
        name => name.to_string(),
    }
}

#[async_trait]
impl StatsRepository for SqlxStatsRepository {
    async fn status_counts(&self, author_id: Option<i64>) -> Result<StatusCounts> {
        let (where_sql, binds) = match author_id {
            Some(id) => (
                "WHERE a.id IN (SELECT aa.article_id FROM article_authors aa WHERE aa.user_id = ?)",
                vec![BindValue::Int(id)],
            ),
            None => ("", Vec::new()),
        };
        let sql = format!(
            "SELECT a.status, COUNT(*) AS count FROM articles a {} GROUP BY a.status",
            where_sql
        );

        let rows: Vec<(String, i64)> = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count articles by status")?
                .iter()
                .map(|row| (row.get("status"), row.get("count")))
                .collect(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count articles by status")?
                .iter()
                .map(|row| (row.get("status"), row.get("count")))
                .collect(),
        };

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            counts.add(ArticleStatus::from_str(&status)?, count);
        }
        Ok(counts)
    }

    async fn author_totals(&self, author_id: i64) -> Result<EngagementTotals> {
        let sql = format!(
            "SELECT {} AS views, {} AS likes FROM articles a \
             JOIN article_authors aa ON aa.article_id = a.id WHERE aa.user_id = ?",
            self.sum("a.view_count"),
            self.sum("a.like_count")
        );
        let totals = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(author_id)
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to sum author engagement")?;
                EngagementTotals {
                    views: row.get("views"),
                    likes: row.get("likes"),
                }
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(author_id)
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to sum author engagement")?;
                EngagementTotals {
                    views: row.get("views"),
                    likes: row.get("likes"),
                }
            }
        };
        Ok(totals)
    }

    async fn count_approved_by_since(
        &self,
        reviewer_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) AS count FROM articles WHERE approved_by = ? AND approved_at >= ?",
            &[BindValue::Int(reviewer_id), BindValue::Time(since)],
        )
        .await
    }

    async fn published_since(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
        let sql = "SELECT published_at FROM articles \
                   WHERE status = ? AND published_at IS NOT NULL AND published_at >= ? \
                   ORDER BY published_at";
        let binds = [published(), BindValue::Time(since)];
        let stamps = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), &binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list publication dates")?
                .iter()
                .map(|row| row.get("published_at"))
                .collect(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), &binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list publication dates")?
                .iter()
                .map(|row| row.get("published_at"))
                .collect(),
        };
        Ok(stamps)
    }

    async fn category_distribution(&self) -> Result<Vec<CategoryCount>> {
        let sql = r#"
            SELECT c.name, c.slug, COUNT(a.id) AS count
            FROM categories c
            JOIN articles a ON a.category_id = c.id AND a.status = ?
            GROUP BY c.id, c.name, c.slug
            ORDER BY count DESC, c.name
        "#;
        let binds = [published()];
        let counts = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), &binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count articles per category")?
                .iter()
                .map(|row| CategoryCount {
                    name: row.get("name"),
                    slug: row.get("slug"),
                    count: row.get("count"),
                })
                .collect(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), &binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count articles per category")?
                .iter()
                .map(|row| CategoryCount {
                    name: row.get("name"),
                    slug: row.get("slug"),
                    count: row.get("count"),
                })
                .collect(),
        };
        Ok(counts)
    }

    async fn top_journalists(&self, limit: i64) -> Result<Vec<JournalistStats>> {
        let sql = format!(
            r#"
            SELECT u.id, u.username, u.first_name, u.last_name,
                   COUNT(a.id) AS article_count, {} AS total_views, {} AS total_likes
            FROM users u
            JOIN article_authors aa ON aa.user_id = u.id
            JOIN articles a ON a.id = aa.article_id AND a.status = ?
            WHERE u.role = ?
            GROUP BY u.id, u.username, u.first_name, u.last_name
            ORDER BY article_count DESC, u.username
            LIMIT ?
            "#,
            self.sum("a.view_count"),
            self.sum("a.like_count")
        );
        let binds = [
            published(),
            BindValue::Text(UserRole::Journalist.as_str().to_string()),
            BindValue::Int(limit),
        ];

        let stats = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to rank journalists")?
                .iter()
                .map(|row| {
                    let username: String = row.get("username");
                    let first: String = row.get("first_name");
                    let last: String = row.get("last_name");
                    JournalistStats {
                        user_id: row.get("id"),
                        full_name: display_name(&username, &first, &last),
                        username,
                        article_count: row.get("article_count"),
                        total_views: row.get("total_views"),
                        total_likes: row.get("total_likes"),
                    }
                })
                .collect(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to rank journalists")?
                .iter()
                .map(|row| {
                    let username: String = row.get("username");
                    let first: String = row.get("first_name");
                    let last: String = row.get("last_name");
                    JournalistStats {
                        user_id: row.get("id"),
                        full_name: display_name(&username, &first, &last),
                        username,
                        article_count: row.get("article_count"),
                        total_views: row.get("total_views"),
                        total_likes: row.get("total_likes"),
                    }
                })
                .collect(),
        };
        Ok(stats)
    }

    async fn global_counts(&self) -> Result<GlobalCounts> {
        let by_status = |status: ArticleStatus| {
            [BindValue::Text(status.as_str().to_string())]
        };
        let articles = "SELECT COUNT(*) AS count FROM articles WHERE status = ?";

        Ok(GlobalCounts {
            users: self.count("SELECT COUNT(*) AS count FROM users", &[]).await?,
            articles: self.count("SELECT COUNT(*) AS count FROM articles", &[]).await?,
            published_articles: self
                .count(articles, &by_status(ArticleStatus::Published))
                .await?,
            pending_articles: self
                .count(articles, &by_status(ArticleStatus::Submitted))
                .await?,
            publishers: self.count("SELECT COUNT(*) AS count FROM publishers", &[]).await?,
            categories: self.count("SELECT COUNT(*) AS count FROM categories", &[]).await?,
            subscriptions: self
                .count("SELECT COUNT(*) AS count FROM subscriptions", &[])
                .await?,
            newsletters: self.count("SELECT COUNT(*) AS count FROM newsletters", &[]).await?,
            pending_notifications: self
                .count(
                    "SELECT COUNT(*) AS count FROM notifications WHERE status = 'pending'",
                    &[],
                )
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    struct Fixture {
        repo: SqlxStatsRepository,
        pool: DynDatabasePool,
        journalist: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let journalist = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, first_name, last_name) \
             VALUES ('lois', 'lois@example.com', 'h', 'journalist', 'Lois', 'Lane')",
        )
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();
        Fixture {
            repo: SqlxStatsRepository::new(pool.clone()),
            pool,
            journalist,
        }
    }

    async fn article(
        f: &Fixture,
        slug: &str,
        status: &str,
        category_id: Option<i64>,
        views: i64,
        published_at: Option<DateTime<Utc>>,
    ) -> i64 {
        let sqlite = f.pool.sqlite().unwrap();
        let id = sqlx::query(
            "INSERT INTO articles (title, slug, content, content_html, status, category_id, view_count, like_count, published_at) \
             VALUES ('t', ?, 'x', 'x', ?, ?, ?, 1, ?)",
        )
        .bind(slug)
        .bind(status)
        .bind(category_id)
        .bind(views)
        .bind(published_at)
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();
        sqlx::query("INSERT INTO article_authors (article_id, user_id) VALUES (?, ?)")
            .bind(id)
            .bind(f.journalist)
            .execute(sqlite)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_status_counts_and_totals() {
        let f = setup().await;
        article(&f, "a", "draft", None, 5, None).await;
        article(&f, "b", "published", None, 10, Some(Utc::now())).await;
        article(&f, "c", "published", None, 1, Some(Utc::now())).await;

        let counts = f.repo.status_counts(Some(f.journalist)).await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.published, 2);
        assert_eq!(counts.draft, 1);

        let totals = f.repo.author_totals(f.journalist).await.unwrap();
        assert_eq!(totals, EngagementTotals { views: 16, likes: 3 });

        let empty = f.repo.author_totals(9999).await.unwrap();
        assert_eq!(empty, EngagementTotals::default());
    }

    #[tokio::test]
    async fn test_analytics_queries() {
        let f = setup().await;
        let tech = sqlx::query("INSERT INTO categories (name, slug) VALUES ('Tech', 'tech')")
            .execute(f.pool.sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        let now = Utc::now();
        article(&f, "old", "published", Some(tech), 0, Some(now - Duration::days(40))).await;
        article(&f, "new", "published", Some(tech), 0, Some(now - Duration::days(2))).await;
        article(&f, "draft", "draft", Some(tech), 0, None).await;

        let recent = f.repo.published_since(now - Duration::days(30)).await.unwrap();
        assert_eq!(recent.len(), 1);

        let dist = f.repo.category_distribution().await.unwrap();
        assert_eq!(dist.len(), 1);
        assert_eq!(dist[0].slug, "tech");
        assert_eq!(dist[0].count, 2);

        let top = f.repo.top_journalists(10).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].full_name, "Lois Lane");
        assert_eq!(top[0].article_count, 2);
        assert_eq!(top[0].total_likes, 2);

        let global = f.repo.global_counts().await.unwrap();
        assert_eq!(global.users, 1);
        assert_eq!(global.articles, 3);
        assert_eq!(global.published_articles, 2);
        assert_eq!(global.categories, 1);
    }
}
