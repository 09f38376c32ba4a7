//! Subscription repository
//!
//! Database operations for reader subscriptions to publishers and journalists.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Subscriber, Subscription, SubscriptionTarget, TargetType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

const SUBSCRIPTION_SELECT: &str = r#"
    SELECT s.id, s.user_id, s.target_type, s.target_id, s.created_at,
           CASE WHEN s.target_type = 'publisher' THEN COALESCE(p.name, '')
                ELSE COALESCE(u.username, '') END AS target_name
    FROM subscriptions s
    LEFT JOIN publishers p ON s.target_type = 'publisher' AND p.id = s.target_id
    LEFT JOIN users u ON s.target_type = 'journalist' AND u.id = s.target_id
"#;

/// Subscription repository trait
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Subscribe, returning the existing row when already subscribed
    async fn subscribe(&self, user_id: i64, target: SubscriptionTarget) -> Result<Subscription>;

    /// Returns false when there was no such subscription
    async fn unsubscribe(&self, user_id: i64, target: SubscriptionTarget) -> Result<bool>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>>;

    /// Users following a target, with their email addresses
    async fn subscribers_of(&self, target: SubscriptionTarget) -> Result<Vec<Subscriber>>;

    /// How many targets of one kind the user follows
    async fn count_for_user(&self, user_id: i64, target_type: TargetType) -> Result<i64>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based subscription repository implementation
pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find(&self, user_id: i64, target: SubscriptionTarget) -> Result<Option<Subscription>> {
        let sql = format!(
            "{} WHERE s.user_id = ? AND s.target_type = ? AND s.target_id = ?",
            SUBSCRIPTION_SELECT
        );
        let subscription = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get subscription")?
                .map(|row| row_to_subscription_sqlite(&row))
                .transpose()?,
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get subscription")?
                .map(|row| row_to_subscription_mysql(&row))
                .transpose()?,
        };
        Ok(subscription)
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn subscribe(&self, user_id: i64, target: SubscriptionTarget) -> Result<Subscription> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO subscriptions (user_id, target_type, target_id, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create subscription")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO subscriptions (user_id, target_type, target_id, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create subscription")?;
            }
        }
        self.find(user_id, target)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Subscription not found after insert"))
    }

    async fn unsubscribe(&self, user_id: i64, target: SubscriptionTarget) -> Result<bool> {
        let sql = "DELETE FROM subscriptions WHERE user_id = ? AND target_type = ? AND target_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete subscription")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete subscription")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let sql = format!(
            "{} WHERE s.user_id = ? ORDER BY s.created_at DESC, s.id DESC",
            SUBSCRIPTION_SELECT
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list subscriptions")?
                .iter()
                .map(row_to_subscription_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list subscriptions")?
                .iter()
                .map(row_to_subscription_mysql)
                .collect(),
        }
    }

    async fn subscribers_of(&self, target: SubscriptionTarget) -> Result<Vec<Subscriber>> {
        let sql = r#"
            SELECT u.id, u.email
            FROM subscriptions s
            JOIN users u ON u.id = s.user_id
            WHERE s.target_type = ? AND s.target_id = ?
            ORDER BY u.id
        "#;
        let subscribers = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list subscribers")?
                .iter()
                .map(|row| Subscriber {
                    user_id: row.get("id"),
                    email: row.get("email"),
                    target,
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(target.target_type().as_str())
                .bind(target.id())
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list subscribers")?
                .iter()
                .map(|row| Subscriber {
                    user_id: row.get("id"),
                    email: row.get("email"),
                    target,
                })
                .collect(),
        };
        Ok(subscribers)
    }

    async fn count_for_user(&self, user_id: i64, target_type: TargetType) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM subscriptions WHERE user_id = ? AND target_type = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(target_type.as_str())
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count subscriptions")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(target_type.as_str())
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count subscriptions")?
                .get("count"),
        };
        Ok(count)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM subscriptions";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count subscriptions")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count subscriptions")?
                .get("count"),
        };
        Ok(count)
    }
}

fn row_to_subscription_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Subscription> {
    let target_type: String = row.get("target_type");
    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        target_type: TargetType::from_str(&target_type)?,
        target_id: row.get("target_id"),
        target_name: row.get("target_name"),
        created_at: row.get("created_at"),
    })
}

fn row_to_subscription_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Subscription> {
    let target_type: String = row.get("target_type");
    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        target_type: TargetType::from_str(&target_type)?,
        target_id: row.get("target_id"),
        target_name: row.get("target_name"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    struct Fixture {
        repo: SqlxSubscriptionRepository,
        reader: i64,
        journalist: i64,
        publisher: i64,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let sqlite = pool.sqlite().unwrap();
        let insert_user = |name: &'static str, role: &'static str| {
            sqlx::query("INSERT INTO users (username, email, password_hash, role) VALUES (?, ?, 'h', ?)")
                .bind(name)
                .bind(format!("{}@example.com", name))
                .bind(role)
        };
        let reader = insert_user("reader", "reader")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        let journalist = insert_user("scribe", "journalist")
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();
        let publisher = sqlx::query(
            "INSERT INTO publishers (name, slug, description) VALUES ('Daily Planet', 'daily-planet', 'Metropolis news')",
        )
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();

        Fixture {
            repo: SqlxSubscriptionRepository::new(pool.clone()),
            reader,
            journalist,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let f = setup().await;
        let target = SubscriptionTarget::Publisher(f.publisher);
        let first = f.repo.subscribe(f.reader, target).await.unwrap();
        let second = f.repo.subscribe(f.reader, target).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.target_name, "Daily Planet");
        assert_eq!(f.repo.count_for_user(f.reader, TargetType::Publisher).await.unwrap(), 1);
        assert_eq!(f.repo.count_for_user(f.reader, TargetType::Journalist).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_names_both_target_kinds() {
        let f = setup().await;
        f.repo
            .subscribe(f.reader, SubscriptionTarget::Publisher(f.publisher))
            .await
            .unwrap();
        f.repo
            .subscribe(f.reader, SubscriptionTarget::Journalist(f.journalist))
            .await
            .unwrap();

        let subs = f.repo.list_for_user(f.reader).await.unwrap();
        let mut names: Vec<_> = subs.iter().map(|s| s.target_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Daily Planet", "scribe"]);
    }

    #[tokio::test]
    async fn test_subscribers_and_unsubscribe() {
        let f = setup().await;
        let target = SubscriptionTarget::Journalist(f.journalist);
        f.repo.subscribe(f.reader, target).await.unwrap();

        let subscribers = f.repo.subscribers_of(target).await.unwrap();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].email, "reader@example.com");
        assert_eq!(subscribers[0].target, target);

        assert!(f.repo.unsubscribe(f.reader, target).await.unwrap());
        assert!(!f.repo.unsubscribe(f.reader, target).await.unwrap());
        assert!(f.repo.subscribers_of(target).await.unwrap().is_empty());
        assert_eq!(f.repo.count().await.unwrap(), 0);
    }
}
