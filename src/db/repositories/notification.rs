//! Notification repository
//!
//! The outbox of queued emails. Rows are enqueued by the article and
//! newsletter services and drained by the dispatcher.

use super::{bind_mysql, bind_sqlite, BindValue};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, NewNotification, Notification, NotificationStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, Row, SqliteConnection};
use std::str::FromStr;
use std::sync::Arc;

const NOTIFICATION_COLUMNS: &str = "id, user_id, article_id, newsletter_id, recipient, subject, \
     body, status, attempts, last_error, created_at, sent_at";

const INSERT_SQL: &str = r#"
    INSERT INTO notifications (user_id, article_id, newsletter_id, recipient, subject, body,
                               status, attempts, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
"#;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Queue notifications, returning how many were stored
    async fn enqueue_many(&self, notifications: &[NewNotification]) -> Result<usize>;

    /// Oldest pending notifications first
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Notification>>;

    async fn mark_sent(&self, id: i64) -> Result<()>;

    /// Record a failed attempt. The row turns `failed` once `attempts`
    /// reaches `max_attempts`, otherwise it stays pending for a retry.
    async fn record_failure(&self, id: i64, error: &str, max_attempts: i32) -> Result<()>;

    async fn list(
        &self,
        status: Option<NotificationStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)>;

    async fn count_by_status(&self, status: NotificationStatus) -> Result<i64>;
}

/// SQLx-based notification repository implementation
pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }

    async fn select(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<Notification>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to query notifications")?
                .iter()
                .map(row_to_notification_sqlite)
                .collect(),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to query notifications")?
                .iter()
                .map(row_to_notification_mysql)
                .collect(),
        }
    }

    async fn count_where(&self, sql: &str, binds: &[BindValue]) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(sql), binds)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count notifications")?
                .get("count"),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(sql), binds)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count notifications")?
                .get("count"),
        };
        Ok(count)
    }
}

/// Insert pending rows on an open connection, so callers can make them part
/// of a larger transaction
pub(crate) async fn enqueue_sqlite(
    conn: &mut SqliteConnection,
    notifications: &[NewNotification],
) -> Result<()> {
    let now = Utc::now();
    for n in notifications {
        sqlx::query(INSERT_SQL)
            .bind(n.user_id)
            .bind(n.article_id)
            .bind(n.newsletter_id)
            .bind(&n.recipient)
            .bind(&n.subject)
            .bind(&n.body)
            .bind(NotificationStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("Failed to enqueue notification")?;
    }
    Ok(())
}

pub(crate) async fn enqueue_mysql(
    conn: &mut MySqlConnection,
    notifications: &[NewNotification],
) -> Result<()> {
    let now = Utc::now();
    for n in notifications {
        sqlx::query(INSERT_SQL)
            .bind(n.user_id)
            .bind(n.article_id)
            .bind(n.newsletter_id)
            .bind(&n.recipient)
            .bind(&n.subject)
            .bind(&n.body)
            .bind(NotificationStatus::Pending.as_str())
            .bind(now)
            .execute(&mut *conn)
            .await
            .context("Failed to enqueue notification")?;
    }
    Ok(())
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn enqueue_many(&self, notifications: &[NewNotification]) -> Result<usize> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self
                    .pool
                    .sqlite()?
                    .begin()
                    .await
                    .context("Failed to start transaction")?;
                enqueue_sqlite(&mut tx, notifications).await?;
                tx.commit().await.context("Failed to commit notifications")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self
                    .pool
                    .mysql()?
                    .begin()
                    .await
                    .context("Failed to start transaction")?;
                enqueue_mysql(&mut tx, notifications).await?;
                tx.commit().await.context("Failed to commit notifications")?;
            }
        }
        Ok(notifications.len())
    }

    async fn fetch_pending(&self, limit: i64) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE status = ? ORDER BY created_at, id LIMIT ?",
            NOTIFICATION_COLUMNS
        );
        self.select(
            &sql,
            &[
                BindValue::Text(NotificationStatus::Pending.as_str().to_string()),
                BindValue::Int(limit),
            ],
        )
        .await
    }

    async fn mark_sent(&self, id: i64) -> Result<()> {
        let sql = "UPDATE notifications SET status = ?, sent_at = ?, attempts = attempts + 1, \
                   last_error = NULL WHERE id = ?";
        let sent = NotificationStatus::Sent.as_str();
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(sent)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to mark notification sent")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(sent)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to mark notification sent")?;
            }
        }
        Ok(())
    }

    async fn record_failure(&self, id: i64, error: &str, max_attempts: i32) -> Result<()> {
        let sql = r#"
            UPDATE notifications
            SET status = CASE WHEN attempts + 1 >= ? THEN 'failed' ELSE 'pending' END,
                attempts = attempts + 1,
                last_error = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(max_attempts)
                    .bind(error)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to record notification failure")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(max_attempts)
                    .bind(error)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to record notification failure")?;
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        status: Option<NotificationStatus>,
        params: &ListParams,
    ) -> Result<(Vec<Notification>, i64)> {
        let (where_sql, mut binds) = match status {
            Some(status) => (
                "WHERE status = ?",
                vec![BindValue::Text(status.as_str().to_string())],
            ),
            None => ("", Vec::new()),
        };

        let total = self
            .count_where(
                &format!("SELECT COUNT(*) AS count FROM notifications {}", where_sql),
                &binds,
            )
            .await?;

        let sql = format!(
            "SELECT {} FROM notifications {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, where_sql
        );
        binds.push(BindValue::Int(params.limit()));
        binds.push(BindValue::Int(params.offset()));
        let items = self.select(&sql, &binds).await?;

        Ok((items, total))
    }

    async fn count_by_status(&self, status: NotificationStatus) -> Result<i64> {
        self.count_where(
            "SELECT COUNT(*) AS count FROM notifications WHERE status = ?",
            &[BindValue::Text(status.as_str().to_string())],
        )
        .await
    }
}

fn row_to_notification_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Notification> {
    let status: String = row.get("status");
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        article_id: row.get("article_id"),
        newsletter_id: row.get("newsletter_id"),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        body: row.get("body"),
        status: NotificationStatus::from_str(&status)?,
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
    })
}

fn row_to_notification_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Notification> {
    let status: String = row.get("status");
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        article_id: row.get("article_id"),
        newsletter_id: row.get("newsletter_id"),
        recipient: row.get("recipient"),
        subject: row.get("subject"),
        body: row.get("body"),
        status: NotificationStatus::from_str(&status)?,
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        sent_at: row.get("sent_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SqlxNotificationRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('r', 'r@example.com', 'h')",
        )
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();
        (SqlxNotificationRepository::new(pool), user_id)
    }

    fn new_notification(user_id: i64, subject: &str) -> NewNotification {
        NewNotification {
            user_id,
            article_id: None,
            newsletter_id: None,
            recipient: "r@example.com".to_string(),
            subject: subject.to_string(),
            body: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_mark_sent() {
        let (repo, user) = setup().await;
        let queued = repo
            .enqueue_many(&[new_notification(user, "one"), new_notification(user, "two")])
            .await
            .unwrap();
        assert_eq!(queued, 2);

        let pending = repo.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].subject, "one");

        repo.mark_sent(pending[0].id).await.unwrap();
        assert_eq!(repo.fetch_pending(10).await.unwrap().len(), 1);
        assert_eq!(repo.count_by_status(NotificationStatus::Sent).await.unwrap(), 1);

        let (sent, total) = repo
            .list(Some(NotificationStatus::Sent), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(sent[0].sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_retries_until_max_attempts() {
        let (repo, user) = setup().await;
        repo.enqueue_many(&[new_notification(user, "flaky")])
            .await
            .unwrap();
        let id = repo.fetch_pending(1).await.unwrap()[0].id;

        repo.record_failure(id, "connection refused", 2).await.unwrap();
        let retry = repo.fetch_pending(1).await.unwrap();
        assert_eq!(retry.len(), 1);
        assert_eq!(retry[0].attempts, 1);
        assert_eq!(retry[0].last_error.as_deref(), Some("connection refused"));

        repo.record_failure(id, "connection refused", 2).await.unwrap();
        assert!(repo.fetch_pending(1).await.unwrap().is_empty());
        assert_eq!(repo.count_by_status(NotificationStatus::Failed).await.unwrap(), 1);
    }
}
