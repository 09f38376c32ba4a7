//! Newsletter repository
//!
//! Database operations for newsletters and their linked articles.

use super::notification::{enqueue_mysql, enqueue_sqlite};
use super::{bind_mysql, bind_sqlite, placeholders, BindValue};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, NewNotification, Newsletter, NewsletterFilter, NewsletterFrequency};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const NEWSLETTER_COLUMNS: &str = "id, title, content, frequency, publisher_id, created_by, \
     scheduled_for, sent_at, sent_count, open_count, click_count, created_at, updated_at";

/// Newsletter repository trait
#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>>;

    async fn list(
        &self,
        filter: &NewsletterFilter,
        params: &ListParams,
    ) -> Result<(Vec<Newsletter>, i64)>;

    /// Persist editable fields and replace the article links
    async fn update(&self, newsletter: &Newsletter) -> Result<Newsletter>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Stamp an unsent newsletter as sent and queue its notifications in the
    /// same transaction. Returns false, queueing nothing, if it was already sent.
    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        notifications: &[NewNotification],
    ) -> Result<bool>;

    /// Unsent newsletters scheduled at or before `now`
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based newsletter repository implementation
pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }

    async fn select(&self, sql: &str, binds: &[BindValue]) -> Result<Vec<Newsletter>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let mut newsletters = bind_sqlite(sqlx::query(sql), binds)
                    .fetch_all(pool)
                    .await
                    .context("Failed to query newsletters")?
                    .iter()
                    .map(row_to_newsletter_sqlite)
                    .collect::<Result<Vec<_>>>()?;
                attach_articles_sqlite(pool, &mut newsletters).await?;
                Ok(newsletters)
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let mut newsletters = bind_mysql(sqlx::query(sql), binds)
                    .fetch_all(pool)
                    .await
                    .context("Failed to query newsletters")?
                    .iter()
                    .map(row_to_newsletter_mysql)
                    .collect::<Result<Vec<_>>>()?;
                attach_articles_mysql(pool, &mut newsletters).await?;
                Ok(newsletters)
            }
        }
    }
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn create(&self, newsletter: &Newsletter) -> Result<Newsletter> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => create_newsletter_sqlite(self.pool.sqlite()?, newsletter).await?,
            DatabaseDriver::Mysql => create_newsletter_mysql(self.pool.mysql()?, newsletter).await?,
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Newsletter not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Newsletter>> {
        let sql = format!("SELECT {} FROM newsletters WHERE id = ?", NEWSLETTER_COLUMNS);
        let mut found = self.select(&sql, &[BindValue::Int(id)]).await?;
        Ok(found.pop())
    }

    async fn list(
        &self,
        filter: &NewsletterFilter,
        params: &ListParams,
    ) -> Result<(Vec<Newsletter>, i64)> {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();
        if let Some(publisher_id) = filter.publisher_id {
            clauses.push("publisher_id = ?");
            binds.push(BindValue::Int(publisher_id));
        }
        if let Some(created_by) = filter.created_by {
            clauses.push("created_by = ?");
            binds.push(BindValue::Int(created_by));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS count FROM newsletters {}", where_sql);
        let total: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => bind_sqlite(sqlx::query(&count_sql), &binds)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count newsletters")?
                .get("count"),
            DatabaseDriver::Mysql => bind_mysql(sqlx::query(&count_sql), &binds)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count newsletters")?
                .get("count"),
        };

        let sql = format!(
            "SELECT {} FROM newsletters {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            NEWSLETTER_COLUMNS, where_sql
        );
        binds.push(BindValue::Int(params.limit()));
        binds.push(BindValue::Int(params.offset()));
        let items = self.select(&sql, &binds).await?;

        Ok((items, total))
    }

    async fn update(&self, newsletter: &Newsletter) -> Result<Newsletter> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_newsletter_sqlite(self.pool.sqlite()?, newsletter).await?,
            DatabaseDriver::Mysql => update_newsletter_mysql(self.pool.mysql()?, newsletter).await?,
        }
        self.get_by_id(newsletter.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Newsletter not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM newsletters WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete newsletter")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete newsletter")?;
            }
        }
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        notifications: &[NewNotification],
    ) -> Result<bool> {
        let sql = "UPDATE newsletters SET sent_at = ?, sent_count = ?, updated_at = ? \
                   WHERE id = ? AND sent_at IS NULL";
        let sent_count = notifications.len() as i64;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self
                    .pool
                    .sqlite()?
                    .begin()
                    .await
                    .context("Failed to start transaction")?;
                let affected = sqlx::query(sql)
                    .bind(sent_at)
                    .bind(sent_count)
                    .bind(sent_at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to mark newsletter sent")?
                    .rows_affected();
                if affected == 0 {
                    return Ok(false);
                }
                enqueue_sqlite(&mut tx, notifications).await?;
                tx.commit().await.context("Failed to commit newsletter send")?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self
                    .pool
                    .mysql()?
                    .begin()
                    .await
                    .context("Failed to start transaction")?;
                let affected = sqlx::query(sql)
                    .bind(sent_at)
                    .bind(sent_count)
                    .bind(sent_at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to mark newsletter sent")?
                    .rows_affected();
                if affected == 0 {
                    return Ok(false);
                }
                enqueue_mysql(&mut tx, notifications).await?;
                tx.commit().await.context("Failed to commit newsletter send")?;
            }
        }
        Ok(true)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>> {
        let sql = format!(
            "SELECT {} FROM newsletters \
             WHERE sent_at IS NULL AND scheduled_for IS NOT NULL AND scheduled_for <= ? \
             ORDER BY scheduled_for, id",
            NEWSLETTER_COLUMNS
        );
        self.select(&sql, &[BindValue::Time(now)]).await
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM newsletters";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count newsletters")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count newsletters")?
                .get("count"),
        };
        Ok(count)
    }
}

fn group_article_ids(newsletters: &mut [Newsletter], pairs: impl Iterator<Item = (i64, i64)>) {
    let mut by_newsletter: HashMap<i64, Vec<i64>> = HashMap::new();
    for (newsletter_id, article_id) in pairs {
        by_newsletter.entry(newsletter_id).or_default().push(article_id);
    }
    for newsletter in newsletters.iter_mut() {
        newsletter.article_ids = by_newsletter.remove(&newsletter.id).unwrap_or_default();
    }
}

fn links_sql(n: usize) -> String {
    format!(
        "SELECT newsletter_id, article_id FROM newsletter_articles \
         WHERE newsletter_id IN ({}) ORDER BY article_id",
        placeholders(n)
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_newsletter_sqlite(pool: &SqlitePool, newsletter: &Newsletter) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    let id = sqlx::query(
        r#"
        INSERT INTO newsletters (title, content, frequency, publisher_id, created_by,
                                 scheduled_for, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&newsletter.title)
    .bind(&newsletter.content)
    .bind(newsletter.frequency.as_str())
    .bind(newsletter.publisher_id)
    .bind(newsletter.created_by)
    .bind(newsletter.scheduled_for)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create newsletter")?
    .last_insert_rowid();

    link_articles_sqlite(&mut tx, id, &newsletter.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(id)
}

async fn update_newsletter_sqlite(pool: &SqlitePool, newsletter: &Newsletter) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    sqlx::query(
        r#"
        UPDATE newsletters
        SET title = ?, content = ?, frequency = ?, publisher_id = ?, scheduled_for = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&newsletter.title)
    .bind(&newsletter.content)
    .bind(newsletter.frequency.as_str())
    .bind(newsletter.publisher_id)
    .bind(newsletter.scheduled_for)
    .bind(Utc::now())
    .bind(newsletter.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update newsletter")?;

    sqlx::query("DELETE FROM newsletter_articles WHERE newsletter_id = ?")
        .bind(newsletter.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear newsletter articles")?;
    link_articles_sqlite(&mut tx, newsletter.id, &newsletter.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")
}

async fn link_articles_sqlite(conn: &mut SqliteConnection, id: i64, article_ids: &[i64]) -> Result<()> {
    for article_id in article_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO newsletter_articles (newsletter_id, article_id) VALUES (?, ?)",
        )
        .bind(id)
        .bind(article_id)
        .execute(&mut *conn)
        .await
        .context("Failed to link newsletter article")?;
    }
    Ok(())
}

async fn attach_articles_sqlite(pool: &SqlitePool, newsletters: &mut [Newsletter]) -> Result<()> {
    if newsletters.is_empty() {
        return Ok(());
    }
    let sql = links_sql(newsletters.len());
    let mut query = sqlx::query(&sql);
    for newsletter in newsletters.iter() {
        query = query.bind(newsletter.id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load newsletter articles")?;
    group_article_ids(
        newsletters,
        rows.iter()
            .map(|row| (row.get("newsletter_id"), row.get("article_id"))),
    );
    Ok(())
}

fn row_to_newsletter_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Newsletter> {
    let frequency: String = row.get("frequency");
    Ok(Newsletter {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        frequency: NewsletterFrequency::from_str(&frequency)?,
        publisher_id: row.get("publisher_id"),
        created_by: row.get("created_by"),
        article_ids: Vec::new(),
        scheduled_for: row.get("scheduled_for"),
        sent_at: row.get("sent_at"),
        sent_count: row.get("sent_count"),
        open_count: row.get("open_count"),
        click_count: row.get("click_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_newsletter_mysql(pool: &MySqlPool, newsletter: &Newsletter) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    let id = sqlx::query(
        r#"
        INSERT INTO newsletters (title, content, frequency, publisher_id, created_by,
                                 scheduled_for, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&newsletter.title)
    .bind(&newsletter.content)
    .bind(newsletter.frequency.as_str())
    .bind(newsletter.publisher_id)
    .bind(newsletter.created_by)
    .bind(newsletter.scheduled_for)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create newsletter")?
    .last_insert_id() as i64;

    link_articles_mysql(&mut tx, id, &newsletter.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")?;
    Ok(id)
}

async fn update_newsletter_mysql(pool: &MySqlPool, newsletter: &Newsletter) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    sqlx::query(
        r#"
        UPDATE newsletters
        SET title = ?, content = ?, frequency = ?, publisher_id = ?, scheduled_for = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&newsletter.title)
    .bind(&newsletter.content)
    .bind(newsletter.frequency.as_str())
    .bind(newsletter.publisher_id)
    .bind(newsletter.scheduled_for)
    .bind(Utc::now())
    .bind(newsletter.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update newsletter")?;

    sqlx::query("DELETE FROM newsletter_articles WHERE newsletter_id = ?")
        .bind(newsletter.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear newsletter articles")?;
    link_articles_mysql(&mut tx, newsletter.id, &newsletter.article_ids).await?;
    tx.commit().await.context("Failed to commit newsletter")
}

async fn link_articles_mysql(conn: &mut MySqlConnection, id: i64, article_ids: &[i64]) -> Result<()> {
    for article_id in article_ids {
        sqlx::query("INSERT IGNORE INTO newsletter_articles (newsletter_id, article_id) VALUES (?, ?)")
            .bind(id)
            .bind(article_id)
            .execute(&mut *conn)
            .await
            .context("Failed to link newsletter article")?;
    }
    Ok(())
}

async fn attach_articles_mysql(pool: &MySqlPool, newsletters: &mut [Newsletter]) -> Result<()> {
    if newsletters.is_empty() {
        return Ok(());
    }
    let sql = links_sql(newsletters.len());
    let mut query = sqlx::query(&sql);
    for newsletter in newsletters.iter() {
        query = query.bind(newsletter.id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load newsletter articles")?;
    group_article_ids(
        newsletters,
        rows.iter()
            .map(|row| (row.get("newsletter_id"), row.get("article_id"))),
    );
    Ok(())
}

fn row_to_newsletter_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Newsletter> {
    let frequency: String = row.get("frequency");
    Ok(Newsletter {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        frequency: NewsletterFrequency::from_str(&frequency)?,
        publisher_id: row.get("publisher_id"),
        created_by: row.get("created_by"),
        article_ids: Vec::new(),
        scheduled_for: row.get("scheduled_for"),
        sent_at: row.get("sent_at"),
        sent_count: row.get("sent_count"),
        open_count: row.get("open_count"),
        click_count: row.get("click_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> (SqlxNewsletterRepository, DynDatabasePool) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (SqlxNewsletterRepository::new(pool.clone()), pool)
    }

    async fn article(pool: &DynDatabasePool, slug: &str) -> i64 {
        sqlx::query(
            "INSERT INTO articles (title, slug, content, content_html, status) VALUES ('t', ?, 'x', 'x', 'published')",
        )
        .bind(slug)
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid()
    }

    fn newsletter(title: &str) -> Newsletter {
        let now = Utc::now();
        Newsletter {
            id: 0,
            title: title.to_string(),
            content: "This week in local news, a summary of everything".to_string(),
            frequency: NewsletterFrequency::Weekly,
            publisher_id: None,
            created_by: None,
            article_ids: Vec::new(),
            scheduled_for: None,
            sent_at: None,
            sent_count: 0,
            open_count: 0,
            click_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_with_articles_and_update_links() {
        let (repo, pool) = setup().await;
        let a1 = article(&pool, "one").await;
        let a2 = article(&pool, "two").await;

        let mut input = newsletter("Weekly digest");
        input.article_ids = vec![a2, a1];
        let created = repo.create(&input).await.unwrap();
        assert_eq!(created.article_ids, vec![a1, a2]);
        assert_eq!(created.frequency, NewsletterFrequency::Weekly);

        let mut changed = created.clone();
        changed.title = "Renamed digest".to_string();
        changed.article_ids = vec![a2];
        let updated = repo.update(&changed).await.unwrap();
        assert_eq!(updated.title, "Renamed digest");
        assert_eq!(updated.article_ids, vec![a2]);
    }

    async fn reader(pool: &DynDatabasePool, name: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'h')")
            .bind(name)
            .bind(format!("{}@example.com", name))
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    fn queued(user_id: i64, newsletter_id: i64) -> NewNotification {
        NewNotification {
            user_id,
            article_id: None,
            newsletter_id: Some(newsletter_id),
            recipient: format!("user{}@example.com", user_id),
            subject: "Once only".to_string(),
            body: "Hello".to_string(),
        }
    }

    async fn queued_count(pool: &DynDatabasePool, newsletter_id: i64) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM notifications WHERE newsletter_id = ?")
            .bind(newsletter_id)
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap()
            .get("count")
    }

    #[tokio::test]
    async fn test_mark_sent_only_once() {
        let (repo, pool) = setup().await;
        let created = repo.create(&newsletter("Once only")).await.unwrap();
        let a = reader(&pool, "ann").await;
        let b = reader(&pool, "ben").await;
        let batch = vec![queued(a, created.id), queued(b, created.id)];

        assert!(repo.mark_sent(created.id, Utc::now(), &batch).await.unwrap());
        assert!(!repo.mark_sent(created.id, Utc::now(), &batch).await.unwrap());

        let sent = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(sent.is_sent());
        assert_eq!(sent.sent_count, 2);
        assert_eq!(queued_count(&pool, created.id).await, 2);
    }

    #[tokio::test]
    async fn test_mark_sent_rolls_back_when_queueing_fails() {
        let (repo, pool) = setup().await;
        let created = repo.create(&newsletter("All or nothing")).await.unwrap();
        let a = reader(&pool, "ann").await;
        // no such user, the foreign key rejects the second row
        let batch = vec![queued(a, created.id), queued(a + 1000, created.id)];

        assert!(repo.mark_sent(created.id, Utc::now(), &batch).await.is_err());

        let unsent = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(!unsent.is_sent());
        assert_eq!(unsent.sent_count, 0);
        assert_eq!(queued_count(&pool, created.id).await, 0);

        assert!(repo
            .mark_sent(created.id, Utc::now(), &batch[..1])
            .await
            .unwrap());
        assert_eq!(queued_count(&pool, created.id).await, 1);
    }

    #[tokio::test]
    async fn test_list_due_and_filter() {
        let (repo, pool) = setup().await;
        let user_id = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES ('ed', 'ed@example.com', 'h')",
        )
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();

        let mut past = newsletter("Past schedule");
        past.scheduled_for = Some(Utc::now() - Duration::hours(1));
        past.created_by = Some(user_id);
        let past = repo.create(&past).await.unwrap();
        let mut future = newsletter("Future schedule");
        future.scheduled_for = Some(Utc::now() + Duration::hours(1));
        repo.create(&future).await.unwrap();
        repo.create(&newsletter("Unscheduled")).await.unwrap();

        let due = repo.list_due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past.id);

        let filter = NewsletterFilter {
            created_by: Some(user_id),
            ..Default::default()
        };
        let (mine, total) = repo.list(&filter, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(mine[0].id, past.id);

        let (_, all) = repo
            .list(&NewsletterFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(all, 3);
        assert_eq!(repo.count().await.unwrap(), 3);

        repo.delete(past.id).await.unwrap();
        assert!(repo.get_by_id(past.id).await.unwrap().is_none());
    }
}
