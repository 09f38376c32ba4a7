//! Engagement repository
//!
//! Comments, likes and reading history. These three tables hang off an
//! article and a user and are always touched together by the engagement
//! service, so they share one repository.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Comment, ReadingHistoryEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const COMMENT_SELECT: &str = r#"
    SELECT cm.id, cm.article_id, cm.author_id, u.username AS author_username,
           cm.parent_id, cm.content, cm.is_approved, cm.created_at, cm.updated_at
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
"#;

const HISTORY_SELECT: &str = r#"
    SELECT h.user_id, h.article_id, a.title AS article_title, a.slug AS article_slug,
           h.read_at, h.read_duration, h.read_percentage
    FROM reading_history h
    JOIN articles a ON a.id = h.article_id
    WHERE h.user_id = ?
    ORDER BY h.read_at DESC, h.id DESC
    LIMIT ?
"#;

/// Engagement repository trait
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<Comment>;

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>>;

    /// Approved comments of an article, oldest first
    async fn list_comments(&self, article_id: i64) -> Result<Vec<Comment>>;

    /// Delete a comment and its replies, returning how many rows went away
    async fn delete_comment(&self, id: i64) -> Result<u64>;

    async fn has_liked(&self, article_id: i64, user_id: i64) -> Result<bool>;

    /// Returns false when the like already existed
    async fn add_like(&self, article_id: i64, user_id: i64) -> Result<bool>;

    /// Returns false when there was nothing to remove
    async fn remove_like(&self, article_id: i64, user_id: i64) -> Result<bool>;

    async fn count_likes_by_user(&self, user_id: i64) -> Result<i64>;

    /// Insert or refresh the (user, article) history row
    async fn record_read(&self, user_id: i64, article_id: i64) -> Result<()>;

    /// Most recent reads first
    async fn list_history(&self, user_id: i64, limit: i64) -> Result<Vec<ReadingHistoryEntry>>;

    async fn count_history(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based engagement repository implementation
pub struct SqlxEngagementRepository {
    pool: DynDatabasePool,
}

impl SqlxEngagementRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EngagementRepository> {
        Arc::new(Self::new(pool))
    }

    async fn count_where(&self, sql: &str, a: i64, b: Option<i64>) -> Result<i64> {
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(sql).bind(a);
                if let Some(b) = b {
                    query = query.bind(b);
                }
                query
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count rows")?
                    .get("count")
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(sql).bind(a);
                if let Some(b) = b {
                    query = query.bind(b);
                }
                query
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to count rows")?
                    .get("count")
            }
        };
        Ok(count)
    }
}

#[async_trait]
impl EngagementRepository for SqlxEngagementRepository {
    async fn create_comment(
        &self,
        article_id: i64,
        author_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<Comment> {
        let sql = r#"
            INSERT INTO comments (article_id, author_id, parent_id, content, is_approved, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(article_id)
                .bind(author_id)
                .bind(parent_id)
                .bind(content)
                .bind(true)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(article_id)
                .bind(author_id)
                .bind(parent_id)
                .bind(content)
                .bind(true)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };
        self.get_comment(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Comment not found after insert"))
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE cm.id = ?", COMMENT_SELECT);
        let comment = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_mysql(&row)),
        };
        Ok(comment)
    }

    async fn list_comments(&self, article_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "{} WHERE cm.article_id = ? AND cm.is_approved = ? ORDER BY cm.created_at ASC, cm.id ASC",
            COMMENT_SELECT
        );
        let comments = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(article_id)
                .bind(true)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(article_id)
                .bind(true)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_mysql)
                .collect(),
        };
        Ok(comments)
    }

    async fn delete_comment(&self, id: i64) -> Result<u64> {
        // Replies cascade, so count them first
        let removed = self
            .count_where(
                "SELECT COUNT(*) AS count FROM comments WHERE id = ? OR parent_id = ?",
                id,
                Some(id),
            )
            .await?;

        let sql = "DELETE FROM comments WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query("DELETE FROM comments WHERE parent_id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete replies")?;
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete comment")?;
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query("DELETE FROM comments WHERE parent_id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete replies")?;
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete comment")?;
            }
        }
        Ok(removed as u64)
    }

    async fn has_liked(&self, article_id: i64, user_id: i64) -> Result<bool> {
        let count = self
            .count_where(
                "SELECT COUNT(*) AS count FROM article_likes WHERE article_id = ? AND user_id = ?",
                article_id,
                Some(user_id),
            )
            .await?;
        Ok(count > 0)
    }

    async fn add_like(&self, article_id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let inserted = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                add_like_sqlite(self.pool.sqlite()?, article_id, user_id, now).await?
            }
            DatabaseDriver::Mysql => {
                add_like_mysql(self.pool.mysql()?, article_id, user_id, now).await?
            }
        };
        Ok(inserted)
    }

    async fn remove_like(&self, article_id: i64, user_id: i64) -> Result<bool> {
        let sql = "DELETE FROM article_likes WHERE article_id = ? AND user_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(article_id)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to remove like")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(article_id)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to remove like")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn count_likes_by_user(&self, user_id: i64) -> Result<i64> {
        self.count_where(
            "SELECT COUNT(*) AS count FROM article_likes WHERE user_id = ?",
            user_id,
            None,
        )
        .await
    }

    async fn record_read(&self, user_id: i64, article_id: i64) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    r#"
                    INSERT INTO reading_history (user_id, article_id, read_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT(user_id, article_id) DO UPDATE SET read_at = excluded.read_at
                    "#,
                )
                .bind(user_id)
                .bind(article_id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to record reading history")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    r#"
                    INSERT INTO reading_history (user_id, article_id, read_at)
                    VALUES (?, ?, ?)
                    ON DUPLICATE KEY UPDATE read_at = VALUES(read_at)
                    "#,
                )
                .bind(user_id)
                .bind(article_id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to record reading history")?;
            }
        }
        Ok(())
    }

    async fn list_history(&self, user_id: i64, limit: i64) -> Result<Vec<ReadingHistoryEntry>> {
        let entries = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(HISTORY_SELECT)
                .bind(user_id)
                .bind(limit)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list reading history")?
                .iter()
                .map(|row| ReadingHistoryEntry {
                    user_id: row.get("user_id"),
                    article_id: row.get("article_id"),
                    article_title: row.get("article_title"),
                    article_slug: row.get("article_slug"),
                    read_at: row.get("read_at"),
                    read_duration: row.get("read_duration"),
                    read_percentage: row.get("read_percentage"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(HISTORY_SELECT)
                .bind(user_id)
                .bind(limit)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list reading history")?
                .iter()
                .map(|row| ReadingHistoryEntry {
                    user_id: row.get("user_id"),
                    article_id: row.get("article_id"),
                    article_title: row.get("article_title"),
                    article_slug: row.get("article_slug"),
                    read_at: row.get("read_at"),
                    read_duration: row.get("read_duration"),
                    read_percentage: row.get("read_percentage"),
                })
                .collect(),
        };
        Ok(entries)
    }

    async fn count_history(&self, user_id: i64) -> Result<i64> {
        self.count_where(
            "SELECT COUNT(*) AS count FROM reading_history WHERE user_id = ?",
            user_id,
            None,
        )
        .await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn add_like_sqlite(
    pool: &SqlitePool,
    article_id: i64,
    user_id: i64,
    now: chrono::DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO article_likes (article_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(article_id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to add like")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("article_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        is_approved: row.get("is_approved"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn add_like_mysql(
    pool: &MySqlPool,
    article_id: i64,
    user_id: i64,
    now: chrono::DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT IGNORE INTO article_likes (article_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(article_id)
    .bind(user_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to add like")?;
    Ok(result.rows_affected() > 0)
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("article_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        is_approved: row.get("is_approved"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
