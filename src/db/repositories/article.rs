//! Article repository
//!
//! Database operations for articles and their authors.
//!
//! Listings are assembled from an [`ArticleScope`] (which rows the viewer may
//! see at all) and an [`ArticleFilter`] (what they asked for). Both become a
//! `WHERE` clause with `?` placeholders so one builder serves SQLite and MySQL.

use super::{bind_mysql, bind_sqlite, like_pattern, placeholders, BindValue, LIKE_ESCAPE};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Article, ArticleAuthor, ArticleFilter, ArticlePriority, ArticleScope, ArticleStatus, FeedSort,
    ListParams,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.title, a.subtitle, a.slug, a.content, a.content_html, a.excerpt,
           a.category_id, c.slug AS category_slug, a.tags, a.publisher_id,
           p.name AS publisher_name, a.approved_by, a.approved_at, a.rejection_reason, a.status,
           a.priority, a.is_featured, a.is_sticky, a.allow_comments, a.reading_time,
           a.view_count, a.like_count, a.comment_count, a.created_at, a.updated_at,
           a.published_at
    FROM articles a
    LEFT JOIN categories c ON c.id = a.category_id
    LEFT JOIN publishers p ON p.id = a.publisher_id
"#;

const ARTICLE_FROM: &str = r#"
    FROM articles a
    LEFT JOIN categories c ON c.id = a.category_id
    LEFT JOIN publishers p ON p.id = a.publisher_id
"#;

/// Trending only looks at articles published this recently
pub const TRENDING_WINDOW_DAYS: i64 = 7;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article and link its authors
    async fn create(&self, article: &Article, author_ids: &[i64]) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Whether a slug is used by any article other than `exclude_id`
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Persist every mutable column. Counters are left alone.
    async fn update(&self, article: &Article) -> Result<Article>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Scoped, filtered and paginated listing
    async fn list(
        &self,
        scope: &ArticleScope,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)>;

    async fn author_ids(&self, article_id: i64) -> Result<Vec<i64>>;

    async fn increment_view_count(&self, id: i64) -> Result<()>;

    /// Add `delta` to the like counter (floored at zero), returning the new value
    async fn adjust_like_count(&self, id: i64, delta: i64) -> Result<i64>;

    /// Add `delta` to the comment counter (floored at zero)
    async fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()>;
}

/// SQLx-based article repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    /// Create a new SQLx article repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, clause: &str, bind: BindValue) -> Result<Option<Article>> {
        let sql = format!("{} WHERE {}", ARTICLE_SELECT, clause);
        let binds = [bind];
        let article = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let row = bind_sqlite(sqlx::query(&sql), &binds)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get article")?;
                match row {
                    Some(row) => {
                        let mut articles = vec![row_to_article_sqlite(&row)?];
                        attach_authors_sqlite(pool, &mut articles).await?;
                        articles.pop()
                    }
                    None => None,
                }
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let row = bind_mysql(sqlx::query(&sql), &binds)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get article")?;
                match row {
                    Some(row) => {
                        let mut articles = vec![row_to_article_mysql(&row)?];
                        attach_authors_mysql(pool, &mut articles).await?;
                        articles.pop()
                    }
                    None => None,
                }
            }
        };
        Ok(article)
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, article: &Article, author_ids: &[i64]) -> Result<Article> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_article_sqlite(self.pool.sqlite()?, article, author_ids).await?
            }
            DatabaseDriver::Mysql => {
                create_article_mysql(self.pool.mysql()?, article, author_ids).await?
            }
        };
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Article not found after insert"))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        self.fetch_one_where("a.id = ?", BindValue::Int(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        self.fetch_one_where("a.slug = ?", BindValue::Text(slug.to_string()))
            .await
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM articles WHERE slug = ? AND id != ?";
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(slug)
                .bind(exclude)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check article slug")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(slug)
                .bind(exclude)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check article slug")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn update(&self, article: &Article) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_article_sqlite(self.pool.sqlite()?, article).await?,
            DatabaseDriver::Mysql => update_article_mysql(self.pool.mysql()?, article).await?,
        }
        self.get_by_id(article.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Article not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM articles WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete article")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete article")?;
            }
        }
        Ok(())
    }

    async fn list(
        &self,
        scope: &ArticleScope,
        filter: &ArticleFilter,
        params: &ListParams,
    ) -> Result<(Vec<Article>, i64)> {
        let query = ListQuery::build(scope, filter);
        let select_sql = format!(
            "{} {} ORDER BY {} LIMIT ? OFFSET ?",
            ARTICLE_SELECT, query.where_sql, query.order_sql
        );
        let count_sql = format!(
            "SELECT COUNT(*) AS count {} {}",
            ARTICLE_FROM, query.where_sql
        );

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let mut articles = bind_sqlite(sqlx::query(&select_sql), &query.binds)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list articles")?
                    .iter()
                    .map(row_to_article_sqlite)
                    .collect::<Result<Vec<_>>>()?;
                attach_authors_sqlite(pool, &mut articles).await?;
                let total: i64 = bind_sqlite(sqlx::query(&count_sql), &query.binds)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count articles")?
                    .get("count");
                Ok((articles, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let mut articles = bind_mysql(sqlx::query(&select_sql), &query.binds)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list articles")?
                    .iter()
                    .map(row_to_article_mysql)
                    .collect::<Result<Vec<_>>>()?;
                attach_authors_mysql(pool, &mut articles).await?;
                let total: i64 = bind_mysql(sqlx::query(&count_sql), &query.binds)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count articles")?
                    .get("count");
                Ok((articles, total))
            }
        }
    }

    async fn author_ids(&self, article_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT user_id FROM article_authors WHERE article_id = ? ORDER BY user_id";
        let ids = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(article_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list article authors")?
                .iter()
                .map(|row| row.get("user_id"))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(article_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list article authors")?
                .iter()
                .map(|row| row.get("user_id"))
                .collect(),
        };
        Ok(ids)
    }

    async fn increment_view_count(&self, id: i64) -> Result<()> {
        let sql = "UPDATE articles SET view_count = view_count + 1 WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to increment view count")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to increment view count")?;
            }
        }
        Ok(())
    }

    async fn adjust_like_count(&self, id: i64, delta: i64) -> Result<i64> {
        let select = "SELECT like_count FROM articles WHERE id = ?";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query("UPDATE articles SET like_count = MAX(like_count + ?, 0) WHERE id = ?")
                    .bind(delta)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update like count")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to read like count")?
                    .get("like_count")
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(
                    "UPDATE articles SET like_count = GREATEST(like_count + ?, 0) WHERE id = ?",
                )
                .bind(delta)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to update like count")?;
                sqlx::query(select)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to read like count")?
                    .get("like_count")
            }
        };
        Ok(count)
    }

    async fn adjust_comment_count(&self, id: i64, delta: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "UPDATE articles SET comment_count = MAX(comment_count + ?, 0) WHERE id = ?",
                )
                .bind(delta)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update comment count")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "UPDATE articles SET comment_count = GREATEST(comment_count + ?, 0) WHERE id = ?",
                )
                .bind(delta)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update comment count")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Listing query builder
// ============================================================================

/// `WHERE`/`ORDER BY` fragments plus their bind values for one listing
#[derive(Debug, Clone, PartialEq)]
struct ListQuery {
    where_sql: String,
    order_sql: &'static str,
    binds: Vec<BindValue>,
}

impl ListQuery {
    fn build(scope: &ArticleScope, filter: &ArticleFilter) -> Self {
        let mut clauses: Vec<String> = Vec::new();
        let mut binds: Vec<BindValue> = Vec::new();
        let published = || BindValue::Text(ArticleStatus::Published.as_str().to_string());

        match scope {
            ArticleScope::Published => {
                clauses.push("a.status = ?".to_string());
                binds.push(published());
            }
            ArticleScope::PublishedFollowing {
                publisher_ids,
                journalist_ids,
            } => {
                binds.push(published());
                let mut any_of = Vec::new();
                if !publisher_ids.is_empty() {
                    any_of.push(format!(
                        "a.publisher_id IN ({})",
                        placeholders(publisher_ids.len())
                    ));
                    binds.extend(publisher_ids.iter().map(|id| BindValue::Int(*id)));
                }
                if !journalist_ids.is_empty() {
                    any_of.push(format!(
                        "a.id IN (SELECT aa.article_id FROM article_authors aa WHERE aa.user_id IN ({}))",
                        placeholders(journalist_ids.len())
                    ));
                    binds.extend(journalist_ids.iter().map(|id| BindValue::Int(*id)));
                }
                if any_of.is_empty() {
                    any_of.push("1 = 0".to_string());
                }
                clauses.push(format!("a.status = ? AND ({})", any_of.join(" OR ")));
            }
            ArticleScope::PublishedOrAuthoredBy(user_id) => {
                clauses.push(
                    "(a.status = ? OR a.id IN (SELECT aa.article_id FROM article_authors aa WHERE aa.user_id = ?))"
                        .to_string(),
                );
                binds.push(published());
                binds.push(BindValue::Int(*user_id));
            }
            ArticleScope::PublishedOrManaged { publisher_ids } => {
                binds.push(published());
                if publisher_ids.is_empty() {
                    clauses.push("(a.status = ? OR a.publisher_id IS NULL)".to_string());
                } else {
                    clauses.push(format!(
                        "(a.status = ? OR a.publisher_id IS NULL OR a.publisher_id IN ({}))",
                        placeholders(publisher_ids.len())
                    ));
                    binds.extend(publisher_ids.iter().map(|id| BindValue::Int(*id)));
                }
            }
            ArticleScope::All => {}
        }

        if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
            clauses.push(format!(
                "(LOWER(a.title) LIKE ? ESCAPE '{esc}' OR LOWER(a.content) LIKE ? ESCAPE '{esc}' \
                 OR LOWER(a.excerpt) LIKE ? ESCAPE '{esc}' OR LOWER(a.tags) LIKE ? ESCAPE '{esc}' \
                 OR LOWER(COALESCE(p.name, '')) LIKE ? ESCAPE '{esc}' \
                 OR a.id IN (SELECT aa.article_id FROM article_authors aa \
                 JOIN users u ON u.id = aa.user_id \
                 WHERE LOWER(u.first_name) LIKE ? ESCAPE '{esc}' OR LOWER(u.last_name) LIKE ? ESCAPE '{esc}'))",
                esc = LIKE_ESCAPE
            ));
            let pattern = like_pattern(search);
            binds.extend(std::iter::repeat(BindValue::Text(pattern)).take(7));
        }
        if let Some(slug) = &filter.category_slug {
            clauses.push("c.slug = ?".to_string());
            binds.push(BindValue::Text(slug.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("a.status = ?".to_string());
            binds.push(BindValue::Text(status.as_str().to_string()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("a.priority = ?".to_string());
            binds.push(BindValue::Text(priority.as_str().to_string()));
        }
        if let Some(featured) = filter.featured {
            clauses.push("a.is_featured = ?".to_string());
            binds.push(BindValue::Bool(featured));
        }
        if let Some(publisher_id) = filter.publisher_id {
            clauses.push("a.publisher_id = ?".to_string());
            binds.push(BindValue::Int(publisher_id));
        }
        if let Some(author_id) = filter.author_id {
            clauses.push(
                "a.id IN (SELECT aa.article_id FROM article_authors aa WHERE aa.user_id = ?)"
                    .to_string(),
            );
            binds.push(BindValue::Int(author_id));
        }

        let order_sql = match filter.sort {
            FeedSort::Latest => {
                "a.is_sticky DESC, a.is_featured DESC, COALESCE(a.published_at, a.created_at) DESC, a.id DESC"
            }
            FeedSort::Popular => {
                "(a.like_count + a.comment_count + a.view_count / 10) DESC, a.id DESC"
            }
            FeedSort::Trending => {
                clauses.push("a.published_at >= ?".to_string());
                binds.push(BindValue::Time(
                    Utc::now() - Duration::days(TRENDING_WINDOW_DAYS),
                ));
                "(a.like_count + 2 * a.comment_count) DESC, a.published_at DESC"
            }
        };

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        Self {
            where_sql,
            order_sql,
            binds,
        }
    }
}

fn author_name(username: &str, first_name: &str, last_name: &str) -> String {
    let name = format!("{} {}", first_name.trim(), last_name.trim());
    match name.trim() {
        "" => username.to_string(),
        name => name.to_string(),
    }
}

fn group_authors(
    articles: &mut [Article],
    rows: impl Iterator<Item = (i64, ArticleAuthor)>,
) {
    let mut by_article: HashMap<i64, Vec<ArticleAuthor>> = HashMap::new();
    for (article_id, author) in rows {
        by_article.entry(article_id).or_default().push(author);
    }
    for article in articles.iter_mut() {
        article.authors = by_article.remove(&article.id).unwrap_or_default();
    }
}

fn authors_sql(n: usize) -> String {
    format!(
        "SELECT aa.article_id, u.id, u.username, u.first_name, u.last_name \
         FROM article_authors aa JOIN users u ON u.id = aa.user_id \
         WHERE aa.article_id IN ({}) ORDER BY u.username",
        placeholders(n)
    )
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(
    pool: &SqlitePool,
    article: &Article,
    author_ids: &[i64],
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, subtitle, slug, content, content_html, excerpt,
                              category_id, tags, publisher_id, approved_by, approved_at,
                              rejection_reason, status, priority, is_featured, is_sticky,
                              allow_comments, reading_time, created_at, updated_at, published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.subtitle)
    .bind(&article.slug)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.excerpt)
    .bind(article.category_id)
    .bind(&article.tags)
    .bind(article.publisher_id)
    .bind(article.approved_by)
    .bind(article.approved_at)
    .bind(&article.rejection_reason)
    .bind(article.status.as_str())
    .bind(article.priority.as_str())
    .bind(article.is_featured)
    .bind(article.is_sticky)
    .bind(article.allow_comments)
    .bind(article.reading_time)
    .bind(now)
    .bind(now)
    .bind(article.published_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create article")?;

    let id = result.last_insert_rowid();
    for author_id in author_ids {
        sqlx::query("INSERT OR IGNORE INTO article_authors (article_id, user_id) VALUES (?, ?)")
            .bind(id)
            .bind(author_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link article author")?;
    }
    tx.commit().await.context("Failed to commit article")?;
    Ok(id)
}

async fn update_article_sqlite(pool: &SqlitePool, article: &Article) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, subtitle = ?, slug = ?, content = ?, content_html = ?, excerpt = ?,
            category_id = ?, tags = ?, publisher_id = ?, approved_by = ?, approved_at = ?,
            rejection_reason = ?,
            status = ?, priority = ?, is_featured = ?, is_sticky = ?, allow_comments = ?,
            reading_time = ?, updated_at = ?, published_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.subtitle)
    .bind(&article.slug)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.excerpt)
    .bind(article.category_id)
    .bind(&article.tags)
    .bind(article.publisher_id)
    .bind(article.approved_by)
    .bind(article.approved_at)
    .bind(&article.rejection_reason)
    .bind(article.status.as_str())
    .bind(article.priority.as_str())
    .bind(article.is_featured)
    .bind(article.is_sticky)
    .bind(article.allow_comments)
    .bind(article.reading_time)
    .bind(Utc::now())
    .bind(article.published_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;
    Ok(())
}

async fn attach_authors_sqlite(pool: &SqlitePool, articles: &mut [Article]) -> Result<()> {
    if articles.is_empty() {
        return Ok(());
    }
    let sql = authors_sql(articles.len());
    let mut query = sqlx::query(&sql);
    for article in articles.iter() {
        query = query.bind(article.id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load article authors")?;

    group_authors(
        articles,
        rows.iter().map(|row| {
            let username: String = row.get("username");
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            (
                row.get("article_id"),
                ArticleAuthor {
                    id: row.get("id"),
                    full_name: author_name(&username, &first, &last),
                    username,
                },
            )
        }),
    );
    Ok(())
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");

    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        slug: row.get("slug"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        category_id: row.get("category_id"),
        category_slug: row.get("category_slug"),
        tags: row.get("tags"),
        publisher_id: row.get("publisher_id"),
        publisher_name: row.get("publisher_name"),
        authors: Vec::new(),
        approved_by: row.get("approved_by"),
        approved_at: row.get("approved_at"),
        rejection_reason: row.get("rejection_reason"),
        status: ArticleStatus::from_str(&status)?,
        priority: ArticlePriority::from_str(&priority)?,
        is_featured: row.get("is_featured"),
        is_sticky: row.get("is_sticky"),
        allow_comments: row.get("allow_comments"),
        reading_time: row.get("reading_time"),
        view_count: row.get("view_count"),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_article_mysql(
    pool: &MySqlPool,
    article: &Article,
    author_ids: &[i64],
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    let result = sqlx::query(
        r#"
        INSERT INTO articles (title, subtitle, slug, content, content_html, excerpt,
                              category_id, tags, publisher_id, approved_by, approved_at,
                              rejection_reason, status, priority, is_featured, is_sticky,
                              allow_comments, reading_time, created_at, updated_at, published_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.title)
    .bind(&article.subtitle)
    .bind(&article.slug)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.excerpt)
    .bind(article.category_id)
    .bind(&article.tags)
    .bind(article.publisher_id)
    .bind(article.approved_by)
    .bind(article.approved_at)
    .bind(&article.rejection_reason)
    .bind(article.status.as_str())
    .bind(article.priority.as_str())
    .bind(article.is_featured)
    .bind(article.is_sticky)
    .bind(article.allow_comments)
    .bind(article.reading_time)
    .bind(now)
    .bind(now)
    .bind(article.published_at)
    .execute(&mut *tx)
    .await
    .context("Failed to create article")?;

    let id = result.last_insert_id() as i64;
    for author_id in author_ids {
        sqlx::query("INSERT IGNORE INTO article_authors (article_id, user_id) VALUES (?, ?)")
            .bind(id)
            .bind(author_id)
            .execute(&mut *tx)
            .await
            .context("Failed to link article author")?;
    }
    tx.commit().await.context("Failed to commit article")?;
    Ok(id)
}

async fn update_article_mysql(pool: &MySqlPool, article: &Article) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE articles
        SET title = ?, subtitle = ?, slug = ?, content = ?, content_html = ?, excerpt = ?,
            category_id = ?, tags = ?, publisher_id = ?, approved_by = ?, approved_at = ?,
            rejection_reason = ?,
            status = ?, priority = ?, is_featured = ?, is_sticky = ?, allow_comments = ?,
            reading_time = ?, updated_at = ?, published_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&article.title)
    .bind(&article.subtitle)
    .bind(&article.slug)
    .bind(&article.content)
    .bind(&article.content_html)
    .bind(&article.excerpt)
    .bind(article.category_id)
    .bind(&article.tags)
    .bind(article.publisher_id)
    .bind(article.approved_by)
    .bind(article.approved_at)
    .bind(&article.rejection_reason)
    .bind(article.status.as_str())
    .bind(article.priority.as_str())
    .bind(article.is_featured)
    .bind(article.is_sticky)
    .bind(article.allow_comments)
    .bind(article.reading_time)
    .bind(Utc::now())
    .bind(article.published_at)
    .bind(article.id)
    .execute(pool)
    .await
    .context("Failed to update article")?;
    Ok(())
}

async fn attach_authors_mysql(pool: &MySqlPool, articles: &mut [Article]) -> Result<()> {
    if articles.is_empty() {
        return Ok(());
    }
    let sql = authors_sql(articles.len());
    let mut query = sqlx::query(&sql);
    for article in articles.iter() {
        query = query.bind(article.id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to load article authors")?;

    group_authors(
        articles,
        rows.iter().map(|row| {
            let username: String = row.get("username");
            let first: String = row.get("first_name");
            let last: String = row.get("last_name");
            (
                row.get("article_id"),
                ArticleAuthor {
                    id: row.get("id"),
                    full_name: author_name(&username, &first, &last),
                    username,
                },
            )
        }),
    );
    Ok(())
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status: String = row.get("status");
    let priority: String = row.get("priority");

    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        slug: row.get("slug"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        excerpt: row.get("excerpt"),
        category_id: row.get("category_id"),
        category_slug: row.get("category_slug"),
        tags: row.get("tags"),
        publisher_id: row.get("publisher_id"),
        publisher_name: row.get("publisher_name"),
        authors: Vec::new(),
        approved_by: row.get("approved_by"),
        approved_at: row.get("approved_at"),
        rejection_reason: row.get("rejection_reason"),
        status: ArticleStatus::from_str(&status)?,
        priority: ArticlePriority::from_str(&priority)?,
        is_featured: row.get("is_featured"),
        is_sticky: row.get("is_sticky"),
        allow_comments: row.get("allow_comments"),
        reading_time: row.get("reading_time"),
        view_count: row.get("view_count"),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        published_at: row.get("published_at"),
    })
}
