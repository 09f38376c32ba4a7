//! Category repository
//!
//! Database operations for categories.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL
//!
//! `article_count` is computed on read and only counts published articles.

use super::{bind_mysql, bind_sqlite, BindValue};
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const CATEGORY_SELECT: &str = r#"
    SELECT c.id, c.name, c.slug, c.description, c.color, c.is_active, c.created_at,
           (SELECT COUNT(*) FROM articles a
            WHERE a.category_id = c.id AND a.status = 'published') AS article_count
    FROM categories c
"#;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, category: &Category) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// List categories by name
    async fn list(&self, active_only: bool) -> Result<Vec<Category>>;

    /// Update a category
    async fn update(&self, category: &Category) -> Result<Category>;

    /// Delete a category; its articles keep existing without one
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a category name already exists (case-insensitive)
    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Check if a category slug already exists
    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    /// Create a new SQLx category repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_category_sqlite(self.pool.sqlite()?, category).await,
            DatabaseDriver::Mysql => create_category_mysql(self.pool.mysql()?, category).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = format!("{} WHERE c.id = ?", CATEGORY_SELECT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = format!("{} WHERE c.slug = ?", CATEGORY_SELECT);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(slug)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Category>> {
        let (where_clause, binds) = if active_only {
            ("WHERE c.is_active = ?", vec![BindValue::Bool(true)])
        } else {
            ("", Vec::new())
        };
        let sql = format!("{} {} ORDER BY c.name", CATEGORY_SELECT, where_clause);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(bind_sqlite(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(bind_mysql(sqlx::query(&sql), &binds)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_mysql)
                .collect()),
        }
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        let sql = r#"
            UPDATE categories
            SET name = ?, slug = ?, description = ?, color = ?, is_active = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(&category.color)
                    .bind(category.is_active)
                    .bind(category.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update category")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&category.name)
                    .bind(&category.slug)
                    .bind(&category.description)
                    .bind(&category.color)
                    .bind(category.is_active)
                    .bind(category.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update category")?;
            }
        }
        self.get_by_id(category.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Category not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let detach = "UPDATE articles SET category_id = NULL WHERE category_id = ?";
        let delete = "DELETE FROM categories WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(detach)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to detach articles from category")?;
                sqlx::query(delete)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete category")?;
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(detach)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to detach articles from category")?;
                sqlx::query(delete)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete category")?;
            }
        }
        Ok(())
    }

    async fn exists_by_name(&self, name: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM categories WHERE LOWER(name) = ? AND id != ?";
        let name = name.trim().to_lowercase();
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&name)
                .bind(exclude)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check category name")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&name)
                .bind(exclude)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check category name")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM categories WHERE slug = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check category slug")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check category slug")?
                .get("count"),
        };
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, color, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.color)
    .bind(category.is_active)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        article_count: 0,
        created_at: now,
        ..category.clone()
    })
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        color: row.get("color"),
        is_active: row.get("is_active"),
        article_count: row.get("article_count"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, category: &Category) -> Result<Category> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO categories (name, slug, description, color, is_active, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&category.name)
    .bind(&category.slug)
    .bind(&category.description)
    .bind(&category.color)
    .bind(category.is_active)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        article_count: 0,
        created_at: now,
        ..category.clone()
    })
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        description: row.get("description"),
        color: row.get("color"),
        is_active: row.get("is_active"),
        article_count: row.get("article_count"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::DEFAULT_CATEGORY_COLOR;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxCategoryRepository::new(pool))
    }

    fn category(name: &str, slug: &str, active: bool) -> Category {
        Category {
            id: 0,
            name: name.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            color: DEFAULT_CATEGORY_COLOR.to_string(),
            is_active: active,
            article_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&category("Politics", "politics", true)).await.unwrap();

        let by_slug = repo.get_by_slug("politics").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.article_count, 0);
        assert!(repo.exists_by_name("POLITICS", None).await.unwrap());
        assert!(!repo.exists_by_name("politics", Some(created.id)).await.unwrap());
        assert!(repo.exists_by_slug("politics").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_inactive() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&category("Sports", "sports", true)).await.unwrap();
        repo.create(&category("Archive", "archive", false)).await.unwrap();

        let active = repo.list(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].slug, "sports");
        assert_eq!(repo.list(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_article_count_only_counts_published() {
        let (pool, repo) = setup_test_repo().await;
        let cat = repo.create(&category("Tech", "tech", true)).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        for (slug, status) in [("a", "published"), ("b", "draft"), ("c", "published")] {
            sqlx::query(
                "INSERT INTO articles (title, slug, content, content_html, excerpt, category_id, status) VALUES ('t', ?, 'c', 'c', '', ?, ?)",
            )
            .bind(slug)
            .bind(cat.id)
            .bind(status)
            .execute(sqlite)
            .await
            .unwrap();
        }

        assert_eq!(repo.get_by_id(cat.id).await.unwrap().unwrap().article_count, 2);
    }

    #[tokio::test]
    async fn test_delete_detaches_articles() {
        let (pool, repo) = setup_test_repo().await;
        let cat = repo.create(&category("World", "world", true)).await.unwrap();
        let sqlite = pool.sqlite().unwrap();
        sqlx::query(
            "INSERT INTO articles (title, slug, content, content_html, excerpt, category_id) VALUES ('t', 'w', 'c', 'c', '', ?)",
        )
        .bind(cat.id)
        .execute(sqlite)
        .await
        .unwrap();

        repo.delete(cat.id).await.unwrap();
        assert!(repo.get_by_id(cat.id).await.unwrap().is_none());

        let row = sqlx::query("SELECT category_id FROM articles WHERE slug = 'w'")
            .fetch_one(sqlite)
            .await
            .unwrap();
        let category_id: Option<i64> = row.get("category_id");
        assert!(category_id.is_none());
    }

    #[tokio::test]
    async fn test_update_category() {
        let (_pool, repo) = setup_test_repo().await;
        let mut cat = repo.create(&category("Biz", "biz", true)).await.unwrap();
        cat.name = "Business".to_string();
        cat.color = "#ff0000".to_string();
        let updated = repo.update(&cat).await.unwrap();
        assert_eq!(updated.name, "Business");
        assert_eq!(updated.color, "#ff0000");
    }
}
