//! Publisher repository
//!
//! Publishers, their editor/journalist membership and the subscriber and
//! article counters shown on listings.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, MemberRole, Publisher, PublisherMember, PublisherWithStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

const PUBLISHER_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.website, \
    p.contact_email, p.twitter_handle, p.is_active, p.created_at, p.updated_at";

const STATS_COLUMNS: &str = "(SELECT COUNT(*) FROM subscriptions s \
        WHERE s.target_type = 'publisher' AND s.target_id = p.id) AS subscriber_count, \
    (SELECT COUNT(*) FROM articles a \
        WHERE a.publisher_id = p.id AND a.status = 'published') AS published_article_count";

/// Publisher repository trait
#[async_trait]
pub trait PublisherRepository: Send + Sync {
    /// Insert a publisher. `id` and timestamps of the argument are ignored.
    async fn create(&self, publisher: &Publisher) -> Result<Publisher>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>>;

    /// Publisher with subscriber and published-article counts
    async fn get_with_stats(&self, id: i64) -> Result<Option<PublisherWithStats>>;

    /// Whether a slug is taken
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// List publishers by name with their counters
    async fn list_with_stats(
        &self,
        params: &ListParams,
        active_only: bool,
    ) -> Result<(Vec<PublisherWithStats>, i64)>;

    async fn update(&self, publisher: &Publisher) -> Result<Publisher>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Add a member; adding an existing membership is a no-op
    async fn add_member(&self, publisher_id: i64, user_id: i64, role: MemberRole) -> Result<()>;

    /// Remove a member, returning whether a row was removed
    async fn remove_member(&self, publisher_id: i64, user_id: i64, role: MemberRole)
        -> Result<bool>;

    async fn list_members(&self, publisher_id: i64) -> Result<Vec<PublisherMember>>;

    /// Publishers the user belongs to in the given capacity
    async fn publisher_ids_for_member(&self, user_id: i64, role: MemberRole) -> Result<Vec<i64>>;

    /// Drop every membership of the user in the given capacity
    async fn remove_memberships(&self, user_id: i64, role: MemberRole) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based publisher repository implementation
pub struct SqlxPublisherRepository {
    pool: DynDatabasePool,
}

impl SqlxPublisherRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublisherRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PublisherRepository for SqlxPublisherRepository {
    async fn create(&self, publisher: &Publisher) -> Result<Publisher> {
        let now = Utc::now();
        let sql = r#"
            INSERT INTO publishers (name, slug, description, website, contact_email,
                                    twitter_handle, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&publisher.name)
                .bind(&publisher.slug)
                .bind(&publisher.description)
                .bind(&publisher.website)
                .bind(&publisher.contact_email)
                .bind(&publisher.twitter_handle)
                .bind(publisher.is_active)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create publisher")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&publisher.name)
                .bind(&publisher.slug)
                .bind(&publisher.description)
                .bind(&publisher.website)
                .bind(&publisher.contact_email)
                .bind(&publisher.twitter_handle)
                .bind(publisher.is_active)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create publisher")?
                .last_insert_id() as i64,
        };

        Ok(Publisher {
            id,
            created_at: now,
            updated_at: now,
            ..publisher.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Publisher>> {
        Ok(self.get_with_stats(id).await?.map(|p| p.publisher))
    }

    async fn get_with_stats(&self, id: i64) -> Result<Option<PublisherWithStats>> {
        let sql = format!(
            "SELECT {}, {} FROM publishers p WHERE p.id = ?",
            PUBLISHER_COLUMNS, STATS_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_stats_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get publisher")?;
                Ok(row.as_ref().map(row_to_stats_mysql))
            }
        }
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM publishers WHERE slug = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check publisher slug")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(slug)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check publisher slug")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn list_with_stats(
        &self,
        params: &ListParams,
        active_only: bool,
    ) -> Result<(Vec<PublisherWithStats>, i64)> {
        let where_clause = if active_only { "WHERE p.is_active = ?" } else { "WHERE 1 = 1 OR p.is_active = ?" };
        let sql = format!(
            "SELECT {}, {} FROM publishers p {} ORDER BY p.name ASC LIMIT ? OFFSET ?",
            PUBLISHER_COLUMNS, STATS_COLUMNS, where_clause
        );
        let count_sql = format!("SELECT COUNT(*) AS count FROM publishers p {}", where_clause);

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let items = sqlx::query(&sql)
                    .bind(true)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publishers")?
                    .iter()
                    .map(row_to_stats_sqlite)
                    .collect();
                let total: i64 = sqlx::query(&count_sql)
                    .bind(true)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count publishers")?
                    .get("count");
                Ok((items, total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let items = sqlx::query(&sql)
                    .bind(true)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publishers")?
                    .iter()
                    .map(row_to_stats_mysql)
                    .collect();
                let total: i64 = sqlx::query(&count_sql)
                    .bind(true)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count publishers")?
                    .get("count");
                Ok((items, total))
            }
        }
    }

    async fn update(&self, publisher: &Publisher) -> Result<Publisher> {
        let sql = r#"
            UPDATE publishers
            SET name = ?, description = ?, website = ?, contact_email = ?,
                twitter_handle = ?, is_active = ?, updated_at = ?
            WHERE id = ?
        "#;
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&publisher.name)
                    .bind(&publisher.description)
                    .bind(&publisher.website)
                    .bind(&publisher.contact_email)
                    .bind(&publisher.twitter_handle)
                    .bind(publisher.is_active)
                    .bind(now)
                    .bind(publisher.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update publisher")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&publisher.name)
                    .bind(&publisher.description)
                    .bind(&publisher.website)
                    .bind(&publisher.contact_email)
                    .bind(&publisher.twitter_handle)
                    .bind(publisher.is_active)
                    .bind(now)
                    .bind(publisher.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update publisher")?;
            }
        }
        self.get_by_id(publisher.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Publisher not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM publishers WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete publisher")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete publisher")?;
            }
        }
        Ok(())
    }

    async fn add_member(&self, publisher_id: i64, user_id: i64, role: MemberRole) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO publisher_members (publisher_id, user_id, member_role, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(publisher_id)
                .bind(user_id)
                .bind(role.as_str())
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to add publisher member")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO publisher_members (publisher_id, user_id, member_role, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(publisher_id)
                .bind(user_id)
                .bind(role.as_str())
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to add publisher member")?;
            }
        }
        Ok(())
    }

    async fn remove_member(
        &self,
        publisher_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<bool> {
        let sql = "DELETE FROM publisher_members WHERE publisher_id = ? AND user_id = ? AND member_role = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(publisher_id)
                .bind(user_id)
                .bind(role.as_str())
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to remove publisher member")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(publisher_id)
                .bind(user_id)
                .bind(role.as_str())
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to remove publisher member")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_members(&self, publisher_id: i64) -> Result<Vec<PublisherMember>> {
        let sql = r#"
            SELECT m.publisher_id, m.user_id, u.username, m.member_role
            FROM publisher_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.publisher_id = ?
            ORDER BY m.member_role, u.username
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(publisher_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list publisher members")?
                .iter()
                .map(|row| -> Result<PublisherMember> {
                    let role: String = row.get("member_role");
                    Ok(PublisherMember {
                        publisher_id: row.get("publisher_id"),
                        user_id: row.get("user_id"),
                        username: row.get("username"),
                        member_role: MemberRole::from_str(&role)?,
                    })
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(publisher_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list publisher members")?
                .iter()
                .map(|row| -> Result<PublisherMember> {
                    let role: String = row.get("member_role");
                    Ok(PublisherMember {
                        publisher_id: row.get("publisher_id"),
                        user_id: row.get("user_id"),
                        username: row.get("username"),
                        member_role: MemberRole::from_str(&role)?,
                    })
                })
                .collect(),
        }
    }

    async fn publisher_ids_for_member(&self, user_id: i64, role: MemberRole) -> Result<Vec<i64>> {
        let sql = "SELECT publisher_id FROM publisher_members WHERE user_id = ? AND member_role = ? ORDER BY publisher_id";
        let ids = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(role.as_str())
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list memberships")?
                .iter()
                .map(|row| row.get("publisher_id"))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(role.as_str())
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list memberships")?
                .iter()
                .map(|row| row.get("publisher_id"))
                .collect(),
        };
        Ok(ids)
    }

    async fn remove_memberships(&self, user_id: i64, role: MemberRole) -> Result<u64> {
        let sql = "DELETE FROM publisher_members WHERE user_id = ? AND member_role = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(user_id)
                .bind(role.as_str())
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to remove memberships")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(user_id)
                .bind(role.as_str())
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to remove memberships")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM publishers";
        let count = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count publishers")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count publishers")?
                .get("count"),
        };
        Ok(count)
    }
}

fn row_to_stats_sqlite(row: &sqlx::sqlite::SqliteRow) -> PublisherWithStats {
    PublisherWithStats {
        publisher: Publisher {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            website: row.get("website"),
            contact_email: row.get("contact_email"),
            twitter_handle: row.get("twitter_handle"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        subscriber_count: row.get("subscriber_count"),
        published_article_count: row.get("published_article_count"),
    }
}

fn row_to_stats_mysql(row: &sqlx::mysql::MySqlRow) -> PublisherWithStats {
    PublisherWithStats {
        publisher: Publisher {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            website: row.get("website"),
            contact_email: row.get("contact_email"),
            twitter_handle: row.get("twitter_handle"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        },
        subscriber_count: row.get("subscriber_count"),
        published_article_count: row.get("published_article_count"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    async fn setup() -> (DynDatabasePool, SqlxPublisherRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxPublisherRepository::new(pool))
    }

    fn publisher(name: &str, slug: &str) -> Publisher {
        let now = Utc::now();
        Publisher {
            id: 0,
            name: name.to_string(),
            slug: slug.to_string(),
            description: "A daily newspaper".to_string(),
            website: None,
            contact_email: Some("desk@example.com".to_string()),
            twitter_handle: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn user(pool: &DynDatabasePool, name: &str, role: UserRole) -> i64 {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new(name, format!("{}@example.com", name), "h", role))
            .await
            .expect("Failed to create user")
            .id
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let (_pool, repo) = setup().await;
        let created = repo.create(&publisher("Daily Planet", "daily-planet")).await.unwrap();
        assert!(created.id > 0);
        assert!(repo.slug_exists("daily-planet").await.unwrap());
        assert!(!repo.slug_exists("other").await.unwrap());

        let mut changed = created.clone();
        changed.is_active = false;
        changed.website = Some("https://planet.example.com".to_string());
        let updated = repo.update(&changed).await.unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.slug, "daily-planet");

        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_only() {
        let (_pool, repo) = setup().await;
        repo.create(&publisher("Bugle", "bugle")).await.unwrap();
        let mut closed = publisher("Closed Times", "closed-times");
        closed.is_active = false;
        repo.create(&closed).await.unwrap();

        let (active, total) = repo.list_with_stats(&ListParams::default(), true).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(active[0].publisher.name, "Bugle");
        assert_eq!(active[0].subscriber_count, 0);

        let (all, total) = repo.list_with_stats(&ListParams::default(), false).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_membership() {
        let (pool, repo) = setup().await;
        let p = repo.create(&publisher("Gazette", "gazette")).await.unwrap();
        let editor = user(&pool, "ed", UserRole::Editor).await;
        let writer = user(&pool, "wr", UserRole::Journalist).await;

        repo.add_member(p.id, editor, MemberRole::Editor).await.unwrap();
        repo.add_member(p.id, writer, MemberRole::Journalist).await.unwrap();
        // Idempotent
        repo.add_member(p.id, writer, MemberRole::Journalist).await.unwrap();

        let members = repo.list_members(p.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(
            repo.publisher_ids_for_member(editor, MemberRole::Editor).await.unwrap(),
            vec![p.id]
        );
        assert!(repo
            .publisher_ids_for_member(editor, MemberRole::Journalist)
            .await
            .unwrap()
            .is_empty());

        assert!(repo.remove_member(p.id, writer, MemberRole::Journalist).await.unwrap());
        assert!(!repo.remove_member(p.id, writer, MemberRole::Journalist).await.unwrap());
        assert_eq!(repo.remove_memberships(editor, MemberRole::Editor).await.unwrap(), 1);
        assert!(repo.list_members(p.id).await.unwrap().is_empty());
    }
}
