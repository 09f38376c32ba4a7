//! Fixtures shared by service tests

use crate::db::repositories::{
    PublisherRepository, SqlxPublisherRepository, SqlxUserRepository, UserRepository,
};
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{MemberRole, Publisher, User, UserRole};
use chrono::Utc;

pub async fn test_pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub async fn create_user(pool: &DynDatabasePool, username: &str, role: UserRole) -> User {
    SqlxUserRepository::new(pool.clone())
        .create(&User::new(
            username,
            format!("{}@example.com", username),
            "not-a-real-hash",
            role,
        ))
        .await
        .expect("Failed to create user")
}

pub async fn create_publisher(pool: &DynDatabasePool, name: &str) -> Publisher {
    let now = Utc::now();
    SqlxPublisherRepository::new(pool.clone())
        .create(&Publisher {
            id: 0,
            name: name.to_string(),
            slug: crate::services::slug::slugify(name),
            description: format!("{} covers the news", name),
            website: None,
            contact_email: None,
            twitter_handle: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .expect("Failed to create publisher")
}

pub async fn add_member(pool: &DynDatabasePool, publisher: &Publisher, user: &User, role: MemberRole) {
    SqlxPublisherRepository::new(pool.clone())
        .add_member(publisher.id, user.id, role)
        .await
        .expect("Failed to add member");
}

/// Article body long enough to pass validation
pub fn article_body(topic: &str) -> String {
    format!(
        "# {topic}\n\nThis report on {topic} runs long enough to satisfy the minimum \
         length for article content, with a second sentence for good measure."
    )
}
