//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity (or one group of
//! closely related tables) and dispatches on the pool's driver.

pub mod article;
pub mod category;
pub mod engagement;
pub mod newsletter;
pub mod notification;
pub mod publisher;
pub mod session;
pub mod stats;
pub mod subscription;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use engagement::{EngagementRepository, SqlxEngagementRepository};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use publisher::{PublisherRepository, SqlxPublisherRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use stats::{SqlxStatsRepository, StatsRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use user::{SqlxUserRepository, UserRepository};

use chrono::{DateTime, Utc};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// A value bound into a dynamically built query.
///
/// Queries with optional filters are assembled as a SQL string with `?`
/// placeholders plus a list of these, so the same builder serves both
/// dialects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Int(i64),
    Bool(bool),
    Text(String),
    Time(DateTime<Utc>),
}

pub(crate) fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &[BindValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.clone()),
            BindValue::Time(v) => query.bind(*v),
        };
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    values: &[BindValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in values {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.clone()),
            BindValue::Time(v) => query.bind(*v),
        };
    }
    query
}

/// `?, ?, ?` for an `IN (...)` list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape character paired with [`like_pattern`]; the same literal works in
/// both SQLite and MySQL, unlike a backslash.
pub(crate) const LIKE_ESCAPE: char = '!';

/// Lowercased `%term%` pattern for `LOWER(col) LIKE ? ESCAPE '!'`.
///
/// Wildcards typed by the user match literally.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::from("%");
    for c in term.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern("  Rust News "), "%rust news%");
        assert_eq!(like_pattern("100%"), "%100!%%");
        assert_eq!(like_pattern("snake_case"), "%snake!_case%");
        assert_eq!(like_pattern("wow!"), "%wow!!%");
    }
}
