//! Aggregates returned by the dashboard and analytics endpoints

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ArticleStatus;

/// Article counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub total: i64,
    pub draft: i64,
    pub submitted: i64,
    pub published: i64,
    pub rejected: i64,
    pub archived: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ArticleStatus, count: i64) {
        self.total += count;
        match status {
            ArticleStatus::Draft => self.draft += count,
            ArticleStatus::Submitted => self.submitted += count,
            ArticleStatus::Published => self.published += count,
            ArticleStatus::Rejected => self.rejected += count,
            ArticleStatus::Archived => self.archived += count,
        }
    }
}

/// Summed counters over a set of articles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementTotals {
    pub views: i64,
    pub likes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub slug: String,
    pub count: i64,
}

/// Published output of one journalist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalistStats {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub article_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
}

/// Site-wide totals for the admin dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCounts {
    pub users: i64,
    pub articles: i64,
    pub published_articles: i64,
    pub pending_articles: i64,
    pub publishers: i64,
    pub categories: i64,
    pub subscriptions: i64,
    pub newsletters: i64,
    pub pending_notifications: i64,
}
