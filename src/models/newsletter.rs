//! Newsletter model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const NEWSLETTER_TITLE_MIN_LENGTH: usize = 5;
pub const NEWSLETTER_TITLE_MAX_LENGTH: usize = 200;
pub const NEWSLETTER_CONTENT_MIN_LENGTH: usize = 50;

/// How often a newsletter series goes out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterFrequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
    Special,
}

impl NewsletterFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsletterFrequency::Daily => "daily",
            NewsletterFrequency::Weekly => "weekly",
            NewsletterFrequency::Monthly => "monthly",
            NewsletterFrequency::Special => "special",
        }
    }
}

impl fmt::Display for NewsletterFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NewsletterFrequency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(NewsletterFrequency::Daily),
            "weekly" => Ok(NewsletterFrequency::Weekly),
            "monthly" => Ok(NewsletterFrequency::Monthly),
            "special" => Ok(NewsletterFrequency::Special),
            _ => Err(anyhow::anyhow!("Invalid newsletter frequency: {}", s)),
        }
    }
}

/// Newsletter entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub frequency: NewsletterFrequency,
    pub publisher_id: Option<i64>,
    pub created_by: Option<i64>,
    /// Linked published articles
    pub article_ids: Vec<i64>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_count: i64,
    pub open_count: i64,
    pub click_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Newsletter {
    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Open rate in percent, rounded to two decimals; 0 when nothing was sent
    pub fn open_rate(&self) -> f64 {
        if self.sent_count <= 0 {
            return 0.0;
        }
        let rate = self.open_count as f64 / self.sent_count as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    }
}

/// Newsletter listing filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewsletterFilter {
    pub publisher_id: Option<i64>,
    pub created_by: Option<i64>,
}

/// Input for creating a newsletter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateNewsletterInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub frequency: NewsletterFrequency,
    #[serde(default)]
    pub publisher_id: Option<i64>,
    #[serde(default)]
    pub article_ids: Vec<i64>,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl CreateNewsletterInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Input for updating a newsletter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateNewsletterInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub frequency: Option<NewsletterFrequency>,
    pub article_ids: Option<Vec<i64>>,
    pub scheduled_for: Option<DateTime<Utc>>,
}
