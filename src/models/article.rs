//! Article model and editorial workflow

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const TITLE_MIN_LENGTH: usize = 5;
pub const TITLE_MAX_LENGTH: usize = 200;
pub const SUBTITLE_MAX_LENGTH: usize = 300;
pub const CONTENT_MIN_LENGTH: usize = 100;
pub const EXCERPT_MAX_LENGTH: usize = 500;
pub const MAX_TAGS: usize = 10;
pub const TAG_MAX_LENGTH: usize = 30;

/// Generated excerpts are cut at this many characters
const AUTO_EXCERPT_LENGTH: usize = 200;
const WORDS_PER_MINUTE: usize = 200;

/// Article status in the editorial workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Submitted,
    Published,
    Rejected,
    Archived,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 5] = [
        ArticleStatus::Draft,
        ArticleStatus::Submitted,
        ArticleStatus::Published,
        ArticleStatus::Rejected,
        ArticleStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Submitted => "submitted",
            ArticleStatus::Published => "published",
            ArticleStatus::Rejected => "rejected",
            ArticleStatus::Archived => "archived",
        }
    }

    /// Status reached by applying `action`, or `None` if the transition is not allowed
    pub fn apply(self, action: WorkflowAction) -> Option<ArticleStatus> {
        use ArticleStatus::*;
        use WorkflowAction::*;
        match (self, action) {
            (Draft | Rejected, Submit) => Some(Submitted),
            (Submitted | Rejected, Withdraw) => Some(Draft),
            (Submitted, Approve) => Some(Published),
            (Submitted, Reject) => Some(Rejected),
            (Published, Archive) => Some(Archived),
            (Archived, Restore) => Some(Published),
            _ => None,
        }
    }

    /// Whether authors may still edit the article body in this status
    pub fn is_editable_by_author(&self) -> bool {
        matches!(
            self,
            ArticleStatus::Draft | ArticleStatus::Submitted | ArticleStatus::Rejected
        )
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ArticleStatus::Draft),
            "submitted" => Ok(ArticleStatus::Submitted),
            "published" => Ok(ArticleStatus::Published),
            "rejected" => Ok(ArticleStatus::Rejected),
            "archived" => Ok(ArticleStatus::Archived),
            _ => Err(anyhow::anyhow!("Invalid article status: {}", s)),
        }
    }
}

/// Editorial action moving an article between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowAction {
    /// Author sends the article for review
    Submit,
    /// Author pulls the article back to draft
    Withdraw,
    Approve,
    Reject,
    Archive,
    Restore,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 6] = [
        WorkflowAction::Submit,
        WorkflowAction::Withdraw,
        WorkflowAction::Approve,
        WorkflowAction::Reject,
        WorkflowAction::Archive,
        WorkflowAction::Restore,
    ];

    /// Actions only an editor of the article's publisher (or an admin) may take
    pub fn requires_reviewer(&self) -> bool {
        matches!(
            self,
            WorkflowAction::Approve
                | WorkflowAction::Reject
                | WorkflowAction::Archive
                | WorkflowAction::Restore
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Submit => "submit",
            WorkflowAction::Withdraw => "withdraw",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
            WorkflowAction::Archive => "archive",
            WorkflowAction::Restore => "restore",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Article priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticlePriority {
    Low,
    #[default]
    Normal,
    High,
    Breaking,
}

impl ArticlePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticlePriority::Low => "low",
            ArticlePriority::Normal => "normal",
            ArticlePriority::High => "high",
            ArticlePriority::Breaking => "breaking",
        }
    }
}

impl fmt::Display for ArticlePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticlePriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(ArticlePriority::Low),
            "normal" => Ok(ArticlePriority::Normal),
            "high" => Ok(ArticlePriority::High),
            "breaking" => Ok(ArticlePriority::Breaking),
            _ => Err(anyhow::anyhow!("Invalid article priority: {}", s)),
        }
    }
}

/// Author reference attached to an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleAuthor {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    pub slug: String,
    /// Markdown source
    pub content: String,
    /// Rendered HTML
    pub content_html: String,
    pub excerpt: String,
    pub category_id: Option<i64>,
    pub category_slug: Option<String>,
    /// Comma-separated tags
    pub tags: String,
    pub publisher_id: Option<i64>,
    pub publisher_name: Option<String>,
    pub authors: Vec<ArticleAuthor>,
    /// Reviewer who approved or rejected the article
    pub approved_by: Option<i64>,
    /// When the article was last approved; a rejection clears it
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub status: ArticleStatus,
    pub priority: ArticlePriority,
    pub is_featured: bool,
    pub is_sticky: bool,
    pub allow_comments: bool,
    pub reading_time: i32,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Article {
    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published
    }

    pub fn is_authored_by(&self, user_id: i64) -> bool {
        self.authors.iter().any(|a| a.id == user_id)
    }

    /// Trimmed, non-empty tags
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags)
    }

    /// Published less than 24 hours ago
    pub fn is_recent(&self) -> bool {
        self.published_at
            .is_some_and(|at| Utc::now() - at < Duration::hours(24))
    }
}

/// Input for creating a new article
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub publisher_id: Option<i64>,
    #[serde(default)]
    pub priority: ArticlePriority,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_sticky: bool,
    #[serde(default = "default_true")]
    pub allow_comments: bool,
    /// Additional journalists credited as authors
    #[serde(default)]
    pub co_author_ids: Vec<i64>,
}

fn default_true() -> bool {
    true
}

impl CreateArticleInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            allow_comments: true,
            ..Default::default()
        }
    }

    pub fn with_publisher(mut self, publisher_id: i64) -> Self {
        self.publisher_id = Some(publisher_id);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }
}

/// Input for updating an article. `None` leaves a field unchanged; for the
/// nullable foreign keys `Some(None)` clears the reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<i64>>,
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub publisher_id: Option<Option<i64>>,
    pub priority: Option<ArticlePriority>,
    pub is_featured: Option<bool>,
    pub is_sticky: Option<bool>,
    pub allow_comments: Option<bool>,
}

impl UpdateArticleInput {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.subtitle.is_some()
            || self.content.is_some()
            || self.excerpt.is_some()
            || self.category_id.is_some()
            || self.tags.is_some()
            || self.publisher_id.is_some()
            || self.priority.is_some()
            || self.is_featured.is_some()
            || self.is_sticky.is_some()
            || self.allow_comments.is_some()
    }
}

/// Distinguishes an absent field from an explicit `null`
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Which articles a listing may include
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleScope {
    /// Published articles only
    Published,
    /// Published articles from any of the given publishers or authors
    PublishedFollowing {
        publisher_ids: Vec<i64>,
        journalist_ids: Vec<i64>,
    },
    /// Published articles plus anything the user authored
    PublishedOrAuthoredBy(i64),
    /// Published articles plus anything from the given publishers or without a publisher
    PublishedOrManaged { publisher_ids: Vec<i64> },
    /// Everything
    All,
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Latest,
    Popular,
    Trending,
}

/// Filters for article listings
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub search: Option<String>,
    pub category_slug: Option<String>,
    pub status: Option<ArticleStatus>,
    pub priority: Option<ArticlePriority>,
    pub featured: Option<bool>,
    pub publisher_id: Option<i64>,
    pub author_id: Option<i64>,
    pub sort: FeedSort,
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<]+?>").expect("valid tag regex"));

/// Remove HTML tags, leaving the text between them untouched
pub fn strip_html(html: &str) -> String {
    HTML_TAG.replace_all(html, "").into_owned()
}

/// Excerpt generated from the raw content: first 200 characters once tags
/// are stripped, with `...` appended when truncated
pub fn make_excerpt(content: &str) -> String {
    let text = strip_html(content);
    if text.chars().count() > AUTO_EXCERPT_LENGTH {
        let cut: String = text.chars().take(AUTO_EXCERPT_LENGTH).collect();
        format!("{}...", cut)
    } else {
        text
    }
}

/// Estimated reading time in minutes, never below one
pub fn reading_time(content: &str) -> i32 {
    let words = content.split_whitespace().count();
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round() as i32;
    minutes.max(1)
}

/// Split a comma-separated tag string
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Validate and normalize a tag string (trimmed, de-duplicated, comma-joined)
pub fn normalize_tags(tags: &str) -> Result<String, String> {
    let mut seen: Vec<String> = Vec::new();
    for tag in split_tags(tags) {
        if tag.chars().count() > TAG_MAX_LENGTH {
            return Err(format!(
                "Tag '{}' is longer than {} characters",
                tag, TAG_MAX_LENGTH
            ));
        }
        if !seen.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            seen.push(tag);
        }
    }
    if seen.len() > MAX_TAGS {
        return Err(format!("At most {} tags are allowed", MAX_TAGS));
    }
    Ok(seen.join(", "))
}
