//! Publisher model
//!
//! A publisher is a news outlet. Editors manage it and journalists write for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UserRole;

/// Publisher entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub website: Option<String>,
    pub contact_email: Option<String>,
    pub twitter_handle: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Publisher with aggregate counts for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherWithStats {
    #[serde(flatten)]
    pub publisher: Publisher,
    pub subscriber_count: i64,
    pub published_article_count: i64,
}

/// Kind of affiliation a user has with a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Editor,
    Journalist,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Editor => "editor",
            MemberRole::Journalist => "journalist",
        }
    }

    /// The user role a member of this kind must hold
    pub fn required_user_role(&self) -> UserRole {
        match self {
            MemberRole::Editor => UserRole::Editor,
            MemberRole::Journalist => UserRole::Journalist,
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(MemberRole::Editor),
            "journalist" => Ok(MemberRole::Journalist),
            _ => Err(anyhow::anyhow!("Invalid member role: {}", s)),
        }
    }
}

/// A user's membership in a publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherMember {
    pub publisher_id: i64,
    pub user_id: i64,
    pub username: String,
    pub member_role: MemberRole,
}

/// Input for creating a publisher
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePublisherInput {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub twitter_handle: Option<String>,
}

/// Input for updating a publisher
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePublisherInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub contact_email: Option<String>,
    pub twitter_handle: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdatePublisherInput {
    pub fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.website.is_some()
            || self.contact_email.is_some()
            || self.twitter_handle.is_some()
            || self.is_active.is_some()
    }
}
