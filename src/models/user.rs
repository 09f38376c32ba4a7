//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a user biography
pub const MAX_BIO_LENGTH: usize = 500;

/// User role. Roles are mutually exclusive and determine what a user may do
/// in the editorial workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Reads published articles and follows publishers or journalists
    #[default]
    Reader,
    /// Writes articles and newsletters, submits articles for review
    Journalist,
    /// Reviews, publishes and rejects articles of the publishers they manage
    Editor,
    /// Full access
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 4] = [
        UserRole::Reader,
        UserRole::Journalist,
        UserRole::Editor,
        UserRole::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Reader => "reader",
            UserRole::Journalist => "journalist",
            UserRole::Editor => "editor",
            UserRole::Admin => "admin",
        }
    }

    /// Roles a visitor may pick for themselves at registration
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, UserRole::Reader | UserRole::Journalist)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reader" => Ok(UserRole::Reader),
            "journalist" => Ok(UserRole::Journalist),
            "editor" => Ok(UserRole::Editor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub bio: String,
    pub website: Option<String>,
    pub location: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user (ID and timestamps are placeholders until persisted)
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            bio: String::new(),
            website: None,
            location: None,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", falling back to the username
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            self.username.clone()
        } else {
            name.to_string()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_editor(&self) -> bool {
        self.role == UserRole::Editor
    }

    pub fn is_journalist(&self) -> bool {
        self.role == UserRole::Journalist
    }

    /// Journalists and admins write articles
    pub fn can_create_article(&self) -> bool {
        matches!(self.role, UserRole::Journalist | UserRole::Admin)
    }

    /// Editors and admins approve, publish, reject and archive articles
    pub fn can_review(&self) -> bool {
        matches!(self.role, UserRole::Editor | UserRole::Admin)
    }

    pub fn can_create_newsletter(&self) -> bool {
        matches!(
            self.role,
            UserRole::Journalist | UserRole::Editor | UserRole::Admin
        )
    }
}

/// Profile fields a user may edit about themselves
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
}

impl UpdateProfileInput {
    pub fn has_changes(&self) -> bool {
        self.first_name.is_some()
            || self.last_name.is_some()
            || self.email.is_some()
            || self.bio.is_some()
            || self.website.is_some()
            || self.location.is_some()
    }
}
