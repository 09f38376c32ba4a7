//! Subscription model
//!
//! A subscription links a user to a publisher or to a journalist. Subscribers
//! are notified when matching articles are published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a subscription points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Publisher,
    Journalist,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Publisher => "publisher",
            TargetType::Journalist => "journalist",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publisher" => Ok(TargetType::Publisher),
            "journalist" => Ok(TargetType::Journalist),
            _ => Err(anyhow::anyhow!("Invalid subscription target type: {}", s)),
        }
    }
}

/// Subscription target with its ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum SubscriptionTarget {
    Publisher(i64),
    Journalist(i64),
}

impl SubscriptionTarget {
    pub fn new(target_type: TargetType, id: i64) -> Self {
        match target_type {
            TargetType::Publisher => SubscriptionTarget::Publisher(id),
            TargetType::Journalist => SubscriptionTarget::Journalist(id),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            SubscriptionTarget::Publisher(_) => TargetType::Publisher,
            SubscriptionTarget::Journalist(_) => TargetType::Journalist,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            SubscriptionTarget::Publisher(id) | SubscriptionTarget::Journalist(id) => *id,
        }
    }

    /// Resolve a `publisher_id` / `journalist_id` pair where exactly one must be set
    pub fn from_ids(
        publisher_id: Option<i64>,
        journalist_id: Option<i64>,
    ) -> Result<Self, &'static str> {
        match (publisher_id, journalist_id) {
            (Some(id), None) => Ok(SubscriptionTarget::Publisher(id)),
            (None, Some(id)) => Ok(SubscriptionTarget::Journalist(id)),
            (None, None) => Err("Either publisher_id or journalist_id must be provided"),
            (Some(_), Some(_)) => Err("Provide only one of publisher_id or journalist_id"),
        }
    }
}

/// Stored subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub target_type: TargetType,
    pub target_id: i64,
    /// Publisher name or journalist username
    pub target_name: String,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn target(&self) -> SubscriptionTarget {
        SubscriptionTarget::new(self.target_type, self.target_id)
    }
}

/// Subscriber contact details used for notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub user_id: i64,
    pub email: String,
    /// The subscription that matched, used for the unsubscribe link
    pub target: SubscriptionTarget,
}
