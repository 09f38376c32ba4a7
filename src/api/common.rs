//! Common API utilities and shared types
//!
//! This module contains query types used across multiple API endpoints.

use serde::Deserialize;

use crate::api::middleware::ApiError;
use crate::models::{ListParams, SubscriptionTarget};

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size for public listings
pub fn default_page_size() -> u32 {
    10
}

/// Default page size for admin listings
pub fn default_per_page() -> u32 {
    20
}

/// Basic pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.page_size)
    }
}

/// Admin pagination query parameters
#[derive(Debug, Deserialize)]
pub struct AdminPaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl AdminPaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// `?publisher_id=` or `?journalist_id=`, exactly one of them
#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub publisher_id: Option<i64>,
    pub journalist_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl TargetQuery {
    pub fn target(&self) -> Result<SubscriptionTarget, ApiError> {
        SubscriptionTarget::from_ids(self.publisher_id, self.journalist_id)
            .map_err(ApiError::validation_error)
    }

    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_query(publisher_id: Option<i64>, journalist_id: Option<i64>) -> TargetQuery {
        TargetQuery {
            publisher_id,
            journalist_id,
            page: 1,
            page_size: 10,
        }
    }

    #[test]
    fn test_target_query_requires_exactly_one() {
        assert_eq!(
            target_query(Some(3), None).target().unwrap(),
            SubscriptionTarget::Publisher(3)
        );
        assert_eq!(
            target_query(None, Some(4)).target().unwrap(),
            SubscriptionTarget::Journalist(4)
        );
        assert_eq!(
            target_query(None, None).target().unwrap_err().error.code,
            "VALIDATION_ERROR"
        );
        assert!(target_query(Some(1), Some(2)).target().is_err());
    }

    #[test]
    fn test_pagination_is_clamped() {
        let query = PaginationQuery {
            page: 0,
            page_size: 500,
        };
        assert_eq!(query.params(), ListParams::new(1, 100));
    }
}
