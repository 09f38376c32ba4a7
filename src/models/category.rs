//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default badge color for new categories
pub const DEFAULT_CATEGORY_COLOR: &str = "#007bff";

/// Category entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    /// Hex color `#rrggbb`
    pub color: String,
    pub is_active: bool,
    /// Number of published articles in this category
    pub article_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Input for updating a category
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

/// Check that a color is in `#rrggbb` form
pub fn is_valid_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_color() {
        assert!(is_valid_color(DEFAULT_CATEGORY_COLOR));
        assert!(is_valid_color("#A1b2C3"));
        assert!(!is_valid_color("007bff"));
        assert!(!is_valid_color("#07bf"));
        assert!(!is_valid_color("#zzzzzz"));
    }
}
