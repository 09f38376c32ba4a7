//! Category service
//!
//! Categories change rarely and are read on every feed page, so listings and
//! slug lookups go through the shared cache. Every write drops all cached
//! category entries.

use crate::cache::{CacheLayer, SharedCache};
use crate::db::repositories::CategoryRepository;
use crate::models::{
    is_valid_color, Category, CreateCategoryInput, UpdateCategoryInput, DEFAULT_CATEGORY_COLOR,
};
use crate::services::slug::unique_slug;
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const CACHE_KEY_ACTIVE: &str = "categories:active";
const CACHE_KEY_PATTERN: &str = "categories:*";
const NAME_MAX_LENGTH: usize = 100;

fn slug_cache_key(slug: &str) -> String {
    format!("categories:slug:{}", slug)
}

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Category already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: SharedCache,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: SharedCache) -> Self {
        Self { repo, cache }
    }

    /// Active categories with their published article counts
    pub async fn list_active(&self) -> Result<Vec<Category>, CategoryServiceError> {
        if let Ok(Some(cached)) = self.cache.get::<Vec<Category>>(CACHE_KEY_ACTIVE).await {
            return Ok(cached);
        }

        let categories = self
            .repo
            .list(true)
            .await
            .context("Failed to list categories")?;

        if let Err(e) = self
            .cache
            .set(CACHE_KEY_ACTIVE, &categories, self.cache.default_ttl())
            .await
        {
            tracing::warn!("Failed to cache categories: {}", e);
        }
        Ok(categories)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        let key = slug_cache_key(slug);
        if let Ok(Some(cached)) = self.cache.get::<Category>(&key).await {
            return Ok(cached);
        }

        let category = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category")?
            .filter(|c| c.is_active)
            .ok_or(CategoryServiceError::NotFound)?;

        if let Err(e) = self.cache.set(&key, &category, self.cache.default_ttl()).await {
            tracing::warn!("Failed to cache category {}: {}", slug, e);
        }
        Ok(category)
    }

    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim().to_string();
        validate_name(&name)?;
        let color = match input.color {
            Some(color) => validate_color(color)?,
            None => DEFAULT_CATEGORY_COLOR.to_string(),
        };

        if self
            .repo
            .exists_by_name(&name, None)
            .await
            .context("Failed to check category name")?
        {
            return Err(CategoryServiceError::Conflict(format!(
                "Category '{}' already exists",
                name
            )));
        }

        let repo = self.repo.clone();
        let slug = unique_slug(&name, "category", move |candidate| {
            let repo = repo.clone();
            async move { repo.exists_by_slug(&candidate).await }
        })
        .await?;

        let category = Category {
            id: 0,
            name,
            slug,
            description: input.description.trim().to_string(),
            color,
            is_active: true,
            article_count: 0,
            created_at: Utc::now(),
        };
        let created = self
            .repo
            .create(&category)
            .await
            .context("Failed to create category")?;

        self.invalidate().await;
        Ok(created)
    }

    pub async fn update(
        &self,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let mut category = self.get_by_id(id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            validate_name(&name)?;
            if self
                .repo
                .exists_by_name(&name, Some(id))
                .await
                .context("Failed to check category name")?
            {
                return Err(CategoryServiceError::Conflict(format!(
                    "Category '{}' already exists",
                    name
                )));
            }
            category.name = name;
        }
        if let Some(description) = input.description {
            category.description = description.trim().to_string();
        }
        if let Some(color) = input.color {
            category.color = validate_color(color)?;
        }
        if let Some(is_active) = input.is_active {
            category.is_active = is_active;
        }

        let updated = self
            .repo
            .update(&category)
            .await
            .context("Failed to update category")?;

        self.invalidate().await;
        Ok(updated)
    }

    /// Delete a category. Its articles become uncategorized.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        self.get_by_id(id).await?;
        self.repo
            .delete(id)
            .await
            .context("Failed to delete category")?;

        self.invalidate().await;
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound)
    }

    async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_KEY_PATTERN).await {
            tracing::warn!("Failed to invalidate category cache: {}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<(), CategoryServiceError> {
    if name.is_empty() || name.chars().count() > NAME_MAX_LENGTH {
        return Err(CategoryServiceError::ValidationError(format!(
            "Category name must be between 1 and {} characters",
            NAME_MAX_LENGTH
        )));
    }
    Ok(())
}

fn validate_color(color: String) -> Result<String, CategoryServiceError> {
    let color = color.trim().to_string();
    if !is_valid_color(&color) {
        return Err(CategoryServiceError::ValidationError(
            "Color must be in #rrggbb form".to_string(),
        ));
    }
    Ok(color)
}
