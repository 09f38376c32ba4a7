//! Publisher service
//!
//! News outlets and their staff. Admins manage publishers and all
//! memberships; an editor of a publisher may manage its journalists.

use crate::db::repositories::{PublisherRepository, UserRepository};
use crate::models::{
    CreatePublisherInput, ListParams, MemberRole, PagedResult, Publisher, PublisherMember,
    PublisherWithStats, UpdatePublisherInput, User,
};
use crate::services::slug::unique_slug;
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

const NAME_MIN_LENGTH: usize = 2;
const NAME_MAX_LENGTH: usize = 200;
const DESCRIPTION_MIN_LENGTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum PublisherServiceError {
    #[error("Publisher not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Publisher with its counters and staff
#[derive(Debug, Clone, Serialize)]
pub struct PublisherDetail {
    #[serde(flatten)]
    pub publisher: PublisherWithStats,
    pub members: Vec<PublisherMember>,
}

pub struct PublisherService {
    publisher_repo: Arc<dyn PublisherRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl PublisherService {
    pub fn new(
        publisher_repo: Arc<dyn PublisherRepository>,
        user_repo: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            publisher_repo,
            user_repo,
        }
    }

    pub async fn create(
        &self,
        input: CreatePublisherInput,
    ) -> Result<Publisher, PublisherServiceError> {
        let name = input.name.trim().to_string();
        validate_name(&name)?;
        validate_description(&input.description)?;
        validate_contact_email(input.contact_email.as_deref())?;

        let repo = self.publisher_repo.clone();
        let slug = unique_slug(&name, "publisher", move |candidate| {
            let repo = repo.clone();
            async move { repo.slug_exists(&candidate).await }
        })
        .await?;

        let now = Utc::now();
        let publisher = Publisher {
            id: 0,
            name,
            slug,
            description: input.description.trim().to_string(),
            website: clean(input.website),
            contact_email: clean(input.contact_email),
            twitter_handle: clean(input.twitter_handle),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .publisher_repo
            .create(&publisher)
            .await
            .context("Failed to create publisher")?;
        tracing::info!(publisher_id = created.id, slug = %created.slug, "Publisher created");
        Ok(created)
    }

    /// Update a publisher. The slug is kept when the name changes.
    pub async fn update(
        &self,
        id: i64,
        input: UpdatePublisherInput,
    ) -> Result<Publisher, PublisherServiceError> {
        let mut publisher = self.get_publisher(id).await?;
        if !input.has_changes() {
            return Ok(publisher);
        }

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            validate_name(&name)?;
            publisher.name = name;
        }
        if let Some(description) = input.description {
            validate_description(&description)?;
            publisher.description = description.trim().to_string();
        }
        if input.contact_email.is_some() {
            validate_contact_email(input.contact_email.as_deref())?;
            publisher.contact_email = clean(input.contact_email);
        }
        if input.website.is_some() {
            publisher.website = clean(input.website);
        }
        if input.twitter_handle.is_some() {
            publisher.twitter_handle = clean(input.twitter_handle);
        }
        if let Some(is_active) = input.is_active {
            publisher.is_active = is_active;
        }

        let updated = self
            .publisher_repo
            .update(&publisher)
            .await
            .context("Failed to update publisher")?;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), PublisherServiceError> {
        self.get_publisher(id).await?;
        self.publisher_repo
            .delete(id)
            .await
            .context("Failed to delete publisher")?;
        tracing::info!(publisher_id = id, "Publisher deleted");
        Ok(())
    }

    /// List publishers with counters. Inactive publishers are shown to admins only.
    pub async fn list(
        &self,
        viewer: &User,
        params: &ListParams,
    ) -> Result<PagedResult<PublisherWithStats>, PublisherServiceError> {
        let (items, total) = self
            .publisher_repo
            .list_with_stats(params, !viewer.is_admin())
            .await
            .context("Failed to list publishers")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, viewer: &User, id: i64) -> Result<PublisherDetail, PublisherServiceError> {
        let publisher = self
            .publisher_repo
            .get_with_stats(id)
            .await
            .context("Failed to get publisher")?
            .filter(|p| p.publisher.is_active || viewer.is_admin())
            .ok_or(PublisherServiceError::NotFound)?;

        let members = self
            .publisher_repo
            .list_members(id)
            .await
            .context("Failed to list publisher members")?;
        Ok(PublisherDetail { publisher, members })
    }

    pub async fn get_publisher(&self, id: i64) -> Result<Publisher, PublisherServiceError> {
        self.publisher_repo
            .get_by_id(id)
            .await
            .context("Failed to get publisher")?
            .ok_or(PublisherServiceError::NotFound)
    }

    /// Add an editor or journalist to a publisher.
    ///
    /// # Errors
    ///
    /// - `Forbidden` unless the actor is an admin, or an editor of this
    ///   publisher adding a journalist
    /// - `ValidationError` if the user's role does not match `role`
    pub async fn add_member(
        &self,
        actor: &User,
        publisher_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<Vec<PublisherMember>, PublisherServiceError> {
        self.get_publisher(publisher_id).await?;
        self.check_can_manage(actor, publisher_id, role).await?;

        let member = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(PublisherServiceError::UserNotFound)?;
        if member.role != role.required_user_role() {
            return Err(PublisherServiceError::ValidationError(format!(
                "User '{}' must have the {} role to be added as {}",
                member.username,
                role.required_user_role(),
                role
            )));
        }

        self.publisher_repo
            .add_member(publisher_id, user_id, role)
            .await
            .context("Failed to add publisher member")?;
        self.members(publisher_id).await
    }

    pub async fn remove_member(
        &self,
        actor: &User,
        publisher_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<Vec<PublisherMember>, PublisherServiceError> {
        self.get_publisher(publisher_id).await?;
        self.check_can_manage(actor, publisher_id, role).await?;

        self.publisher_repo
            .remove_member(publisher_id, user_id, role)
            .await
            .context("Failed to remove publisher member")?;
        self.members(publisher_id).await
    }

    /// Publishers an editor manages
    pub async fn managed_publisher_ids(&self, editor_id: i64) -> Result<Vec<i64>, PublisherServiceError> {
        let ids = self
            .publisher_repo
            .publisher_ids_for_member(editor_id, MemberRole::Editor)
            .await
            .context("Failed to load managed publishers")?;
        Ok(ids)
    }

    /// Publishers a journalist writes for
    pub async fn affiliated_publisher_ids(
        &self,
        journalist_id: i64,
    ) -> Result<Vec<i64>, PublisherServiceError> {
        let ids = self
            .publisher_repo
            .publisher_ids_for_member(journalist_id, MemberRole::Journalist)
            .await
            .context("Failed to load affiliated publishers")?;
        Ok(ids)
    }

    async fn members(&self, publisher_id: i64) -> Result<Vec<PublisherMember>, PublisherServiceError> {
        let members = self
            .publisher_repo
            .list_members(publisher_id)
            .await
            .context("Failed to list publisher members")?;
        Ok(members)
    }

    async fn check_can_manage(
        &self,
        actor: &User,
        publisher_id: i64,
        role: MemberRole,
    ) -> Result<(), PublisherServiceError> {
        if actor.is_admin() {
            return Ok(());
        }
        if actor.is_editor() && role == MemberRole::Journalist {
            let managed = self.managed_publisher_ids(actor.id).await?;
            if managed.contains(&publisher_id) {
                return Ok(());
            }
        }
        Err(PublisherServiceError::Forbidden(format!(
            "You cannot manage {} members of this publisher",
            role
        )))
    }
}

fn validate_name(name: &str) -> Result<(), PublisherServiceError> {
    let len = name.chars().count();
    if !(NAME_MIN_LENGTH..=NAME_MAX_LENGTH).contains(&len) {
        return Err(PublisherServiceError::ValidationError(format!(
            "Publisher name must be between {} and {} characters",
            NAME_MIN_LENGTH, NAME_MAX_LENGTH
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), PublisherServiceError> {
    if description.trim().chars().count() < DESCRIPTION_MIN_LENGTH {
        return Err(PublisherServiceError::ValidationError(format!(
            "Description must be at least {} characters",
            DESCRIPTION_MIN_LENGTH
        )));
    }
    Ok(())
}

fn validate_contact_email(email: Option<&str>) -> Result<(), PublisherServiceError> {
    match email.map(str::trim) {
        Some(email) if !email.is_empty() && !email.contains('@') => Err(
            PublisherServiceError::ValidationError("Invalid contact email".to_string()),
        ),
        _ => Ok(()),
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
