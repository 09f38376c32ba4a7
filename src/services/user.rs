//! User service
//!
//! Accounts, sessions and role administration:
//! - self-registration as reader or journalist
//! - login/logout with bearer-token sessions
//! - profile and password changes
//! - admin user management, including role changes

use crate::db::repositories::{PublisherRepository, SessionRepository, UserRepository};
use crate::models::{
    ListParams, MemberRole, PagedResult, Session, UpdateProfileInput, User, UserRole,
    MAX_BIO_LENGTH,
};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

const USERNAME_MIN_LENGTH: usize = 3;
const USERNAME_MAX_LENGTH: usize = 150;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: None,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Input for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
    ) -> Self {
        Self::with_session_expiration(
            user_repo,
            session_repo,
            publisher_repo,
            DEFAULT_SESSION_EXPIRATION_DAYS,
        )
    }

    /// Create a user service with a custom session lifetime
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            publisher_repo,
            session_expiration_days,
        }
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    /// Register a new account.
    ///
    /// Visitors may register as a reader (the default) or a journalist.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for a malformed username, email or password, or a
    ///   privileged role
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let role = input.role.unwrap_or_default();
        if !role.is_self_assignable() {
            return Err(UserServiceError::ValidationError(format!(
                "Cannot register with the {} role",
                role
            )));
        }
        self.create_account(input, role).await
    }

    /// Create an account with any role. Used by the `create-user` command.
    pub async fn create_user(
        &self,
        input: RegisterInput,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        self.create_account(input, role).await
    }

    /// Login with username or email.
    ///
    /// Unknown users and wrong passwords produce the same error.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(input.username_or_email.trim())
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        let session = self.create_session(user.id).await?;
        tracing::info!(user_id = user.id, "User logged in");
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown tokens. Expired sessions are deleted and
    /// also yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    pub async fn get_user(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Update the caller's own profile
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.get_user(user_id).await?;
        if !input.has_changes() {
            return Ok(user);
        }

        if let Some(bio) = input.bio {
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(UserServiceError::ValidationError(format!(
                    "Bio must be at most {} characters",
                    MAX_BIO_LENGTH
                )));
            }
            user.bio = bio;
        }

        if let Some(email) = input.email {
            let email = email.trim().to_string();
            validate_email(&email)?;
            if !email.eq_ignore_ascii_case(&user.email) {
                if let Some(other) = self
                    .user_repo
                    .get_by_email(&email)
                    .await
                    .context("Failed to check email")?
                {
                    if other.id != user.id {
                        return Err(UserServiceError::UserExists(format!(
                            "Email '{}' is already registered",
                            email
                        )));
                    }
                }
            }
            user.email = email;
        }

        if let Some(first_name) = input.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(website) = input.website {
            user.website = non_empty(website);
        }
        if let Some(location) = input.location {
            user.location = non_empty(location);
        }

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;
        Ok(updated)
    }

    /// Change the caller's password after checking the current one.
    ///
    /// All other sessions of the user stay valid.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), UserServiceError> {
        let mut user = self.get_user(user_id).await?;

        let valid = verify_password(current_password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        check_password_policy(new_password).map_err(UserServiceError::ValidationError)?;

        user.password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update(&user)
            .await
            .context("Failed to update password")?;
        Ok(())
    }

    pub async fn list_users(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change a user's role.
    ///
    /// Publisher memberships that require the old role are removed, so a
    /// former editor no longer manages anything and a former journalist is no
    /// longer affiliated.
    pub async fn set_role(&self, user_id: i64, role: UserRole) -> Result<User, UserServiceError> {
        let mut user = self.get_user(user_id).await?;
        if user.role == role {
            return Ok(user);
        }

        for member_role in [MemberRole::Editor, MemberRole::Journalist] {
            if member_role.required_user_role() != role {
                self.publisher_repo
                    .remove_memberships(user.id, member_role)
                    .await
                    .context("Failed to remove publisher memberships")?;
            }
        }

        let previous = user.role;
        user.role = role;
        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user role")?;
        tracing::info!(user_id, from = %previous, to = %role, "User role changed");
        Ok(updated)
    }

    /// Delete a user. Admins cannot delete their own account.
    pub async fn delete_user(&self, actor: &User, user_id: i64) -> Result<(), UserServiceError> {
        if actor.id == user_id {
            return Err(UserServiceError::ValidationError(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.get_user(user_id).await?;

        self.session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to delete user sessions")?;
        self.user_repo
            .delete(user_id)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn create_account(
        &self,
        input: RegisterInput,
        role: UserRole,
    ) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();
        validate_username(&username)?;
        validate_email(&email)?;
        check_password_policy(&input.password).map_err(UserServiceError::ValidationError)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let mut user = User::new(username, email, password_hash, role);
        user.first_name = input.first_name.trim().to_string();
        user.last_name = input.last_name.trim().to_string();

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;
        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?;
        Ok(user)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }
}

/// 3 to 150 characters: letters, digits and `@.+-_`
fn validate_username(username: &str) -> Result<(), UserServiceError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&len) {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(UserServiceError::ValidationError(
            "Username may only contain letters, digits and @.+-_".to_string(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !email.contains(' '),
        None => false,
    };
    if !valid {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
