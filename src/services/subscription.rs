//! Subscription service
//!
//! Readers follow publishers and journalists. Every notification email
//! carries a signed one-click unsubscribe link, so tokens are derived from
//! the site secret with HMAC-SHA256 and can be checked without a login.

use crate::db::repositories::{PublisherRepository, SubscriptionRepository, UserRepository};
use crate::models::{Subscriber, Subscription, SubscriptionTarget, UserRole};
use anyhow::Context;
use data_encoding::HEXLOWER_PERMISSIVE;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionServiceError {
    #[error("Subscription target not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid unsubscribe token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Signs and verifies unsubscribe tokens
#[derive(Clone)]
pub struct UnsubscribeTokens {
    mac: HmacSha256,
}

impl std::fmt::Debug for UnsubscribeTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("UnsubscribeTokens(..)")
    }
}

impl UnsubscribeTokens {
    pub fn new(secret_key: &str) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid unsubscribe signing key: {}", e))?;
        Ok(Self { mac })
    }

    fn mac(&self, user_id: i64, target: SubscriptionTarget) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(message(user_id, target).as_bytes());
        mac
    }

    /// Hex-encoded `HMAC-SHA256(secret, "{user_id}:{target_type}:{target_id}")`
    pub fn sign(&self, user_id: i64, target: SubscriptionTarget) -> String {
        let digest = self.mac(user_id, target).finalize().into_bytes();
        data_encoding::HEXLOWER.encode(&digest)
    }

    /// Constant-time check of a token produced by [`sign`](Self::sign)
    pub fn verify(&self, user_id: i64, target: SubscriptionTarget, token: &str) -> bool {
        let Ok(bytes) = HEXLOWER_PERMISSIVE.decode(token.trim().as_bytes()) else {
            return false;
        };
        self.mac(user_id, target).verify_slice(&bytes).is_ok()
    }
}

fn message(user_id: i64, target: SubscriptionTarget) -> String {
    format!("{}:{}:{}", user_id, target.target_type(), target.id())
}

pub struct SubscriptionService {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    publisher_repo: Arc<dyn PublisherRepository>,
    user_repo: Arc<dyn UserRepository>,
    tokens: UnsubscribeTokens,
}

impl SubscriptionService {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        publisher_repo: Arc<dyn PublisherRepository>,
        user_repo: Arc<dyn UserRepository>,
        tokens: UnsubscribeTokens,
    ) -> Self {
        Self {
            subscription_repo,
            publisher_repo,
            user_repo,
            tokens,
        }
    }

    /// Follow a publisher or journalist. Subscribing twice returns the
    /// existing subscription.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the publisher does not exist, or the journalist does
    ///   not exist or is not a journalist
    /// - `ValidationError` when following yourself
    pub async fn subscribe(
        &self,
        user_id: i64,
        target: SubscriptionTarget,
    ) -> Result<Subscription, SubscriptionServiceError> {
        self.check_target(target).await?;
        if target == SubscriptionTarget::Journalist(user_id) {
            return Err(SubscriptionServiceError::ValidationError(
                "You cannot subscribe to yourself".to_string(),
            ));
        }

        let subscription = self
            .subscription_repo
            .subscribe(user_id, target)
            .await
            .context("Failed to subscribe")?;
        Ok(subscription)
    }

    /// Stop following a target. Returns whether a subscription existed.
    pub async fn unsubscribe(
        &self,
        user_id: i64,
        target: SubscriptionTarget,
    ) -> Result<bool, SubscriptionServiceError> {
        let removed = self
            .subscription_repo
            .unsubscribe(user_id, target)
            .await
            .context("Failed to unsubscribe")?;
        Ok(removed)
    }

    /// Unsubscribe through an emailed link
    pub async fn unsubscribe_with_token(
        &self,
        user_id: i64,
        target: SubscriptionTarget,
        token: &str,
    ) -> Result<bool, SubscriptionServiceError> {
        if !self.tokens.verify(user_id, target, token) {
            tracing::warn!(user_id, target = %target.target_type(), "Rejected unsubscribe token");
            return Err(SubscriptionServiceError::InvalidToken);
        }
        self.unsubscribe(user_id, target).await
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<Subscription>, SubscriptionServiceError> {
        let subscriptions = self
            .subscription_repo
            .list_for_user(user_id)
            .await
            .context("Failed to list subscriptions")?;
        Ok(subscriptions)
    }

    pub async fn subscribers_of(
        &self,
        target: SubscriptionTarget,
    ) -> Result<Vec<Subscriber>, SubscriptionServiceError> {
        let subscribers = self
            .subscription_repo
            .subscribers_of(target)
            .await
            .context("Failed to list subscribers")?;
        Ok(subscribers)
    }

    pub fn tokens(&self) -> &UnsubscribeTokens {
        &self.tokens
    }

    async fn check_target(&self, target: SubscriptionTarget) -> Result<(), SubscriptionServiceError> {
        let exists = match target {
            SubscriptionTarget::Publisher(id) => self
                .publisher_repo
                .get_by_id(id)
                .await
                .context("Failed to get publisher")?
                .is_some(),
            SubscriptionTarget::Journalist(id) => self
                .user_repo
                .get_by_id(id)
                .await
                .context("Failed to get journalist")?
                .is_some_and(|u| u.role == UserRole::Journalist),
        };
        if exists {
            Ok(())
        } else {
            Err(SubscriptionServiceError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxPublisherRepository, SqlxSubscriptionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Publisher, User};
    use chrono::Utc;
    use proptest::prelude::*;

    struct Fixture {
        service: SubscriptionService,
        reader: User,
        journalist: User,
        publisher: Publisher,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let users = SqlxUserRepository::boxed(pool.clone());
        let publishers = SqlxPublisherRepository::boxed(pool.clone());
        let reader = users
            .create(&User::new("reader", "reader@example.com", "h", UserRole::Reader))
            .await
            .unwrap();
        let journalist = users
            .create(&User::new("writer", "writer@example.com", "h", UserRole::Journalist))
            .await
            .unwrap();
        let now = Utc::now();
        let publisher = publishers
            .create(&Publisher {
                id: 0,
                name: "The Herald".to_string(),
                slug: "the-herald".to_string(),
                description: "Local news and more".to_string(),
                website: None,
                contact_email: None,
                twitter_handle: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        Fixture {
            service: SubscriptionService::new(
                SqlxSubscriptionRepository::boxed(pool),
                publishers,
                users,
                UnsubscribeTokens::new("test-secret").unwrap(),
            ),
            reader,
            journalist,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let fx = setup().await;
        let target = SubscriptionTarget::Publisher(fx.publisher.id);

        let first = fx.service.subscribe(fx.reader.id, target).await.unwrap();
        let second = fx.service.subscribe(fx.reader.id, target).await.unwrap();
        assert_eq!(first.id, second.id);

        let subs = fx.service.list(fx.reader.id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].target_name, "The Herald");
    }

    #[tokio::test]
    async fn test_journalist_target_must_be_journalist() {
        let fx = setup().await;

        let ok = fx
            .service
            .subscribe(fx.reader.id, SubscriptionTarget::Journalist(fx.journalist.id))
            .await;
        assert!(ok.is_ok());

        let not_journalist = fx
            .service
            .subscribe(fx.journalist.id, SubscriptionTarget::Journalist(fx.reader.id))
            .await;
        assert!(matches!(not_journalist, Err(SubscriptionServiceError::NotFound)));

        let missing = fx
            .service
            .subscribe(fx.reader.id, SubscriptionTarget::Publisher(999))
            .await;
        assert!(matches!(missing, Err(SubscriptionServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let fx = setup().await;
        let target = SubscriptionTarget::Journalist(fx.journalist.id);
        fx.service.subscribe(fx.reader.id, target).await.unwrap();

        assert!(fx.service.unsubscribe(fx.reader.id, target).await.unwrap());
        assert!(!fx.service.unsubscribe(fx.reader.id, target).await.unwrap());
    }

    #[tokio::test]
    async fn test_unsubscribe_with_token() {
        let fx = setup().await;
        let target = SubscriptionTarget::Publisher(fx.publisher.id);
        fx.service.subscribe(fx.reader.id, target).await.unwrap();

        let bad = fx
            .service
            .unsubscribe_with_token(fx.reader.id, target, "deadbeef")
            .await;
        assert!(matches!(bad, Err(SubscriptionServiceError::InvalidToken)));

        let token = fx.service.tokens().sign(fx.reader.id, target);
        assert!(fx
            .service
            .unsubscribe_with_token(fx.reader.id, target, &token)
            .await
            .unwrap());
        assert!(fx.service.list(fx.reader.id).await.unwrap().is_empty());
    }

    #[test]
    fn test_token_is_lowercase_hex_sha256() {
        let tokens = UnsubscribeTokens::new("secret").unwrap();
        let token = tokens.sign(7, SubscriptionTarget::Publisher(3));
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(tokens.verify(7, SubscriptionTarget::Publisher(3), &token.to_uppercase()));
        assert!(!tokens.verify(7, SubscriptionTarget::Journalist(3), &token));
        assert!(!UnsubscribeTokens::new("other").unwrap().verify(7, SubscriptionTarget::Publisher(3), &token));
        assert!(!tokens.verify(7, SubscriptionTarget::Publisher(3), "not hex"));
    }

    #[test]
    fn test_tokens_accept_any_key_length() {
        for key in [String::new(), "k".to_string(), "x".repeat(200)] {
            let tokens = UnsubscribeTokens::new(&key).unwrap();
            let token = tokens.sign(1, SubscriptionTarget::Journalist(2));
            assert!(tokens.verify(1, SubscriptionTarget::Journalist(2), &token));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn tokens_bind_user_and_target(user in 1i64..10_000, id in 1i64..10_000, other in 1i64..10_000) {
            let tokens = UnsubscribeTokens::new("prop-secret").unwrap();
            let target = SubscriptionTarget::Journalist(id);
            let token = tokens.sign(user, target);
            prop_assert!(tokens.verify(user, target, &token));
            if other != user {
                prop_assert!(!tokens.verify(other, target, &token));
            }
        }
    }
}
