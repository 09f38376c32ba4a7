//! Outbound email
//!
//! The notification dispatcher hands each message to a [`Mailer`]. With SMTP
//! configured that is [`SmtpMailer`]; otherwise [`LogMailer`] writes the
//! message to the log so development setups need no mail server.

use crate::config::EmailConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

/// A rendered email ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Build the mailer for the given settings
pub fn create_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    if config.is_smtp_configured() {
        let mailer = SmtpMailer::new(config)?;
        tracing::info!("Using SMTP mailer");
        Ok(Arc::new(mailer))
    } else {
        tracing::info!("SMTP not configured, notification emails will be logged");
        Ok(Arc::new(LogMailer))
    }
}

/// Sends mail through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let host = config
            .host
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| anyhow!("SMTP host not configured"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
            .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from: format!("{} <{}>", config.from_name, config.from),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| anyhow!("Invalid from address: {}", e))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

/// Writes messages to the log instead of sending them
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "Email (not sent, SMTP disabled):\n{}",
            email.body
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mailer_without_smtp_logs() {
        let mailer = create_mailer(&EmailConfig::default()).unwrap();
        assert_eq!(mailer.name(), "log");
    }

    #[tokio::test]
    async fn test_create_mailer_with_smtp() {
        let config = EmailConfig {
            host: Some("smtp.example.com".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };
        let mailer = create_mailer(&config).unwrap();
        assert_eq!(mailer.name(), "smtp");
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let email = OutgoingEmail {
            to: "reader@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        };
        assert!(LogMailer.send(&email).await.is_ok());
    }
}
