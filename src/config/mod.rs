//! Configuration management
//!
//! Configuration is loaded from a YAML file (`config.yml` by default) and may be
//! overridden by environment variables. Missing values are filled with defaults,
//! so an absent or empty file yields a runnable configuration.
//!
//! Environment variables follow the `NEWSDESK_<SECTION>_<KEY>` pattern. Two
//! deployment-level variables are also honoured:
//! - `SECRET_KEY` sets `site.secret_key`
//! - `DB_PASSWORD` sets `database.password`

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Password applied on top of the URL (MySQL only)
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            password: None,
        }
    }
}

fn default_database_url() -> String {
    "data/newsdesk.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL / MariaDB
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_entries() -> u64 {
    10_000
}

/// Public site settings used when composing outbound links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Absolute base URL, without trailing slash
    #[serde(default = "default_site_url")]
    pub url: String,
    /// Key for signing unsubscribe links
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            url: default_site_url(),
            secret_key: None,
        }
    }
}

fn default_site_name() -> String {
    "Newsdesk".to_string()
}

fn default_site_url() -> String {
    "http://localhost:8000".to_string()
}

impl SiteConfig {
    /// Base URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Outbound SMTP settings. When `host` is unset, mail is written to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_site_name")]
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_from(),
            from_name: default_site_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "noreply@localhost".to_string()
}

impl EmailConfig {
    pub fn is_smtp_configured(&self) -> bool {
        self.host.as_deref().is_some_and(|h| !h.trim().is_empty())
    }
}

/// Notification dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    50
}

fn default_max_attempts() -> i32 {
    3
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_expiration_days(),
        }
    }
}

fn default_expiration_days() -> i64 {
    7
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// carrying the line and column of the problem.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment variable overrides
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "session.expiration_days must be positive".to_string(),
            ));
        }
        if self.notifications.max_attempts <= 0 || self.notifications.batch_size <= 0 {
            return Err(ConfigError::ValidationError(
                "notifications.max_attempts and notifications.batch_size must be positive"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Unparseable numeric values are ignored and the file value is kept.
    fn apply_env_overrides(&mut self) {
        if let Some(host) = env_var("NEWSDESK_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("NEWSDESK_SERVER_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(origin) = env_var("NEWSDESK_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        if let Some(driver) = env_var("NEWSDESK_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" | "mariadb" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Some(url) = env_var("NEWSDESK_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(password) = env_var("DB_PASSWORD") {
            self.database.password = Some(password);
        }

        if let Some(ttl) = env_var("NEWSDESK_CACHE_TTL_SECONDS").and_then(|t| t.parse().ok()) {
            self.cache.ttl_seconds = ttl;
        }

        if let Some(name) = env_var("NEWSDESK_SITE_NAME") {
            self.site.name = name;
        }
        if let Some(url) = env_var("NEWSDESK_SITE_URL") {
            self.site.url = url;
        }
        if let Some(secret) = env_var("SECRET_KEY") {
            self.site.secret_key = Some(secret);
        }

        if let Some(host) = env_var("NEWSDESK_EMAIL_HOST") {
            self.email.host = Some(host);
        }
        if let Some(port) = env_var("NEWSDESK_EMAIL_PORT").and_then(|p| p.parse().ok()) {
            self.email.port = port;
        }
        if let Some(username) = env_var("NEWSDESK_EMAIL_USERNAME") {
            self.email.username = Some(username);
        }
        if let Some(password) = env_var("NEWSDESK_EMAIL_PASSWORD") {
            self.email.password = Some(password);
        }
        if let Some(from) = env_var("NEWSDESK_EMAIL_FROM") {
            self.email.from = from;
        }
    }

    /// Return the configured secret key, generating an ephemeral one if unset.
    ///
    /// Unsubscribe links signed with an ephemeral key stop verifying after a
    /// restart, hence the warning.
    pub fn ensure_secret_key(&mut self) -> String {
        if let Some(secret) = self.site.secret_key.as_ref().filter(|s| !s.is_empty()) {
            return secret.clone();
        }
        tracing::warn!("No SECRET_KEY configured, generating an ephemeral key");
        let secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        self.site.secret_key = Some(secret.clone());
        secret
    }

    /// The configured secret key, for commands whose output (unsubscribe
    /// links) must still verify after the process exits
    pub fn require_secret_key(&self) -> Result<&str, ConfigError> {
        self.site
            .secret_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "site.secret_key (or SECRET_KEY) must be set to sign unsubscribe links".to_string(),
                )
            })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "NEWSDESK_SERVER_HOST",
        "NEWSDESK_SERVER_PORT",
        "NEWSDESK_SERVER_CORS_ORIGIN",
        "NEWSDESK_DATABASE_DRIVER",
        "NEWSDESK_DATABASE_URL",
        "NEWSDESK_CACHE_TTL_SECONDS",
        "NEWSDESK_SITE_NAME",
        "NEWSDESK_SITE_URL",
        "NEWSDESK_EMAIL_HOST",
        "NEWSDESK_EMAIL_PORT",
        "NEWSDESK_EMAIL_USERNAME",
        "NEWSDESK_EMAIL_PASSWORD",
        "NEWSDESK_EMAIL_FROM",
        "SECRET_KEY",
        "DB_PASSWORD",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load(Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.url, "data/newsdesk.db");
        assert_eq!(config.cache.ttl_seconds, 300);
        assert_eq!(config.session.expiration_days, 7);
        assert_eq!(config.notifications.max_attempts, 3);
        assert!(!config.email.is_smtp_configured());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 3000\nsite:\n  url: \"https://news.example.com/\"\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.site.base_url(), "https://news.example.com");
        assert_eq!(config.site.name, "Newsdesk");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  driver: mysql
  url: "mysql://news@db:3306/news"
email:
  host: "smtp.example.com"
  port: 2525
  username: "mailer"
  from: "desk@example.com"
notifications:
  poll_interval_secs: 5
  batch_size: 10
  max_attempts: 5
session:
  expiration_days: 14
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.database.url, "mysql://news@db:3306/news");
        assert!(config.email.is_smtp_configured());
        assert_eq!(config.email.port, 2525);
        assert_eq!(config.notifications.poll_interval_secs, 5);
        assert_eq!(config.notifications.batch_size, 10);
        assert_eq!(config.session.expiration_days, 14);
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("parse"));
        assert!(err.contains("line"));
    }

    #[test]
    fn test_load_rejects_non_positive_session_expiry() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  expiration_days: 0\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_env_override_server_and_database() {
        let _guard = lock_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8000\n").unwrap();

        std::env::set_var("NEWSDESK_SERVER_HOST", "10.0.0.1");
        std::env::set_var("NEWSDESK_SERVER_PORT", "9100");
        std::env::set_var("NEWSDESK_DATABASE_DRIVER", "mariadb");
        std::env::set_var("NEWSDESK_DATABASE_URL", "mysql://news@db/news");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.host, "10.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.database.driver, DatabaseDriver::Mysql);
        assert_eq!(config.database.url, "mysql://news@db/news");

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_secret_key_and_db_password_from_env() {
        let _guard = lock_env();
        std::env::set_var("SECRET_KEY", "s3cret");
        std::env::set_var("DB_PASSWORD", "hunter2");

        let mut config = Config::load_with_env(Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.database.password.as_deref(), Some("hunter2"));
        assert_eq!(config.ensure_secret_key(), "s3cret");

        std::env::remove_var("SECRET_KEY");
        std::env::remove_var("DB_PASSWORD");
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8123\n").unwrap();
        std::env::set_var("NEWSDESK_SERVER_PORT", "not_a_number");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 8123);

        std::env::remove_var("NEWSDESK_SERVER_PORT");
    }

    #[test]
    fn test_ensure_secret_key_generates_stable_value() {
        let mut config = Config::default();
        let first = config.ensure_secret_key();
        assert_eq!(first.len(), 64);
        assert_eq!(config.ensure_secret_key(), first);
    }

    #[test]
    fn test_require_secret_key_refuses_missing_key() {
        let mut config = Config::default();
        assert!(matches!(
            config.require_secret_key(),
            Err(ConfigError::ValidationError(_))
        ));
        config.site.secret_key = Some(String::new());
        assert!(config.require_secret_key().is_err());
        config.site.secret_key = Some("s3cret".to_string());
        assert_eq!(config.require_secret_key().unwrap(), "s3cret");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.site.secret_key = Some("topsecretvalue".to_string());
        config.database.password = Some("dbpassvalue".to_string());

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("topsecretvalue"));
        assert!(!yaml.contains("dbpassvalue"));
    }
}
