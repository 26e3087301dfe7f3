//! Configuration module for userbase.

use serde::Deserialize;
use std::path::Path;

use crate::profile::Privacy;
use crate::{Result, UserbaseError};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (e.g. `sqlite://data/userbase.db` or `postgres://...`).
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_url() -> String {
    "sqlite://data/userbase.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/userbase.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Site information used in outgoing mail.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Human readable site name.
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Domain that activation and confirmation links point to.
    #[serde(default = "default_site_domain")]
    pub domain: String,
    /// Build links with https.
    #[serde(default = "default_true")]
    pub secure: bool,
}

fn default_site_name() -> String {
    "example.com".to_string()
}

fn default_site_domain() -> String {
    "example.com".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            domain: default_site_domain(),
            secure: true,
        }
    }
}

impl SiteConfig {
    /// Base URL of the site, always ending with a slash.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}/", self.domain.trim_end_matches('/'))
    }
}

/// Account lifecycle settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// New accounts must be activated through the emailed link.
    #[serde(default = "default_true")]
    pub activation_required: bool,
    /// Days an activation or confirmation key stays valid.
    #[serde(default = "default_activation_days")]
    pub activation_days: i64,
    /// Send a reminder before an activation key expires.
    #[serde(default = "default_true")]
    pub activation_notify: bool,
    /// Days before expiry at which the reminder goes out.
    #[serde(default = "default_activation_notify_days")]
    pub activation_notify_days: i64,
    /// Allow users to request a fresh link after expiry.
    #[serde(default)]
    pub activation_retry: bool,
    /// Sign up with an email address only; usernames are generated.
    #[serde(default)]
    pub without_usernames: bool,
    /// Usernames that may never be registered.
    #[serde(default = "default_forbidden_usernames")]
    pub forbidden_usernames: Vec<String>,
    /// Privacy level given to new profiles.
    #[serde(default)]
    pub default_privacy: Privacy,
    /// Hide the profile list from everyone but staff.
    #[serde(default)]
    pub disable_profile_list: bool,
    /// Never expose email addresses on profiles.
    #[serde(default)]
    pub hide_email: bool,
    /// Languages a profile may choose from.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

fn default_activation_days() -> i64 {
    7
}

fn default_activation_notify_days() -> i64 {
    5
}

fn default_forbidden_usernames() -> Vec<String> {
    ["signup", "signout", "signin", "activate", "me", "password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            activation_required: true,
            activation_days: default_activation_days(),
            activation_notify: true,
            activation_notify_days: default_activation_notify_days(),
            activation_retry: false,
            without_usernames: false,
            forbidden_usernames: default_forbidden_usernames(),
            default_privacy: Privacy::default(),
            disable_profile_list: false,
            hide_email: false,
            languages: default_languages(),
        }
    }
}

/// Mugshot (avatar) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MugshotConfig {
    /// Fall back to Gravatar when no image was uploaded.
    #[serde(default = "default_true")]
    pub gravatar: bool,
    /// Use the https Gravatar endpoint.
    #[serde(default = "default_true")]
    pub gravatar_secure: bool,
    /// Gravatar default image (identicon, mp, retro, 404, or a URL).
    #[serde(default = "default_mugshot_default")]
    pub default: String,
    /// Image size in pixels.
    #[serde(default = "default_mugshot_size")]
    pub size: u32,
}

fn default_mugshot_default() -> String {
    "identicon".to_string()
}

fn default_mugshot_size() -> u32 {
    80
}

impl Default for MugshotConfig {
    fn default() -> Self {
        Self {
            gravatar: true,
            gravatar_secure: true,
            default: default_mugshot_default(),
            size: default_mugshot_size(),
        }
    }
}

/// Which transport delivers outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    /// Write mail to the log.
    #[default]
    Console,
    /// Keep mail in memory.
    Memory,
    /// Deliver through an SMTP relay.
    Smtp,
}

/// Outgoing mail configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Transport to use.
    #[serde(default)]
    pub backend: MailBackend,
    /// From address for every message.
    #[serde(default = "default_from")]
    pub from: String,
    /// Also send an HTML alternative part.
    #[serde(default)]
    pub html: bool,
    /// SMTP relay host.
    #[serde(default)]
    pub smtp_host: String,
    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    #[serde(default)]
    pub smtp_username: String,
    /// SMTP password.
    #[serde(default)]
    pub smtp_password: String,
}

fn default_from() -> String {
    "webmaster@localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            backend: MailBackend::default(),
            from: default_from(),
            html: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Site information.
    #[serde(default)]
    pub site: SiteConfig,
    /// Account lifecycle settings.
    #[serde(default)]
    pub accounts: AccountsConfig,
    /// Mugshot settings.
    #[serde(default)]
    pub mugshot: MugshotConfig,
    /// Outgoing mail.
    #[serde(default)]
    pub mail: MailConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(UserbaseError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| UserbaseError::Config(format!("parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `USERBASE_DATABASE_URL`: Override the database URL
    /// - `USERBASE_SMTP_PASSWORD`: Override the SMTP password
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("USERBASE_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(password) = std::env::var("USERBASE_SMTP_PASSWORD") {
            if !password.is_empty() {
                self.mail.smtp_password = password;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.accounts.activation_days <= 0 {
            return Err(UserbaseError::Config(
                "accounts.activation_days must be positive".to_string(),
            ));
        }
        if self.accounts.activation_notify
            && self.accounts.activation_notify_days >= self.accounts.activation_days
        {
            return Err(UserbaseError::Config(
                "accounts.activation_notify_days must be less than activation_days".to_string(),
            ));
        }
        if self.accounts.languages.is_empty() {
            return Err(UserbaseError::Config(
                "accounts.languages must list at least one language".to_string(),
            ));
        }
        if self.mail.backend == MailBackend::Smtp && self.mail.smtp_host.is_empty() {
            return Err(UserbaseError::Config(
                "mail.smtp_host is required for the smtp backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.url, "sqlite://data/userbase.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.accounts.activation_days, 7);
        assert_eq!(config.accounts.activation_notify_days, 5);
        assert!(config.accounts.activation_required);
        assert!(!config.accounts.activation_retry);
        assert_eq!(config.accounts.default_privacy, Privacy::Registered);
        assert_eq!(config.mugshot.size, 80);
        assert_eq!(config.mail.backend, MailBackend::Console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[site]
name = "Example Community"
domain = "community.example.org"

[accounts]
activation_days = 3
activation_notify_days = 1
activation_retry = true
default_privacy = "open"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.site.name, "Example Community");
        assert_eq!(config.accounts.activation_days, 3);
        assert!(config.accounts.activation_retry);
        assert_eq!(config.accounts.default_privacy, Privacy::Open);
        // Untouched sections keep their defaults
        assert_eq!(config.mugshot.default, "identicon");
        assert!(config
            .accounts
            .forbidden_usernames
            .contains(&"signup".to_string()));
    }

    #[test]
    fn test_parse_mail_backend() {
        let toml = r#"
[mail]
backend = "smtp"
smtp_host = "mail.example.org"
from = "noreply@example.org"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.mail.backend, MailBackend::Smtp);
        assert_eq!(config.mail.smtp_port, 587);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = Config::parse("[accounts\nactivation_days = ");
        assert!(matches!(result, Err(UserbaseError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_notify_after_expiry() {
        let mut config = Config::default();
        config.accounts.activation_days = 3;
        config.accounts.activation_notify_days = 3;
        assert!(config.validate().is_err());

        config.accounts.activation_notify = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_smtp_requires_host() {
        let mut config = Config::default();
        config.mail.backend = MailBackend::Smtp;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_site_base_url() {
        let mut site = SiteConfig::default();
        site.domain = "example.org/".to_string();
        assert_eq!(site.base_url(), "https://example.org/");
        site.secure = false;
        assert_eq!(site.base_url(), "http://example.org/");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/userbase.toml");
        assert!(matches!(result, Err(UserbaseError::Io(_))));
    }
}
