//! Environment-driven configuration

use std::time::Duration;

use crate::error::ConfigError;
use crate::types::is_valid_email;

pub const DEFAULT_FROM_ADDRESS: &str = "noreply@jerome.co.in";
pub const DEFAULT_FROM_NAME: &str = "0xJerry's Lab";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@0jerome.co.in";
pub const DEFAULT_SITE_URL: &str = "https://0jerome.co.in";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:lab-mailer.db?mode=rwc";

/// Mailjet free tier
pub const DEFAULT_PRIMARY_DAILY_LIMIT: u32 = 200;

/// Hard cap on recipients per bulk notification
pub const DEFAULT_MAX_RECIPIENTS: usize = 300;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sender identity used by every provider
#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

impl Sender {
    /// `Name <address>` form, quoted when the name needs it
    pub fn mailbox(&self) -> String {
        crate::types::mailbox(&self.name, &self.address)
    }
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            address: DEFAULT_FROM_ADDRESS.to_string(),
            name: DEFAULT_FROM_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MailjetCredentials {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeyCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Configuration for the mailer
#[derive(Debug, Clone, PartialEq)]
pub struct MailerConfig {
    pub sender: Sender,

    /// Receives writeup access notifications
    pub admin_email: String,

    /// Base URL used for links in templates
    pub site_url: String,

    pub mailjet: MailjetCredentials,
    pub resend: ApiKeyCredentials,
    pub brevo: ApiKeyCredentials,

    /// Daily send limit for the primary (Mailjet) provider
    pub primary_daily_limit: u32,

    pub max_recipients: usize,

    /// Per-request timeout for provider HTTP calls
    pub request_timeout: Duration,

    pub database_url: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            sender: Sender::default(),
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            mailjet: MailjetCredentials::default(),
            resend: ApiKeyCredentials::default(),
            brevo: ApiKeyCredentials::default(),
            primary_daily_limit: DEFAULT_PRIMARY_DAILY_LIMIT,
            max_recipients: DEFAULT_MAX_RECIPIENTS,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            database_url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl MailerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let sender = Sender {
            address: var("EMAIL_FROM_ADDRESS").unwrap_or(defaults.sender.address),
            name: var("EMAIL_FROM_NAME").unwrap_or(defaults.sender.name),
        };
        if !is_valid_email(&sender.address) {
            return Err(ConfigError::InvalidSender(sender.address));
        }

        let config = Self {
            sender,
            admin_email: var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            site_url: var("SITE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.site_url),
            mailjet: MailjetCredentials {
                api_key: var("MAILJET_API_KEY"),
                secret_key: var("MAILJET_SECRET_KEY"),
                base_url: var("MAILJET_API_URL"),
            },
            resend: ApiKeyCredentials {
                api_key: var("RESEND_API_KEY"),
                base_url: var("RESEND_API_URL"),
            },
            brevo: ApiKeyCredentials {
                api_key: var("BREVO_API_KEY"),
                base_url: var("BREVO_API_URL"),
            },
            primary_daily_limit: parse_or(
                "MAILJET_DAILY_LIMIT",
                var("MAILJET_DAILY_LIMIT"),
                defaults.primary_daily_limit,
            )?,
            max_recipients: parse_or(
                "MAX_RECIPIENTS",
                var("MAX_RECIPIENTS"),
                defaults.max_recipients,
            )?,
            request_timeout: Duration::from_secs(parse_or(
                "EMAIL_TIMEOUT_SECS",
                var("EMAIL_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
        };

        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}
