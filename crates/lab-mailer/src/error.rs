//! Error types for the mailer
//!
//! Nothing on the delivery path returns these to a caller; provider and storage
//! failures are logged and folded into outcomes. These cover setup: loading
//! configuration, opening the database, building the HTTP client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid sender address: {0}")]
    InvalidSender(String),
}

pub type Result<T> = std::result::Result<T, MailerError>;
