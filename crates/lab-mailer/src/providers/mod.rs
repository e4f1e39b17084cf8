//! Transactional email provider adapters
//!
//! Every adapter makes one HTTP call per message and never returns an error:
//! transport failures, non-success statuses and missing credentials all come
//! back as a failed [`SendAttempt`] after being logged.

pub mod brevo;
pub mod mailjet;
pub mod resend;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::Message;

pub use brevo::BrevoProvider;
pub use mailjet::MailjetProvider;
pub use resend::ResendProvider;

/// Outcome of a single provider call
#[derive(Debug, Clone, PartialEq)]
pub enum SendAttempt {
    /// Provider confirmed acceptance
    Sent { id: Option<String> },

    /// Provider answered with a non-success status
    Rejected { status: u16, detail: String },

    /// Provider signalled that its sending quota is used up
    RateLimited { status: u16, detail: String },

    /// Request never got a response (connect error, timeout, bad body)
    Transport(String),

    /// No credentials configured; nothing was sent
    Unconfigured,

    /// Provider accepted the request but reported the message as not sent
    Refused(String),
}

impl SendAttempt {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Human-readable failure detail, `None` on success
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Sent { .. } => None,
            Self::Rejected { status, detail } => Some(format!("HTTP {status}: {detail}")),
            Self::RateLimited { status, detail } => {
                Some(format!("rate limited (HTTP {status}): {detail}"))
            }
            Self::Transport(e) => Some(format!("transport error: {e}")),
            Self::Unconfigured => Some("provider not configured".to_string()),
            Self::Refused(e) => Some(format!("refused by provider: {e}")),
        }
    }
}

impl From<SendAttempt> for bool {
    fn from(attempt: SendAttempt) -> Self {
        attempt.is_success()
    }
}

/// A transactional email API
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Stable identifier, also used as the quota key
    fn name(&self) -> &str;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Send one message
    async fn send(&self, message: &Message) -> SendAttempt;
}

/// Adapter-internal failures, converted to a [`SendAttempt`] at the boundary
#[derive(Debug, thiserror::Error)]
pub(crate) enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider reported failure: {0}")]
    Refused(String),
}

impl ProviderError {
    pub(crate) fn into_attempt(self) -> SendAttempt {
        match self {
            Self::Transport(e) => SendAttempt::Transport(e.to_string()),
            Self::Status { status, body } => SendAttempt::Rejected {
                status,
                detail: body,
            },
            Self::Refused(detail) => SendAttempt::Refused(detail),
        }
    }
}

/// Turn a non-success response into a [`ProviderError::Status`]
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ProviderError::Status { status, body }
}

/// Shared HTTP client with a bounded per-request timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(concat!("lab-mailer/", env!("CARGO_PKG_VERSION")))
        .build()
}
