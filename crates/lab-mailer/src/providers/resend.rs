//! Direct Resend API client
//!
//! Sends emails via `POST {base}/emails` with a bearer token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{status_error, EmailProvider, ProviderError, SendAttempt};
use crate::config::{ApiKeyCredentials, Sender};
use crate::types::{mailbox, Message};

pub const RESEND_API_URL: &str = "https://api.resend.com";
pub const PROVIDER_NAME: &str = "resend";

/// Resend API request payload
#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: String,
    to: Vec<String>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

/// Resend API success response
#[derive(Debug, Deserialize)]
struct ResendSuccessResponse {
    id: String,
}

/// Resend API error response
#[derive(Debug, Deserialize)]
struct ResendErrorResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct ResendProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    sender: Sender,
}

impl ResendProvider {
    pub fn new(client: reqwest::Client, config: &ApiKeyCredentials, sender: Sender) -> Self {
        if config.api_key.is_none() {
            warn!("RESEND_API_KEY not configured, Resend sends are disabled");
        }
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| RESEND_API_URL.to_string()),
            sender,
        }
    }

    fn payload<'a>(&self, message: &'a Message) -> ResendPayload<'a> {
        ResendPayload {
            from: self.sender.mailbox(),
            to: vec![mailbox(&message.recipient_name(), &message.to)],
            subject: &message.subject,
            html: &message.html,
            text: message.text.as_deref(),
        }
    }

    async fn try_send(&self, message: &Message, api_key: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = status_error(response).await;
            return Err(match err {
                ProviderError::Status { status, body } => ProviderError::Status {
                    status,
                    body: error_message(&body),
                },
                other => other,
            });
        }

        match response.json::<ResendSuccessResponse>().await {
            Ok(success) => Ok(success.id),
            Err(e) => {
                // Response parse error but email likely sent
                warn!(error = %e, "Resend response parse error");
                Ok("resend:unknown".to_string())
            }
        }
    }
}

/// Prefer the structured error message over the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<ResendErrorResponse>(body)
        .ok()
        .and_then(|err| err.message.or(err.name))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, message), fields(provider = PROVIDER_NAME, to = %message.to))]
    async fn send(&self, message: &Message) -> SendAttempt {
        let Some(api_key) = &self.api_key else {
            return SendAttempt::Unconfigured;
        };

        match self.try_send(message, api_key).await {
            Ok(id) => {
                info!(message_id = %id, "Email sent via Resend");
                SendAttempt::Sent { id: Some(id) }
            }
            Err(e) => {
                error!(error = %e, "Resend send failed");
                e.into_attempt()
            }
        }
    }
}
