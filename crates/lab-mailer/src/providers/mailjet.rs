//! Mailjet Send API v3.1 client
//!
//! Primary provider. Its free tier caps daily volume, and it answers with 429
//! (or 403 once the account is throttled) when that cap is hit; both map to
//! [`SendAttempt::RateLimited`] so the dispatcher can stop using it for the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{status_error, EmailProvider, ProviderError, SendAttempt};
use crate::config::{MailjetCredentials, Sender};
use crate::types::Message;

pub const MAILJET_API_URL: &str = "https://api.mailjet.com";
pub const PROVIDER_NAME: &str = "mailjet";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetPayload<'a> {
    messages: Vec<MailjetMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetMessage<'a> {
    from: MailjetAddress<'a>,
    to: Vec<MailjetAddress<'a>>,
    subject: &'a str,
    #[serde(rename = "HTMLPart")]
    html_part: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_part: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetAddress<'a> {
    email: &'a str,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetResponse {
    #[serde(default)]
    messages: Vec<MailjetMessageResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MailjetMessageResult {
    status: String,
    #[serde(default)]
    to: Vec<MailjetRecipientResult>,
}

#[derive(Debug, Deserialize)]
struct MailjetRecipientResult {
    #[serde(rename = "MessageUUID", default)]
    message_uuid: Option<String>,
}

pub struct MailjetProvider {
    client: reqwest::Client,
    credentials: Option<(String, String)>,
    base_url: String,
    sender: Sender,
}

impl MailjetProvider {
    pub fn new(client: reqwest::Client, config: &MailjetCredentials, sender: Sender) -> Self {
        let credentials = match (&config.api_key, &config.secret_key) {
            (Some(key), Some(secret)) => Some((key.clone(), secret.clone())),
            _ => {
                warn!("Mailjet credentials not configured, Mailjet sends are disabled");
                None
            }
        };

        Self {
            client,
            credentials,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| MAILJET_API_URL.to_string()),
            sender,
        }
    }

    fn payload<'a>(&'a self, message: &'a Message) -> MailjetPayload<'a> {
        MailjetPayload {
            messages: vec![MailjetMessage {
                from: MailjetAddress {
                    email: &self.sender.address,
                    name: self.sender.name.clone(),
                },
                to: vec![MailjetAddress {
                    email: &message.to,
                    name: message.recipient_name(),
                }],
                subject: &message.subject,
                html_part: &message.html,
                text_part: message.text.as_deref(),
            }],
        }
    }

    async fn try_send(
        &self,
        message: &Message,
        api_key: &str,
        secret_key: &str,
    ) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v3.1/send", self.base_url))
            .basic_auth(api_key, Some(secret_key))
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        // A 2xx is a confirmed send; the body only refines it
        match response.json::<MailjetResponse>().await {
            Ok(body) => match body.messages.first() {
                Some(result) if !result.status.eq_ignore_ascii_case("success") => {
                    Err(ProviderError::Refused(format!("status {}", result.status)))
                }
                Some(result) => Ok(result.to.first().and_then(|r| r.message_uuid.clone())),
                None => Ok(None),
            },
            Err(e) => {
                warn!(error = %e, "Mailjet response parse error, treating as sent");
                Ok(None)
            }
        }
    }
}

/// Mailjet uses 429 for rate limiting and 403 for a throttled or suspended sender
fn is_rate_limit_status(status: u16) -> bool {
    status == 429 || status == 403
}

#[async_trait]
impl EmailProvider for MailjetProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    #[instrument(skip(self, message), fields(provider = PROVIDER_NAME, to = %message.to))]
    async fn send(&self, message: &Message) -> SendAttempt {
        let Some((api_key, secret_key)) = &self.credentials else {
            return SendAttempt::Unconfigured;
        };

        match self.try_send(message, api_key, secret_key).await {
            Ok(id) => {
                info!(message_id = ?id, "Email sent via Mailjet");
                SendAttempt::Sent { id }
            }
            Err(ProviderError::Status { status, body }) if is_rate_limit_status(status) => {
                warn!(status, body = %body, "Mailjet rate limit reached");
                SendAttempt::RateLimited {
                    status,
                    detail: body,
                }
            }
            Err(e) => {
                error!(error = %e, "Mailjet send failed");
                e.into_attempt()
            }
        }
    }
}
