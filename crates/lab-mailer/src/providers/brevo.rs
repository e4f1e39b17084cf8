//! Brevo (formerly Sendinblue) transactional email client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{status_error, EmailProvider, ProviderError, SendAttempt};
use crate::config::{ApiKeyCredentials, Sender};
use crate::types::Message;

pub const BREVO_API_URL: &str = "https://api.brevo.com";
pub const PROVIDER_NAME: &str = "brevo";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoPayload<'a> {
    sender: BrevoAddress<'a>,
    to: Vec<BrevoAddress<'a>>,
    subject: &'a str,
    html_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_content: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct BrevoAddress<'a> {
    email: &'a str,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrevoResponse {
    #[serde(default)]
    message_id: Option<String>,
}

pub struct BrevoProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    sender: Sender,
}

impl BrevoProvider {
    pub fn new(client: reqwest::Client, config: &ApiKeyCredentials, sender: Sender) -> Self {
        if config.api_key.is_none() {
            warn!("BREVO_API_KEY not configured, Brevo sends are disabled");
        }
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| BREVO_API_URL.to_string()),
            sender,
        }
    }

    fn payload<'a>(&'a self, message: &'a Message) -> BrevoPayload<'a> {
        BrevoPayload {
            sender: BrevoAddress {
                email: &self.sender.address,
                name: self.sender.name.clone(),
            },
            to: vec![BrevoAddress {
                email: &message.to,
                name: message.recipient_name(),
            }],
            subject: &message.subject,
            html_content: &message.html,
            text_content: message.text.as_deref(),
        }
    }

    async fn try_send(
        &self,
        message: &Message,
        api_key: &str,
    ) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v3/smtp/email", self.base_url))
            .header("api-key", api_key)
            .header("accept", "application/json")
            .json(&self.payload(message))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(response
            .json::<BrevoResponse>()
            .await
            .ok()
            .and_then(|body| body.message_id))
    }
}

#[async_trait]
impl EmailProvider for BrevoProvider {
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
                info!(message_id = ?id, "Email sent via Brevo");
                SendAttempt::Sent { id }
            }
            Err(e) => {
                error!(error = %e, "Brevo send failed");
                e.into_attempt()
            }
        }
    }
}
