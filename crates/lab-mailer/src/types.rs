//! Message, recipient and outcome types shared by every layer of the mailer.

use serde::{Deserialize, Serialize};

/// A single outbound email, addressed to exactly one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Recipient address
    pub to: String,

    /// Recipient display name. Adapters derive one from the address when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,

    /// Subject line
    pub subject: String,

    /// HTML body
    pub html: String,

    /// Plain text alternative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Create a message with an HTML body only
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            to_name: None,
            subject: subject.into(),
            html: html.into(),
            text: None,
        }
    }

    /// Attach a display name for the recipient
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.to_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }

    /// Attach a plain text alternative
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Display name for the recipient, falling back to the local part of the address
    pub fn recipient_name(&self) -> String {
        self.to_name
            .clone()
            .unwrap_or_else(|| display_name_for(&self.to))
    }

    /// Validate the message before handing it to any provider
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.to.is_empty() {
            return Err(ValidationError::MissingField("to"));
        }
        if !is_valid_email(&self.to) {
            return Err(ValidationError::InvalidEmail(self.to.clone()));
        }
        if self.subject.trim().is_empty() {
            return Err(ValidationError::MissingField("subject"));
        }
        if self.html.is_empty() && self.text.is_none() {
            return Err(ValidationError::MissingContent);
        }
        Ok(())
    }
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Email must have either html or text content")]
    MissingContent,
}

/// Check if an email address is syntactically valid
pub fn is_valid_email(email: &str) -> bool {
    email_address::EmailAddress::is_valid(email)
}

/// Derive a display name from the local part of an address
///
/// `jane.doe@example.com` becomes `jane.doe`. An address without `@` is returned as is.
pub fn display_name_for(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

/// Format a `Name <address>` mailbox
///
/// Names containing RFC 5322 specials are quoted so that a name like
/// `Doe, Jane` stays one address.
pub fn mailbox(name: &str, address: &str) -> String {
    const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

    if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\" <{address}>")
    } else {
        format!("{name} <{address}>")
    }
}

/// Which audience list a recipient came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    Member,
    Subscriber,
}

impl std::fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Member => write!(f, "member"),
            Self::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// A resolved bulk-notification recipient, unique by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
    pub kind: RecipientKind,
}

impl Recipient {
    pub fn member(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
            kind: RecipientKind::Member,
        }
    }

    pub fn subscriber(email: impl Into<String>, name: Option<String>) -> Self {
        Self {
            email: email.into(),
            name,
            kind: RecipientKind::Subscriber,
        }
    }
}

/// Result of dispatching one message through the provider chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Whether any provider accepted the message
    pub success: bool,

    /// Provider that accepted the message, or the last one tried
    pub provider: Option<String>,

    /// Failure detail from the last attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    /// Create a successful outcome
    pub fn delivered(provider: impl Into<String>) -> Self {
        Self {
            success: true,
            provider: Some(provider.into()),
            error: None,
        }
    }

    /// Create a failed outcome
    pub fn failed(provider: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_from_local_part() {
        assert_eq!(display_name_for("jane.doe@example.com"), "jane.doe");
        assert_eq!(display_name_for("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn test_mailbox_quotes_specials() {
        assert_eq!(
            mailbox("0xJerry's Lab", "noreply@jerome.co.in"),
            "0xJerry's Lab <noreply@jerome.co.in>"
        );
        assert_eq!(
            mailbox("Doe, Jane", "jane@example.com"),
            "\"Doe, Jane\" <jane@example.com>"
        );
        assert_eq!(
            mailbox("Jane \"JJ\" Doe", "jane@example.com"),
            r#""Jane \"JJ\" Doe" <jane@example.com>"#
        );
        assert_eq!(
            mailbox(r"back\slash.", "b@example.com"),
            r#""back\\slash." <b@example.com>"#
        );
    }

    #[test]
    fn test_recipient_name_prefers_explicit_name() {
        let msg = Message::new("jane@example.com", "Hi", "<p>Hi</p>");
        assert_eq!(msg.recipient_name(), "jane");

        let msg = msg.with_name("Jane Doe");
        assert_eq!(msg.recipient_name(), "Jane Doe");
    }

    #[test]
    fn test_blank_name_is_ignored() {
        let msg = Message::new("jane@example.com", "Hi", "<p>Hi</p>").with_name("   ");
        assert!(msg.to_name.is_none());
        assert_eq!(msg.recipient_name(), "jane");
    }

    #[test]
    fn test_validate_ok() {
        let msg = Message::new("to@example.com", "Subject", "<p>Body</p>");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_email() {
        let msg = Message::new("not-an-email", "Subject", "<p>Body</p>");
        assert!(matches!(
            msg.validate(),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_validate_missing_subject() {
        let msg = Message::new("to@example.com", "  ", "<p>Body</p>");
        assert_eq!(msg.validate(), Err(ValidationError::MissingField("subject")));
    }

    #[test]
    fn test_validate_missing_content() {
        let msg = Message::new("to@example.com", "Subject", "");
        assert_eq!(msg.validate(), Err(ValidationError::MissingContent));

        let msg = msg.with_text("plain");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_message_serialization_skips_empty_optionals() {
        let msg = Message::new("to@example.com", "Subject", "<p>Body</p>");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("to_name"));
        assert!(!json.contains("\"text\""));
    }

    #[test]
    fn test_dispatch_outcome_constructors() {
        let ok = DispatchOutcome::delivered("resend");
        assert!(ok.success);
        assert_eq!(ok.provider.as_deref(), Some("resend"));
        assert!(ok.error.is_none());

        let err = DispatchOutcome::failed(None, "no providers");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("no providers"));
    }
}
