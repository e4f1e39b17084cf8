//! Member and newsletter subscriber lists
//!
//! Both lists are owned by the site; this crate only reads them. Members take
//! priority: a subscriber whose address matches a member is dropped, and the
//! member's name is kept.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;
use tracing::warn;

use crate::types::Recipient;

/// One row from either audience list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub email: String,
    pub name: Option<String>,
}

impl Contact {
    pub fn new(email: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            email: email.into(),
            name: name.map(str::to_string),
        }
    }
}

/// Read-only access to the site's audience lists
#[async_trait]
pub trait AudienceSource: Send + Sync {
    async fn list_members(&self) -> Result<Vec<Contact>, sqlx::Error>;

    async fn list_subscribers(&self) -> Result<Vec<Contact>, sqlx::Error>;
}

/// Fixed lists, for tests and one-off sends
#[derive(Debug, Clone, Default)]
pub struct StaticAudience {
    pub members: Vec<Contact>,
    pub subscribers: Vec<Contact>,
}

impl StaticAudience {
    pub fn new(members: Vec<Contact>, subscribers: Vec<Contact>) -> Self {
        Self {
            members,
            subscribers,
        }
    }
}

#[async_trait]
impl AudienceSource for StaticAudience {
    async fn list_members(&self) -> Result<Vec<Contact>, sqlx::Error> {
        Ok(self.members.clone())
    }

    async fn list_subscribers(&self) -> Result<Vec<Contact>, sqlx::Error> {
        Ok(self.subscribers.clone())
    }
}

/// Audience lists stored in the site database
#[derive(Debug, Clone)]
pub struct SqliteAudience {
    pool: SqlitePool,
}

impl SqliteAudience {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AudienceSource for SqliteAudience {
    async fn list_members(&self) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>("SELECT email, name FROM members")
            .fetch_all(&self.pool)
            .await
    }

    async fn list_subscribers(&self) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT email, name FROM newsletter_subscribers ORDER BY subscribed_at",
        )
        .fetch_all(&self.pool)
        .await
    }
}

/// Load both lists, treating a failed query as an empty list
pub async fn load_recipients(source: &dyn AudienceSource) -> Vec<Recipient> {
    let members = source.list_members().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load members, continuing without them");
        Vec::new()
    });
    let subscribers = source.list_subscribers().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load subscribers, continuing without them");
        Vec::new()
    });
    resolve_recipients(members, subscribers)
}

/// Merge members and subscribers into one list, unique by address
///
/// Members come first in their original order, then subscribers not already
/// present. Addresses are compared trimmed and case-insensitively; blank
/// addresses are dropped.
pub fn resolve_recipients(members: Vec<Contact>, subscribers: Vec<Contact>) -> Vec<Recipient> {
    let mut seen = HashSet::new();
    let mut recipients = Vec::with_capacity(members.len() + subscribers.len());

    for member in members {
        if let Some(key) = address_key(&member.email) {
            if seen.insert(key) {
                recipients.push(Recipient::member(member.email.trim(), member.name));
            }
        }
    }

    for subscriber in subscribers {
        if let Some(key) = address_key(&subscriber.email) {
            if seen.insert(key) {
                recipients.push(Recipient::subscriber(
                    subscriber.email.trim(),
                    subscriber.name,
                ));
            }
        }
    }

    recipients
}

fn address_key(email: &str) -> Option<String> {
    let trimmed = email.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}
