//! Site-facing notification operations

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::audience::{AudienceSource, SqliteAudience};
use crate::bulk::{BulkNotifier, BulkReport};
use crate::config::MailerConfig;
use crate::dispatch::{Dispatcher, Route};
use crate::error::Result;
use crate::quota::{QuotaUsage, SqliteQuotaStore};
use crate::storage;
use crate::templates::{Notification, TemplateContext, TemplateRegistry};
use crate::types::{DispatchOutcome, Message};

/// Entry point for everything the site sends
pub struct Mailer {
    dispatcher: Arc<Dispatcher>,
    templates: Arc<TemplateRegistry>,
    bulk: BulkNotifier,
    admin_email: String,
}

impl Mailer {
    pub fn new(
        config: &MailerConfig,
        dispatcher: Arc<Dispatcher>,
        audience: Arc<dyn AudienceSource>,
    ) -> Self {
        let templates = Arc::new(TemplateRegistry::new(TemplateContext {
            site_url: config.site_url.clone(),
            site_name: config.sender.name.clone(),
        }));

        Self {
            bulk: BulkNotifier::new(
                Arc::clone(&dispatcher),
                audience,
                Arc::clone(&templates),
                config.max_recipients,
            ),
            dispatcher,
            templates,
            admin_email: config.admin_email.clone(),
        }
    }

    /// Open the SQLite database and wire the default provider chain
    pub async fn from_config(config: &MailerConfig) -> Result<Self> {
        let pool = storage::connect(&config.database_url).await?;
        let store = Arc::new(SqliteQuotaStore::new(pool.clone()));
        let dispatcher = Arc::new(Dispatcher::from_config(config, store)?);
        let audience = Arc::new(SqliteAudience::new(pool));
        Ok(Self::new(config, dispatcher, audience))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Tell the whole audience about a new machine
    pub async fn notify_new_machine(&self, name: &str, os: &str, difficulty: &str) -> BulkReport {
        self.bulk
            .notify_many(&Notification::NewMachine {
                name: name.to_string(),
                os: os.to_string(),
                difficulty: difficulty.to_string(),
            })
            .await
    }

    /// Tell the whole audience about a new writeup
    pub async fn notify_new_writeup(
        &self,
        title: &str,
        platform: &str,
        category: &str,
        difficulty: &str,
    ) -> BulkReport {
        self.bulk
            .notify_many(&Notification::NewWriteup {
                title: title.to_string(),
                platform: platform.to_string(),
                category: category.to_string(),
                difficulty: difficulty.to_string(),
            })
            .await
    }

    /// Tell the admin that someone opened a protected writeup
    #[instrument(skip(self, accessor_email, accessor_ip))]
    pub async fn notify_writeup_access(
        &self,
        title: &str,
        ctf_name: &str,
        accessor_email: &str,
        accessor_name: &str,
        accessor_ip: &str,
    ) -> DispatchOutcome {
        let notification = Notification::WriteupAccess {
            title: title.to_string(),
            ctf_name: ctf_name.to_string(),
            accessor_email: accessor_email.to_string(),
            accessor_name: accessor_name.to_string(),
            accessor_ip: accessor_ip.to_string(),
            accessed_at: Utc::now(),
        };
        let admin = self.admin_email.clone();
        self.send_single(&notification, admin, None).await
    }

    /// Greet a new newsletter subscriber
    #[instrument(skip(self, email))]
    pub async fn send_welcome(&self, email: &str, name: &str) -> DispatchOutcome {
        let notification = Notification::Welcome {
            name: name.to_string(),
        };
        self.send_single(&notification, email.to_string(), Some(name.to_string()))
            .await
    }

    /// Today's usage of the quota-limited provider
    pub async fn quota_usage(&self) -> Option<QuotaUsage> {
        match self.dispatcher.primary_quota() {
            Some(quota) => Some(quota.usage().await),
            None => None,
        }
    }

    async fn send_single(
        &self,
        notification: &Notification,
        to: String,
        name: Option<String>,
    ) -> DispatchOutcome {
        let Some(email) = self.templates.render(notification) else {
            warn!(kind = %notification.kind(), "No template registered for notification");
            return DispatchOutcome::failed(None, "no template registered");
        };

        let mut message = Message::new(to, email.subject, email.html).with_text(email.text);
        if let Some(name) = name {
            message = message.with_name(name);
        }

        let outcome = self.dispatcher.send_one(&message, Route::PrimaryAllowed).await;
        if outcome.success {
            info!(
                kind = %notification.kind(),
                provider = outcome.provider.as_deref().unwrap_or("unknown"),
                "Notification sent"
            );
        } else {
            warn!(
                kind = %notification.kind(),
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Notification not sent"
            );
        }
        outcome
    }
}
