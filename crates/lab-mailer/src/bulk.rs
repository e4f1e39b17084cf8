//! Bulk notification sends
//!
//! A notification goes to every member, then to every subscriber who is not a
//! member, capped at a fixed number of recipients. The capped list is split in
//! two batches: as many recipients as the primary provider has quota left for,
//! then everyone else with the primary skipped. Each batch is sent concurrently
//! and awaited as a whole; one failed or panicking send never affects the rest.

use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::audience::{load_recipients, AudienceSource};
use crate::dispatch::{Dispatcher, Route};
use crate::templates::{Notification, RenderedEmail, TemplateRegistry};
use crate::types::{Message, Recipient};

/// Recipients split by route, plus how many were dropped by the cap
#[derive(Debug, Clone, PartialEq)]
pub struct BulkPlan {
    pub primary: Vec<Recipient>,
    pub fallback: Vec<Recipient>,
    pub skipped: usize,
}

impl BulkPlan {
    pub fn attempted(&self) -> usize {
        self.primary.len() + self.fallback.len()
    }
}

/// Cap the list at `max_recipients` and split it by remaining primary quota
pub fn plan_batches(
    mut recipients: Vec<Recipient>,
    max_recipients: usize,
    primary_remaining: u32,
) -> BulkPlan {
    let skipped = recipients.len().saturating_sub(max_recipients);
    recipients.truncate(max_recipients);

    let split = usize::try_from(primary_remaining)
        .unwrap_or(usize::MAX)
        .min(recipients.len());
    let fallback = recipients.split_off(split);

    BulkPlan {
        primary: recipients,
        fallback,
        skipped,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub label: &'static str,
    pub attempted: usize,
    pub succeeded: usize,
}

/// Aggregate result of a bulk send
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    /// Unique recipients before the cap
    pub resolved: usize,
    /// Recipients dropped by the cap
    pub skipped: usize,
    pub batches: Vec<BatchReport>,
}

impl BulkReport {
    pub fn attempted(&self) -> usize {
        self.batches.iter().map(|b| b.attempted).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.batches.iter().map(|b| b.succeeded).sum()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

pub struct BulkNotifier {
    dispatcher: Arc<Dispatcher>,
    audience: Arc<dyn AudienceSource>,
    templates: Arc<TemplateRegistry>,
    max_recipients: usize,
}

impl BulkNotifier {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        audience: Arc<dyn AudienceSource>,
        templates: Arc<TemplateRegistry>,
        max_recipients: usize,
    ) -> Self {
        Self {
            dispatcher,
            audience,
            templates,
            max_recipients,
        }
    }

    /// Send a notification to the whole audience. Never fails; see the report and logs.
    #[instrument(skip(self, notification), fields(kind = %notification.kind()))]
    pub async fn notify_many(&self, notification: &Notification) -> BulkReport {
        let Some(email) = self.templates.render(notification) else {
            error!("No template registered for notification");
            return BulkReport::default();
        };

        let recipients = load_recipients(self.audience.as_ref()).await;
        if recipients.is_empty() {
            info!("No subscribers or members to notify");
            return BulkReport::default();
        }

        let resolved = recipients.len();
        if resolved > self.max_recipients {
            warn!(
                resolved,
                max = self.max_recipients,
                "Too many recipients, limiting"
            );
        }

        let remaining = self.dispatcher.remaining_primary_quota().await;
        let plan = plan_batches(recipients, self.max_recipients, remaining);
        info!(
            attempted = plan.attempted(),
            resolved,
            primary_batch = plan.primary.len(),
            fallback_batch = plan.fallback.len(),
            "Sending notification in 2 batches"
        );

        let mut report = BulkReport {
            resolved,
            skipped: plan.skipped,
            batches: Vec::with_capacity(2),
        };

        for (label, route, batch) in [
            ("primary", Route::PrimaryAllowed, plan.primary),
            ("fallback", Route::SkipPrimary, plan.fallback),
        ] {
            if batch.is_empty() {
                continue;
            }
            let attempted = batch.len();
            let succeeded = self.send_batch(batch, route, &email).await;
            info!(batch = label, succeeded, attempted, "Batch complete");
            report.batches.push(BatchReport {
                label,
                attempted,
                succeeded,
            });
        }

        info!(
            succeeded = report.succeeded(),
            attempted = report.attempted(),
            skipped = report.skipped,
            "Notification complete"
        );
        report
    }

    /// Send to every recipient at once; returns the number delivered
    async fn send_batch(&self, batch: Vec<Recipient>, route: Route, email: &RenderedEmail) -> usize {
        let mut tasks = JoinSet::new();

        for recipient in batch {
            let mut message = Message::new(recipient.email, &email.subject, &email.html)
                .with_text(&email.text);
            if let Some(name) = recipient.name {
                message = message.with_name(name);
            }
            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move { dispatcher.send_one(&message, route).await });
        }

        let mut succeeded = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) if outcome.success => succeeded += 1,
                Ok(_) => {}
                Err(e) => error!(error = %e, "Send task failed"),
            }
        }
        succeeded
    }
}
