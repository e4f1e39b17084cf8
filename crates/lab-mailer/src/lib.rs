//! Lab Mailer - transactional and bulk email delivery for 0xJerry's Lab
//!
//! Sends notification emails through a chain of HTTP email providers:
//!
//! ```text
//! Notification → TemplateRegistry → BulkNotifier ─┬─ primary batch  ─┐
//!                                                 └─ fallback batch ─┤
//!                                                                    ↓
//!                          Dispatcher: Mailjet (daily quota) → Resend → Brevo
//!                                          ↓
//!                                   QuotaTracker → SQLite (email_quota)
//! ```
//!
//! - **Quota**: per-provider, per-UTC-day counters. Reads fail open, writes
//!   are best effort, and a 429/403 from Mailjet zeroes its quota for the run.
//! - **Providers**: one HTTP call per message, failures become values, never errors.
//! - **Dispatch**: ordered provider list, first success wins.
//! - **Bulk**: members before subscribers, de-duplicated, capped at 300, sent
//!   in two concurrent batches split by the remaining primary quota.
//!
//! ## Usage
//!
//! ```no_run
//! use lab_mailer::{Mailer, MailerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MailerConfig::from_env()?;
//! let mailer = Mailer::from_config(&config).await?;
//! let report = mailer.notify_new_machine("Cicada", "Windows", "Easy").await;
//! println!("{}/{} sent", report.succeeded(), report.attempted());
//! # Ok(())
//! # }
//! ```

pub mod audience;
pub mod bulk;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod providers;
pub mod quota;
pub mod service;
pub mod storage;
pub mod templates;
pub mod types;

pub use audience::{AudienceSource, Contact, SqliteAudience, StaticAudience};
pub use bulk::{plan_batches, BatchReport, BulkNotifier, BulkPlan, BulkReport};
pub use config::{MailerConfig, Sender};
pub use dispatch::{Dispatcher, Route};
pub use error::{ConfigError, MailerError};
pub use providers::{EmailProvider, SendAttempt};
pub use quota::{InMemoryQuotaStore, QuotaStore, QuotaTracker, QuotaUsage, SqliteQuotaStore};
pub use service::Mailer;
pub use templates::{Notification, NotificationKind, RenderedEmail, TemplateRegistry};
pub use types::{DispatchOutcome, Message, Recipient, RecipientKind, ValidationError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
