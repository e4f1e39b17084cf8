//! Daily send quota tracking
//!
//! Counts are stored per provider per UTC day, keyed by a `YYYY-MM-DD` string, so
//! a new day starts from zero without any reset job. The raw [`QuotaStore`] only
//! reads and upserts counters; [`QuotaTracker`] layers the delivery policy on top:
//!
//! - read failures count as zero sends (fail open)
//! - write failures are logged and dropped
//! - a provider rate-limit signal zeroes the remaining quota for the rest of the process

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Quota store errors
#[derive(Debug, thiserror::Error)]
pub enum QuotaStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Quota store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent per-provider, per-day send counters
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Sends recorded for `provider` on `date`, zero when no record exists
    async fn get_count(&self, provider: &str, date: &str) -> Result<u32, QuotaStoreError>;

    /// Create the record with a count of one, or add one to it
    async fn increment(&self, provider: &str, date: &str) -> Result<(), QuotaStoreError>;
}

/// Current UTC day as `YYYY-MM-DD`
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// In-memory quota store for tests and ephemeral runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryQuotaStore {
    counts: Arc<RwLock<HashMap<(String, String), u32>>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter
    pub async fn set_count(&self, provider: &str, date: &str, count: u32) {
        let mut counts = self.counts.write().await;
        counts.insert((provider.to_string(), date.to_string()), count);
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get_count(&self, provider: &str, date: &str) -> Result<u32, QuotaStoreError> {
        let counts = self.counts.read().await;
        Ok(counts
            .get(&(provider.to_string(), date.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn increment(&self, provider: &str, date: &str) -> Result<(), QuotaStoreError> {
        let mut counts = self.counts.write().await;
        *counts
            .entry((provider.to_string(), date.to_string()))
            .or_insert(0) += 1;
        Ok(())
    }
}

/// SQLite-backed quota store
#[derive(Debug, Clone)]
pub struct SqliteQuotaStore {
    pool: SqlitePool,
}

impl SqliteQuotaStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for SqliteQuotaStore {
    async fn get_count(&self, provider: &str, date: &str) -> Result<u32, QuotaStoreError> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT count FROM email_quota WHERE provider = ? AND date = ?")
                .bind(provider)
                .bind(date)
                .fetch_optional(&self.pool)
                .await?;

        Ok(count
            .map(|c| u32::try_from(c.max(0)).unwrap_or(u32::MAX))
            .unwrap_or(0))
    }

    async fn increment(&self, provider: &str, date: &str) -> Result<(), QuotaStoreError> {
        sqlx::query(
            r#"
            INSERT INTO email_quota (provider, date, count) VALUES (?, ?, 1)
            ON CONFLICT(provider, date) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(provider)
        .bind(date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Snapshot of a provider's quota for today
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub provider: String,
    pub date: String,
    pub sent: u32,
    pub limit: u32,
    pub remaining: u32,
    pub exhausted: bool,
}

/// Applies the daily limit and failure policy for one provider
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    provider: String,
    daily_limit: u32,
    exhausted: AtomicBool,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn QuotaStore>, provider: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            store,
            provider: provider.into(),
            daily_limit,
            exhausted: AtomicBool::new(false),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Sends recorded today. A failed read counts as zero.
    pub async fn sent_today(&self) -> u32 {
        let date = today();
        match self.store.get_count(&self.provider, &date).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    provider = %self.provider,
                    date = %date,
                    error = %e,
                    "Quota read failed, treating count as 0"
                );
                0
            }
        }
    }

    /// Sends still allowed today
    pub async fn remaining(&self) -> u32 {
        if self.is_exhausted() {
            return 0;
        }
        self.daily_limit.saturating_sub(self.sent_today().await)
    }

    pub async fn is_available(&self) -> bool {
        self.remaining().await > 0
    }

    /// Record a confirmed send. A failed write is logged and dropped.
    pub async fn record_send(&self) {
        let date = today();
        if let Err(e) = self.store.increment(&self.provider, &date).await {
            warn!(
                provider = %self.provider,
                date = %date,
                error = %e,
                "Quota write failed, count may be low"
            );
        }
    }

    /// Zero the remaining quota for the rest of the process
    pub fn mark_exhausted(&self) {
        if !self.exhausted.swap(true, Ordering::SeqCst) {
            info!(provider = %self.provider, "Provider rate limited, quota exhausted for this run");
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    pub async fn usage(&self) -> QuotaUsage {
        let sent = self.sent_today().await;
        let exhausted = self.is_exhausted();
        QuotaUsage {
            provider: self.provider.clone(),
            date: today(),
            sent,
            limit: self.daily_limit,
            remaining: if exhausted {
                0
            } else {
                self.daily_limit.saturating_sub(sent)
            },
            exhausted,
        }
    }
}

impl std::fmt::Debug for QuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaTracker")
            .field("provider", &self.provider)
            .field("daily_limit", &self.daily_limit)
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}
