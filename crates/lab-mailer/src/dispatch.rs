//! Provider fallback chain
//!
//! Providers are tried in order until one accepts the message, and providers
//! without credentials are skipped. A slot may carry a [`QuotaTracker`]; such
//! slots are skipped once today's quota is spent, when the caller routes with
//! [`Route::SkipPrimary`], or after the provider has signalled a rate limit
//! during this run.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::MailerConfig;
use crate::error::MailerError;
use crate::providers::{
    http_client, BrevoProvider, EmailProvider, MailjetProvider, ResendProvider,
};
use crate::quota::{QuotaStore, QuotaTracker};
use crate::types::{DispatchOutcome, Message};

/// Whether quota-limited providers may be used for a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PrimaryAllowed,
    SkipPrimary,
}

/// One entry in the fallback chain
pub struct ProviderSlot {
    provider: Arc<dyn EmailProvider>,
    quota: Option<Arc<QuotaTracker>>,
}

impl ProviderSlot {
    pub fn provider(&self) -> &Arc<dyn EmailProvider> {
        &self.provider
    }

    pub fn quota(&self) -> Option<&Arc<QuotaTracker>> {
        self.quota.as_ref()
    }
}

/// Ordered list of providers, tried until the first success
#[derive(Default)]
pub struct Dispatcher {
    slots: Vec<ProviderSlot>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider without a daily limit
    pub fn with_provider(mut self, provider: Arc<dyn EmailProvider>) -> Self {
        self.slots.push(ProviderSlot {
            provider,
            quota: None,
        });
        self
    }

    /// Append a provider gated by a daily quota
    pub fn with_limited_provider(
        mut self,
        provider: Arc<dyn EmailProvider>,
        quota: Arc<QuotaTracker>,
    ) -> Self {
        self.slots.push(ProviderSlot {
            provider,
            quota: Some(quota),
        });
        self
    }

    /// Mailjet (quota-limited), then Resend, then Brevo
    pub fn from_config(
        config: &MailerConfig,
        store: Arc<dyn QuotaStore>,
    ) -> Result<Self, MailerError> {
        let client = http_client(config.request_timeout)?;

        let mailjet = MailjetProvider::new(client.clone(), &config.mailjet, config.sender.clone());
        let quota = Arc::new(QuotaTracker::new(
            store,
            mailjet.name().to_string(),
            config.primary_daily_limit,
        ));

        Ok(Self::new()
            .with_limited_provider(Arc::new(mailjet), quota)
            .with_provider(Arc::new(ResendProvider::new(
                client.clone(),
                &config.resend,
                config.sender.clone(),
            )))
            .with_provider(Arc::new(BrevoProvider::new(
                client,
                &config.brevo,
                config.sender.clone(),
            ))))
    }

    pub fn slots(&self) -> &[ProviderSlot] {
        &self.slots
    }

    /// Quota of the first quota-limited provider
    pub fn primary_quota(&self) -> Option<&Arc<QuotaTracker>> {
        self.slots.iter().find_map(|slot| slot.quota.as_ref())
    }

    /// Sends the primary provider may still make today, 0 without one
    pub async fn remaining_primary_quota(&self) -> u32 {
        match self.primary_quota() {
            Some(quota) => quota.remaining().await,
            None => 0,
        }
    }

    /// Send one message through the chain
    #[instrument(skip(self, message), fields(to = %message.to, route = ?route))]
    pub async fn send_one(&self, message: &Message, route: Route) -> DispatchOutcome {
        if let Err(e) = message.validate() {
            warn!(error = %e, "Refusing to send invalid message");
            return DispatchOutcome::failed(None, e.to_string());
        }

        let mut last_failure: Option<(String, String)> = None;

        for slot in &self.slots {
            let name = slot.provider.name();

            if !slot.provider.is_configured() {
                debug!(provider = name, "No credentials, skipping");
                continue;
            }

            if let Some(quota) = &slot.quota {
                if route == Route::SkipPrimary {
                    debug!(provider = name, "Skipping quota-limited provider by request");
                    continue;
                }
                if !quota.is_available().await {
                    debug!(provider = name, "Daily quota used up, skipping");
                    continue;
                }
            }

            let attempt = slot.provider.send(message).await;

            if attempt.is_success() {
                if let Some(quota) = &slot.quota {
                    quota.record_send().await;
                }
                return DispatchOutcome::delivered(name);
            }

            if attempt.is_rate_limited() {
                if let Some(quota) = &slot.quota {
                    quota.mark_exhausted();
                }
            }

            let detail = attempt
                .detail()
                .unwrap_or_else(|| "unknown failure".to_string());
            debug!(provider = name, detail = %detail, "Provider failed, falling through");
            last_failure = Some((name.to_string(), detail));
        }

        match last_failure {
            Some((provider, detail)) => {
                warn!(provider = %provider, detail = %detail, "All providers failed");
                DispatchOutcome::failed(Some(provider), detail)
            }
            None => {
                warn!("No provider available for this message");
                DispatchOutcome::failed(None, "no provider available")
            }
        }
    }

    /// Convenience form returning only whether the message was delivered
    pub async fn send(&self, message: &Message, route: Route) -> bool {
        self.send_one(message, route).await.success
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::SendAttempt;
    use crate::quota::{today, InMemoryQuotaStore};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that replays scripted attempts, repeating the last one
    pub(crate) struct ScriptedProvider {
        name: String,
        configured: bool,
        script: Mutex<VecDeque<SendAttempt>>,
        fallback: SendAttempt,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub(crate) fn new(name: &str, script: Vec<SendAttempt>) -> Arc<Self> {
            let fallback = script.last().cloned().unwrap_or(SendAttempt::Unconfigured);
            Arc::new(Self {
                name: name.to_string(),
                configured: true,
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn ok(name: &str) -> Arc<Self> {
            Self::new(name, vec![SendAttempt::Sent { id: None }])
        }

        pub(crate) fn failing(name: &str) -> Arc<Self> {
            Self::new(
                name,
                vec![SendAttempt::Rejected {
                    status: 500,
                    detail: "down".to_string(),
                }],
            )
        }

        pub(crate) fn unconfigured(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                configured: false,
                script: Mutex::new(VecDeque::new()),
                fallback: SendAttempt::Unconfigured,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmailProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn send(&self, _message: &Message) -> SendAttempt {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn message() -> Message {
        Message::new("reader@example.com", "New writeup", "<p>Hi</p>")
    }

    fn tracker(store: &Arc<InMemoryQuotaStore>, limit: u32) -> Arc<QuotaTracker> {
        Arc::new(QuotaTracker::new(store.clone(), "primary", limit))
    }

    #[tokio::test]
    async fn test_primary_success_increments_quota() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let primary = ScriptedProvider::ok("primary");
        let secondary = ScriptedProvider::ok("secondary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 10))
            .with_provider(secondary.clone());

        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;

        assert_eq!(outcome, DispatchOutcome::delivered("primary"));
        assert_eq!(secondary.calls(), 0);
        assert_eq!(store.get_count("primary", &today()).await.unwrap(), 1);
        assert_eq!(dispatcher.remaining_primary_quota().await, 9);
    }

    #[tokio::test]
    async fn test_zero_quota_goes_straight_to_secondary() {
        let store = Arc::new(InMemoryQuotaStore::new());
        store.set_count("primary", &today(), 10).await;
        let primary = ScriptedProvider::ok("primary");
        let secondary = ScriptedProvider::ok("secondary");
        let tertiary = ScriptedProvider::ok("tertiary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 10))
            .with_provider(secondary.clone())
            .with_provider(tertiary.clone());

        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;

        assert_eq!(outcome, DispatchOutcome::delivered("secondary"));
        assert_eq!(primary.calls(), 0);
        assert_eq!(tertiary.calls(), 0);
    }

    #[tokio::test]
    async fn test_skip_primary_route() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let primary = ScriptedProvider::ok("primary");
        let secondary = ScriptedProvider::ok("secondary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 10))
            .with_provider(secondary.clone());

        let outcome = dispatcher.send_one(&message(), Route::SkipPrimary).await;

        assert_eq!(outcome.provider.as_deref(), Some("secondary"));
        assert_eq!(primary.calls(), 0);
        assert_eq!(store.get_count("primary", &today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_tertiary() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let primary = ScriptedProvider::failing("primary");
        let secondary = ScriptedProvider::new("secondary", vec![SendAttempt::Unconfigured]);
        let tertiary = ScriptedProvider::ok("tertiary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 10))
            .with_provider(secondary.clone())
            .with_provider(tertiary.clone());

        assert!(dispatcher.send(&message(), Route::PrimaryAllowed).await);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(tertiary.calls(), 1);
        // Failed primary sends are not counted
        assert_eq!(store.get_count("primary", &today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_all_fail() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let dispatcher = Dispatcher::new()
            .with_limited_provider(ScriptedProvider::failing("primary"), tracker(&store, 10))
            .with_provider(ScriptedProvider::failing("secondary"))
            .with_provider(ScriptedProvider::failing("tertiary"));

        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;

        assert!(!outcome.success);
        assert_eq!(outcome.provider.as_deref(), Some("tertiary"));
        assert_eq!(outcome.error.as_deref(), Some("HTTP 500: down"));
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_primary_for_the_run() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let primary = ScriptedProvider::new(
            "primary",
            vec![
                SendAttempt::RateLimited {
                    status: 429,
                    detail: "limit".to_string(),
                },
                SendAttempt::Sent { id: None },
            ],
        );
        let secondary = ScriptedProvider::ok("secondary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 200))
            .with_provider(secondary.clone());

        for _ in 0..3 {
            let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;
            assert_eq!(outcome.provider.as_deref(), Some("secondary"));
        }

        // Stored record still allows sends, but the primary is never retried
        assert_eq!(store.get_count("primary", &today()).await.unwrap(), 0);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 3);
        assert_eq!(dispatcher.remaining_primary_quota().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_message_makes_no_calls() {
        let provider = ScriptedProvider::ok("secondary");
        let dispatcher = Dispatcher::new().with_provider(provider.clone());

        let outcome = dispatcher
            .send_one(
                &Message::new("not-an-address", "Subject", "<p>x</p>"),
                Route::PrimaryAllowed,
            )
            .await;

        assert!(!outcome.success);
        assert!(outcome.provider.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let dispatcher = Dispatcher::new();
        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;
        assert_eq!(
            outcome,
            DispatchOutcome::failed(None, "no provider available")
        );
        assert_eq!(dispatcher.remaining_primary_quota().await, 0);
    }

    #[tokio::test]
    async fn test_from_config_orders_providers() {
        let config = MailerConfig::default();
        let dispatcher =
            Dispatcher::from_config(&config, Arc::new(InMemoryQuotaStore::new())).unwrap();

        let names: Vec<&str> = dispatcher
            .slots()
            .iter()
            .map(|slot| slot.provider().name())
            .collect();
        assert_eq!(names, vec!["mailjet", "resend", "brevo"]);
        assert!(dispatcher.slots()[0].quota().is_some());
        assert!(dispatcher.slots()[1].quota().is_none());
        assert_eq!(dispatcher.remaining_primary_quota().await, 200);

        assert!(dispatcher
            .slots()
            .iter()
            .all(|slot| !slot.provider().is_configured()));

        // Nothing configured: fails without network I/O
        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;
        assert_eq!(
            outcome,
            DispatchOutcome::failed(None, "no provider available")
        );
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_skipped() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let primary = ScriptedProvider::unconfigured("primary");
        let secondary = ScriptedProvider::unconfigured("secondary");
        let tertiary = ScriptedProvider::ok("tertiary");
        let dispatcher = Dispatcher::new()
            .with_limited_provider(primary.clone(), tracker(&store, 10))
            .with_provider(secondary.clone())
            .with_provider(tertiary.clone());

        let outcome = dispatcher.send_one(&message(), Route::PrimaryAllowed).await;

        assert_eq!(outcome, DispatchOutcome::delivered("tertiary"));
        assert_eq!(primary.calls(), 0);
        assert_eq!(secondary.calls(), 0);
        assert_eq!(store.get_count("primary", &today()).await.unwrap(), 0);
    }
}
