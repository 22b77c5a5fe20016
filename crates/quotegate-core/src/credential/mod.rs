//! Short-lived bearer credential lifecycle.
//!
//! ```text
//! Unset ──get()──▶ Refreshing ──▶ Cached(valid) ──time──▶ Cached(expired)
//!                      ▲                                        │
//!                      └────────────────get()───────────────────┘
//! ```
//!
//! [`CredentialCache::get`] serves the in-memory credential while it is valid, then the
//! durable [`TokenFile`], and only then asks the [`IdentityProvider`]. Refreshes run under
//! an async mutex so concurrent callers share one in-flight refresh.

mod device_code;
mod store;

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::CredentialError;

pub use device_code::{DeviceCodePrompt, DeviceCodeProvider, DeviceCodeSettings, AZURE_SQL_SCOPE};
pub use store::TokenFile;

/// Subtracted from the provider-reported expiry before a credential is cached.
pub const SAFETY_MARGIN: Duration = Duration::minutes(5);

/// Bearer credential with its margined expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_at: OffsetDateTime, expires_at: OffsetDateTime) -> Self {
        Self {
            token: token.into(),
            issued_at,
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub const fn issued_at(&self) -> OffsetDateTime {
        self.issued_at
    }

    pub const fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token as reported by the identity provider, before the safety margin.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: OffsetDateTime,
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of fresh tokens. May block for a long time on interactive consent.
pub trait IdentityProvider: Send + Sync {
    fn acquire<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

pub struct CredentialCache {
    provider: Arc<dyn IdentityProvider>,
    file: Option<TokenFile>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Credential>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            file: None,
            clock: Arc::new(SystemClock),
            current: Mutex::new(None),
        }
    }

    pub fn with_token_file(mut self, file: TokenFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return a credential valid at the time of the call, refreshing if needed.
    pub async fn get(&self) -> Result<Credential, CredentialError> {
        let mut current = self.current.lock().await;
        let now = self.clock.now();

        if let Some(credential) = current.as_ref().filter(|c| c.is_valid_at(now)) {
            debug!(expires_at = %credential.expires_at(), "using in-memory credential");
            return Ok(credential.clone());
        }

        if let Some(credential) = self.load_durable(now) {
            info!(expires_at = %credential.expires_at(), "using cached credential from token file");
            *current = Some(credential.clone());
            return Ok(credential);
        }

        info!("no valid cached credential; starting refresh");
        let credential = self.refresh_locked().await?;
        *current = Some(credential.clone());
        Ok(credential)
    }

    /// Skip both caches and obtain a new credential from the provider.
    pub async fn force_refresh(&self) -> Result<Credential, CredentialError> {
        let mut current = self.current.lock().await;
        let credential = self.refresh_locked().await?;
        *current = Some(credential.clone());
        Ok(credential)
    }

    /// Credential currently held in memory, valid or not.
    pub async fn peek(&self) -> Option<Credential> {
        self.current.lock().await.clone()
    }

    fn load_durable(&self, now: OffsetDateTime) -> Option<Credential> {
        let file = self.file.as_ref()?;
        file.load().filter(|credential| credential.is_valid_at(now))
    }

    // Caller holds the `current` lock.
    async fn refresh_locked(&self) -> Result<Credential, CredentialError> {
        let issued_at = self.clock.now();
        let reported = self.provider.acquire().await?;
        let expires_at = reported.expires_on - SAFETY_MARGIN;

        if expires_at <= self.clock.now() {
            return Err(CredentialError::ShortLived {
                expires_at: expires_at.to_string(),
            });
        }

        let credential = Credential::new(reported.token, issued_at, expires_at);
        if let Some(file) = &self.file {
            if let Err(error) = file.save(&credential) {
                warn!(path = %file.path().display(), %error, "failed to persist credential");
            }
        }

        info!(expires_at = %credential.expires_at(), "credential refreshed");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;
    use time::macros::datetime;

    struct ManualClock(StdMutex<OffsetDateTime>);

    impl ManualClock {
        fn at(now: OffsetDateTime) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(now)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().expect("clock lock");
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.0.lock().expect("clock lock")
        }
    }

    struct CountingProvider {
        clock: Arc<ManualClock>,
        lifetime: Duration,
        calls: AtomicUsize,
    }

    impl IdentityProvider for CountingProvider {
        fn acquire<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(AccessToken {
                    token: format!("token-{call}"),
                    expires_on: self.clock.now() + self.lifetime,
                })
            })
        }
    }

    struct FailingProvider;

    impl IdentityProvider for FailingProvider {
        fn acquire<'a>(
            &'a self,
        ) -> Pin<Box<dyn Future<Output = Result<AccessToken, CredentialError>> + Send + 'a>> {
            Box::pin(async { Err(CredentialError::Declined) })
        }
    }

    fn provider(clock: &Arc<ManualClock>, lifetime: Duration) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            clock: Arc::clone(clock),
            lifetime,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn applies_safety_margin_and_reuses_until_expiry() {
        let clock = ManualClock::at(datetime!(2024-03-07 08:00 UTC));
        let provider = provider(&clock, Duration::hours(1));
        let cache = CredentialCache::new(provider.clone()).with_clock(clock.clone());

        let first = cache.get().await.expect("refresh");
        assert_eq!(first.expires_at(), datetime!(2024-03-07 08:55 UTC));

        clock.advance(Duration::minutes(54));
        let second = cache.get().await.expect("cached");
        assert_eq!(second.token(), "token-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(1));
        let third = cache.get().await.expect("refresh");
        assert_eq!(third.token(), "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejects_tokens_that_expire_inside_margin() {
        let clock = ManualClock::at(datetime!(2024-03-07 08:00 UTC));
        let provider = provider(&clock, Duration::minutes(4));
        let cache = CredentialCache::new(provider).with_clock(clock);

        let err = cache.get().await.expect_err("too short");
        assert!(matches!(err, CredentialError::ShortLived { .. }));
        assert!(cache.peek().await.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_leaves_token_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("token.json");
        let clock = ManualClock::at(datetime!(2024-03-07 08:00 UTC));
        let stale = Credential::new(
            "stale",
            datetime!(2024-03-07 06:00 UTC),
            datetime!(2024-03-07 07:00 UTC),
        );
        TokenFile::new(&path).save(&stale).expect("seed");
        let before = std::fs::read_to_string(&path).expect("read");

        let cache = CredentialCache::new(Arc::new(FailingProvider))
            .with_token_file(TokenFile::new(&path))
            .with_clock(clock);
        let err = cache.get().await.expect_err("declined");

        assert_eq!(err, CredentialError::Declined);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), before);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let clock = ManualClock::at(datetime!(2024-03-07 08:00 UTC));
        let provider = provider(&clock, Duration::hours(1));
        let cache = Arc::new(CredentialCache::new(provider.clone()).with_clock(clock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await })
            })
            .collect();
        for handle in handles {
            let credential = handle.await.expect("join").expect("credential");
            assert_eq!(credential.token(), "token-1");
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_output_hides_token() {
        let credential = Credential::new(
            "very-secret",
            datetime!(2024-03-07 06:00 UTC),
            datetime!(2024-03-07 07:00 UTC),
        );
        assert!(!format!("{credential:?}").contains("very-secret"));
    }
}
