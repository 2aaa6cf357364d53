//! Reloading metadata provider.
//!
//! One background task refreshes the cached document: it sleeps until the
//! next refresh instant, performs a conditional fetch, and either swaps in a
//! new document, keeps the current one (304), or backs off on failure.
//! Readers call [`ReloadingMetadataProvider::get`] concurrently at any time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{CachedDocument, MetadataCache};
use super::config::{MetadataProviderConfig, RefreshPolicy};
use super::decoder::decode;
use super::document::{MetadataDocument, MetadataFilter, MetadataParser, RequireValidityHints};
use super::error::{ErrorKind, MetadataError};
use super::expiry::{compute_expiry, earliest_valid_until, refresh_delay};
use super::fetcher::{ConditionalToken, FetchOutcome, HttpFetcher, RemoteSource, TokenUpdate};

/// Scheduler state as reported in [`ProviderStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Idle,
    Fetching,
    Applying,
    Backoff,
    Stopped,
}

/// Observable refresh status.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub state: ProviderState,
    /// Start of the most recent refresh attempt.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Most recent refresh that yielded a new document or a 304.
    pub last_success: Option<DateTime<Utc>>,
    /// Most recent refresh that swapped in a new document.
    pub last_update: Option<DateTime<Utc>>,
    /// When the scheduler will next fetch.
    pub next_refresh: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
}

impl Default for ProviderStatus {
    fn default() -> Self {
        Self {
            state: ProviderState::Idle,
            last_attempt: None,
            last_success: None,
            last_update: None,
            next_refresh: None,
            consecutive_failures: 0,
            last_error: None,
            last_error_kind: None,
        }
    }
}

/// Result of a completed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new document was swapped in.
    Updated { expires_at: DateTime<Utc> },
    /// The source reported no change; the cached document stays with a
    /// renewed expiry.
    NotModified { expires_at: DateTime<Utc> },
    /// Another refresh succeeded while this one waited; nothing was fetched.
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    Initial,
    Scheduled,
    Manual,
}

impl std::fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshTrigger::Initial => write!(f, "initial"),
            RefreshTrigger::Scheduled => write!(f, "scheduled"),
            RefreshTrigger::Manual => write!(f, "manual"),
        }
    }
}

enum Lifecycle {
    Created,
    Starting,
    Running(JoinHandle<()>),
    Stopped,
}

/// Output of the fetch/decode/parse/filter pipeline, not yet applied.
enum Retrieved<D> {
    NotModified,
    New {
        document: D,
        fetched_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        token: TokenUpdate,
    },
}

struct Inner<P: MetadataParser> {
    fetcher: HttpFetcher,
    parser: P,
    filters: Vec<Box<dyn MetadataFilter<P::Document>>>,
    policy: RwLock<RefreshPolicy>,
    fail_fast_initialization: bool,
    cache: MetadataCache<P::Document>,
    /// Serialises refreshes; only the holder touches the conditional token.
    refresh_slot: tokio::sync::Mutex<ConditionalToken>,
    successful_refreshes: AtomicU64,
    status: RwLock<ProviderStatus>,
    reschedule: Notify,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

/// Builder for [`ReloadingMetadataProvider`].
pub struct MetadataProviderBuilder<P: MetadataParser> {
    source: RemoteSource,
    parser: P,
    policy: RefreshPolicy,
    filters: Vec<Box<dyn MetadataFilter<P::Document>>>,
    fail_fast_initialization: bool,
}

impl<P: MetadataParser> MetadataProviderBuilder<P> {
    pub fn policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a filter; filters run in insertion order after parsing.
    pub fn filter(mut self, filter: impl MetadataFilter<P::Document> + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Whether [`ReloadingMetadataProvider::start`] fails when the first fetch fails.
    pub fn fail_fast_initialization(mut self, fail_fast: bool) -> Self {
        self.fail_fast_initialization = fail_fast;
        self
    }

    /// Validate the policy and build the provider. The scheduler is not started.
    pub fn build(self) -> Result<ReloadingMetadataProvider<P>, MetadataError> {
        self.policy.validate().map_err(MetadataError::Configuration)?;

        let fetcher = HttpFetcher::new(self.source)?;
        let (shutdown, _) = watch::channel(false);

        Ok(ReloadingMetadataProvider {
            inner: Arc::new(Inner {
                fetcher,
                parser: self.parser,
                filters: self.filters,
                policy: RwLock::new(self.policy),
                fail_fast_initialization: self.fail_fast_initialization,
                cache: MetadataCache::new(),
                refresh_slot: tokio::sync::Mutex::new(ConditionalToken::default()),
                successful_refreshes: AtomicU64::new(0),
                status: RwLock::new(ProviderStatus::default()),
                reschedule: Notify::new(),
                shutdown,
                stopped: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::Created),
            }),
        })
    }
}

/// A metadata provider that keeps a remote document cached and refreshed.
pub struct ReloadingMetadataProvider<P: MetadataParser> {
    inner: Arc<Inner<P>>,
}

impl<P: MetadataParser> Clone for ReloadingMetadataProvider<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: MetadataParser> ReloadingMetadataProvider<P> {
    /// Start building a provider for `source`.
    pub fn builder(source: RemoteSource, parser: P) -> MetadataProviderBuilder<P> {
        MetadataProviderBuilder {
            source,
            parser,
            policy: RefreshPolicy::default(),
            filters: Vec::new(),
            fail_fast_initialization: true,
        }
    }

    /// Build a provider from file/CLI configuration.
    pub fn from_config(config: &MetadataProviderConfig, parser: P) -> Result<Self, MetadataError> {
        let source = config.remote_source()?;

        let mut builder = Self::builder(source, parser)
            .policy(config.refresh_policy())
            .fail_fast_initialization(config.fail_fast_initialization);

        if config.require_validity_hints {
            builder = builder.filter(RequireValidityHints);
        }

        builder.build()
    }

    /// Start the background scheduler.
    ///
    /// With fail-fast initialization the first refresh runs here and its
    /// error is returned; otherwise it runs in the background.
    pub async fn start(&self) -> Result<(), MetadataError> {
        {
            let mut lifecycle = self.inner.lock_lifecycle();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Running(_) => {
                    return Err(MetadataError::Configuration(
                        "metadata provider already started".to_string(),
                    ))
                }
                Lifecycle::Stopped => return Err(MetadataError::Stopped),
            }
        }

        if self.inner.fail_fast_initialization {
            if let Err(e) = self.inner.refresh(RefreshTrigger::Initial).await {
                let mut lifecycle = self.inner.lock_lifecycle();
                if matches!(*lifecycle, Lifecycle::Starting) {
                    *lifecycle = Lifecycle::Created;
                }
                return Err(e);
            }
        }

        let mut lifecycle = self.inner.lock_lifecycle();
        if !matches!(*lifecycle, Lifecycle::Starting) {
            return Err(MetadataError::Stopped);
        }

        let handle = tokio::spawn(run_scheduler(
            Arc::clone(&self.inner),
            self.inner.shutdown.subscribe(),
        ));
        *lifecycle = Lifecycle::Running(handle);

        info!(url = %self.source_identifier(), "Metadata provider started");
        Ok(())
    }

    /// Tear down: cancel the scheduler, drop the cached document and make
    /// every later call fail with [`MetadataError::Stopped`].
    ///
    /// A fetch already in flight is allowed to finish (or time out) and its
    /// result is discarded; this waits for it.
    pub async fn stop(&self) {
        let previous = {
            let mut lifecycle = self.inner.lock_lifecycle();
            if matches!(*lifecycle, Lifecycle::Stopped) {
                return;
            }
            self.inner.stopped.store(true, Ordering::Release);
            self.inner.cache.invalidate();
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        self.inner.shutdown.send_replace(true);
        if let Ok(mut token) = self.inner.refresh_slot.try_lock() {
            token.clear();
        }

        self.inner.update_status(|status| {
            status.state = ProviderState::Stopped;
            status.next_refresh = None;
        });

        if let Lifecycle::Running(handle) = previous {
            if let Err(e) = handle.await {
                warn!(error = %e, "Metadata refresh task ended abnormally");
            }
        }

        info!(url = %self.source_identifier(), "Metadata provider stopped");
    }

    /// The live document.
    ///
    /// Returns `Unavailable` before the first successful fetch, and after
    /// expiry when valid metadata is required. Background failures never
    /// surface here.
    pub fn get(&self) -> Result<Arc<CachedDocument<P::Document>>, MetadataError> {
        if self.inner.is_stopped() {
            return Err(MetadataError::Stopped);
        }

        let require_valid = self.inner.policy().require_valid_metadata;
        self.inner.cache.get(Utc::now(), require_valid)
    }

    /// Refresh now instead of waiting for the timer. Coalesces with a refresh
    /// that succeeds while this call waits for its turn; after a failed one it
    /// fetches itself.
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, MetadataError> {
        if self.inner.is_stopped() {
            return Err(MetadataError::Stopped);
        }

        let outcome = self.inner.refresh(RefreshTrigger::Manual).await;
        self.inner.reschedule.notify_one();
        outcome
    }

    /// Replace the refresh policy. Takes effect for the next scheduling decision.
    pub fn configure(&self, policy: RefreshPolicy) -> Result<(), MetadataError> {
        if self.inner.is_stopped() {
            return Err(MetadataError::Stopped);
        }
        policy.validate().map_err(MetadataError::Configuration)?;

        {
            let mut current = self
                .inner
                .policy
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *current = policy.clone();
        }

        if let Some(cached) = self.inner.cache.peek() {
            let now = Utc::now();
            self.inner.update_status(|status| {
                if status.state == ProviderState::Idle {
                    status.next_refresh =
                        Some(now + chrono_delay(refresh_delay(now, cached.expires_at(), &policy)));
                }
            });
        }
        self.inner.reschedule.notify_one();

        info!(
            min_refresh_delay_ms = policy.min_refresh_delay.as_millis() as u64,
            max_refresh_delay_ms = policy.max_refresh_delay.as_millis() as u64,
            refresh_delay_factor = policy.refresh_delay_factor,
            require_valid_metadata = policy.require_valid_metadata,
            "Metadata refresh policy reconfigured"
        );
        Ok(())
    }

    pub fn status(&self) -> ProviderStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.inner.policy()
    }

    pub fn source_identifier(&self) -> &str {
        self.inner.fetcher.source().identifier()
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.lock_lifecycle(), Lifecycle::Running(_))
    }
}

async fn run_scheduler<P: MetadataParser>(
    inner: Arc<Inner<P>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(url = %inner.fetcher.source().identifier(), "Metadata refresh scheduler running");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = inner.delay_until_next_refresh(Utc::now());

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = inner.reschedule.notified() => continue,
            _ = tokio::time::sleep(delay) => {
                // Failures are recorded in status and rescheduled by refresh()
                let _ = inner.refresh(RefreshTrigger::Scheduled).await;
            }
        }
    }

    debug!(url = %inner.fetcher.source().identifier(), "Metadata refresh scheduler exited");
}

impl<P: MetadataParser> Inner<P> {
    fn policy(&self) -> RefreshPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_status(&self, f: impl FnOnce(&mut ProviderStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }

    /// Status update from the refresh path; a no-op once stopped.
    fn update_refresh_status(&self, f: impl FnOnce(&mut ProviderStatus)) {
        self.update_status(|status| {
            if !self.is_stopped() {
                f(status);
            }
        });
    }

    fn delay_until_next_refresh(&self, now: DateTime<Utc>) -> Duration {
        let next = self
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .next_refresh;

        match next {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshOutcome, MetadataError> {
        let seen = self.successful_refreshes.load(Ordering::Acquire);
        let mut token = self.refresh_slot.lock().await;

        if self.is_stopped() {
            token.clear();
            return Err(MetadataError::Stopped);
        }

        if trigger == RefreshTrigger::Manual
            && self.successful_refreshes.load(Ordering::Acquire) != seen
        {
            debug!("Manual refresh coalesced with a refresh that just succeeded");
            return Ok(RefreshOutcome::Coalesced);
        }

        let policy = self.policy();
        let started = Utc::now();
        self.update_refresh_status(|status| {
            status.state = ProviderState::Fetching;
            status.last_attempt = Some(started);
        });

        debug!(url = %self.fetcher.source().identifier(), trigger = %trigger, "Refreshing metadata");

        let retrieved = self.retrieve(&token, &policy).await;

        let result = match retrieved {
            Ok(retrieved) => self.apply(retrieved, &mut token, &policy),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                self.successful_refreshes.fetch_add(1, Ordering::AcqRel);
                self.record_success(outcome, &policy);
                Ok(outcome)
            }
            Err(MetadataError::Stopped) => {
                token.clear();
                debug!("Metadata provider stopped during refresh, result discarded");
                Err(MetadataError::Stopped)
            }
            Err(e) => {
                self.record_failure(&e, &mut token, &policy);
                Err(e)
            }
        }
    }

    /// Fetch, decode, parse, filter and compute expiry without touching shared state.
    async fn retrieve(
        &self,
        token: &ConditionalToken,
        policy: &RefreshPolicy,
    ) -> Result<Retrieved<P::Document>, MetadataError> {
        let fetched = match self.fetcher.fetch(token).await? {
            FetchOutcome::NotModified => return Ok(Retrieved::NotModified),
            FetchOutcome::Fetched(fetched) => fetched,
        };

        let bytes = decode(&fetched.body, fetched.content_encoding.as_deref())?;
        let mut document = self.parser.parse(&bytes)?;

        for filter in &self.filters {
            filter.apply(&mut document).map_err(|e| {
                debug!(filter = %filter.name(), error = %e, "Metadata filter rejected document");
                e
            })?;
        }

        let fetched_at = Utc::now();
        ensure_not_expired(&document, fetched_at, policy)?;

        let expires_at = compute_expiry(&document, fetched_at, policy);

        Ok(Retrieved::New {
            document,
            fetched_at,
            expires_at,
            token: fetched.token,
        })
    }

    fn apply(
        &self,
        retrieved: Retrieved<P::Document>,
        token: &mut ConditionalToken,
        policy: &RefreshPolicy,
    ) -> Result<RefreshOutcome, MetadataError> {
        // Held while swapping so stop() cannot interleave with the swap.
        let lifecycle = self.lock_lifecycle();
        if self.is_stopped() {
            return Err(MetadataError::Stopped);
        }

        self.update_refresh_status(|status| status.state = ProviderState::Applying);

        match retrieved {
            Retrieved::NotModified => {
                let cached = self.cache.peek().ok_or_else(|| MetadataError::HttpStatus {
                    url: self.fetcher.source().identifier().to_string(),
                    status: 304,
                })?;

                // Unchanged at the source: renew the window from the same document
                let now = Utc::now();
                ensure_not_expired(cached.document(), now, policy)?;
                let expires_at = compute_expiry(cached.document(), now, policy);
                self.cache.swap(cached.renewed(now, expires_at));

                debug!(
                    url = %cached.source_identifier(),
                    expires_at = %expires_at,
                    "Cached metadata still current, expiry renewed"
                );
                Ok(RefreshOutcome::NotModified { expires_at })
            }
            Retrieved::New {
                document,
                fetched_at,
                expires_at,
                token: update,
            } => {
                let source = self.fetcher.source().identifier().to_string();
                self.cache
                    .swap(CachedDocument::new(document, fetched_at, expires_at, source));
                drop(lifecycle);

                token.apply(&update);

                info!(
                    url = %self.fetcher.source().identifier(),
                    expires_at = %expires_at,
                    etag = ?token.etag,
                    "Metadata cache refreshed"
                );
                Ok(RefreshOutcome::Updated { expires_at })
            }
        }
    }

    fn record_success(&self, outcome: RefreshOutcome, policy: &RefreshPolicy) {
        let now = Utc::now();
        let (expires_at, updated) = match outcome {
            RefreshOutcome::Updated { expires_at } => (expires_at, true),
            RefreshOutcome::NotModified { expires_at } => (expires_at, false),
            RefreshOutcome::Coalesced => return,
        };
        let next_refresh = now + chrono_delay(refresh_delay(now, expires_at, policy));

        self.update_refresh_status(|status| {
            status.state = ProviderState::Idle;
            status.last_success = Some(now);
            if updated {
                status.last_update = Some(now);
            }
            status.next_refresh = Some(next_refresh);
            status.consecutive_failures = 0;
            status.last_error = None;
            status.last_error_kind = None;
        });

        debug!(next_refresh = %next_refresh, "Next metadata refresh scheduled");
    }

    fn record_failure(
        &self,
        error: &MetadataError,
        token: &mut ConditionalToken,
        policy: &RefreshPolicy,
    ) {
        let now = Utc::now();
        let backoff = policy.backoff();
        let next_refresh = now + chrono_delay(backoff);

        if policy.require_valid_metadata {
            if let Some(cached) = self.cache.peek() {
                if cached.is_expired(now) {
                    warn!(
                        url = %cached.source_identifier(),
                        expired_at = %cached.expires_at(),
                        "Cached metadata expired and could not be refreshed, discarding it"
                    );
                    self.cache.invalidate();
                    token.clear();
                }
            }
        }

        // Nothing cached means the validators point at nothing; refetch in full.
        if self.cache.peek().is_none() {
            token.clear();
        }

        let mut failures = 0;
        self.update_refresh_status(|status| {
            status.state = ProviderState::Backoff;
            status.next_refresh = Some(next_refresh);
            status.consecutive_failures += 1;
            status.last_error = Some(error.to_string());
            status.last_error_kind = Some(error.kind());
            failures = status.consecutive_failures;
        });

        warn!(
            url = %self.fetcher.source().identifier(),
            error = %error,
            kind = %error.kind(),
            consecutive_failures = failures,
            retry_in_ms = backoff.as_millis() as u64,
            "Metadata refresh failed, keeping cached metadata"
        );
    }
}

/// With `require_valid_metadata`, reject a document whose `validUntil` has passed.
fn ensure_not_expired<D: MetadataDocument>(
    document: &D,
    now: DateTime<Utc>,
    policy: &RefreshPolicy,
) -> Result<(), MetadataError> {
    if !policy.require_valid_metadata {
        return Ok(());
    }

    match earliest_valid_until(document) {
        Some(valid_until) if valid_until < now => Err(MetadataError::Invalid(format!(
            "metadata expired at {}",
            valid_until
        ))),
        _ => Ok(()),
    }
}

fn chrono_delay(delay: Duration) -> chrono::TimeDelta {
    chrono::TimeDelta::from_std(delay).unwrap_or(chrono::TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::document::ValidityHint;

    struct Plain;

    impl MetadataDocument for String {
        fn root_validity_hint(&self) -> ValidityHint {
            ValidityHint::default()
        }

        fn validity_hints(&self) -> Vec<ValidityHint> {
            Vec::new()
        }
    }

    impl MetadataParser for Plain {
        type Document = String;

        fn parse(&self, bytes: &[u8]) -> Result<String, MetadataError> {
            String::from_utf8(bytes.to_vec()).map_err(|e| MetadataError::Invalid(e.to_string()))
        }
    }

    fn source() -> RemoteSource {
        RemoteSource::new("http://127.0.0.1:9/federation.xml").unwrap()
    }

    #[test]
    fn test_build_rejects_bad_policy() {
        let policy = RefreshPolicy {
            refresh_delay_factor: 1.5,
            ..Default::default()
        };
        let result = ReloadingMetadataProvider::builder(source(), Plain)
            .policy(policy)
            .build();
        assert!(matches!(result, Err(MetadataError::Configuration(_))));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = MetadataProviderConfig {
            metadata_url: "https://".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ReloadingMetadataProvider::from_config(&config, Plain),
            Err(MetadataError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_get_before_start_is_unavailable() {
        let provider = ReloadingMetadataProvider::builder(source(), Plain)
            .build()
            .unwrap();
        assert!(matches!(provider.get(), Err(MetadataError::Unavailable)));
        assert_eq!(provider.status().state, ProviderState::Idle);
        assert!(!provider.is_running());
    }

    #[tokio::test]
    async fn test_stopped_provider_fails_fast() {
        let provider = ReloadingMetadataProvider::builder(source(), Plain)
            .build()
            .unwrap();
        provider.stop().await;

        assert!(matches!(provider.get(), Err(MetadataError::Stopped)));
        assert!(matches!(provider.start().await, Err(MetadataError::Stopped)));
        assert!(matches!(
            provider.refresh_now().await,
            Err(MetadataError::Stopped)
        ));
        assert!(matches!(
            provider.configure(RefreshPolicy::default()),
            Err(MetadataError::Stopped)
        ));
        assert_eq!(provider.status().state, ProviderState::Stopped);

        // Idempotent
        provider.stop().await;
    }

    #[tokio::test]
    async fn test_late_refresh_result_keeps_stopped_state() {
        let provider = ReloadingMetadataProvider::builder(source(), Plain)
            .build()
            .unwrap();
        provider.stop().await;

        // A refresh that finished after stop() must not resurrect the state
        let policy = provider.policy();
        provider.inner.record_success(
            RefreshOutcome::Updated {
                expires_at: Utc::now(),
            },
            &policy,
        );
        assert_eq!(provider.status().state, ProviderState::Stopped);
        assert!(provider.status().next_refresh.is_none());

        let mut token = ConditionalToken::default();
        provider
            .inner
            .record_failure(&MetadataError::Unavailable, &mut token, &policy);
        let status = provider.status();
        assert_eq!(status.state, ProviderState::Stopped);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_configure_validates_policy() {
        let provider = ReloadingMetadataProvider::builder(source(), Plain)
            .build()
            .unwrap();

        let bad = RefreshPolicy {
            min_refresh_delay: Duration::from_secs(10),
            max_refresh_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(matches!(
            provider.configure(bad),
            Err(MetadataError::Configuration(_))
        ));

        let good = RefreshPolicy {
            require_valid_metadata: true,
            ..Default::default()
        };
        provider.configure(good).unwrap();
        assert!(provider.policy().require_valid_metadata);
    }
}
