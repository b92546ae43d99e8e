use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use quanta::Clock;
use quanta::Instant;

use crate::bucket::Bucket;
use crate::memory::MemoryStore;
use crate::rate::RateSpec;
use crate::store::Store;
use crate::store::StoreError;

/// Errors raised while constructing a [`Limiter`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Burst must be a positive, finite number.
    #[error("burst must be a positive number, got {0}")]
    InvalidBurst(f64),
}

/// The outcome of one admission decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The bucket exactly as persisted by this decision; callers report
    /// remaining tokens and reset time from it.
    pub bucket: Bucket,
}

/// The per-key decision engine.
///
/// One `Limiter` owns one store instance for its lifetime. Every
/// decision round-trips through the store: load (or synthesize a full
/// bucket), refill to now, compare against the request cost, persist,
/// return the verdict. The engine never retries a failed store call and
/// never converts a [`StoreError`] into an allow or a throttle; callers
/// pick that policy.
#[derive(Debug, Clone)]
pub struct Limiter {
    rate: RateSpec,
    burst: f64,
    store: Arc<dyn Store>,
    store_timeout: Option<Duration>,
    clock: Clock,
    anchor: Instant,
    epoch_ms: u64,
}

impl Limiter {
    /// Create a limiter admitting `burst` tokens at `rate`, backed by a
    /// fresh bounded [`MemoryStore`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `burst` is not a positive finite number.
    pub fn new(rate: RateSpec, burst: f64) -> Result<Self, ConfigError> {
        Self::with_clock(rate, burst, Clock::new())
    }

    /// Create a limiter driven by the supplied clock. Tests pair this
    /// with `quanta::Clock::mock` to step time deterministically.
    pub fn with_clock(rate: RateSpec, burst: f64, clock: Clock) -> Result<Self, ConfigError> {
        if !burst.is_finite() || burst <= 0.0 {
            return Err(ConfigError::InvalidBurst(burst));
        }
        let anchor = clock.now();
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Ok(Self {
            rate,
            burst,
            store: Arc::new(MemoryStore::new()),
            store_timeout: None,
            clock,
            anchor,
            epoch_ms,
        })
    }

    /// Replace the backing store.
    ///
    /// Do not share one [`MemoryStore`] across unrelated limiters:
    /// their keys would collide.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = store;
        self
    }

    /// Bound each store call to `timeout`; expiry surfaces as
    /// [`StoreError::Timeout`].
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// The configured burst capacity.
    pub fn burst(&self) -> f64 {
        self.burst
    }

    /// The configured rate.
    pub fn rate(&self) -> &RateSpec {
        &self.rate
    }

    fn now_ms(&self) -> u64 {
        self.epoch_ms + self.clock.now().duration_since(self.anchor).as_millis() as u64
    }

    async fn load(&self, key: &str) -> Result<Option<Bucket>, StoreError> {
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.load(key))
                .await
                .map_err(|_| StoreError::Timeout)?,
            None => self.store.load(key).await,
        }
    }

    async fn save(&self, key: &str, bucket: Bucket) -> Result<(), StoreError> {
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, self.store.save(key, bucket))
                .await
                .map_err(|_| StoreError::Timeout)?,
            None => self.store.save(key, bucket).await,
        }
    }

    /// Decide whether `key` may spend `cost` tokens right now.
    ///
    /// A throttled request does not drive the balance negative; the
    /// refreshed bucket is persisted either way, so refill earned since
    /// the last decision is never lost. A zero cost is always admitted.
    /// A cost above `burst` is accepted and simply never admitted until
    /// the limiter is reconfigured.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the store verbatim; whether that
    /// means fail-open or fail-closed is the caller's policy.
    pub async fn decide(&self, key: &str, cost: f64) -> Result<Verdict, StoreError> {
        let now = self.now_ms();
        let bucket = self
            .load(key)
            .await?
            .unwrap_or_else(|| Bucket::full(self.burst, now));

        let mut bucket = bucket.refill(&self.rate, self.burst, now);
        let allowed = bucket.tokens >= cost;
        if allowed {
            bucket.tokens -= cost;
        }

        self.save(key, bucket.clone()).await?;
        Ok(Verdict { allowed, bucket })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use more_asserts::assert_ge;
    use more_asserts::assert_lt;

    use super::*;

    fn mocked(spec: &str, burst: f64) -> (Limiter, Arc<quanta::Mock>) {
        let (clock, mock) = Clock::mock();
        let limiter = Limiter::with_clock(spec.parse().unwrap(), burst, clock).unwrap();
        (limiter, mock)
    }

    #[test]
    fn it_rejects_a_non_positive_burst() {
        let rate: RateSpec = "5/s".parse().unwrap();
        assert_eq!(
            Limiter::new(rate, 0.0).unwrap_err(),
            ConfigError::InvalidBurst(0.0)
        );
        assert_eq!(
            Limiter::new(rate, -1.0).unwrap_err(),
            ConfigError::InvalidBurst(-1.0)
        );
        assert!(Limiter::new(rate, f64::NAN).is_err());
    }

    #[tokio::test]
    async fn it_admits_a_full_burst_then_throttles() {
        let (limiter, _mock) = mocked("5/s", 10.0);

        for _ in 0..10 {
            let verdict = limiter.decide("client", 1.0).await.unwrap();
            assert!(verdict.allowed);
        }

        let verdict = limiter.decide("client", 1.0).await.unwrap();
        assert!(!verdict.allowed);
        assert_lt!(verdict.bucket.tokens, 1.0);
    }

    #[tokio::test]
    async fn sliding_refill_readmits_continuously() {
        let (limiter, mock) = mocked("1/s", 1.0);

        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);

        // Half a second in: roughly half a token, still throttled.
        mock.increment(Duration::from_millis(500));
        let verdict = limiter.decide("client", 1.0).await.unwrap();
        assert!(!verdict.allowed);
        assert_ge!(verdict.bucket.tokens, 0.49);

        mock.increment(Duration::from_millis(500));
        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn decimal_rates_refill_proportionally() {
        let (limiter, mock) = mocked("2.5/s", 1.0);

        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);

        mock.increment(Duration::from_millis(400));
        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn fixed_mode_only_resets_at_the_boundary() {
        let (limiter, mock) = mocked("1/s:fixed", 1.0);

        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);

        mock.increment(Duration::from_millis(900));
        assert!(!limiter.decide("client", 1.0).await.unwrap().allowed);

        mock.increment(Duration::from_millis(100));
        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn zero_cost_is_always_admitted_and_free() {
        let (limiter, _mock) = mocked("1/s", 1.0);

        assert!(limiter.decide("client", 1.0).await.unwrap().allowed);

        // The bucket is empty, yet zero-cost requests pass untouched.
        for _ in 0..3 {
            let verdict = limiter.decide("client", 0.0).await.unwrap();
            assert!(verdict.allowed);
            assert_lt!(verdict.bucket.tokens, 1e-9);
        }
    }

    #[tokio::test]
    async fn a_burst_sized_cost_drains_the_bucket_in_one_admission() {
        let (limiter, _mock) = mocked("5/s", 10.0);

        let verdict = limiter.decide("client", 10.0).await.unwrap();
        assert!(verdict.allowed);
        assert_lt!(verdict.bucket.tokens, 1e-9);

        assert!(!limiter.decide("client", 1.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn a_cost_above_burst_is_never_admitted() {
        let (limiter, mock) = mocked("5/s", 10.0);

        assert!(!limiter.decide("client", 11.0).await.unwrap().allowed);
        mock.increment(Duration::from_secs(3600));
        assert!(!limiter.decide("client", 11.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn keys_are_accounted_independently() {
        let (limiter, _mock) = mocked("1/s", 1.0);

        assert!(limiter.decide("alpha", 1.0).await.unwrap().allowed);
        assert!(limiter.decide("beta", 1.0).await.unwrap().allowed);
        assert!(!limiter.decide("alpha", 1.0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn an_evicted_key_starts_over_with_a_full_bucket() {
        let (clock, _mock) = Clock::mock();
        let store = Arc::new(MemoryStore::with_capacity(2));
        let limiter = Limiter::with_clock("1/s".parse().unwrap(), 1.0, clock)
            .unwrap()
            .with_store(store);

        // Drain "a", then push it out with two newer keys.
        assert!(limiter.decide("a", 1.0).await.unwrap().allowed);
        assert!(limiter.decide("b", 1.0).await.unwrap().allowed);
        assert!(limiter.decide("c", 1.0).await.unwrap().allowed);

        // "a" was forgotten: it behaves like a never-seen key.
        assert!(limiter.decide("a", 1.0).await.unwrap().allowed);
    }

    #[derive(Debug)]
    struct FailingStore;

    #[async_trait::async_trait]
    impl Store for FailingStore {
        async fn load(&self, _key: &str) -> Result<Option<Bucket>, StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }

        async fn save(&self, _key: &str, _bucket: Bucket) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failures_surface_instead_of_defaulting() {
        let (clock, _mock) = Clock::mock();
        let limiter = Limiter::with_clock("1/s".parse().unwrap(), 1.0, clock)
            .unwrap()
            .with_store(Arc::new(FailingStore));

        let err = limiter.decide("client", 1.0).await.unwrap_err();
        assert_eq!(err, StoreError::Backend("connection refused".to_string()));
    }

    /// A store whose operations park on the timer, standing in for a
    /// networked backend.
    #[derive(Debug)]
    struct SuspendingStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Store for SuspendingStore {
        async fn load(&self, key: &str) -> Result<Option<Bucket>, StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.load(key).await
        }

        async fn save(&self, key: &str, bucket: Bucket) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(key, bucket).await
        }
    }

    #[tokio::test]
    async fn slow_store_calls_time_out_as_store_errors() {
        tokio::time::pause();

        let (clock, _mock) = Clock::mock();
        let store = Arc::new(SuspendingStore {
            inner: MemoryStore::new(),
            delay: Duration::from_secs(5),
        });
        let limiter = Limiter::with_clock("1/s".parse().unwrap(), 1.0, clock)
            .unwrap()
            .with_store(store)
            .with_store_timeout(Duration::from_millis(100));

        let err = limiter.decide("client", 1.0).await.unwrap_err();
        assert_eq!(err, StoreError::Timeout);
    }

    /// Documents the read-modify-write hazard of suspending stores:
    /// two concurrent cycles for one key each load the same full
    /// bucket and each admit a burst-sized request, overcommitting to
    /// twice the burst. This is inherent to the `Store` contract, which
    /// offers no compare-and-swap; the test demonstrates the race
    /// rather than pretending it cannot happen.
    #[tokio::test]
    async fn concurrent_cycles_overcommit_on_suspending_store() {
        tokio::time::pause();

        let (clock, _mock) = Clock::mock();
        let store = Arc::new(SuspendingStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(10),
        });
        let limiter = Limiter::with_clock("1/s".parse().unwrap(), 5.0, clock)
            .unwrap()
            .with_store(store);

        // Both cycles suspend in `load` before either reaches `save`.
        let (first, second) = futures::join!(
            limiter.decide("client", 5.0),
            limiter.decide("client", 5.0)
        );

        assert!(first.unwrap().allowed);
        assert!(second.unwrap().allowed);

        // The second save overwrote the first: the store accounts for
        // one spend even though two were admitted.
        let persisted = limiter.store.load("client").await.unwrap().unwrap();
        assert_lt!(persisted.tokens, 1e-9);
    }

    #[tokio::test]
    async fn throttled_decisions_still_persist_refill_progress() {
        let (limiter, mock) = mocked("1/s", 2.0);

        assert!(limiter.decide("client", 2.0).await.unwrap().allowed);

        // 300ms of trickle is recorded even though the request fails.
        mock.increment(Duration::from_millis(300));
        let verdict = limiter.decide("client", 2.0).await.unwrap();
        assert!(!verdict.allowed);
        assert_ge!(verdict.bucket.tokens, 0.29);

        let persisted = limiter.store.load("client").await.unwrap().unwrap();
        assert_eq!(persisted, verdict.bucket);
    }
}
