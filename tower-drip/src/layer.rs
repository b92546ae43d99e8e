use std::sync::Arc;

use tower::Layer;

use drip_limit::Bucket;
use drip_limit::Limiter;

use crate::cost::Cost;
use crate::service::AllowHook;
use crate::service::DripService;
use crate::service::ThrottleHook;

/// Applies per-key admission control to requests.
///
/// The layer owns the full limiter configuration: the parsed rate and
/// burst live in the [`Limiter`], which also owns the store for its
/// lifetime. Key extraction, request cost, the fail policy for store
/// outages and the allowed/throttled hooks are set here.
///
/// ```rust
/// use drip_limit::Limiter;
/// use tower_drip::DripLayer;
///
/// let limiter = Limiter::new("5/s".parse().unwrap(), 10.0).unwrap();
/// let layer = DripLayer::new(limiter, |name: &String| Some(name.clone()))
///     .with_cost(2.0);
/// # let _: DripLayer<_, String, String> = layer;
/// ```
pub struct DripLayer<K, Req, Resp> {
    limiter: Arc<Limiter>,
    key: Arc<K>,
    cost: Cost<Req>,
    fail_open: bool,
    on_allowed: Option<AllowHook<Resp>>,
    on_throttled: Option<ThrottleHook<Resp>>,
}

impl<K, Req, Resp> Clone for DripLayer<K, Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            key: Arc::clone(&self.key),
            cost: self.cost.clone(),
            fail_open: self.fail_open,
            on_allowed: self.on_allowed.clone(),
            on_throttled: self.on_throttled.clone(),
        }
    }
}

impl<K, Req, Resp> DripLayer<K, Req, Resp> {
    /// Create a layer deciding with `limiter` and keying with `key`.
    pub fn new(limiter: Limiter, key: K) -> Self {
        Self {
            limiter: Arc::new(limiter),
            key: Arc::new(key),
            cost: Cost::default(),
            fail_open: false,
            on_allowed: None,
            on_throttled: None,
        }
    }

    /// Set the per-request cost: a plain number, or
    /// [`Cost::dynamic`](crate::Cost::dynamic) to derive it from each
    /// request. Defaults to 1.
    pub fn with_cost(mut self, cost: impl Into<Cost<Req>>) -> Self {
        self.cost = cost.into();
        self
    }

    /// Admit requests when the store fails instead of rejecting them.
    ///
    /// Defaults to fail-closed (reject with
    /// [`DripError::Store`](crate::DripError::Store)): a backend outage
    /// must not silently disable protection.
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Run after the inner service responds to an admitted request,
    /// e.g. to stamp rate limit headers from the bucket snapshot.
    pub fn with_on_allowed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Resp, &Bucket) + Send + Sync + 'static,
    {
        self.on_allowed = Some(Arc::new(hook));
        self
    }

    /// Respond to throttled requests with a response built from the
    /// bucket snapshot, instead of the default
    /// [`DripError::Throttled`](crate::DripError::Throttled) error.
    pub fn with_on_throttled<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Bucket) -> Resp + Send + Sync + 'static,
    {
        self.on_throttled = Some(Arc::new(hook));
        self
    }
}

#[cfg(feature = "axum")]
impl<Req, Resp> DripLayer<crate::key::PeerAddrKey, Req, Resp> {
    /// Create a layer keyed by client network address, the default for
    /// http servers. Equivalent to `DripLayer::new(limiter, PeerAddrKey)`.
    pub fn by_peer_addr(limiter: Limiter) -> Self {
        Self::new(limiter, crate::key::PeerAddrKey)
    }
}

impl<K, S, Req, Resp> Layer<S> for DripLayer<K, Req, Resp> {
    type Service = DripService<K, S, Req, Resp>;

    fn layer(&self, service: S) -> Self::Service {
        DripService::new(service, Arc::clone(&self.limiter), Arc::clone(&self.key))
            .with_cost(self.cost.clone())
            .with_fail_open(self.fail_open)
            .with_hooks(self.on_allowed.clone(), self.on_throttled.clone())
    }
}
