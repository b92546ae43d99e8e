use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::task::ready;
use std::time::Duration;

use futures::future::BoxFuture;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tower::BoxError;
use tower::Service;

use drip_limit::Bucket;
use drip_limit::Limiter;
use drip_limit::StoreError;
use drip_limit::Verdict;

use crate::cost::Cost;
use crate::error::DripError;
use crate::key::KeyExtractor;

pub(crate) type AllowHook<Resp> = Arc<dyn Fn(&mut Resp, &Bucket) + Send + Sync>;
pub(crate) type ThrottleHook<Resp> = Arc<dyn Fn(&Bucket) -> Resp + Send + Sync>;

#[derive(Clone, Debug)]
struct DripServiceMetrics {
    throttled: Counter<u64>,
    store_failure: Counter<u64>,
}

/// A tower service applying per-key admission control in front of `S`.
///
/// Each request is keyed, costed, and decided before the inner service
/// sees it. Admitted requests flow through (optionally post-processed
/// by the `on_allowed` hook); throttled requests terminate with either
/// the `on_throttled` hook's response or a [`DripError::Throttled`]
/// carrying the bucket snapshot.
pub struct DripService<K, S, Req, Resp> {
    inner: S,
    limiter: Arc<Limiter>,
    key: Arc<K>,
    cost: Cost<Req>,
    fail_open: bool,
    on_allowed: Option<AllowHook<Resp>>,
    on_throttled: Option<ThrottleHook<Resp>>,
    instruments: DripServiceMetrics,
}

impl<K, S, Req, Resp> DripService<K, S, Req, Resp> {
    pub fn new(inner: S, limiter: Arc<Limiter>, key: Arc<K>) -> Self {
        let meter = global::meter("drip_limit_service");
        let instruments = DripServiceMetrics {
            throttled: meter.u64_counter("drip_limit_throttled").build(),
            store_failure: meter.u64_counter("drip_limit_store_failure").build(),
        };

        Self {
            inner,
            limiter,
            key,
            cost: Cost::default(),
            fail_open: false,
            on_allowed: None,
            on_throttled: None,
            instruments,
        }
    }

    /// Set the per-request cost. Defaults to 1.
    pub fn with_cost(mut self, cost: impl Into<Cost<Req>>) -> Self {
        self.cost = cost.into();
        self
    }

    /// Admit requests when the store fails instead of rejecting them.
    ///
    /// Defaults to fail-closed: store failures surface as
    /// [`DripError::Store`].
    pub fn with_fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    pub(crate) fn with_hooks(
        mut self,
        on_allowed: Option<AllowHook<Resp>>,
        on_throttled: Option<ThrottleHook<Resp>>,
    ) -> Self {
        self.on_allowed = on_allowed;
        self.on_throttled = on_throttled;
        self
    }
}

impl<K, S, Req, Resp> Clone for DripService<K, S, Req, Resp>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            key: Arc::clone(&self.key),
            cost: self.cost.clone(),
            fail_open: self.fail_open,
            on_allowed: self.on_allowed.clone(),
            on_throttled: self.on_throttled.clone(),
            instruments: self.instruments.clone(),
        }
    }
}

struct CallCtx<S, Req, Resp> {
    svc: S,
    req: Req,
    fail_open: bool,
    on_allowed: Option<AllowHook<Resp>>,
    on_throttled: Option<ThrottleHook<Resp>>,
    instruments: DripServiceMetrics,
}

pin_project! {
    #[project = FutureStateProj]
    enum FutureState<S, Req, Resp>
    where
        S: Service<Req>,
    {
        Deciding {
            #[pin]
            decide: BoxFuture<'static, Result<Verdict, StoreError>>,
            ctx: Option<CallCtx<S, Req, Resp>>,
        },
        Forwarding {
            #[pin]
            inner: S::Future,
            bucket: Option<Bucket>,
            on_allowed: Option<AllowHook<Resp>>,
        },
        Settled {
            outcome: Option<Result<Resp, BoxError>>,
        },
    }
}

pin_project! {
    /// The future returned by [`DripService`]: decide, then forward or
    /// terminate.
    pub struct ResponseFuture<S, Req, Resp>
    where
        S: Service<Req>,
    {
        #[pin]
        state: FutureState<S, Req, Resp>,
    }
}

impl<S, Req, Resp> ResponseFuture<S, Req, Resp>
where
    S: Service<Req>,
{
    fn settled(outcome: Result<Resp, BoxError>) -> Self {
        Self {
            state: FutureState::Settled {
                outcome: Some(outcome),
            },
        }
    }

    fn deciding(
        decide: BoxFuture<'static, Result<Verdict, StoreError>>,
        ctx: CallCtx<S, Req, Resp>,
    ) -> Self {
        Self {
            state: FutureState::Deciding {
                decide,
                ctx: Some(ctx),
            },
        }
    }
}

impl<S, Req, Resp> Future for ResponseFuture<S, Req, Resp>
where
    S: Service<Req, Response = Resp, Error = BoxError>,
{
    type Output = Result<Resp, BoxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            let mut this = self.as_mut().project();
            let next = match this.state.as_mut().project() {
                FutureStateProj::Deciding { decide, ctx } => {
                    let verdict = ready!(decide.poll(cx));
                    let CallCtx {
                        mut svc,
                        req,
                        fail_open,
                        on_allowed,
                        on_throttled,
                        instruments,
                    } = ctx.take().expect("future polled after completion");

                    match verdict {
                        Ok(verdict) if verdict.allowed => FutureState::Forwarding {
                            inner: svc.call(req),
                            bucket: Some(verdict.bucket),
                            on_allowed,
                        },
                        Ok(verdict) => {
                            instruments.throttled.add(1, &[]);
                            return match on_throttled {
                                Some(hook) => Poll::Ready(Ok(hook(&verdict.bucket))),
                                None => {
                                    let retry_after = Duration::from_millis(
                                        verdict.bucket.rtime.saturating_sub(verdict.bucket.mtime),
                                    );
                                    Poll::Ready(Err(DripError::Throttled {
                                        bucket: verdict.bucket,
                                        retry_after,
                                    }
                                    .into()))
                                }
                            };
                        }
                        Err(err) => {
                            instruments.store_failure.add(1, &[]);
                            if fail_open {
                                // No bucket snapshot exists, so the
                                // on_allowed hook is skipped.
                                FutureState::Forwarding {
                                    inner: svc.call(req),
                                    bucket: None,
                                    on_allowed,
                                }
                            } else {
                                return Poll::Ready(Err(DripError::Store(err).into()));
                            }
                        }
                    }
                }
                FutureStateProj::Forwarding {
                    inner,
                    bucket,
                    on_allowed,
                } => {
                    let outcome = match ready!(inner.poll(cx)) {
                        Ok(mut resp) => {
                            if let Some(hook) = on_allowed.as_ref()
                                && let Some(bucket) = bucket.as_ref()
                            {
                                hook(&mut resp, bucket);
                            }
                            Ok(resp)
                        }
                        Err(err) => Err(err),
                    };
                    return Poll::Ready(outcome);
                }
                FutureStateProj::Settled { outcome } => {
                    return Poll::Ready(outcome.take().expect("future polled after completion"));
                }
            };
            this.state.set(next);
        }
    }
}

impl<K, S, Req, Resp> Service<Req> for DripService<K, S, Req, Resp>
where
    K: KeyExtractor<Req>,
    S: Service<Req, Response = Resp, Error = BoxError> + Clone,
    Req: Send + 'static,
{
    type Response = Resp;
    type Error = BoxError;
    type Future = ResponseFuture<S, Req, Resp>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let Some(key) = self.key.extract(&req) else {
            return ResponseFuture::settled(Err(DripError::Key.into()));
        };
        let cost = self.cost.resolve(&req);

        let limiter = Arc::clone(&self.limiter);
        let decide: BoxFuture<'static, Result<Verdict, StoreError>> =
            Box::pin(async move { limiter.decide(&key, cost).await });

        // Take the ready inner service, leaving a fresh clone behind.
        let clone = self.inner.clone();
        let svc = mem::replace(&mut self.inner, clone);

        ResponseFuture::deciding(
            decide,
            CallCtx {
                svc,
                req,
                fail_open: self.fail_open,
                on_allowed: self.on_allowed.clone(),
                on_throttled: self.on_throttled.clone(),
                instruments: self.instruments.clone(),
            },
        )
    }
}
