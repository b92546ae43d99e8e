//! # Tower Drip
//!
//! `tower-drip` binds the [`drip-limit`](drip_limit) per-key admission
//! core into the [Tower](https://github.com/tower-rs/tower) ecosystem.
//!
//! ## The Request Path
//!
//! [`DripLayer`] wraps a service so that every request is:
//!
//! 1. **Keyed**: a [`KeyExtractor`] derives the client identity
//!    (closure, or `PeerAddrKey` for http servers).
//! 2. **Costed**: a [`Cost`] resolves how many tokens the request
//!    spends, constant or per-request.
//! 3. **Decided**: the [`drip_limit::Limiter`] loads the key's bucket,
//!    refills it, and admits or throttles.
//! 4. **Routed**: admitted requests reach the inner service (with an
//!    optional `on_allowed` hook over the response); throttled requests
//!    terminate with the `on_throttled` hook or a
//!    [`DripError::Throttled`] carrying the bucket snapshot.
//!
//! Store outages follow the configured fail policy: fail-closed by
//! default, so a broken backend rejects rather than silently admitting.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`DripError`], mapping
//!   throttles to `429 Too Many Requests` with `Retry-After` and
//!   `x-ratelimit-*` headers, plus the `PeerAddrKey` extractor.

mod cost;
mod error;
mod key;
mod layer;
mod service;


pub use cost::Cost;
pub use error::DripError;
pub use key::KeyExtractor;
#[cfg(feature = "axum")]
pub use key::PeerAddrKey;
pub use layer::DripLayer;
pub use service::DripService;
pub use service::ResponseFuture;
