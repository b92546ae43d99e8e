//! # drip-limit
//!
//! `drip-limit` provides per-key token bucket admission control with
//! pluggable storage.
//!
//! ## Core Philosophy
//!
//! Most per-key limiters fuse the algorithm to one storage backend.
//! `drip-limit` keeps the bucket math pure and routes every decision
//! through a narrow [`Store`] interface, so the same engine runs
//! against the bundled bounded in-memory table or any backend you
//! bring.
//!
//! ## Key Concepts
//!
//! * **Lazy Refill**: token balances are recalculated at the moment of
//!   the request; there are no background timers or sweeper threads.
//! * **Per-Key Buckets**: each client key owns an independent bucket,
//!   created full on first sight and bounded by LRU eviction in the
//!   default store.
//! * **Pluggable Storage**: [`Store`] is the single source of truth;
//!   no component holds bucket state across decisions.
//!
//! ## Example
//!
//! ```rust
//! use drip_limit::Limiter;
//! use drip_limit::RateSpec;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let rate: RateSpec = "5/s".parse().unwrap();
//! let limiter = Limiter::new(rate, 10.0).unwrap();
//!
//! let verdict = limiter.decide("client-1", 1.0).await.unwrap();
//! assert!(verdict.allowed);
//! # }
//! ```
//!
//! ## Consistency
//!
//! Within one process, a decision's `load → refill → save` cycle is not
//! interleaved with another cycle for the same key as long as the store
//! does not suspend mid-cycle; the bundled [`MemoryStore`] never does.
//! A store that reaches over the network suspends on every call, and
//! two concurrent cycles for the same key can then both load the same
//! stale bucket and both admit — the later save overwrites the earlier
//! one's accounting. The [`Store`] contract deliberately offers no
//! compare-and-swap, so multi-process deployments inherit this hazard
//! and must size their limits accordingly.

mod bucket;
mod limiter;
mod memory;
mod rate;
mod store;

pub use bucket::Bucket;
pub use limiter::ConfigError;
pub use limiter::Limiter;
pub use limiter::Verdict;
pub use memory::DEFAULT_CAPACITY;
pub use memory::MemoryStore;
pub use rate::Mode;
pub use rate::RateError;
pub use rate::RateSpec;
pub use store::Store;
pub use store::StoreError;
