use std::fmt::Debug;

use async_trait::async_trait;

use crate::bucket::Bucket;

/// Errors reported by storage backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend failed to serve the operation.
    #[error("store backend failed: {0}")]
    Backend(String),

    /// The operation did not complete within the configured deadline.
    #[error("store operation timed out")]
    Timeout,
}

/// Durable owner of bucket state between decisions.
///
/// A `save` that returns `Ok` must make the bucket retrievable by a
/// subsequent `load` of the same key; implementations must never
/// silently drop a save. No atomicity is promised across the
/// `load` + `save` pair performed by one decision: backends whose
/// operations suspend reintroduce a read-modify-write race between
/// concurrent decisions for the same key. See the crate docs for the
/// consequences.
///
/// Retries, if desired, belong to the implementation; the decision
/// engine performs none.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    /// Fetch the bucket for `key`, if one is known.
    async fn load(&self, key: &str) -> Result<Option<Bucket>, StoreError>;

    /// Persist `bucket` under `key`.
    async fn save(&self, key: &str, bucket: Bucket) -> Result<(), StoreError>;
}
