//! Key-value primitives backing leases.

use async_trait::async_trait;
use imgagent_error::LeaseError;
use std::time::Duration;

/// Atomic conditional writes with store-enforced expiry.
///
/// The store, not the caller, is responsible for expiring keys once their
/// time-to-live elapses.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Set `key` to `value` with `ttl` only if no live value exists.
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, LeaseError>;

    /// Reset the time-to-live of `key` only if it currently holds `value`.
    ///
    /// Returns `true` when the ttl was extended.
    async fn compare_and_extend(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError>;

    /// Delete `key` only if it currently holds `value`.
    ///
    /// Returns `true` when a value was deleted.
    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LeaseError>;
}
