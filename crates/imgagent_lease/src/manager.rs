//! Acquire, renew, and release leases over a [`LeaseStore`].

use imgagent_error::LeaseError;
use imgagent_interface::LeaseStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// Opaque proof of lease ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub struct FencingToken(String);

impl FencingToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Token value as stored in the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of [`LeaseManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAcquisition {
    /// The caller now owns the key
    Acquired(FencingToken),
    /// Another owner holds a live lease
    Busy,
}

impl LeaseAcquisition {
    /// Whether someone else owns the key.
    pub fn is_busy(&self) -> bool {
        matches!(self, LeaseAcquisition::Busy)
    }
}

/// Outcome of [`LeaseManager::renew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseRenewal {
    /// The lease was extended
    Renewed,
    /// The token no longer owns the key
    Lost,
}

/// Leases keyed by name, backed by any [`LeaseStore`].
#[derive(Clone)]
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    prefix: String,
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl LeaseManager {
    /// Create a manager with the default `imgagent:lease` key prefix.
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self {
            store,
            prefix: "imgagent:lease".to_string(),
        }
    }

    /// Use a different key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Claim `key` for `ttl` if nobody holds a live lease on it.
    #[instrument(skip(self), fields(ttl_ms = ttl.as_millis() as u64))]
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<LeaseAcquisition, LeaseError> {
        let token = FencingToken::generate();
        let acquired = self
            .store
            .set_if_absent(&self.full_key(key), token.as_str(), ttl)
            .await?;

        if acquired {
            debug!(token = %token, "Lease acquired");
            Ok(LeaseAcquisition::Acquired(token))
        } else {
            trace!("Lease busy");
            Ok(LeaseAcquisition::Busy)
        }
    }

    /// Extend the lease on `key` to `ttl` from now if `token` still owns it.
    #[instrument(skip(self, token), fields(token = %token))]
    pub async fn renew(
        &self,
        key: &str,
        token: &FencingToken,
        ttl: Duration,
    ) -> Result<LeaseRenewal, LeaseError> {
        let extended = self
            .store
            .compare_and_extend(&self.full_key(key), token.as_str(), ttl)
            .await?;

        if extended {
            trace!("Lease renewed");
            Ok(LeaseRenewal::Renewed)
        } else {
            debug!("Lease lost");
            Ok(LeaseRenewal::Lost)
        }
    }

    /// Drop the lease on `key` if `token` owns it. A no-op otherwise.
    #[instrument(skip(self, token), fields(token = %token))]
    pub async fn release(&self, key: &str, token: &FencingToken) -> Result<(), LeaseError> {
        let deleted = self
            .store
            .compare_and_delete(&self.full_key(key), token.as_str())
            .await?;
        debug!(deleted, "Lease released");
        Ok(())
    }
}
