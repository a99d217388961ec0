//! In-process lease store.

use async_trait::async_trait;
use imgagent_error::LeaseError;
use imgagent_interface::LeaseStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Lease store held in memory, for tests and single-instance runs.
///
/// Expiry is checked against the tokio clock on every access, so paused-time
/// tests can expire leases with `tokio::time::advance`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaseStore {
    entries: Arc<Mutex<HashMap<String, (String, Instant)>>>,
}

impl InMemoryLeaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live leases.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Whether no live lease exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|(_, expires)| *expires > now) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LeaseError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|(_, expires)| *expires <= now) {
            entries.remove(key);
            return Ok(false);
        }
        match entries.get_mut(key) {
            Some((owner, expires)) if owner == value => {
                *expires = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, value: &str) -> Result<bool, LeaseError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|(_, expires)| *expires <= now) {
            entries.remove(key);
            return Ok(false);
        }
        match entries.get(key) {
            Some((owner, _)) if owner == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stored(store: &InMemoryLeaseStore) -> usize {
        store.entries.lock().await.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_dropped_on_access() -> anyhow::Result<()> {
        let store = InMemoryLeaseStore::new();
        let ttl = Duration::from_millis(100);
        assert!(store.set_if_absent("renewed", "a", ttl).await?);
        assert!(store.set_if_absent("released", "b", ttl).await?);

        tokio::time::advance(Duration::from_millis(150)).await;

        // Expired leases are gone for their owner too
        assert!(!store.compare_and_extend("renewed", "a", ttl).await?);
        assert!(!store.compare_and_delete("released", "b").await?);
        assert_eq!(stored(&store).await, 0);
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_entry_kept_for_other_owner() -> anyhow::Result<()> {
        let store = InMemoryLeaseStore::new();
        let ttl = Duration::from_millis(100);
        assert!(store.set_if_absent("doc", "owner", ttl).await?);

        assert!(!store.compare_and_extend("doc", "intruder", ttl).await?);
        assert!(!store.compare_and_delete("doc", "intruder").await?);
        assert_eq!(stored(&store).await, 1);
        Ok(())
    }
}
