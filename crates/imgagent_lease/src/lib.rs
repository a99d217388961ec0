//! Fencing-token leases for the imgagent document pipeline.
//!
//! A lease gives one worker, across every running orchestrator instance,
//! exclusive and time-bounded ownership of a document. The owner proves
//! ownership with an opaque [`FencingToken`]; once the lease expires and
//! someone else claims it, the old token stops working.
//!
//! # Example
//!
//! ```
//! use imgagent_lease::{InMemoryLeaseStore, LeaseAcquisition, LeaseManager};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = LeaseManager::new(Arc::new(InMemoryLeaseStore::new()));
//! let ttl = Duration::from_secs(30);
//!
//! let LeaseAcquisition::Acquired(token) = manager.acquire("doc-1", ttl).await? else {
//!     panic!("fresh key should be free");
//! };
//! assert!(manager.acquire("doc-1", ttl).await?.is_busy());
//!
//! manager.release("doc-1", &token).await?;
//! assert!(!manager.acquire("doc-1", ttl).await?.is_busy());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod manager;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use config::RedisConfig;
pub use manager::{FencingToken, LeaseAcquisition, LeaseManager, LeaseRenewal};
pub use memory::InMemoryLeaseStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisLeaseStore;
