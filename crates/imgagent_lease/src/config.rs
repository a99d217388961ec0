//! Redis connection settings.

use serde::{Deserialize, Serialize};

/// Connection settings for the Redis lease backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(default)]
pub struct RedisConfig {
    /// Node addresses, `host:port` or full `redis://` URLs
    addrs: Vec<String>,
    /// Connect to a single node even when several addresses are listed
    disable_cluster: bool,
    /// Prefix for every lease key
    key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addrs: vec!["127.0.0.1:6379".to_string()],
            disable_cluster: true,
            key_prefix: "imgagent:lease".to_string(),
        }
    }
}

impl RedisConfig {
    /// Addresses normalized to `redis://` URLs.
    pub fn urls(&self) -> Vec<String> {
        self.addrs
            .iter()
            .map(|addr| {
                if addr.contains("://") {
                    addr.clone()
                } else {
                    format!("redis://{addr}")
                }
            })
            .collect()
    }
}
