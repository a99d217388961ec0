//! Database connection settings.

use serde::{Deserialize, Serialize};

/// Connection settings for the PostgreSQL document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_getters::Getters)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL; falls back to `DATABASE_URL` when unset
    url: Option<String>,
    /// Maximum pooled connections
    pool_size: u32,
    /// Apply embedded migrations on connect
    run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 8,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Configured URL, or `DATABASE_URL` from the environment.
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }

    /// Settings for an explicit URL with defaults elsewhere.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}
