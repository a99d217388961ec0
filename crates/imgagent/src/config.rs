//! Layered configuration for the imgagent binary.
//!
//! Sources, lowest precedence first:
//! 1. Bundled defaults (`imgagent.toml`, compiled in)
//! 2. `~/.config/imgagent/imgagent.toml`
//! 3. `./imgagent.toml`
//! 4. An explicit file passed to [`ImgAgentConfig::load_with`]
//! 5. `IMGAGENT__<SECTION>__<KEY>` environment variables

use config::{Config, Environment, File, FileFormat};
use imgagent_core::SplitOptions;
use imgagent_error::{ConfigError, ImgAgentResult};
use imgagent_lease::RedisConfig;
use imgagent_models::BailianConfig;
use imgagent_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, instrument};

const DEFAULT_CONFIG: &str = include_str!("../imgagent.toml");

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "IMGAGENT";

/// Every section the binary reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_getters::Getters)]
#[serde(default)]
pub struct ImgAgentConfig {
    /// Worker pool, polling, leases, and retry policy
    pipeline: PipelineConfig,
    /// PostgreSQL document store
    #[cfg(feature = "database")]
    database: imgagent_database::DatabaseConfig,
    /// Redis lease backend
    redis: RedisConfig,
    /// Generation service
    bailian: BailianConfig,
    /// Chapter splitting on ingest
    splitter: SplitOptions,
}

impl ImgAgentConfig {
    /// Load from the default locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be parsed or the merged values are
    /// invalid.
    pub fn load() -> ImgAgentResult<Self> {
        Self::load_with(None)
    }

    /// Load like [`load`](Self::load), adding `path` above the user files.
    #[instrument]
    pub fn load_with(path: Option<&Path>) -> ImgAgentResult<Self> {
        debug!("Loading configuration with precedence: env > explicit > current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/imgagent/imgagent.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("imgagent").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("redis.addrs"),
            )
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to read configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string on top of the bundled defaults, without touching
    /// the filesystem or the environment.
    pub fn from_toml(overrides: &str) -> ImgAgentResult<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to read configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Replace the pipeline section.
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;

        if *self.splitter.chunk_size() == 0 {
            return Err(ConfigError::new("splitter.chunk_size must be at least 1"));
        }
        if self.splitter.chunk_overlap() >= self.splitter.chunk_size() {
            return Err(ConfigError::new(
                "splitter.chunk_overlap must be smaller than splitter.chunk_size",
            ));
        }
        if self.splitter.separator().is_empty() {
            return Err(ConfigError::new("splitter.separator must not be empty"));
        }
        if self.redis.addrs().is_empty() {
            return Err(ConfigError::new("redis.addrs must list at least one node"));
        }
        if *self.bailian.image_poll_interval_ms() == 0 {
            return Err(ConfigError::new(
                "bailian.image_poll_interval_ms must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_defaults_are_valid() {
        let config = ImgAgentConfig::from_toml("").unwrap();
        assert_eq!(*config.pipeline().workers(), 4);
        assert_eq!(*config.splitter().chunk_size(), 2000);
        assert_eq!(config.splitter().separator(), "\n\n");
        assert_eq!(config.redis().key_prefix(), "imgagent:lease");
    }

    #[test]
    fn test_bundled_defaults_match_code_defaults() {
        let config = ImgAgentConfig::from_toml("").unwrap();
        assert_eq!(config.pipeline(), &PipelineConfig::default());
        assert_eq!(config.splitter(), &SplitOptions::default());
        assert_eq!(config.bailian(), &BailianConfig::default());
    }
}
