//! imgagent - long-form text to illustrated, voiced scenes
//!
//! imgagent ingests a document, splits it into chapters, and advances it
//! through AI-assisted stages until every scene has an image and a voice
//! track. Any number of orchestrator processes can share one document store
//! and one lease backend; a lease makes each document the property of exactly
//! one worker at a time, and every stage result is committed atomically
//! together with the status change.
//!
//! # Features
//!
//! - **Staged pipeline**: roles, then scenes per chapter, then media per scene
//! - **Multi-instance safety**: fencing-token leases with background renewal
//! - **Retry policy**: exponential backoff persisted on the document, with a
//!   terminal `failed` status once attempts run out
//! - **Graceful shutdown**: in-flight stages are cancelled, nothing half-applied
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use imgagent::{ImgAgentConfig, build_controller, open_store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ImgAgentConfig::load()?;
//!     let store = open_store(&config).await?;
//!     let handle = build_controller(&config, store).await?.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `database` - PostgreSQL document store
//! - `redis` - Redis lease backend
//! - `all` - Enable all features
//!
//! # Architecture
//!
//! - `imgagent_error` - Error types
//! - `imgagent_core` - Documents, chapters, roles, scenes, statuses, splitter
//! - `imgagent_interface` - `DocumentStore`, `GenerationClient`, `LeaseStore`
//! - `imgagent_lease` - Lease manager with in-memory and Redis stores
//! - `imgagent_database` - PostgreSQL document store
//! - `imgagent_models` - Bailian generation client
//! - `imgagent_pipeline` - Stages, retry policy, controller

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod observability;

pub use backend::{build_controller, ingest, open_leases, open_store};
pub use config::{ENV_PREFIX, ImgAgentConfig};
pub use observability::{ObservabilityConfig, init_observability, init_observability_with_config};

// Re-export error types
pub use imgagent_error::{
    ConfigError, GenerationError, GenerationErrorKind, ImgAgentError, ImgAgentErrorKind,
    ImgAgentResult, LeaseError, LeaseErrorKind, StageError, StageErrorKind, StatusError,
    StoreError, StoreErrorKind,
};

// Re-export core types
pub use imgagent_core::{
    Chapter, Document, DocumentStatus, Revision, Role, RoleDraft, Scene, SceneDraft, SceneMedia,
    SplitOptions, split_text,
};

// Re-export seams
pub use imgagent_interface::{DocumentStore, GenerationClient, LeaseStore, StageResult};

// Re-export leases
pub use imgagent_lease::{
    FencingToken, InMemoryLeaseStore, LeaseAcquisition, LeaseManager, LeaseRenewal, RedisConfig,
};
#[cfg(feature = "redis")]
pub use imgagent_lease::RedisLeaseStore;

// Re-export generation client
pub use imgagent_models::{BailianClient, BailianConfig};

// Re-export pipeline
pub use imgagent_pipeline::{
    BackoffPolicy, ControllerHandle, InMemoryDocumentStore, PipelineConfig, PipelineController,
    StageProcessor, default_stages,
};

#[cfg(feature = "database")]
pub use imgagent_database::{DatabaseConfig, PostgresDocumentStore};
