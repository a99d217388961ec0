//! Pipeline orchestration for imgagent.
//!
//! A [`PipelineController`] runs a pool of workers. Each worker polls the
//! [`DocumentStore`](imgagent_interface::DocumentStore) for documents waiting
//! on a stage, claims one through the [`LeaseManager`](imgagent_lease::LeaseManager),
//! runs the matching [`StageProcessor`], and commits the result atomically.
//! Failures go through the [`BackoffPolicy`] instead of committing.
//!
//! ```text
//! chapterReady --roles--> roleReady --scenes (per chapter)--> sceneReady --media--> imgReady
//!       \________________________\_____________________________\___________> failed
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod config;
mod controller;
mod memory;
mod stages;
mod worker;

pub use backoff::{BackoffPolicy, IdleBackoff, RetryDecision};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use controller::{ControllerHandle, PipelineController};
pub use memory::InMemoryDocumentStore;
pub use stages::{
    MediaGeneration, RoleExtraction, SceneExtraction, StageContext, StageOutput, StageProcessor,
    default_stages,
};
