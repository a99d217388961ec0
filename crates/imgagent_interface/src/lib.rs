//! Trait definitions for the imgagent document pipeline.
//!
//! The pipeline talks to three collaborators through these seams: the
//! durable document store, the remote generation service, and the
//! key-value service that backs leases.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod generation;
mod lease;
mod store;

pub use generation::GenerationClient;
pub use lease::LeaseStore;
pub use store::{DocumentStore, StageResult};
