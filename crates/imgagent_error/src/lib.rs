//! Error types for the imgagent document pipeline.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All constructors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use imgagent_error::{ImgAgentResult, StoreError, StoreErrorKind};
//!
//! fn load() -> ImgAgentResult<String> {
//!     Err(StoreError::new(StoreErrorKind::NotFound("doc-1".to_string())))?
//! }
//!
//! assert!(load().is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod generation;
mod lease;
mod stage;
mod status;
mod store;

pub use config::ConfigError;
pub use error::{ImgAgentError, ImgAgentErrorKind, ImgAgentResult};
pub use generation::{GenerationError, GenerationErrorKind};
pub use lease::{LeaseError, LeaseErrorKind};
pub use stage::{StageError, StageErrorKind};
pub use status::StatusError;
pub use store::{StoreError, StoreErrorKind};
