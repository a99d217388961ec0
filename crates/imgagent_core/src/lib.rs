//! Core data types for the imgagent document pipeline.
//!
//! This crate provides the entities every other imgagent crate speaks in:
//! documents and their chapters, roles and scenes, the closed lifecycle
//! status enum, and the text splitter used when a document is created.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod ids;
mod role;
mod scene;
mod splitter;
mod status;

pub use document::{Chapter, Document, MAX_DOCUMENT_NAME_LEN, Revision, validate_document_name};
pub use ids::{chapter_id, role_id, scene_id};
pub use role::{Role, RoleDraft};
pub use scene::{Scene, SceneDraft, SceneMedia};
pub use splitter::{SplitOptions, SplitOptionsBuilder, split_text};
pub use status::DocumentStatus;
