//! Deterministic identifiers for pipeline outputs.
//!
//! Chapters, roles and scenes are named by their parent and position, so
//! re-running a stage from the same committed state writes the same rows.

use uuid::Uuid;

/// Identifier of the chapter at `index` within a document.
pub fn chapter_id(document_id: Uuid, index: usize) -> Uuid {
    Uuid::new_v5(&document_id, format!("chapter:{index}").as_bytes())
}

/// Identifier of the role at `index` within a document.
pub fn role_id(document_id: Uuid, index: usize) -> Uuid {
    Uuid::new_v5(&document_id, format!("role:{index}").as_bytes())
}

/// Identifier of the scene at `index` within a chapter.
pub fn scene_id(chapter_id: Uuid, index: usize) -> Uuid {
    Uuid::new_v5(&chapter_id, format!("scene:{index}").as_bytes())
}
