//! Scenes extracted from chapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scene as returned by the generation service, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SceneDraft {
    /// Scene description or narration
    pub content: String,
}

/// A stored scene of a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene identifier
    pub id: Uuid,
    /// Owning chapter
    pub chapter_id: Uuid,
    /// Owning document
    pub document_id: Uuid,
    /// Position within the chapter, starting at 0
    pub index: i32,
    /// Scene text sent to media generation
    pub content: String,
    /// Generated image, empty until media generation commits
    pub image_url: String,
    /// Generated narration, empty until media generation commits
    pub voice_url: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last committed change
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// Materialize a draft at `index` for a chapter.
    pub fn from_draft(
        document_id: Uuid,
        chapter_id: Uuid,
        index: usize,
        draft: SceneDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::scene_id(chapter_id, index),
            chapter_id,
            document_id,
            index: index as i32,
            content: draft.content,
            image_url: String::new(),
            voice_url: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether both media artifacts exist.
    pub fn has_media(&self) -> bool {
        !self.image_url.is_empty() && !self.voice_url.is_empty()
    }
}

/// Generated media for one scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMedia {
    /// Scene the media belongs to
    pub scene_id: Uuid,
    /// Generated image URL
    pub image_url: String,
    /// Generated voice URL
    pub voice_url: String,
}
