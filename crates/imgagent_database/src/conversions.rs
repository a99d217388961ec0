//! Conversions between domain types and database rows.

use crate::{ChapterRow, DocumentRow, RoleRow, SceneRow};
use imgagent_core::{Chapter, Document, DocumentStatus, Role, Scene};
use imgagent_error::{StoreError, StoreErrorKind};

/// Parse a stored status string.
pub fn parse_status(s: &str) -> Result<DocumentStatus, StoreError> {
    s.parse().map_err(|e| {
        StoreError::new(StoreErrorKind::Serialization(format!(
            "Invalid document status '{}': {}",
            s, e
        )))
    })
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: row.id,
            name: row.name,
            status: parse_status(&row.status)?,
            failure_count: row.failure_count.max(0) as u32,
            retry_at: row.retry_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<ChapterRow> for Chapter {
    fn from(row: ChapterRow) -> Self {
        Chapter {
            id: row.id,
            document_id: row.document_id,
            index: row.chapter_index,
            title: row.title,
            content: row.content,
            scene_ids: row.scene_ids,
            scenes_extracted: row.scenes_extracted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            document_id: row.document_id,
            name: row.name,
            gender: row.gender,
            character: row.character_summary,
            appearance: row.appearance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Convert a role to a row at `index` in the document's role order.
pub fn role_to_row(role: Role, index: usize) -> RoleRow {
    RoleRow {
        id: role.id,
        document_id: role.document_id,
        role_index: index as i32,
        name: role.name,
        gender: role.gender,
        character_summary: role.character,
        appearance: role.appearance,
        created_at: role.created_at,
        updated_at: role.updated_at,
    }
}

impl From<SceneRow> for Scene {
    fn from(row: SceneRow) -> Self {
        Scene {
            id: row.id,
            chapter_id: row.chapter_id,
            document_id: row.document_id,
            index: row.scene_index,
            content: row.content,
            image_url: row.image_url,
            voice_url: row.voice_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Scene> for SceneRow {
    fn from(scene: Scene) -> Self {
        SceneRow {
            id: scene.id,
            chapter_id: scene.chapter_id,
            document_id: scene.document_id,
            scene_index: scene.index,
            content: scene.content,
            image_url: scene.image_url,
            voice_url: scene.voice_url,
            created_at: scene.created_at,
            updated_at: scene.updated_at,
        }
    }
}
