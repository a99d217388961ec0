//! Characters extracted from a document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A character as returned by the generation service, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleDraft {
    /// Character name
    pub name: String,
    /// Gender as described in the text
    #[serde(default)]
    pub gender: String,
    /// Personality summary
    #[serde(default)]
    pub character: String,
    /// Physical appearance, used to keep images consistent
    #[serde(default)]
    pub appearance: String,
}

/// A stored character of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier
    pub id: Uuid,
    /// Owning document
    pub document_id: Uuid,
    /// Character name
    pub name: String,
    /// Gender as described in the text
    pub gender: String,
    /// Personality summary
    pub character: String,
    /// Physical appearance
    pub appearance: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last committed change
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Materialize a draft at `index` for `document_id`.
    pub fn from_draft(
        document_id: Uuid,
        index: usize,
        draft: RoleDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::role_id(document_id, index),
            document_id,
            name: draft.name,
            gender: draft.gender,
            character: draft.character,
            appearance: draft.appearance,
            created_at: now,
            updated_at: now,
        }
    }
}
