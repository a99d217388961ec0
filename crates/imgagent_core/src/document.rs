//! Documents and chapters.

use crate::DocumentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted document name, in characters.
pub const MAX_DOCUMENT_NAME_LEN: usize = 50;

/// A document moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier
    pub id: Uuid,
    /// Unique, human-readable name
    pub name: String,
    /// Current lifecycle status
    pub status: DocumentStatus,
    /// Consecutive failed stage executions
    pub failure_count: u32,
    /// Earliest time the next attempt may start
    pub retry_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last committed change
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Whether the document may be claimed at `now`.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use imgagent_core::{Document, DocumentStatus};
    /// use uuid::Uuid;
    ///
    /// let now = Utc::now();
    /// let mut doc = Document {
    ///     id: Uuid::new_v4(),
    ///     name: "novel".to_string(),
    ///     status: DocumentStatus::ChapterReady,
    ///     failure_count: 1,
    ///     retry_at: Some(now + Duration::seconds(30)),
    ///     last_error: None,
    ///     created_at: now,
    ///     updated_at: now,
    /// };
    /// assert!(!doc.is_due(now));
    /// doc.retry_at = None;
    /// assert!(doc.is_due(now));
    /// ```
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.retry_at.is_none_or(|at| at <= now)
    }

    /// The committed state this snapshot was read at.
    pub fn revision(&self) -> Revision {
        Revision {
            status: self.status,
            updated_at: self.updated_at,
        }
    }
}

/// A committed document state, as seen by a worker.
///
/// Failure bookkeeping carries the revision the failed execution started
/// from; the store refuses it once the document has moved past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Status when the snapshot was read
    pub status: DocumentStatus,
    /// Last committed change when the snapshot was read
    pub updated_at: DateTime<Utc>,
}

impl Revision {
    /// Whether `document` is still at this revision.
    pub fn matches(&self, document: &Document) -> bool {
        document.status == self.status && document.updated_at == self.updated_at
    }
}

/// A chapter of a document, produced by the creation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier
    pub id: Uuid,
    /// Owning document
    pub document_id: Uuid,
    /// Position within the document, starting at 0
    pub index: i32,
    /// Chapter title
    pub title: String,
    /// Chapter text
    pub content: String,
    /// Scenes extracted from this chapter, in scene order
    pub scene_ids: Vec<Uuid>,
    /// Whether scene extraction has committed for this chapter
    pub scenes_extracted: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last committed change
    pub updated_at: DateTime<Utc>,
}

/// Check a document name against the creation rules.
///
/// # Errors
///
/// Returns a message describing the violation when the name is empty,
/// whitespace only, or longer than [`MAX_DOCUMENT_NAME_LEN`] characters.
pub fn validate_document_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("document name must not be empty".to_string());
    }
    let len = name.chars().count();
    if len > MAX_DOCUMENT_NAME_LEN {
        return Err(format!(
            "document name must be at most {} characters, got {}",
            MAX_DOCUMENT_NAME_LEN, len
        ));
    }
    Ok(())
}
