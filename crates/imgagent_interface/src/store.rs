//! Durable document storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgagent_core::{Chapter, Document, DocumentStatus, Revision, Role, Scene, SceneMedia};
use imgagent_error::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outputs of one stage execution, written by [`DocumentStore::commit_stage`].
///
/// Every variant replaces what it targets, so committing the same result
/// twice leaves the same state as committing it once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageResult {
    /// Full role set of the document, replacing any existing roles.
    Roles(Vec<Role>),
    /// Ordered scenes of one chapter, replacing that chapter's scenes and
    /// its scene id list.
    ChapterScenes {
        /// Chapter the scenes belong to
        chapter_id: Uuid,
        /// Scenes in chapter order
        scenes: Vec<Scene>,
    },
    /// Image and voice URLs for scenes.
    Media(Vec<SceneMedia>),
}

impl StageResult {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            StageResult::Roles(_) => "roles",
            StageResult::ChapterScenes { .. } => "chapter_scenes",
            StageResult::Media(_) => "media",
        }
    }
}

/// Durable storage for documents and their pipeline outputs.
///
/// Implementations must make [`commit_stage`](Self::commit_stage) atomic:
/// either the result set and the status change are both visible, or neither is.
/// Mutual exclusion between workers is not this trait's job.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document at `chapterReady` together with its ordered chapters.
    ///
    /// # Errors
    ///
    /// `Invalid` for a bad name or an empty chapter list, `Duplicate` when the
    /// name is taken.
    async fn create_document(
        &self,
        name: &str,
        chapter_texts: Vec<String>,
    ) -> Result<Document, StoreError>;

    /// Fetch one document.
    async fn get_document(&self, id: Uuid) -> Result<Document, StoreError>;

    /// All documents, optionally filtered by status, newest first.
    async fn list_documents(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Documents in `status` that are due for processing, least recently
    /// updated first, at most `limit` of them.
    ///
    /// Documents with a retry time in the future are left out, as are
    /// documents in a terminal status.
    async fn list_by_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Chapters of a document ordered by index.
    async fn list_chapters(&self, document_id: Uuid) -> Result<Vec<Chapter>, StoreError>;

    /// Roles of a document in insertion order.
    async fn list_roles(&self, document_id: Uuid) -> Result<Vec<Role>, StoreError>;

    /// Scenes of a document ordered by chapter index, then scene index.
    async fn list_scenes_by_document(&self, document_id: Uuid) -> Result<Vec<Scene>, StoreError>;

    /// Scenes of one chapter ordered by index.
    async fn list_scenes_by_chapter(&self, chapter_id: Uuid) -> Result<Vec<Scene>, StoreError>;

    /// Atomically write a stage result and move the document to `next`.
    ///
    /// The same write clears the failure count, retry time, and last error.
    ///
    /// # Errors
    ///
    /// `Conflict` when the stored status is not `expected`; nothing is written.
    async fn commit_stage(
        &self,
        document_id: Uuid,
        expected: DocumentStatus,
        result: StageResult,
        next: DocumentStatus,
    ) -> Result<Document, StoreError>;

    /// Count one more consecutive failure and remember its message.
    ///
    /// Returns the new count. `updated_at` is left alone so `seen` stays
    /// valid for the follow-up [`schedule_retry`](Self::schedule_retry) or
    /// [`mark_failed`](Self::mark_failed).
    ///
    /// # Errors
    ///
    /// `Conflict` when the document is no longer at `seen`; nothing is written.
    async fn increment_failure(
        &self,
        document_id: Uuid,
        seen: Revision,
        error: &str,
    ) -> Result<u32, StoreError>;

    /// Hold the document back from polling until `at`, moving it behind
    /// documents updated since.
    ///
    /// # Errors
    ///
    /// `Conflict` when the document is no longer at `seen`.
    async fn schedule_retry(
        &self,
        document_id: Uuid,
        seen: Revision,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Clear the failure count, retry time, and last error.
    async fn reset_failure(&self, document_id: Uuid) -> Result<(), StoreError>;

    /// Move a document that is still at `seen` to `failed`.
    ///
    /// # Errors
    ///
    /// `Conflict` when the document is terminal or no longer at `seen`.
    async fn mark_failed(
        &self,
        document_id: Uuid,
        seen: Revision,
        reason: &str,
    ) -> Result<(), StoreError>;

    /// Operator reset: put a document back at `status`, clearing failure
    /// bookkeeping and every stage output that belongs after `status`.
    async fn reset_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, StoreError>;

    /// Delete a document with its chapters, roles, and scenes.
    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError>;
}
