//! Document store held in memory.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use imgagent_core::{
    Chapter, Document, DocumentStatus, Revision, Role, Scene, chapter_id, validate_document_name,
};
use imgagent_error::{StoreError, StoreErrorKind};
use imgagent_interface::{DocumentStore, StageResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    documents: HashMap<Uuid, Document>,
    chapters: HashMap<Uuid, Chapter>,
    roles: Vec<Role>,
    scenes: HashMap<Uuid, Scene>,
    history: HashMap<Uuid, Vec<DocumentStatus>>,
    commit_failures: u32,
    clock: Option<DateTime<Utc>>,
}

impl State {
    /// Wall-clock time, nudged forward so writes are strictly ordered.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.clock {
            if now <= last {
                now = last + TimeDelta::microseconds(1);
            }
        }
        self.clock = Some(now);
        now
    }

    fn document_mut(&mut self, id: Uuid) -> Result<&mut Document, StoreError> {
        self.documents.get_mut(&id).ok_or_else(|| not_found("document", id))
    }

    /// The document, if it is still at `seen`.
    fn document_at(&mut self, id: Uuid, seen: Revision) -> Result<&mut Document, StoreError> {
        let document = self.document_mut(id)?;
        if !seen.matches(document) {
            return Err(moved_on(id, seen, document));
        }
        Ok(document)
    }

    fn record_status(&mut self, id: Uuid, status: DocumentStatus) {
        self.history.entry(id).or_default().push(status);
    }
}

#[track_caller]
fn not_found(what: &str, id: Uuid) -> StoreError {
    StoreError::new(StoreErrorKind::NotFound(format!("{} {}", what, id)))
}

#[track_caller]
fn moved_on(id: Uuid, seen: Revision, found: &Document) -> StoreError {
    StoreError::new(StoreErrorKind::Conflict {
        id: id.to_string(),
        expected: format!("{} at {}", seen.status, seen.updated_at.to_rfc3339()),
        found: format!("{} at {}", found.status, found.updated_at.to_rfc3339()),
    })
}

#[track_caller]
fn invalid(message: String) -> StoreError {
    StoreError::new(StoreErrorKind::Invalid(message))
}

/// [`DocumentStore`] kept in process memory.
///
/// Every operation takes one lock, which makes each write atomic. Used by
/// tests and for local runs without PostgreSQL. It also records the status
/// history of each document and can be told to fail commits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status the document has held, oldest first.
    pub async fn status_history(&self, document_id: Uuid) -> Vec<DocumentStatus> {
        self.state
            .read()
            .await
            .history
            .get(&document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `count` stage commits fail with a query error.
    pub async fn fail_next_commits(&self, count: u32) {
        self.state.write().await.commit_failures = count;
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    #[instrument(skip(self, chapter_texts), fields(chapters = chapter_texts.len()))]
    async fn create_document(
        &self,
        name: &str,
        chapter_texts: Vec<String>,
    ) -> Result<Document, StoreError> {
        validate_document_name(name).map_err(invalid)?;
        if chapter_texts.is_empty() {
            return Err(invalid("document must have at least one chapter".to_string()));
        }

        let mut state = self.state.write().await;
        if state.documents.values().any(|d| d.name == name) {
            return Err(StoreError::new(StoreErrorKind::Duplicate(name.to_string())));
        }

        let now = state.tick();
        let document = Document {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: DocumentStatus::ChapterReady,
            failure_count: 0,
            retry_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        for (index, content) in chapter_texts.into_iter().enumerate() {
            let chapter = Chapter {
                id: chapter_id(document.id, index),
                document_id: document.id,
                index: index as i32,
                title: format!("Chapter {}", index + 1),
                content,
                scene_ids: Vec::new(),
                scenes_extracted: false,
                created_at: now,
                updated_at: now,
            };
            state.chapters.insert(chapter.id, chapter);
        }
        state.documents.insert(document.id, document.clone());
        state.record_status(document.id, document.status);

        info!(document_id = %document.id, "Document created");
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Document, StoreError> {
        self.state
            .read()
            .await
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("document", id))
    }

    async fn list_documents(
        &self,
        status: Option<DocumentStatus>,
    ) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|d| status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn list_by_status(
        &self,
        status: DocumentStatus,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let now = Utc::now();
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|d| d.status == status && d.is_due(now))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        documents.truncate(limit);
        debug!(count = documents.len(), "Loaded candidates");
        Ok(documents)
    }

    async fn list_chapters(&self, document_id: Uuid) -> Result<Vec<Chapter>, StoreError> {
        let state = self.state.read().await;
        let mut chapters: Vec<Chapter> = state
            .chapters
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.index);
        Ok(chapters)
    }

    async fn list_roles(&self, document_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .roles
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_scenes_by_document(&self, document_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        let state = self.state.read().await;
        let mut scenes: Vec<(i32, Scene)> = state
            .scenes
            .values()
            .filter(|s| s.document_id == document_id)
            .map(|s| {
                let chapter_index = state.chapters.get(&s.chapter_id).map_or(i32::MAX, |c| c.index);
                (chapter_index, s.clone())
            })
            .collect();
        scenes.sort_by_key(|(chapter_index, s)| (*chapter_index, s.index));
        Ok(scenes.into_iter().map(|(_, s)| s).collect())
    }

    async fn list_scenes_by_chapter(&self, chapter_id: Uuid) -> Result<Vec<Scene>, StoreError> {
        let state = self.state.read().await;
        let mut scenes: Vec<Scene> = state
            .scenes
            .values()
            .filter(|s| s.chapter_id == chapter_id)
            .cloned()
            .collect();
        scenes.sort_by_key(|s| s.index);
        Ok(scenes)
    }

    #[instrument(skip(self, result), fields(result = result.label()))]
    async fn commit_stage(
        &self,
        document_id: Uuid,
        expected: DocumentStatus,
        result: StageResult,
        next: DocumentStatus,
    ) -> Result<Document, StoreError> {
        let mut state = self.state.write().await;
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(StoreError::new(StoreErrorKind::Query(
                "injected commit failure".to_string(),
            )));
        }

        let current = state
            .documents
            .get(&document_id)
            .ok_or_else(|| not_found("document", document_id))?
            .status;
        if current != expected {
            return Err(StoreError::new(StoreErrorKind::Conflict {
                id: document_id.to_string(),
                expected: expected.to_string(),
                found: current.to_string(),
            }));
        }
        expected
            .transition(next)
            .map_err(|e| invalid(e.to_string()))?;

        // Nothing is written until every check passes.
        match &result {
            StageResult::Roles(_) => {}
            StageResult::ChapterScenes { chapter_id, scenes } => {
                let chapter = state
                    .chapters
                    .get(chapter_id)
                    .ok_or_else(|| not_found("chapter", *chapter_id))?;
                if chapter.document_id != document_id
                    || scenes.iter().any(|s| s.chapter_id != *chapter_id)
                {
                    return Err(invalid(format!(
                        "scenes do not belong to chapter {} of document {}",
                        chapter_id, document_id
                    )));
                }
            }
            StageResult::Media(media) => {
                if let Some(missing) = media.iter().find(|m| {
                    state
                        .scenes
                        .get(&m.scene_id)
                        .is_none_or(|s| s.document_id != document_id)
                }) {
                    return Err(not_found("scene", missing.scene_id));
                }
            }
        }

        let now = state.tick();
        match result {
            StageResult::Roles(roles) => {
                state.roles.retain(|r| r.document_id != document_id);
                state.roles.extend(roles);
            }
            StageResult::ChapterScenes { chapter_id, scenes } => {
                state.scenes.retain(|_, s| s.chapter_id != chapter_id);
                let ids: Vec<Uuid> = scenes.iter().map(|s| s.id).collect();
                for scene in scenes {
                    state.scenes.insert(scene.id, scene);
                }
                if let Some(chapter) = state.chapters.get_mut(&chapter_id) {
                    chapter.scene_ids = ids;
                    chapter.scenes_extracted = true;
                    chapter.updated_at = now;
                }
            }
            StageResult::Media(media) => {
                for item in media {
                    if let Some(scene) = state.scenes.get_mut(&item.scene_id) {
                        scene.image_url = item.image_url;
                        scene.voice_url = item.voice_url;
                        scene.updated_at = now;
                    }
                }
            }
        }

        let document = state.document_mut(document_id)?;
        document.status = next;
        document.failure_count = 0;
        document.retry_at = None;
        document.last_error = None;
        document.updated_at = now;
        let document = document.clone();
        if next != expected {
            state.record_status(document_id, next);
        }

        debug!(status = %document.status, "Stage committed");
        Ok(document)
    }

    async fn increment_failure(
        &self,
        document_id: Uuid,
        seen: Revision,
        error: &str,
    ) -> Result<u32, StoreError> {
        let mut state = self.state.write().await;
        let document = state.document_at(document_id, seen)?;
        document.failure_count += 1;
        document.last_error = Some(error.to_string());
        Ok(document.failure_count)
    }

    async fn schedule_retry(
        &self,
        document_id: Uuid,
        seen: Revision,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let now = state.tick();
        let document = state.document_at(document_id, seen)?;
        document.retry_at = Some(at);
        document.updated_at = now;
        Ok(())
    }

    async fn reset_failure(&self, document_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let document = state.document_mut(document_id)?;
        document.failure_count = 0;
        document.retry_at = None;
        document.last_error = None;
        Ok(())
    }

    async fn mark_failed(
        &self,
        document_id: Uuid,
        seen: Revision,
        reason: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let now = state.tick();
        let document = state.document_at(document_id, seen)?;
        if document.status.is_terminal() {
            return Err(StoreError::new(StoreErrorKind::Conflict {
                id: document_id.to_string(),
                expected: "non-terminal".to_string(),
                found: document.status.to_string(),
            }));
        }
        document.status = DocumentStatus::Failed;
        document.last_error = Some(reason.to_string());
        document.retry_at = None;
        document.updated_at = now;
        state.record_status(document_id, DocumentStatus::Failed);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reset_document(
        &self,
        document_id: Uuid,
        status: DocumentStatus,
    ) -> Result<Document, StoreError> {
        if !status.is_reset_target() {
            return Err(invalid(format!("cannot reset a document to {}", status)));
        }

        let mut state = self.state.write().await;
        if !state.documents.contains_key(&document_id) {
            return Err(not_found("document", document_id));
        }
        let now = state.tick();

        if status == DocumentStatus::ChapterReady {
            state.roles.retain(|r| r.document_id != document_id);
        }
        if matches!(status, DocumentStatus::ChapterReady | DocumentStatus::RoleReady) {
            state.scenes.retain(|_, s| s.document_id != document_id);
            for chapter in state
                .chapters
                .values_mut()
                .filter(|c| c.document_id == document_id)
            {
                chapter.scene_ids.clear();
                chapter.scenes_extracted = false;
                chapter.updated_at = now;
            }
        }
        if status == DocumentStatus::SceneReady {
            for scene in state
                .scenes
                .values_mut()
                .filter(|s| s.document_id == document_id)
            {
                scene.image_url.clear();
                scene.voice_url.clear();
                scene.updated_at = now;
            }
        }

        let document = state.document_mut(document_id)?;
        document.status = status;
        document.failure_count = 0;
        document.retry_at = None;
        document.last_error = None;
        document.updated_at = now;
        let document = document.clone();
        state.record_status(document_id, status);

        warn!(document_id = %document_id, status = %status, "Document reset by operator");
        Ok(document)
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.documents.remove(&document_id).is_none() {
            return Err(not_found("document", document_id));
        }
        state.chapters.retain(|_, c| c.document_id != document_id);
        state.roles.retain(|r| r.document_id != document_id);
        state.scenes.retain(|_, s| s.document_id != document_id);
        state.history.remove(&document_id);
        info!(document_id = %document_id, "Document deleted");
        Ok(())
    }
}
