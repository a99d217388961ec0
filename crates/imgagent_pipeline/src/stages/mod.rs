//! Stage processors.
//!
//! Each processor owns one transition of the document lifecycle. It reads
//! the document's last committed state, calls the generation service, and
//! returns a [`StageOutput`] for the worker to commit. Processors never
//! write to the store themselves.

mod media;
mod roles;
mod scenes;

pub use media::MediaGeneration;
pub use roles::RoleExtraction;
pub use scenes::SceneExtraction;

use async_trait::async_trait;
use imgagent_core::{Document, DocumentStatus};
use imgagent_error::{StageError, StageErrorKind};
use imgagent_interface::{DocumentStore, GenerationClient, StageResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a successful execution asks the worker to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    /// Results replacing the stage's previous outputs
    pub result: StageResult,
    /// Status to move the document to
    pub next: DocumentStatus,
}

/// Collaborators available to a stage execution.
#[derive(Clone)]
pub struct StageContext {
    store: Arc<dyn DocumentStore>,
    generation: Arc<dyn GenerationClient>,
    cancel: CancellationToken,
}

impl StageContext {
    /// Bundle the collaborators of one execution.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generation: Arc<dyn GenerationClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            generation,
            cancel,
        }
    }

    /// Store to read committed state from.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Generation service.
    pub fn generation(&self) -> &dyn GenerationClient {
        self.generation.as_ref()
    }

    /// Token cancelled on shutdown or lease loss.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with `Cancelled` once the execution has been cancelled.
    #[track_caller]
    pub fn ensure_active(&self) -> Result<(), StageError> {
        if self.cancel.is_cancelled() {
            Err(StageError::new(StageErrorKind::Cancelled))
        } else {
            Ok(())
        }
    }
}

/// One stage of the document lifecycle.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Status a document must be in for this stage to run.
    fn pre_status(&self) -> DocumentStatus;

    /// Whether the stage runs on `document` in its current status.
    fn applicable(&self, document: &Document) -> bool {
        document.status == self.pre_status()
    }

    /// Compute the next result set from the document's committed state.
    ///
    /// Must be safe to run again from the same state: the output replaces
    /// whatever the stage produced before.
    async fn execute(
        &self,
        ctx: &StageContext,
        document: &Document,
    ) -> Result<StageOutput, StageError>;
}

/// The three pipeline stages in lifecycle order.
pub fn default_stages() -> Vec<Arc<dyn StageProcessor>> {
    vec![
        Arc::new(RoleExtraction),
        Arc::new(SceneExtraction),
        Arc::new(MediaGeneration),
    ]
}

#[track_caller]
fn not_ready(document: &Document, stage: &str, reason: impl Into<String>) -> StageError {
    StageError::new(StageErrorKind::NotReady {
        document_id: document.id.to_string(),
        stage: stage.to_string(),
        reason: reason.into(),
    })
}
