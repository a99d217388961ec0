//! Wiring of stores and clients from configuration.
//!
//! The document store is PostgreSQL with the `database` feature and an
//! in-process store otherwise; the lease backend is Redis with the `redis`
//! feature and in-process otherwise. In-process backends only coordinate
//! workers of a single controller.

use crate::ImgAgentConfig;
use imgagent_core::{Document, SplitOptions, split_text};
use imgagent_error::{ImgAgentResult, StoreError, StoreErrorKind};
use imgagent_interface::DocumentStore;
use imgagent_lease::LeaseManager;
use imgagent_models::BailianClient;
use imgagent_pipeline::PipelineController;
use std::sync::Arc;
use tracing::{info, instrument};

/// Open the configured document store.
#[cfg(feature = "database")]
pub async fn open_store(config: &ImgAgentConfig) -> ImgAgentResult<Arc<dyn DocumentStore>> {
    let store = imgagent_database::PostgresDocumentStore::connect(config.database()).await?;
    Ok(Arc::new(store))
}

/// Open the configured document store.
#[cfg(not(feature = "database"))]
pub async fn open_store(_config: &ImgAgentConfig) -> ImgAgentResult<Arc<dyn DocumentStore>> {
    tracing::warn!("Built without the database feature; documents live only in this process");
    Ok(Arc::new(imgagent_pipeline::InMemoryDocumentStore::new()))
}

/// Open the configured lease backend.
#[cfg(feature = "redis")]
pub async fn open_leases(config: &ImgAgentConfig) -> ImgAgentResult<LeaseManager> {
    let store = imgagent_lease::RedisLeaseStore::connect(config.redis()).await?;
    Ok(LeaseManager::new(Arc::new(store)).with_prefix(config.redis().key_prefix()))
}

/// Open the configured lease backend.
#[cfg(not(feature = "redis"))]
pub async fn open_leases(config: &ImgAgentConfig) -> ImgAgentResult<LeaseManager> {
    tracing::warn!("Built without the redis feature; leases do not span processes");
    Ok(
        LeaseManager::new(Arc::new(imgagent_lease::InMemoryLeaseStore::new()))
            .with_prefix(config.redis().key_prefix()),
    )
}

/// Build a controller over `store`, the configured lease backend, and the
/// generation service.
#[instrument(skip_all)]
pub async fn build_controller(
    config: &ImgAgentConfig,
    store: Arc<dyn DocumentStore>,
) -> ImgAgentResult<PipelineController> {
    let leases = open_leases(config).await?;
    let generation = Arc::new(BailianClient::new(config.bailian().clone())?);

    let controller =
        PipelineController::new(config.pipeline().clone(), store, leases, generation)?;
    info!(
        workers = *config.pipeline().workers(),
        batch_size = *config.pipeline().batch_size(),
        "Pipeline controller ready"
    );
    Ok(controller)
}

/// Split `text` into chapters and create the document at `chapterReady`.
///
/// # Errors
///
/// `Invalid` when the text has no content, plus whatever
/// [`DocumentStore::create_document`] rejects.
///
/// # Examples
///
/// ```
/// use imgagent::{DocumentStatus, InMemoryDocumentStore, SplitOptions, ingest};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// let doc = ingest(&store, "tale", "Once.\n\nTwice.", &SplitOptions::default()).await?;
/// assert_eq!(doc.status, DocumentStatus::ChapterReady);
/// # Ok(())
/// # }
/// ```
#[instrument(skip(store, text, options), fields(text_len = text.len()))]
pub async fn ingest(
    store: &dyn DocumentStore,
    name: &str,
    text: &str,
    options: &SplitOptions,
) -> ImgAgentResult<Document> {
    let chapters = split_text(text, options);
    if chapters.is_empty() {
        return Err(StoreError::new(StoreErrorKind::Invalid(
            "text has no content to split into chapters".to_string(),
        ))
        .into());
    }

    let count = chapters.len();
    let document = store.create_document(name, chapters).await?;
    info!(document_id = %document.id, chapters = count, "Document ingested");
    Ok(document)
}
