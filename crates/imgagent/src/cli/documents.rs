//! Document commands: ingest, status, list, reset.

use super::commands::OutputFormat;
use imgagent::{
    Document, DocumentStatus, DocumentStore, ImgAgentConfig, ImgAgentResult, ingest,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Progress of one document, as printed by `status`.
#[derive(Debug, Serialize)]
struct DocumentReport {
    #[serde(flatten)]
    document: Document,
    chapters: usize,
    chapters_with_scenes: usize,
    roles: usize,
    scenes: usize,
    scenes_with_media: usize,
}

#[cfg(feature = "database")]
async fn document_store(config: &ImgAgentConfig) -> ImgAgentResult<Arc<dyn DocumentStore>> {
    imgagent::open_store(config).await
}

#[cfg(not(feature = "database"))]
async fn document_store(_config: &ImgAgentConfig) -> ImgAgentResult<Arc<dyn DocumentStore>> {
    Err(imgagent::ConfigError::new(
        "Database feature not enabled. Rebuild with --features database, or use `run --seed`",
    )
    .into())
}

/// Create a document from a text file.
pub async fn ingest_file(config: &ImgAgentConfig, name: &str, file: &Path) -> ImgAgentResult<()> {
    let text = super::read_text(file)?;
    let store = document_store(config).await?;
    let document = ingest(store.as_ref(), name, &text, config.splitter()).await?;
    println!("{}", document.id);
    Ok(())
}

/// Print one document with its progress.
pub async fn show_status(
    config: &ImgAgentConfig,
    id: Uuid,
    format: OutputFormat,
) -> ImgAgentResult<()> {
    let store = document_store(config).await?;
    let report = build_report(store.as_ref(), id).await?;

    match format {
        OutputFormat::Json => println!("{}", to_json(&report)?),
        OutputFormat::Human => {
            let doc = &report.document;
            println!("Document '{}' ({})", doc.name, doc.id);
            println!("{:-<80}", "");
            println!("Status:    {}", doc.status);
            println!("Chapters:  {} ({} with scenes)", report.chapters, report.chapters_with_scenes);
            println!("Roles:     {}", report.roles);
            println!("Scenes:    {} ({} with media)", report.scenes, report.scenes_with_media);
            println!("Failures:  {}", doc.failure_count);
            if let Some(at) = doc.retry_at {
                println!("Retry at:  {}", at.to_rfc3339());
            }
            if let Some(error) = &doc.last_error {
                println!("Last error: {}", error);
            }
            println!("Updated:   {}", doc.updated_at.to_rfc3339());
        }
    }
    Ok(())
}

async fn build_report(store: &dyn DocumentStore, id: Uuid) -> ImgAgentResult<DocumentReport> {
    let document = store.get_document(id).await?;
    let chapters = store.list_chapters(id).await?;
    let roles = store.list_roles(id).await?;
    let scenes = store.list_scenes_by_document(id).await?;

    Ok(DocumentReport {
        chapters: chapters.len(),
        chapters_with_scenes: chapters.iter().filter(|c| c.scenes_extracted).count(),
        roles: roles.len(),
        scenes: scenes.len(),
        scenes_with_media: scenes.iter().filter(|s| s.has_media()).count(),
        document,
    })
}

/// Print documents, newest first.
pub async fn list_documents(
    config: &ImgAgentConfig,
    status: Option<DocumentStatus>,
    format: OutputFormat,
) -> ImgAgentResult<()> {
    let store = document_store(config).await?;
    let documents = store.list_documents(status).await?;

    match format {
        OutputFormat::Json => println!("{}", to_json(&documents)?),
        OutputFormat::Human => {
            println!("{:<36}  {:<12}  {:>8}  {}", "ID", "STATUS", "FAILURES", "NAME");
            println!("{:-<80}", "");
            for doc in &documents {
                println!(
                    "{:<36}  {:<12}  {:>8}  {}",
                    doc.id,
                    doc.status.to_string(),
                    doc.failure_count,
                    doc.name
                );
            }
            println!("Total: {} documents", documents.len());
        }
    }
    Ok(())
}

/// Put a document back into the pipeline.
pub async fn reset_document(
    config: &ImgAgentConfig,
    id: Uuid,
    status: DocumentStatus,
) -> ImgAgentResult<()> {
    let store = document_store(config).await?;
    let document = store.reset_document(id, status).await?;
    println!("Document {} reset to {}", document.id, document.status);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> ImgAgentResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| imgagent::ConfigError::new(format!("Failed to render JSON: {}", e)).into())
}
