//! Configuration loading and the ingest path through the facade.

use imgagent::{
    DocumentStatus, DocumentStore, ImgAgentConfig, ImgAgentErrorKind, InMemoryDocumentStore,
    SplitOptions, StoreErrorKind, ingest,
};

#[test]
fn test_overrides_layer_on_bundled_defaults() -> anyhow::Result<()> {
    let config = ImgAgentConfig::from_toml(
        r#"
        [pipeline]
        workers = 12
        max_attempts = 3

        [splitter]
        chunk_size = 500
        "#,
    )?;

    assert_eq!(*config.pipeline().workers(), 12);
    assert_eq!(*config.pipeline().max_attempts(), 3);
    // Untouched keys keep their bundled values
    assert_eq!(*config.pipeline().lease_ttl_ms(), 60_000);
    assert_eq!(*config.splitter().chunk_size(), 500);
    assert_eq!(*config.splitter().chunk_overlap(), 100);
    Ok(())
}

#[test]
fn test_invalid_pipeline_settings_are_rejected() {
    let err = ImgAgentConfig::from_toml("[pipeline]\nworkers = 0\n").unwrap_err();
    assert!(matches!(err.kind(), ImgAgentErrorKind::Config(_)));

    // Renewal must fit at least twice into the TTL
    let err = ImgAgentConfig::from_toml(
        "[pipeline]\nlease_ttl_ms = 10000\nlease_renew_interval_ms = 5000\n",
    )
    .unwrap_err();
    assert!(format!("{}", err).contains("lease_renew_interval_ms"));
}

#[test]
fn test_overlap_must_be_smaller_than_chunk() {
    let result = ImgAgentConfig::from_toml("[splitter]\nchunk_size = 100\nchunk_overlap = 100\n");
    assert!(result.is_err());
}

#[tokio::test]
async fn test_ingest_creates_ordered_chapters() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let options = SplitOptions::builder()
        .chunk_size(12)
        .chunk_overlap(0)
        .build()?;

    let doc = ingest(&store, "river", "The river.\n\nThe bridge.\n\nThe lamp.", &options).await?;
    assert_eq!(doc.status, DocumentStatus::ChapterReady);
    assert_eq!(doc.failure_count, 0);

    let chapters = store.list_chapters(doc.id).await?;
    let contents: Vec<_> = chapters.iter().map(|c| c.content.as_str()).collect();
    assert_eq!(contents, vec!["The river.", "The bridge.", "The lamp."]);
    assert!(chapters.iter().all(|c| !c.scenes_extracted));
    Ok(())
}

#[tokio::test]
async fn test_ingest_rejects_blank_text() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let err = ingest(&store, "blank", " \n\n \n", &SplitOptions::default())
        .await
        .unwrap_err();

    match err.kind() {
        ImgAgentErrorKind::Store(e) => assert!(matches!(e.kind, StoreErrorKind::Invalid(_))),
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.list_documents(None).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ingest_rejects_duplicate_name() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    ingest(&store, "twin", "One.", &SplitOptions::default()).await?;

    let err = ingest(&store, "twin", "Two.", &SplitOptions::default())
        .await
        .unwrap_err();
    match err.kind() {
        ImgAgentErrorKind::Store(e) => assert!(matches!(e.kind, StoreErrorKind::Duplicate(_))),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.list_documents(None).await?.len(), 1);
    Ok(())
}
