//! Stage processor tests: idempotence and back-references.

mod test_utils;

use imgagent_core::{Document, DocumentStatus};
use imgagent_error::StageErrorKind;
use imgagent_interface::DocumentStore;
use imgagent_pipeline::{
    InMemoryDocumentStore, MediaGeneration, RoleExtraction, SceneExtraction, StageContext,
    StageProcessor,
};
use std::sync::Arc;
use test_utils::{MockGenerationClient, Op};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn context(store: &InMemoryDocumentStore, generation: &MockGenerationClient) -> StageContext {
    StageContext::new(
        Arc::new(store.clone()),
        Arc::new(generation.clone()),
        CancellationToken::new(),
    )
}

async fn run_stage(
    stage: &dyn StageProcessor,
    ctx: &StageContext,
    store: &InMemoryDocumentStore,
    document: &Document,
) -> anyhow::Result<Document> {
    assert!(stage.applicable(document));
    let output = stage.execute(ctx, document).await?;
    Ok(store
        .commit_stage(document.id, document.status, output.result, output.next)
        .await?)
}

#[tokio::test]
async fn test_role_extraction_rerun_yields_same_roles() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let ctx = context(&store, &generation);
    let doc = store
        .create_document("rerun-roles", vec!["one".to_string(), "two".to_string()])
        .await?;

    let first = run_stage(&RoleExtraction, &ctx, &store, &doc).await?;
    assert_eq!(first.status, DocumentStatus::RoleReady);
    let roles_first = store.list_roles(doc.id).await?;

    // Simulate a crash-and-retry from the same committed precondition.
    let reset = store
        .reset_document(doc.id, DocumentStatus::ChapterReady)
        .await?;
    assert!(store.list_roles(doc.id).await?.is_empty());
    run_stage(&RoleExtraction, &ctx, &store, &reset).await?;
    let roles_second = store.list_roles(doc.id).await?;

    let key = |roles: &[imgagent_core::Role]| {
        roles
            .iter()
            .map(|r| (r.id, r.name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(key(&roles_first), key(&roles_second));
    assert_eq!(generation.inputs(Op::ExtractRoles), vec!["one\n\ntwo", "one\n\ntwo"]);
    Ok(())
}

#[tokio::test]
async fn test_scene_extraction_commits_one_chapter_at_a_time() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let ctx = context(&store, &generation);
    let doc = store
        .create_document(
            "chaptered",
            vec!["a1\na2".to_string(), "b1\nb2\nb3".to_string()],
        )
        .await?;
    let doc = run_stage(&RoleExtraction, &ctx, &store, &doc).await?;

    let doc = run_stage(&SceneExtraction, &ctx, &store, &doc).await?;
    assert_eq!(doc.status, DocumentStatus::RoleReady);
    let chapters = store.list_chapters(doc.id).await?;
    assert!(chapters[0].scenes_extracted);
    assert_eq!(chapters[0].scene_ids.len(), 2);
    assert!(!chapters[1].scenes_extracted);
    assert!(chapters[1].scene_ids.is_empty());

    let doc = run_stage(&SceneExtraction, &ctx, &store, &doc).await?;
    assert_eq!(doc.status, DocumentStatus::SceneReady);

    for chapter in store.list_chapters(doc.id).await? {
        let ids: Vec<Uuid> = store
            .list_scenes_by_chapter(chapter.id)
            .await?
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(chapter.scene_ids, ids);
    }
    assert_eq!(generation.calls(Op::ExtractScenes), 2);
    Ok(())
}

#[tokio::test]
async fn test_scene_extraction_rerun_yields_same_scenes() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let ctx = context(&store, &generation);
    let doc = store
        .create_document("rerun-scenes", vec!["x1\nx2".to_string()])
        .await?;
    let doc = run_stage(&RoleExtraction, &ctx, &store, &doc).await?;
    let done = run_stage(&SceneExtraction, &ctx, &store, &doc).await?;
    assert_eq!(done.status, DocumentStatus::SceneReady);
    let first: Vec<(Uuid, String)> = store
        .list_scenes_by_document(doc.id)
        .await?
        .into_iter()
        .map(|s| (s.id, s.content))
        .collect();

    let reset = store
        .reset_document(doc.id, DocumentStatus::RoleReady)
        .await?;
    assert!(store.list_scenes_by_document(doc.id).await?.is_empty());
    run_stage(&SceneExtraction, &ctx, &store, &reset).await?;
    let second: Vec<(Uuid, String)> = store
        .list_scenes_by_document(doc.id)
        .await?
        .into_iter()
        .map(|s| (s.id, s.content))
        .collect();

    assert_eq!(first, second);
    let chapter = store.list_chapters(doc.id).await?.remove(0);
    assert_eq!(
        chapter.scene_ids,
        second.iter().map(|(id, _)| *id).collect::<Vec<_>>()
    );
    Ok(())
}

#[tokio::test]
async fn test_media_generation_skips_finished_chapters() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let ctx = context(&store, &generation);
    let doc = store
        .create_document("media", vec!["m1\nm2".to_string(), "n1".to_string()])
        .await?;
    let mut doc = run_stage(&RoleExtraction, &ctx, &store, &doc).await?;
    while doc.status == DocumentStatus::RoleReady {
        doc = run_stage(&SceneExtraction, &ctx, &store, &doc).await?;
    }

    let doc = run_stage(&MediaGeneration, &ctx, &store, &doc).await?;
    assert_eq!(doc.status, DocumentStatus::SceneReady);
    assert_eq!(generation.calls(Op::GenerateImage), 2);

    let doc = run_stage(&MediaGeneration, &ctx, &store, &doc).await?;
    assert_eq!(doc.status, DocumentStatus::ImgReady);
    assert_eq!(generation.calls(Op::GenerateImage), 3);
    assert_eq!(generation.calls(Op::GenerateVoice), 3);
    assert!(store
        .list_scenes_by_document(doc.id)
        .await?
        .iter()
        .all(|s| s.has_media()));
    Ok(())
}

#[tokio::test]
async fn test_document_without_scenes_completes() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let ctx = context(&store, &generation);
    let doc = store
        .create_document("blank-lines", vec!["\n\n".to_string(), "only".to_string()])
        .await?;
    let mut doc = run_stage(&RoleExtraction, &ctx, &store, &doc).await?;
    while doc.status == DocumentStatus::RoleReady {
        doc = run_stage(&SceneExtraction, &ctx, &store, &doc).await?;
    }
    let chapters = store.list_chapters(doc.id).await?;
    assert!(chapters[0].scenes_extracted);
    assert!(chapters[0].scene_ids.is_empty());

    let doc = run_stage(&MediaGeneration, &ctx, &store, &doc).await?;
    assert_eq!(doc.status, DocumentStatus::ImgReady);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_context_stops_stage() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let cancel = CancellationToken::new();
    let ctx = StageContext::new(
        Arc::new(store.clone()),
        Arc::new(generation.clone()),
        cancel.clone(),
    );
    let doc = store
        .create_document("cancelled", vec!["text".to_string()])
        .await?;

    cancel.cancel();
    let err = RoleExtraction.execute(&ctx, &doc).await.unwrap_err();
    assert!(matches!(err.kind, StageErrorKind::Cancelled));
    assert!(err.is_transient());
    assert_eq!(generation.calls(Op::ExtractRoles), 0);
    Ok(())
}

#[tokio::test]
async fn test_stages_apply_to_exact_pre_status() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let doc = store
        .create_document("applicable", vec!["text".to_string()])
        .await?;

    assert!(RoleExtraction.applicable(&doc));
    assert!(!SceneExtraction.applicable(&doc));
    assert!(!MediaGeneration.applicable(&doc));
    Ok(())
}
