//! Controller tests against the in-memory store and lease backend.

mod test_utils;

use imgagent_core::{Document, DocumentStatus};
use imgagent_interface::DocumentStore;
use imgagent_lease::{InMemoryLeaseStore, LeaseAcquisition, LeaseManager};
use imgagent_pipeline::{
    InMemoryDocumentStore, PipelineConfig, PipelineController, RoleExtraction, StageProcessor,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockGenerationClient, Op, RevocableLeaseStore, fast_config};
use uuid::Uuid;

fn controller(
    config: PipelineConfig,
    store: &InMemoryDocumentStore,
    leases: LeaseManager,
    generation: &MockGenerationClient,
) -> anyhow::Result<PipelineController> {
    Ok(PipelineController::new(
        config,
        Arc::new(store.clone()),
        leases,
        Arc::new(generation.clone()),
    )?)
}

fn memory_leases() -> LeaseManager {
    LeaseManager::new(Arc::new(InMemoryLeaseStore::new()))
}

async fn wait_for_status(
    store: &InMemoryDocumentStore,
    id: Uuid,
    status: DocumentStatus,
) -> anyhow::Result<Document> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let document = store.get_document(id).await?;
        if document.status == status {
            return Ok(document);
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "document {} stuck at {} waiting for {}",
                id,
                document.status,
                status
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn assert_forward_walk(history: &[DocumentStatus]) {
    let ordinals: Vec<u8> = history.iter().filter_map(|s| s.ordinal()).collect();
    assert!(
        ordinals.windows(2).all(|w| w[1] == w[0] + 1),
        "history is not a forward walk: {:?}",
        history
    );
}

#[tokio::test]
async fn test_end_to_end_with_transient_media_failures() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().fail_times(Op::GenerateImage, "lamp", 2, true);
    let doc = store
        .create_document(
            "lighthouse",
            vec!["The storm rolls in over the cape.\nLin lights the lamp.".to_string()],
        )
        .await?;

    let handle = controller(fast_config(), &store, memory_leases(), &generation)?.start();
    let done = wait_for_status(&store, doc.id, DocumentStatus::ImgReady).await;
    handle.shutdown().await;
    let done = done?;

    assert_eq!(done.failure_count, 0);
    assert!(done.last_error.is_none());
    assert!(done.retry_at.is_none());

    let roles = store.list_roles(doc.id).await?;
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "Lin");

    let chapters = store.list_chapters(doc.id).await?;
    let scenes = store.list_scenes_by_document(doc.id).await?;
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].scene_ids.len(), 2);
    assert_eq!(
        chapters[0].scene_ids,
        scenes.iter().map(|s| s.id).collect::<Vec<_>>()
    );
    assert!(scenes.iter().all(|s| s.has_media()));

    assert_eq!(generation.calls_containing(Op::GenerateImage, "lamp"), 3);

    let history = store.status_history(doc.id).await;
    assert_eq!(
        history,
        vec![
            DocumentStatus::ChapterReady,
            DocumentStatus::RoleReady,
            DocumentStatus::SceneReady,
            DocumentStatus::ImgReady,
        ]
    );
    assert_forward_walk(&history);
    Ok(())
}

#[tokio::test]
async fn test_retry_exhaustion_marks_failed() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().fail_times(Op::ExtractRoles, "", u32::MAX, false);
    let config = PipelineConfig::builder()
        .max_attempts(3u32)
        .workers(1usize)
        .poll_interval_ms(5u64)
        .max_idle_backoff_ms(20u64)
        .lease_ttl_ms(2_000u64)
        .lease_renew_interval_ms(100u64)
        .retry_base_ms(5u64)
        .retry_max_ms(20u64)
        .build()?;
    let doc = store
        .create_document("doomed", vec!["text nobody may read".to_string()])
        .await?;

    let controller = controller(config, &store, memory_leases(), &generation)?;
    let handle = controller.start();
    let failed = wait_for_status(&store, doc.id, DocumentStatus::Failed).await;
    handle.shutdown().await;
    let failed = failed?;

    assert_eq!(failed.failure_count, 3);
    assert!(failed
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("DataInspectionFailed")));
    assert_eq!(generation.calls(Op::ExtractRoles), 3);

    // No longer a candidate.
    assert_eq!(controller.run_once().await?, 0);
    assert_eq!(generation.calls(Op::ExtractRoles), 3);
    assert!(store.list_roles(doc.id).await?.is_empty());
    assert_eq!(
        store.status_history(doc.id).await,
        vec![DocumentStatus::ChapterReady, DocumentStatus::Failed]
    );
    Ok(())
}

#[tokio::test]
async fn test_fail_fast_on_permanent_error() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().fail_times(Op::ExtractRoles, "", 1, false);
    let config = PipelineConfig::builder()
        .fail_fast_on_permanent(true)
        .retry_base_ms(5u64)
        .retry_max_ms(20u64)
        .build()?;
    let doc = store
        .create_document("rejected", vec!["forbidden words".to_string()])
        .await?;

    let controller = controller(config, &store, memory_leases(), &generation)?;
    assert_eq!(controller.run_once().await?, 1);

    let failed = store.get_document(doc.id).await?;
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(failed.failure_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_scene_extraction_resumes_at_first_incomplete_chapter() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().fail_times(Op::ExtractScenes, "second", 1, true);
    let doc = store
        .create_document(
            "three-chapters",
            vec![
                "first chapter opens.\nfirst chapter closes.".to_string(),
                "second chapter only scene.".to_string(),
                "third chapter begins.\nthird chapter middle.\nthird chapter ends.".to_string(),
            ],
        )
        .await?;

    let handle = controller(fast_config(), &store, memory_leases(), &generation)?.start();
    let done = wait_for_status(&store, doc.id, DocumentStatus::ImgReady).await;
    handle.shutdown().await;
    done?;

    assert_eq!(generation.calls_containing(Op::ExtractScenes, "first"), 1);
    assert_eq!(generation.calls_containing(Op::ExtractScenes, "second"), 2);
    assert_eq!(generation.calls_containing(Op::ExtractScenes, "third"), 1);

    let mut all_ids = HashSet::new();
    for chapter in store.list_chapters(doc.id).await? {
        let scenes = store.list_scenes_by_chapter(chapter.id).await?;
        let ids: Vec<Uuid> = scenes.iter().map(|s| s.id).collect();
        assert_eq!(chapter.scene_ids, ids);
        assert!(chapter.scenes_extracted);
        for id in ids {
            assert!(all_ids.insert(id), "scene {} listed twice", id);
        }
    }
    assert_eq!(all_ids.len(), 6);
    assert_eq!(store.list_scenes_by_document(doc.id).await?.len(), 6);
    Ok(())
}

#[tokio::test]
async fn test_commit_failure_discards_results() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let doc = store
        .create_document("flaky-db", vec!["a quiet harbour".to_string()])
        .await?;
    store.fail_next_commits(1).await;

    let controller = controller(fast_config(), &store, memory_leases(), &generation)?;
    assert_eq!(controller.run_once().await?, 1);

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::ChapterReady);
    assert_eq!(after.failure_count, 1);
    assert!(after.retry_at.is_some());
    assert!(after
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("injected commit failure")));
    assert!(store.list_roles(doc.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_busy_lease_skips_candidate() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let leases = memory_leases();
    let doc = store
        .create_document("owned-elsewhere", vec!["text".to_string()])
        .await?;

    let held = leases
        .acquire(&doc.id.to_string(), Duration::from_secs(30))
        .await?;
    assert!(matches!(held, LeaseAcquisition::Acquired(_)));

    let controller = controller(fast_config(), &store, leases, &generation)?;
    assert_eq!(controller.run_once().await?, 0);
    assert_eq!(generation.calls(Op::ExtractRoles), 0);

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::ChapterReady);
    assert_eq!(after.failure_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_lease_loss_abandons_execution() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation =
        MockGenerationClient::new().with_delay(Op::ExtractRoles, Duration::from_millis(500));
    let lease_store = RevocableLeaseStore::new();
    let leases = LeaseManager::new(Arc::new(lease_store.clone()));
    let config = PipelineConfig::builder()
        .lease_ttl_ms(1_000u64)
        .lease_renew_interval_ms(20u64)
        .build()?;
    let doc = store
        .create_document("partitioned", vec!["long text".to_string()])
        .await?;

    let controller = controller(config, &store, leases, &generation)?;
    let run = tokio::spawn(async move { controller.run_once().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    lease_store.revoke();
    assert_eq!(run.await??, 1);

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::ChapterReady);
    assert_eq!(after.failure_count, 1);
    assert!(after
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("Lease lost")));
    assert!(store.list_roles(doc.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_partitioned_worker_cannot_fail_a_document_it_lost() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let shared = InMemoryLeaseStore::new();
    let partitioned = RevocableLeaseStore::over(shared.clone());
    partitioned.partition();

    // The stale worker outlives its lease and gives up on its first failure
    let slow = MockGenerationClient::new().with_delay(Op::ExtractRoles, Duration::from_millis(600));
    let stale_config = PipelineConfig::builder()
        .workers(1usize)
        .lease_ttl_ms(200u64)
        .lease_renew_interval_ms(50u64)
        .max_attempts(1u32)
        .build()?;
    let doc = store
        .create_document("contested", vec!["text".to_string()])
        .await?;

    let stale = controller(
        stale_config,
        &store,
        LeaseManager::new(Arc::new(partitioned)),
        &slow,
    )?;
    let run = tokio::spawn(async move { stale.run_once().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while slow.calls(Op::ExtractRoles) == 0 {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "stage never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    let fresh = controller(
        fast_config(),
        &store,
        LeaseManager::new(Arc::new(shared.clone())),
        &MockGenerationClient::new(),
    )?
    .with_stages(vec![Arc::new(RoleExtraction) as Arc<dyn StageProcessor>]);
    assert_eq!(fresh.run_once().await?, 1);
    assert_eq!(store.get_document(doc.id).await?.status, DocumentStatus::RoleReady);

    assert_eq!(run.await??, 1);

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::RoleReady);
    assert_eq!(after.failure_count, 0);
    assert!(after.retry_at.is_none());
    assert!(after.last_error.is_none());
    assert_eq!(
        store.status_history(doc.id).await,
        vec![DocumentStatus::ChapterReady, DocumentStatus::RoleReady]
    );
    Ok(())
}

#[tokio::test]
async fn test_deadline_reported_in_milliseconds() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().hang_on(Op::ExtractRoles);
    let config = PipelineConfig::builder().stage_timeout_ms(50u64).build()?;
    let doc = store
        .create_document("stuck", vec!["text".to_string()])
        .await?;

    let controller = controller(config, &store, memory_leases(), &generation)?;
    assert_eq!(controller.run_once().await?, 1);

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::ChapterReady);
    assert_eq!(after.failure_count, 1);
    assert!(after
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("deadline of 50ms")));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_stage() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().hang_on(Op::ExtractRoles);
    let doc = store
        .create_document("hanging", vec!["text".to_string()])
        .await?;

    let handle = controller(fast_config(), &store, memory_leases(), &generation)?.start();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while generation.calls(Op::ExtractRoles) == 0 {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "stage never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await?;

    let after = store.get_document(doc.id).await?;
    assert_eq!(after.status, DocumentStatus::ChapterReady);
    assert!(store.list_roles(doc.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_oldest_documents_served_first() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new();
    let config = PipelineConfig::builder()
        .workers(1usize)
        .batch_size(2usize)
        .build()?;
    let mut ids = Vec::new();
    for name in ["alpha", "beta", "gamma"] {
        let doc = store
            .create_document(name, vec![format!("{} text", name)])
            .await?;
        ids.push(doc.id);
    }

    let controller = controller(config, &store, memory_leases(), &generation)?;
    assert_eq!(controller.run_once().await?, 2);
    assert_eq!(controller.run_once().await?, 1);
    assert_eq!(controller.run_once().await?, 0);

    assert_eq!(
        generation.inputs(Op::ExtractRoles),
        vec!["alpha text", "beta text", "gamma text"]
    );
    for id in ids {
        assert_eq!(store.get_document(id).await?.status, DocumentStatus::ImgReady);
    }
    Ok(())
}

#[tokio::test]
async fn test_failing_document_does_not_block_others() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new().fail_times(Op::ExtractRoles, "poison", 3, true);
    let config = PipelineConfig::builder()
        .workers(1usize)
        .batch_size(1usize)
        .poll_interval_ms(5u64)
        .max_idle_backoff_ms(20u64)
        .lease_ttl_ms(2_000u64)
        .lease_renew_interval_ms(100u64)
        .retry_base_ms(50u64)
        .retry_max_ms(200u64)
        .build()?;

    let poison = store
        .create_document("poison", vec!["poison text".to_string()])
        .await?;
    let mut healthy = Vec::new();
    for name in ["one", "two", "three"] {
        healthy.push(
            store
                .create_document(name, vec![format!("{} text", name)])
                .await?
                .id,
        );
    }

    let handle = controller(config, &store, memory_leases(), &generation)?.start();
    let mut outcome = Ok(());
    for id in &healthy {
        if let Err(e) = wait_for_status(&store, *id, DocumentStatus::ImgReady).await {
            outcome = Err(e);
            break;
        }
    }
    if outcome.is_ok() {
        outcome = wait_for_status(&store, poison.id, DocumentStatus::ImgReady)
            .await
            .map(|_| ());
    }
    handle.shutdown().await;
    outcome?;

    assert_eq!(store.get_document(poison.id).await?.failure_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_two_controllers_never_overlap() -> anyhow::Result<()> {
    let store = InMemoryDocumentStore::new();
    let generation = MockGenerationClient::new()
        .with_delay(Op::ExtractRoles, Duration::from_millis(10))
        .with_delay(Op::GenerateImage, Duration::from_millis(5));
    let lease_store = InMemoryLeaseStore::new();

    let mut ids = Vec::new();
    for i in 0..6 {
        let doc = store
            .create_document(
                &format!("shared-{}", i),
                vec![format!("doc {} opening.\ndoc {} ending.", i, i)],
            )
            .await?;
        ids.push(doc.id);
    }

    let first = controller(
        fast_config(),
        &store,
        LeaseManager::new(Arc::new(lease_store.clone())),
        &generation,
    )?
    .start();
    let second = controller(
        fast_config(),
        &store,
        LeaseManager::new(Arc::new(lease_store.clone())),
        &generation,
    )?
    .start();

    let mut outcome = Ok(());
    for id in &ids {
        if let Err(e) = wait_for_status(&store, *id, DocumentStatus::ImgReady).await {
            outcome = Err(e);
            break;
        }
    }
    first.shutdown().await;
    second.shutdown().await;
    outcome?;

    assert!(!generation.saw_overlap());
    assert_eq!(generation.calls(Op::ExtractRoles), 6);
    for id in ids {
        assert_forward_walk(&store.status_history(id).await);
    }
    Ok(())
}
