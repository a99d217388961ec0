//! Worker loop: poll, claim, execute, commit.

use crate::{BackoffPolicy, IdleBackoff, PipelineConfig, RetryDecision, StageContext, StageProcessor};
use chrono::{DateTime, TimeDelta, Utc};
use imgagent_core::{Document, DocumentStatus};
use imgagent_error::{StageError, StageErrorKind, StoreError};
use imgagent_interface::{DocumentStore, GenerationClient};
use imgagent_lease::{FencingToken, LeaseAcquisition, LeaseManager, LeaseRenewal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, trace, warn};
use uuid::Uuid;

/// Stage executions one claim may run before the lease is handed back.
const MAX_STEPS_PER_CLAIM: usize = 64;

/// Everything a worker needs, shared by all workers of a controller.
pub(crate) struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) policy: BackoffPolicy,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) leases: LeaseManager,
    pub(crate) generation: Arc<dyn GenerationClient>,
    pub(crate) stages: Vec<Arc<dyn StageProcessor>>,
}

impl Pipeline {
    fn stage_for(&self, document: &Document) -> Option<&Arc<dyn StageProcessor>> {
        self.stages.iter().find(|s| s.applicable(document))
    }

    fn polled_statuses(&self) -> Vec<DocumentStatus> {
        let mut statuses: Vec<DocumentStatus> = Vec::new();
        for stage in &self.stages {
            let status = stage.pre_status();
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
        statuses
    }
}

/// How one stage execution ended, short of success.
enum StepFailure {
    /// The stored status moved underneath us; results were discarded.
    Conflict,
    /// Counted failure.
    Failed(StageError),
}

#[track_caller]
fn lease_lost(document_id: Uuid) -> StageError {
    StageError::new(StageErrorKind::LeaseLost(document_id.to_string()))
}

fn retry_time(delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) struct Worker {
    id: usize,
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(id: usize, pipeline: Arc<Pipeline>, shutdown: CancellationToken) -> Self {
        Self {
            id,
            pipeline,
            shutdown,
        }
    }

    /// Poll until shutdown.
    pub(crate) async fn run(self) {
        let span = info_span!("worker", worker = self.id);
        async move {
            info!("Worker started");
            let config = &self.pipeline.config;
            let mut idle = IdleBackoff::new(
                Duration::from_millis(*config.poll_interval_ms()),
                Duration::from_millis(*config.max_idle_backoff_ms()),
            );

            while !self.shutdown.is_cancelled() {
                let claimed = match self.poll_once().await {
                    Ok(claimed) => claimed,
                    Err(e) => {
                        warn!(error = %e, "Polling for candidates failed");
                        0
                    }
                };
                if claimed > 0 {
                    idle.reset();
                    continue;
                }

                let delay = idle.next_delay();
                trace!(delay_ms = delay.as_millis() as u64, "No work, sleeping");
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            info!("Worker stopped");
        }
        .instrument(span)
        .await
    }

    /// Fetch one batch of candidates and work through it.
    ///
    /// Returns how many candidates this worker claimed.
    pub(crate) async fn poll_once(&self) -> Result<usize, StoreError> {
        let batch_size = *self.pipeline.config.batch_size();
        let mut candidates = Vec::new();
        for status in self.pipeline.polled_statuses() {
            candidates.extend(self.pipeline.store.list_by_status(status, batch_size).await?);
        }
        candidates.sort_by_key(|d| d.updated_at);
        candidates.truncate(batch_size);
        debug!(count = candidates.len(), "Polled candidates");

        let mut claimed = 0;
        for candidate in candidates {
            if self.shutdown.is_cancelled() {
                break;
            }
            if self.claim_and_process(candidate.id).await {
                claimed += 1;
            }
        }
        Ok(claimed)
    }

    /// Claim a document and drive it while the lease is held.
    ///
    /// Returns `false` when the lease could not be taken.
    #[instrument(skip(self), fields(worker = self.id))]
    async fn claim_and_process(&self, document_id: Uuid) -> bool {
        let key = document_id.to_string();
        let leases = &self.pipeline.leases;
        let token = match leases.acquire(&key, self.pipeline.config.lease_ttl()).await {
            Ok(LeaseAcquisition::Acquired(token)) => token,
            Ok(LeaseAcquisition::Busy) => {
                trace!("Document busy, skipping");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Lease acquire failed");
                return false;
            }
        };

        let claim = self.shutdown.child_token();
        let lost = Arc::new(AtomicBool::new(false));
        let renewal = self.spawn_renewal(key.clone(), token.clone(), claim.clone(), Arc::clone(&lost));

        self.drive(document_id, &key, &token, &claim, &lost).await;

        claim.cancel();
        if let Err(e) = renewal.await {
            error!(error = %e, "Lease renewal task panicked");
        }
        if let Err(e) = leases.release(&key, &token).await {
            warn!(error = %e, "Lease release failed, it will expire");
        }
        true
    }

    fn spawn_renewal(
        &self,
        key: String,
        token: FencingToken,
        claim: CancellationToken,
        lost: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let leases = self.pipeline.leases.clone();
        let interval = self.pipeline.config.lease_renew_interval();
        let ttl = self.pipeline.config.lease_ttl();
        let span = info_span!("lease_renewal", document_id = %key);

        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = claim.cancelled() => break,
                        _ = tokio::time::sleep(interval) => {}
                    }
                    match leases.renew(&key, &token, ttl).await {
                        Ok(LeaseRenewal::Renewed) => trace!("Lease renewed"),
                        Ok(LeaseRenewal::Lost) => {
                            warn!("Lease lost, cancelling stage execution");
                            lost.store(true, Ordering::SeqCst);
                            claim.cancel();
                            break;
                        }
                        Err(e) => warn!(error = %e, "Lease renewal failed, will retry"),
                    }
                }
            }
            .instrument(span),
        )
    }

    async fn drive(
        &self,
        document_id: Uuid,
        key: &str,
        token: &FencingToken,
        claim: &CancellationToken,
        lost: &AtomicBool,
    ) {
        for _ in 0..MAX_STEPS_PER_CLAIM {
            if claim.is_cancelled() {
                break;
            }
            let document = match self.pipeline.store.get_document(document_id).await {
                Ok(document) => document,
                Err(e) => {
                    warn!(error = %e, "Could not load claimed document");
                    break;
                }
            };
            if !document.is_due(Utc::now()) {
                trace!(status = %document.status, "Document not due");
                break;
            }
            let Some(stage) = self.pipeline.stage_for(&document) else {
                trace!(status = %document.status, "No stage applies");
                break;
            };
            let stage = Arc::clone(stage);

            match self
                .execute_once(stage.as_ref(), &document, key, token, claim, lost)
                .await
            {
                Ok(status) if status.is_terminal() => break,
                Ok(_) => {}
                Err(StepFailure::Conflict) => break,
                Err(StepFailure::Failed(e)) => {
                    self.record_failure(&document, stage.name(), &e).await;
                    break;
                }
            }
        }
    }

    /// Run one stage execution and commit its output.
    async fn execute_once(
        &self,
        stage: &dyn StageProcessor,
        document: &Document,
        key: &str,
        token: &FencingToken,
        claim: &CancellationToken,
        lost: &AtomicBool,
    ) -> Result<DocumentStatus, StepFailure> {
        let pipeline = &self.pipeline;
        info!(document_id = %document.id, stage = stage.name(), status = %document.status, "Stage started");

        let ctx = StageContext::new(
            Arc::clone(&pipeline.store),
            Arc::clone(&pipeline.generation),
            claim.clone(),
        );
        let timeout = pipeline.config.stage_timeout();
        let outcome = tokio::select! {
            biased;
            _ = claim.cancelled() => Err(StageError::new(StageErrorKind::Cancelled)),
            result = tokio::time::timeout(timeout, stage.execute(&ctx, document)) => match result {
                Ok(result) => result,
                Err(_) => Err(StageError::new(StageErrorKind::DeadlineExceeded(
                    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                ))),
            },
        };
        let output = outcome
            .map_err(|e| {
                if lost.load(Ordering::SeqCst) {
                    lease_lost(document.id)
                } else {
                    e
                }
            })
            .map_err(StepFailure::Failed)?;

        // Prove ownership right before the commit.
        match pipeline.leases.renew(key, token, pipeline.config.lease_ttl()).await {
            Ok(LeaseRenewal::Renewed) => {}
            Ok(LeaseRenewal::Lost) => {
                lost.store(true, Ordering::SeqCst);
                claim.cancel();
                return Err(StepFailure::Failed(lease_lost(document.id)));
            }
            Err(e) => return Err(StepFailure::Failed(e.into())),
        }

        let result_label = output.result.label();
        match pipeline
            .store
            .commit_stage(document.id, document.status, output.result, output.next)
            .await
        {
            Ok(committed) => {
                info!(
                    document_id = %document.id,
                    stage = stage.name(),
                    result = result_label,
                    status = %committed.status,
                    "Stage committed"
                );
                Ok(committed.status)
            }
            Err(e) if e.is_conflict() => {
                warn!(document_id = %document.id, error = %e, "Commit conflict, results discarded");
                Err(StepFailure::Conflict)
            }
            Err(e) => Err(StepFailure::Failed(e.into())),
        }
    }

    /// Count a failure and either schedule a retry or give up.
    ///
    /// Every write is fenced on the revision the failed execution started
    /// from. If another owner has committed since, the failure is dropped.
    async fn record_failure(&self, document: &Document, stage: &str, failure: &StageError) {
        let store = &self.pipeline.store;
        let seen = document.revision();
        let message = failure.kind.to_string();
        let count = match store.increment_failure(document.id, seen, &message).await {
            Ok(count) => count,
            Err(e) if e.is_conflict() => {
                warn!(document_id = %document.id, stage, error = %message, "Document moved on, stale failure discarded");
                return;
            }
            Err(e) => {
                error!(document_id = %document.id, error = %e, "Could not record failure");
                return;
            }
        };

        match self.pipeline.policy.decide(count, !failure.is_transient()) {
            RetryDecision::Retry(delay) => {
                warn!(
                    document_id = %document.id,
                    stage,
                    failure_count = count,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %message,
                    "Stage failed, retry scheduled"
                );
                if let Err(e) = store.schedule_retry(document.id, seen, retry_time(delay)).await {
                    warn!(document_id = %document.id, error = %e, "Could not schedule retry");
                }
            }
            RetryDecision::GiveUp => match store.mark_failed(document.id, seen, &message).await {
                Ok(()) => error!(
                    document_id = %document.id,
                    stage,
                    failure_count = count,
                    last_error = %message,
                    "Document failed, operator attention required"
                ),
                Err(e) if e.is_conflict() => {
                    warn!(document_id = %document.id, error = %e, "Document moved on, not marking failed")
                }
                Err(e) => warn!(document_id = %document.id, error = %e, "Could not mark document failed"),
            },
        }
    }
}
