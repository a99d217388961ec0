//! Pipeline controller and its shutdown handle.

use crate::worker::{Pipeline, Worker};
use crate::{BackoffPolicy, PipelineConfig, StageProcessor, default_stages};
use imgagent_error::{ConfigError, StoreError};
use imgagent_interface::{DocumentStore, GenerationClient};
use imgagent_lease::LeaseManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Drives documents through the pipeline with a pool of workers.
///
/// The controller holds its collaborators; nothing is global, so several
/// controllers (or several processes) can share one store and lease backend.
///
/// # Examples
///
/// ```
/// use imgagent_lease::{InMemoryLeaseStore, LeaseManager};
/// use imgagent_pipeline::{InMemoryDocumentStore, PipelineConfig, PipelineController};
/// # use async_trait::async_trait;
/// # use imgagent_core::{RoleDraft, SceneDraft};
/// # use imgagent_error::GenerationError;
/// # use imgagent_interface::GenerationClient;
/// use std::sync::Arc;
/// # struct Echo;
/// # #[async_trait]
/// # impl GenerationClient for Echo {
/// #     async fn extract_roles(&self, _: &str) -> Result<Vec<RoleDraft>, GenerationError> { Ok(vec![]) }
/// #     async fn extract_scenes(&self, _: &str) -> Result<Vec<SceneDraft>, GenerationError> { Ok(vec![]) }
/// #     async fn generate_image(&self, _: &str) -> Result<String, GenerationError> { Ok("i".into()) }
/// #     async fn generate_voice(&self, _: &str) -> Result<String, GenerationError> { Ok("v".into()) }
/// #     fn provider_name(&self) -> &'static str { "echo" }
/// # }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let controller = PipelineController::new(
///     PipelineConfig::default(),
///     Arc::new(InMemoryDocumentStore::new()),
///     LeaseManager::new(Arc::new(InMemoryLeaseStore::new())),
///     Arc::new(Echo),
/// )?;
/// let handle = controller.start();
/// handle.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PipelineController {
    config: PipelineConfig,
    policy: BackoffPolicy,
    store: Arc<dyn DocumentStore>,
    leases: LeaseManager,
    generation: Arc<dyn GenerationClient>,
    stages: Vec<Arc<dyn StageProcessor>>,
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("leases", &self.leases)
            .field("provider", &self.generation.provider_name())
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PipelineController {
    /// Create a controller with the three standard stages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DocumentStore>,
        leases: LeaseManager,
        generation: Arc<dyn GenerationClient>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: BackoffPolicy::from_config(&config),
            config,
            store,
            leases,
            generation,
            stages: default_stages(),
        })
    }

    /// Replace the stage processors.
    pub fn with_stages(mut self, stages: Vec<Arc<dyn StageProcessor>>) -> Self {
        self.stages = stages;
        self
    }

    /// Replace the retry policy derived from the config.
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn pipeline(&self) -> Arc<Pipeline> {
        Arc::new(Pipeline {
            config: self.config.clone(),
            policy: self.policy,
            store: Arc::clone(&self.store),
            leases: self.leases.clone(),
            generation: Arc::clone(&self.generation),
            stages: self.stages.clone(),
        })
    }

    /// Spawn the worker pool.
    #[instrument(skip(self), fields(workers = self.config.workers()))]
    pub fn start(&self) -> ControllerHandle {
        let pipeline = self.pipeline();
        let shutdown = CancellationToken::new();
        let workers = (0..*self.config.workers())
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&pipeline), shutdown.clone());
                tokio::spawn(worker.run())
            })
            .collect();

        info!(provider = self.generation.provider_name(), "Pipeline controller started");
        ControllerHandle {
            shutdown,
            workers,
            grace: self.config.shutdown_grace(),
        }
    }

    /// Run a single poll cycle on the current task.
    ///
    /// Returns how many documents were claimed. Useful for one-shot runs
    /// and deterministic tests.
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        Worker::new(0, self.pipeline(), CancellationToken::new())
            .poll_once()
            .await
    }
}

/// Handle to a running worker pool.
#[derive(Debug)]
pub struct ControllerHandle {
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl ControllerHandle {
    /// Token that stops the workers when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of worker tasks.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for the shutdown signal, then for the workers to stop.
    ///
    /// Workers still running after the grace period are aborted.
    pub async fn join(self) {
        self.shutdown.cancelled().await;
        let deadline = tokio::time::Instant::now() + self.grace;
        for mut worker in self.workers {
            match tokio::time::timeout_at(deadline, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Worker task panicked"),
                Err(_) => {
                    warn!("Worker did not stop within the grace period, aborting");
                    worker.abort();
                }
            }
        }
        info!("Pipeline controller stopped");
    }

    /// Signal shutdown and wait for the workers.
    pub async fn shutdown(self) {
        info!("Shutting down pipeline controller");
        self.shutdown.cancel();
        self.join().await;
    }
}
