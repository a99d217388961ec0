//! The `run` command: a controller that lives until CTRL+C.

use imgagent::{ConfigError, ImgAgentConfig, ImgAgentResult, build_controller, ingest, open_store};
use std::path::PathBuf;
use tracing::{info, warn};

/// Start the controller, optionally seeding documents first.
pub async fn run_controller(
    config: ImgAgentConfig,
    seeds: &[PathBuf],
    workers: Option<usize>,
) -> ImgAgentResult<()> {
    let config = match workers {
        Some(workers) => {
            let pipeline = config.pipeline().clone().with_workers(workers);
            config.with_pipeline(pipeline)
        }
        None => config,
    };

    let store = open_store(&config).await?;
    for path in seeds {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| ConfigError::new(format!("cannot name a document after {:?}", path)))?;
        let text = super::read_text(path)?;
        ingest(store.as_ref(), name, &text, config.splitter()).await?;
    }

    let controller = build_controller(&config, store).await?;
    let handle = controller.start();
    info!(workers = handle.worker_count(), "Pipeline running, press CTRL+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for CTRL+C, shutting down");
    }

    info!("Shutdown requested");
    handle.shutdown().await;
    info!("Pipeline stopped");
    Ok(())
}
