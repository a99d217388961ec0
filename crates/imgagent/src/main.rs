//! imgagent CLI binary.
//!
//! This binary provides command-line access to the pipeline:
//! - Run the pipeline controller until CTRL+C
//! - Ingest text files as documents
//! - Inspect, list, and reset documents

use clap::Parser;
use imgagent::{ImgAgentConfig, ObservabilityConfig, init_observability_with_config};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{
        Cli, Commands, check_config, ingest_file, list_documents, reset_document,
        run_controller, show_status,
    };

    // Pick up DATABASE_URL and API keys from a local .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut observability = ObservabilityConfig::default().with_json_logs(cli.json_logs);
    if cli.verbose {
        observability = observability.with_log_level("debug");
    }
    init_observability_with_config(observability)?;

    let config = ImgAgentConfig::load_with(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { seeds, workers } => {
            run_controller(config, &seeds, workers).await?;
        }

        Commands::Ingest { name, file } => {
            ingest_file(&config, &name, &file).await?;
        }

        Commands::Status { id, format } => {
            show_status(&config, id, format).await?;
        }

        Commands::List { status, format } => {
            list_documents(&config, status, format).await?;
        }

        Commands::Reset { id, status } => {
            reset_document(&config, id, status).await?;
        }

        Commands::CheckConfig => {
            check_config(&config)?;
        }
    }

    Ok(())
}
