//! CLI command definitions.

use clap::{Parser, Subcommand, ValueEnum};
use imgagent::DocumentStatus;
use std::path::PathBuf;
use uuid::Uuid;

/// imgagent - turn long-form text into illustrated, voiced scenes
#[derive(Parser, Debug)]
#[command(name = "imgagent")]
#[command(about = "Document pipeline orchestrator: chapters, roles, scenes, images, voices", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Extra configuration file, layered above the user files
    #[arg(long, global = true, env = "IMGAGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the pipeline controller and run until CTRL+C
    Run {
        /// Ingest these files before starting, named after the file stem
        #[arg(long = "seed")]
        seeds: Vec<PathBuf>,

        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Split a text file into chapters and create a document
    Ingest {
        /// Unique document name (1 to 50 characters)
        name: String,

        /// Path to the UTF-8 text file
        file: PathBuf,
    },

    /// Show one document with its progress
    Status {
        /// Document identifier
        id: Uuid,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// List documents, newest first
    List {
        /// Status filter (e.g. roleReady, failed)
        #[arg(long, value_parser = parse_status)]
        status: Option<DocumentStatus>,

        /// Output format
        #[arg(long, default_value = "human")]
        format: OutputFormat,
    },

    /// Put a document back into the pipeline at a chosen status
    Reset {
        /// Document identifier
        id: Uuid,

        /// Status to resume from: chapterReady, roleReady, or sceneReady
        #[arg(long, default_value = "chapterReady", value_parser = parse_status)]
        status: DocumentStatus,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

/// Output format options
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

fn parse_status(value: &str) -> Result<DocumentStatus, String> {
    value
        .parse::<DocumentStatus>()
        .map_err(|_| format!("unknown status '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reset_defaults_to_chapter_ready() {
        let id = Uuid::new_v4().to_string();
        let cli = Cli::parse_from(["imgagent", "reset", id.as_str()]);
        match cli.command {
            Commands::Reset { status, .. } => assert_eq!(status, DocumentStatus::ChapterReady),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_list_parses_camel_case_status() {
        let cli = Cli::parse_from(["imgagent", "--json-logs", "list", "--status", "sceneReady"]);
        assert!(cli.json_logs);
        match cli.command {
            Commands::List { status, .. } => assert_eq!(status, Some(DocumentStatus::SceneReady)),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result = Cli::try_parse_from(["imgagent", "list", "--status", "done"]);
        assert!(result.is_err());
    }
}
