//! Command-line interface module.
//!
//! This module provides the CLI structure and command handlers for the imgagent binary.

mod commands;
mod documents;
mod run;

pub use commands::{Cli, Commands};
pub use documents::{ingest_file, list_documents, reset_document, show_status};
pub use run::run_controller;

use imgagent::{ConfigError, ImgAgentConfig, ImgAgentResult};
use std::path::Path;

/// Read a UTF-8 input file.
fn read_text(path: &Path) -> ImgAgentResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::new(format!("Failed to read {}: {}", path.display(), e)).into()
    })
}

/// Print the merged configuration after validation.
pub fn check_config(config: &ImgAgentConfig) -> ImgAgentResult<()> {
    let rendered = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::new(format!("Failed to render configuration: {}", e)))?;
    println!("{}", rendered);
    println!("Configuration OK");
    Ok(())
}
