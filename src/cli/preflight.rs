//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available before
//! starting operations that would otherwise fail midway.

use crate::error::{LodestarError, Result};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion embeds every chunk.
    Ingest,
    /// Search embeds the query.
    Search,
    /// Asking embeds the query and calls the chat model.
    Ask,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation) -> Result<()> {
    match operation {
        Operation::Ingest | Operation::Search | Operation::Ask => check_api_key(),
    }
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(LodestarError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(LodestarError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check that an external tool runs.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(LodestarError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(LodestarError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(LodestarError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
