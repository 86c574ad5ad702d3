//! One-shot session: `backspace run`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use backspace::config::Config;
use backspace::pipeline::{Pipeline, SessionRequest};

/// Run a single session and print its result JSON on stdout. Returns whether
/// the session succeeded.
pub async fn cmd_run(
    config_path: Option<&Path>,
    repo_url: &str,
    prompt: &str,
    session_id: Option<String>,
) -> Result<bool> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(Arc::new(config));

    let request = SessionRequest::new(repo_url, prompt, session_id);
    let result = pipeline.run_with_timeout(&request).await;

    let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
    println!("{}", json);
    Ok(result.is_success())
}
