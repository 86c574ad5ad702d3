//! HTTP invocation endpoint: `backspace serve`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use backspace::config::Config;
use backspace::pipeline::Pipeline;
use backspace::server;

pub async fn cmd_serve(config_path: Option<&Path>, host: &str, port: u16) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(Arc::new(config));
    server::serve(pipeline, host, port).await
}
