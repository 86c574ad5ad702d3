//! Configuration display: `backspace config`.

use std::path::Path;

use anyhow::{Context, Result};
use backspace::config::{
    DEFAULT_CONFIG_FILE, ENV_AGENT_API_KEY, ENV_LOG_SINK_URL, ENV_SOURCE_CONTROL_TOKEN, Settings,
};

/// Print the effective non-secret settings and which secrets are present.
/// Secret values are never printed.
pub fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let _ = dotenvy::dotenv();
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    settings.apply_env(&|name: &str| std::env::var(name).ok());

    let source = config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    println!("# Effective configuration (file: {})", source);
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&settings).context("Failed to render settings")?
    );
    println!();
    println!("# Secrets");
    for name in [ENV_AGENT_API_KEY, ENV_SOURCE_CONTROL_TOKEN, ENV_LOG_SINK_URL] {
        let present = std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
        println!("# {} = {}", name, if present { "set" } else { "missing" });
    }
    Ok(())
}
