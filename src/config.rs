//! Runtime configuration for a pipeline run.
//!
//! Non-secret settings come from an optional TOML file (`backspace.toml` in the
//! working directory, or an explicit `--config` path) merged over defaults.
//! Secrets come from the environment only and are validated before any stage
//! runs.
//!
//! ```toml
//! [agent]
//! command = "claude"
//! max_turns = 10
//! allowed_tools = ["Read", "Write", "Bash"]
//! permission_mode = "acceptEdits"
//!
//! [git]
//! user_name = "Backspace Agent"
//! user_email = "agent@backspace.run"
//! gh_command = "gh"
//! base_branch = "main"
//!
//! [branch]
//! prefix = "agent/"
//! append_session_id = false
//!
//! [sandbox]
//! timeout_secs = 1800
//! workspace_root = "/tmp"
//!
//! [reporter]
//! timeout_secs = 10
//! ```

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "backspace.toml";

pub const ENV_AGENT_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_SOURCE_CONTROL_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_LOG_SINK_URL: &str = "LOG_SINK_URL";
/// Older deployments named the sink after its backend.
const ENV_LOG_SINK_URL_ALIAS: &str = "CONVEX_URL";

/// Settings for the external coding agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agent CLI command (default: "claude")
    pub command: String,
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    pub permission_mode: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            max_turns: 10,
            allowed_tools: vec!["Read".to_string(), "Write".to_string(), "Bash".to_string()],
            permission_mode: "acceptEdits".to_string(),
        }
    }
}

/// Settings for git and the hosting-provider CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    pub user_name: String,
    pub user_email: String,
    /// Hosting-provider CLI command (default: "gh")
    pub gh_command: String,
    /// PR base branch. When unset, the branch checked out by the clone is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            user_name: "Backspace Agent".to_string(),
            user_email: "agent@backspace.run".to_string(),
            gh_command: "gh".to_string(),
            base_branch: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchSettings {
    pub prefix: String,
    /// Suffix branch names with the session id so identical prompts don't collide.
    pub append_session_id: bool,
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            prefix: "agent/".to_string(),
            append_session_id: false,
        }
    }
}

/// Limits enforced around a whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 1800,
            workspace_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterSettings {
    pub timeout_secs: u64,
}

impl Default for ReporterSettings {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Everything that may live in `backspace.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub agent: AgentSettings,
    pub git: GitSettings,
    pub branch: BranchSettings,
    pub sandbox: SandboxSettings,
    pub reporter: ReporterSettings,
}

impl Settings {
    /// Load settings from `path`, or from `backspace.toml` in the current
    /// directory when no path is given. A missing default file yields defaults;
    /// a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply command overrides from the environment (`AGENT_CMD`, `GH_CMD`).
    pub fn apply_env<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cmd) = lookup("AGENT_CMD") {
            self.agent.command = cmd;
        }
        if let Some(cmd) = lookup("GH_CMD") {
            self.git.gh_command = cmd;
        }
    }
}

/// Short-lived credentials for one process. Never persisted or logged.
pub struct Credentials {
    pub agent_api_key: SecretString,
    pub source_control_token: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("agent_api_key", &"[REDACTED]")
            .field("source_control_token", &"[REDACTED]")
            .finish()
    }
}

/// Configuration constructed once at startup and passed by reference to every
/// component.
#[derive(Debug)]
pub struct Config {
    pub settings: Settings,
    pub credentials: Credentials,
    pub log_sink_url: String,
}

impl Config {
    /// Build the configuration from `.env`, the process environment and the
    /// optional settings file. Fails fast when a required secret is missing.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is normal outside local development.
        let _ = dotenvy::dotenv();
        let settings = Settings::load(config_path)?;
        Self::from_lookup(settings, |name| std::env::var(name).ok())
    }

    /// Build the configuration from explicit settings and an environment lookup.
    pub fn from_lookup<F>(mut settings: Settings, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        settings.apply_env(&lookup);

        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::SecretMissing { name })
        };

        let agent_api_key = SecretString::from(required(ENV_AGENT_API_KEY)?);
        let source_control_token = SecretString::from(required(ENV_SOURCE_CONTROL_TOKEN)?);
        let log_sink_url = match required(ENV_LOG_SINK_URL) {
            Ok(url) => url,
            Err(_) => required(ENV_LOG_SINK_URL_ALIAS)
                .map_err(|_| ConfigError::SecretMissing {
                    name: ENV_LOG_SINK_URL,
                })?,
        };

        Ok(Self {
            settings,
            credentials: Credentials {
                agent_api_key,
                source_control_token,
            },
            log_sink_url: log_sink_url.trim_end_matches('/').to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("GITHUB_TOKEN", "ghp_test"),
            ("LOG_SINK_URL", "https://sink.example.com/"),
        ]
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.agent.command, "claude");
        assert_eq!(settings.agent.max_turns, 10);
        assert_eq!(settings.agent.allowed_tools, vec!["Read", "Write", "Bash"]);
        assert_eq!(settings.agent.permission_mode, "acceptEdits");
        assert_eq!(settings.branch.prefix, "agent/");
        assert!(!settings.branch.append_session_id);
        assert_eq!(settings.sandbox.timeout_secs, 1800);
        assert_eq!(settings.reporter.timeout_secs, 10);
        assert!(settings.git.base_branch.is_none());
    }

    #[test]
    fn test_settings_parse_partial_file_keeps_defaults() {
        let settings = Settings::parse(
            r#"
[agent]
max_turns = 4

[branch]
prefix = "bot/"
append_session_id = true
"#,
        )
        .unwrap();
        assert_eq!(settings.agent.max_turns, 4);
        assert_eq!(settings.agent.command, "claude");
        assert_eq!(settings.branch.prefix, "bot/");
        assert!(settings.branch.append_session_id);
        assert_eq!(settings.sandbox.timeout_secs, 1800);
    }

    #[test]
    fn test_settings_load_missing_explicit_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Settings::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_settings_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backspace.toml");
        std::fs::write(&path, "[agent\nmax_turns = ").unwrap();
        assert!(matches!(
            Settings::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_settings_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[sandbox]\ntimeout_secs = 60\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.sandbox.timeout_secs, 60);
    }

    #[test]
    fn test_config_from_lookup_reads_secrets() {
        let config = Config::from_lookup(Settings::default(), env(&full_env())).unwrap();
        assert_eq!(config.credentials.agent_api_key.expose_secret(), "sk-ant-test");
        assert_eq!(config.credentials.source_control_token.expose_secret(), "ghp_test");
        assert_eq!(config.log_sink_url, "https://sink.example.com");
    }

    #[test]
    fn test_config_missing_secret_fails_fast() {
        let mut pairs = full_env();
        pairs.retain(|(k, _)| *k != "GITHUB_TOKEN");
        let err = Config::from_lookup(Settings::default(), env(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SecretMissing {
                name: "GITHUB_TOKEN"
            }
        ));
    }

    #[test]
    fn test_config_blank_secret_counts_as_missing() {
        let mut pairs = full_env();
        pairs.retain(|(k, _)| *k != "ANTHROPIC_API_KEY");
        pairs.push(("ANTHROPIC_API_KEY", "   "));
        let err = Config::from_lookup(Settings::default(), env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_config_accepts_sink_url_alias() {
        let config = Config::from_lookup(
            Settings::default(),
            env(&[
                ("ANTHROPIC_API_KEY", "k"),
                ("GITHUB_TOKEN", "t"),
                ("CONVEX_URL", "https://happy-otter.convex.cloud"),
            ]),
        )
        .unwrap();
        assert_eq!(config.log_sink_url, "https://happy-otter.convex.cloud");
    }

    #[test]
    fn test_config_missing_sink_reports_primary_name() {
        let err = Config::from_lookup(
            Settings::default(),
            env(&[("ANTHROPIC_API_KEY", "k"), ("GITHUB_TOKEN", "t")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("LOG_SINK_URL"));
    }

    #[test]
    fn test_env_command_overrides() {
        let mut pairs = full_env();
        pairs.push(("AGENT_CMD", "/opt/agent"));
        pairs.push(("GH_CMD", "/opt/gh"));
        let config = Config::from_lookup(Settings::default(), env(&pairs)).unwrap();
        assert_eq!(config.settings.agent.command, "/opt/agent");
        assert_eq!(config.settings.git.gh_command, "/opt/gh");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = Config::from_lookup(Settings::default(), env(&full_env())).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-ant-test"));
        assert!(!rendered.contains("ghp_test"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
