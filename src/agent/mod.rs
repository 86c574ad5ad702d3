//! The external coding agent, seen as a stream of [`AgentEvent`]s.

mod claude;

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::config::AgentSettings;
use crate::errors::AgentError;
use crate::stream::AgentEvent;

pub use claude::ClaudeCli;

/// Event stream returned by an agent backend. Ends when the agent finishes or
/// its connection closes.
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentEvent, AgentError>> + Send>>;

/// Everything the agent needs for one session.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    pub max_turns: u32,
    pub allowed_tools: Vec<String>,
    pub permission_mode: String,
}

impl AgentRequest {
    pub fn new(prompt: &str, working_dir: PathBuf, settings: &AgentSettings) -> Self {
        Self {
            prompt: prompt.to_string(),
            working_dir,
            max_turns: settings.max_turns,
            allowed_tools: settings.allowed_tools.clone(),
            permission_mode: settings.permission_mode.clone(),
        }
    }
}

/// Abstraction over the coding agent for testability.
/// Real implementation: `ClaudeCli`. Test doubles replay scripted events.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Start a session. Returns `AgentError::Unavailable` when the agent itself
    /// can't be found; any other error is a failure of this one session.
    async fn start(&self, request: &AgentRequest) -> Result<AgentStream, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_request_takes_settings() {
        let settings = AgentSettings::default();
        let request = AgentRequest::new("add a README", PathBuf::from("/tmp/repo"), &settings);
        assert_eq!(request.prompt, "add a README");
        assert_eq!(request.max_turns, 10);
        assert_eq!(request.allowed_tools, vec!["Read", "Write", "Bash"]);
        assert_eq!(request.permission_mode, "acceptEdits");
        assert_eq!(request.working_dir, PathBuf::from("/tmp/repo"));
    }
}
