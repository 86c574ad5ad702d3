//! Typed error hierarchy for the backspace pipeline.
//!
//! Three enums cover the three failure domains:
//! - `ConfigError`: configuration and secret loading, fatal before any stage runs
//! - `AgentError`: the agent stream; recovered by the session driver except `Unavailable`
//! - `PipelineError`: stage failures that end a session with a failure result

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;
use crate::reporter::EventKind;

/// Errors raised while building a [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required secret {name} is not set")]
    SecretMissing { name: &'static str },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Errors from the coding agent and its event stream.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent command '{command}' not available: {source}")]
    Unavailable {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to read agent output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed agent event: {message}")]
    Decode { message: String },

    #[error("Agent exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("Agent stream closed without emitting any events")]
    EmptyStream,
}

/// Errors that end a pipeline run with a failure result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to clone repository: {stderr}")]
    CloneFailed { stderr: String },

    #[error("Failed to prepare workspace: {0}")]
    WorkspaceSetup(#[source] std::io::Error),

    #[error("Agent not available: {0}. Make sure the agent CLI is installed.")]
    SdkUnavailable(#[source] AgentError),

    #[error("Failed to push branch: {stderr}")]
    PushFailed { stderr: String },

    #[error("Failed to create PR: {stderr}")]
    PullRequestFailed { stderr: String },

    #[error("Session exceeded the {secs}s wall-clock limit")]
    Timeout { secs: u64 },
}

impl PipelineError {
    /// The stage a failure result is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::CloneFailed { .. } | PipelineError::WorkspaceSetup(_) => Stage::Workspace,
            PipelineError::SdkUnavailable(_) => Stage::Agent,
            PipelineError::PushFailed { .. } => Stage::Push,
            PipelineError::PullRequestFailed { .. } => Stage::PullRequest,
            PipelineError::Timeout { .. } => Stage::Sandbox,
        }
    }

    /// Feed category the failure is reported under.
    pub fn event_kind(&self) -> EventKind {
        match self {
            PipelineError::CloneFailed { .. } | PipelineError::WorkspaceSetup(_) => EventKind::Error,
            PipelineError::SdkUnavailable(_) => EventKind::SdkMissing,
            PipelineError::PushFailed { .. } => EventKind::PushFailed,
            PipelineError::PullRequestFailed { .. } => EventKind::PrFailed,
            PipelineError::Timeout { .. } => EventKind::FatalError,
        }
    }
}
