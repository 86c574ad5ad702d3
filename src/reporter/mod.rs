//! Best-effort event reporting to the remote log sink.
//!
//! Reporting never fails from the caller's point of view: the [`EventReporter`]
//! method has no error channel, and sink failures are echoed locally through
//! `tracing` instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Mutation path the sink appends log records under.
const LOGS_ADD_PATH: &str = "logs:add";

/// Category of a reported event. Rendered as a stable snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Setup,
    AuthComplete,
    GitClone,
    RepoReady,
    RemoteConfigFailed,
    BranchCreated,
    BranchFailed,
    AgentConfig,
    AgentStart,
    AgentInit,
    AgentResponse,
    AgentToolRead,
    AgentToolWrite,
    AgentToolLs,
    AgentToolBash,
    AgentTool,
    AgentToolResult,
    AgentResult,
    AgentUnknownMessage,
    AgentSuccess,
    AgentError,
    GitCheck,
    ChangesFound,
    GitCommitted,
    GitCommitFailed,
    NoChanges,
    PrStart,
    PushSuccess,
    PushFailed,
    PrFailed,
    Success,
    Error,
    SdkMissing,
    FatalError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Setup => "setup",
            EventKind::AuthComplete => "auth_complete",
            EventKind::GitClone => "git_clone",
            EventKind::RepoReady => "repo_ready",
            EventKind::RemoteConfigFailed => "remote_config_failed",
            EventKind::BranchCreated => "branch_created",
            EventKind::BranchFailed => "branch_failed",
            EventKind::AgentConfig => "agent_config",
            EventKind::AgentStart => "agent_start",
            EventKind::AgentInit => "agent_init",
            EventKind::AgentResponse => "agent_response",
            EventKind::AgentToolRead => "agent_tool_read",
            EventKind::AgentToolWrite => "agent_tool_write",
            EventKind::AgentToolLs => "agent_tool_ls",
            EventKind::AgentToolBash => "agent_tool_bash",
            EventKind::AgentTool => "agent_tool",
            EventKind::AgentToolResult => "agent_tool_result",
            EventKind::AgentResult => "agent_result",
            EventKind::AgentUnknownMessage => "agent_unknown_message",
            EventKind::AgentSuccess => "agent_success",
            EventKind::AgentError => "agent_error",
            EventKind::GitCheck => "git_check",
            EventKind::ChangesFound => "changes_found",
            EventKind::GitCommitted => "git_committed",
            EventKind::GitCommitFailed => "git_commit_failed",
            EventKind::NoChanges => "no_changes",
            EventKind::PrStart => "pr_start",
            EventKind::PushSuccess => "push_success",
            EventKind::PushFailed => "push_failed",
            EventKind::PrFailed => "pr_failed",
            EventKind::Success => "success",
            EventKind::Error => "error",
            EventKind::SdkMissing => "sdk_missing",
            EventKind::FatalError => "fatal_error",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for session events. Implementations must swallow their own failures.
#[async_trait]
pub trait EventReporter: Send + Sync {
    async fn report(&self, session_id: &str, kind: EventKind, message: &str);
}

/// A reporter bound to one session id.
#[derive(Clone)]
pub struct SessionReporter {
    inner: Arc<dyn EventReporter>,
    session_id: String,
}

impl SessionReporter {
    pub fn new(inner: Arc<dyn EventReporter>, session_id: impl Into<String>) -> Self {
        Self {
            inner,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn emit(&self, kind: EventKind, message: impl AsRef<str>) {
        self.inner
            .report(&self.session_id, kind, message.as_ref())
            .await;
    }
}

#[derive(Debug, Serialize)]
struct LogArgs<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'a str,
    #[serde(rename = "sessionId")]
    session_id: &'a str,
}

#[derive(Debug, Serialize)]
struct MutationBody<'a> {
    path: &'static str,
    args: LogArgs<'a>,
}

fn mutation_body<'a>(session_id: &'a str, kind: EventKind, message: &'a str) -> MutationBody<'a> {
    MutationBody {
        path: LOGS_ADD_PATH,
        args: LogArgs {
            kind: kind.as_str(),
            message,
            session_id,
        },
    }
}

/// Posts one JSON mutation per event to `<base_url>/api/mutation`.
///
/// Without an HTTP client (the TLS backend failed to initialise) events are
/// only written to the local trace.
pub struct HttpReporter {
    client: Option<reqwest::Client>,
    endpoint: String,
}

impl HttpReporter {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("log sink disabled, HTTP client unavailable: {}", e);
                None
            }
        };
        Self::with_client(client, base_url)
    }

    fn with_client(client: Option<reqwest::Client>, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/mutation", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventReporter for HttpReporter {
    async fn report(&self, session_id: &str, kind: EventKind, message: &str) {
        let Some(client) = &self.client else {
            tracing::info!(session_id, "[{}] {} (sink disabled)", kind, message);
            return;
        };
        let body = mutation_body(session_id, kind, message);
        match client.post(&self.endpoint).json(&body).send().await {
            Ok(resp) => {
                tracing::info!(
                    session_id,
                    "[{}] {} (sink: {})",
                    kind,
                    message,
                    resp.status().as_u16()
                );
            }
            Err(e) => {
                tracing::warn!(session_id, "[{}] {} (sink failed: {})", kind, message, e);
            }
        }
    }
}

/// Echoes events to the local trace only. Used when no sink should be contacted.
pub struct TraceReporter;

#[async_trait]
impl EventReporter for TraceReporter {
    async fn report(&self, session_id: &str, kind: EventKind, message: &str) {
        tracing::info!(session_id, "[{}] {}", kind, message);
    }
}
