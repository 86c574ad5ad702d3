//! Agent session driver: runs the agent to completion and turns its event
//! stream into reported feed entries and a [`SessionAggregate`].
//!
//! Stream failures are absorbed here. The session degrades to an `Error: ...`
//! summary and the pipeline carries on into reconciliation with whatever the
//! agent left on disk. Only a missing agent binary escapes as an error.

use std::path::Path;

use futures::StreamExt;
use serde_json::json;

use crate::agent::{AgentBackend, AgentRequest};
use crate::config::AgentSettings;
use crate::errors::{AgentError, PipelineError};
use crate::reporter::{EventKind, SessionReporter};
use crate::stream::{AgentEvent, ToolCall, truncate_chars};

/// Longest assistant text forwarded to the feed.
pub const ASSISTANT_TEXT_LIMIT: usize = 150;
/// Longest raw tool argument dump forwarded to the feed.
pub const TOOL_ARGS_LIMIT: usize = 100;
/// Longest shell command or tool result forwarded to the feed.
pub const TOOL_OUTPUT_LIMIT: usize = 200;

pub const FALLBACK_SUMMARY: &str = "Agent session completed";

/// Running totals folded from the agent's events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAggregate {
    /// Every event in arrival order, untruncated.
    pub events: Vec<AgentEvent>,
    pub total_cost_usd: f64,
    pub num_turns: u32,
    pub final_summary: Option<String>,
}

impl SessionAggregate {
    pub fn message_count(&self) -> usize {
        self.events.len()
    }

    /// Fold one event. A final result overwrites cost, turns and summary.
    pub fn record(&mut self, event: AgentEvent) {
        if let AgentEvent::FinalResult(result) = &event {
            self.total_cost_usd = result.total_cost_usd;
            self.num_turns = result.num_turns;
            self.final_summary = result.result.clone();
        }
        self.events.push(event);
    }
}

/// What a finished session hands to reconciliation and publishing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub aggregate: SessionAggregate,
    pub summary: String,
    /// Set when the session ended on a recovered agent error.
    pub error: Option<String>,
}

/// Map an event to its feed category and a size-bounded message.
pub fn classify(event: &AgentEvent) -> (EventKind, String) {
    match event {
        AgentEvent::Init {
            tools,
            session_handle,
        } => {
            let shown: Vec<&str> = tools.iter().take(5).map(String::as_str).collect();
            (
                EventKind::AgentInit,
                format!(
                    "Agent initialized with {} tools: {} (session: {})",
                    tools.len(),
                    shown.join(", "),
                    session_handle.as_deref().unwrap_or("unknown")
                ),
            )
        }
        AgentEvent::AssistantText { text } => (
            EventKind::AgentResponse,
            format!("Agent: {}", truncate_chars(text, ASSISTANT_TEXT_LIMIT)),
        ),
        AgentEvent::ToolInvocation { call, .. } => match call {
            ToolCall::Read { file_path } => {
                (EventKind::AgentToolRead, format!("Reading file: {}", file_path))
            }
            ToolCall::Write { file_path } => {
                (EventKind::AgentToolWrite, format!("Writing file: {}", file_path))
            }
            ToolCall::List { path } => (EventKind::AgentToolLs, format!("Listing directory: {}", path)),
            ToolCall::Shell { command } => (
                EventKind::AgentToolBash,
                format!("Running command: {}", truncate_chars(command, TOOL_OUTPUT_LIMIT)),
            ),
            ToolCall::Other { name, input } => {
                let args = input.to_string();
                (
                    EventKind::AgentTool,
                    format!("Tool: {} - {}", name, truncate_chars(&args, TOOL_ARGS_LIMIT)),
                )
            }
        },
        AgentEvent::ToolResult {
            content, is_error, ..
        } => {
            let label = if *is_error { "Tool error" } else { "Tool result" };
            (
                EventKind::AgentToolResult,
                format!("{}: {}", label, truncate_chars(content, TOOL_OUTPUT_LIMIT)),
            )
        }
        AgentEvent::FinalResult(result) => {
            let stats = json!({
                "cost_usd": result.total_cost_usd,
                "duration_ms": result.duration_ms,
                "api_duration_ms": result.duration_api_ms,
                "turns": result.num_turns,
                "success": result.is_success,
            });
            let mut message = format!(
                "Agent completed with {} turns. Statistics: {}",
                result.num_turns, stats
            );
            if let Some(text) = &result.result {
                message.push_str(&format!(". Result: {}", text));
            }
            (EventKind::AgentResult, message)
        }
        AgentEvent::Unrecognized { kind } => (
            EventKind::AgentUnknownMessage,
            format!("Unknown message type: {}", kind),
        ),
    }
}

/// Drives one agent session in a single workspace.
pub struct SessionDriver<'a> {
    backend: &'a dyn AgentBackend,
    reporter: &'a SessionReporter,
    settings: &'a AgentSettings,
}

impl<'a> SessionDriver<'a> {
    pub fn new(
        backend: &'a dyn AgentBackend,
        reporter: &'a SessionReporter,
        settings: &'a AgentSettings,
    ) -> Self {
        Self {
            backend,
            reporter,
            settings,
        }
    }

    /// Run the agent against `workspace` until its stream closes.
    pub async fn run(&self, prompt: &str, workspace: &Path) -> Result<SessionOutcome, PipelineError> {
        let request = AgentRequest::new(prompt, workspace.to_path_buf(), self.settings);
        self.reporter
            .emit(
                EventKind::AgentConfig,
                format!(
                    "Agent configured: max {} turns, tools [{}], permission mode {}",
                    request.max_turns,
                    request.allowed_tools.join(", "),
                    request.permission_mode
                ),
            )
            .await;
        self.reporter
            .emit(EventKind::AgentStart, format!("Starting agent: {}", prompt))
            .await;

        let mut aggregate = SessionAggregate::default();
        let result = match self.backend.start(&request).await {
            Ok(mut stream) => {
                let mut failure = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            let (kind, message) = classify(&event);
                            aggregate.record(event);
                            self.reporter.emit(kind, message).await;
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                match failure {
                    Some(e) => Err(e),
                    None if aggregate.events.is_empty() => Err(AgentError::EmptyStream),
                    None => Ok(()),
                }
            }
            Err(e @ AgentError::Unavailable { .. }) => {
                return Err(PipelineError::SdkUnavailable(e));
            }
            Err(e) => Err(e),
        };

        Ok(match result {
            Ok(()) => {
                self.reporter
                    .emit(
                        EventKind::AgentSuccess,
                        format!(
                            "Agent session completed with {} messages",
                            aggregate.message_count()
                        ),
                    )
                    .await;
                let summary = aggregate
                    .final_summary
                    .clone()
                    .unwrap_or_else(|| FALLBACK_SUMMARY.to_string());
                SessionOutcome {
                    aggregate,
                    summary,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "agent session failed; continuing with partial changes");
                self.reporter
                    .emit(EventKind::AgentError, format!("Agent error: {}", e))
                    .await;
                SessionOutcome {
                    aggregate,
                    summary: format!("Error: {}", e),
                    error: Some(e.to_string()),
                }
            }
        })
    }
}
