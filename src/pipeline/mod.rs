//! End-to-end session pipeline.
//!
//! ```text
//! setup -> workspace -> branch -> agent session -> reconcile -> publish
//! ```
//!
//! Stages run strictly in order. Each one either absorbs its own failures
//! (branch creation, commits, remote rewrite) or returns a [`PipelineError`]
//! that ends the run. Every run yields exactly one [`PipelineResult`], and
//! the workspace is dropped before it is returned.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use tracing::Instrument;

use crate::agent::{AgentBackend, ClaudeCli};
use crate::branch;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::github;
use crate::publish::{self, PublishRequest};
use crate::reconcile;
use crate::reporter::{EventKind, EventReporter, HttpReporter, SessionReporter};
use crate::session::SessionDriver;
use crate::workspace::Workspace;

const FALLBACK_BASE_BRANCH: &str = "main";

/// Stage a failure result is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Workspace,
    Agent,
    Push,
    PullRequest,
    /// The run as a whole, e.g. the wall-clock ceiling.
    Sandbox,
}

/// One invocation: which repository, what to do, and the id events are
/// reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub repo_url: String,
    pub prompt: String,
    pub session_id: String,
}

impl SessionRequest {
    /// Build a request, generating a v4 session id when none is given.
    pub fn new(repo_url: impl Into<String>, prompt: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            repo_url: repo_url.into(),
            prompt: prompt.into(),
            session_id: session_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub messages: usize,
    pub turns: u32,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedSession {
    pub pr_url: String,
    pub branch: String,
    pub summary: String,
    pub message: String,
    pub stats: SessionStats,
}

/// The single outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Success(PublishedSession),
    Failure { stage: Stage, error: String },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    fn from_error(error: &PipelineError) -> Self {
        PipelineResult::Failure {
            stage: error.stage(),
            error: error.to_string(),
        }
    }
}

impl Serialize for PipelineResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PipelineResult::Success(published) => {
                let mut s = serializer.serialize_struct("PipelineResult", 6)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("prUrl", &published.pr_url)?;
                s.serialize_field("branch", &published.branch)?;
                s.serialize_field("summary", &published.summary)?;
                s.serialize_field("message", &published.message)?;
                s.serialize_field("stats", &published.stats)?;
                s.end()
            }
            PipelineResult::Failure { stage, error } => {
                let mut s = serializer.serialize_struct("PipelineResult", 3)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("stage", stage)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

/// Runs sessions against one configuration. Cheap to clone; concurrent runs
/// share only read-only state.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    reporter: Arc<dyn EventReporter>,
    agent: Arc<dyn AgentBackend>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        reporter: Arc<dyn EventReporter>,
        agent: Arc<dyn AgentBackend>,
    ) -> Self {
        Self {
            config,
            reporter,
            agent,
        }
    }

    /// Production wiring: HTTP log sink and the agent CLI.
    pub fn from_config(config: Arc<Config>) -> Self {
        let reporter = HttpReporter::new(
            &config.log_sink_url,
            Duration::from_secs(config.settings.reporter.timeout_secs),
        );
        let api_key = SecretString::from(config.credentials.agent_api_key.expose_secret().to_string());
        let agent = ClaudeCli::new(config.settings.agent.command.clone(), api_key);
        Self::new(config, Arc::new(reporter), Arc::new(agent))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one session under the configured wall-clock ceiling. On expiry the
    /// in-flight stage is dropped, which kills child processes and removes the
    /// workspace.
    pub async fn run_with_timeout(&self, request: &SessionRequest) -> PipelineResult {
        let secs = self.config.settings.sandbox.timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                let error = PipelineError::Timeout { secs };
                tracing::error!(session_id = %request.session_id, "{}", error);
                SessionReporter::new(self.reporter.clone(), request.session_id.as_str())
                    .emit(error.event_kind(), error.to_string())
                    .await;
                PipelineResult::from_error(&error)
            }
        }
    }

    /// Run one session to completion.
    pub async fn run(&self, request: &SessionRequest) -> PipelineResult {
        let span = tracing::info_span!("session", session_id = %request.session_id);
        async {
            let reporter = SessionReporter::new(self.reporter.clone(), request.session_id.as_str());
            match self.execute(request, &reporter).await {
                Ok(published) => {
                    reporter
                        .emit(
                            EventKind::Success,
                            format!("Successfully created PR: {}", published.pr_url),
                        )
                        .await;
                    PipelineResult::Success(published)
                }
                Err(error) => {
                    tracing::error!(stage = ?error.stage(), "{}", error);
                    reporter.emit(error.event_kind(), error.to_string()).await;
                    PipelineResult::from_error(&error)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &SessionRequest,
        reporter: &SessionReporter,
    ) -> Result<PublishedSession, PipelineError> {
        let settings = &self.config.settings;

        reporter
            .emit(
                EventKind::Setup,
                format!(
                    "Starting session for {}: {}",
                    github::redact_url(&request.repo_url),
                    request.prompt
                ),
            )
            .await;
        let token = self.config.credentials.source_control_token.expose_secret();
        if !github::is_valid_github_token(token) {
            tracing::warn!("source-control token does not look like a GitHub token");
        }
        reporter
            .emit(EventKind::AuthComplete, "Credentials loaded")
            .await;

        let workspace = Workspace::acquire(&request.repo_url, &self.config, reporter).await?;
        tracing::debug!(workspace = %workspace.root().display(), "workspace ready");

        let suffix = settings
            .branch
            .append_session_id
            .then_some(request.session_id.as_str());
        let branch_name = branch::derive_branch_name(&settings.branch.prefix, &request.prompt, suffix);
        branch::create_branch(workspace.path(), &branch_name, reporter).await;

        let session = SessionDriver::new(self.agent.as_ref(), reporter, &settings.agent)
            .run(&request.prompt, workspace.path())
            .await?;

        let reconciliation =
            reconcile::reconcile(workspace.path(), &request.prompt, &session, reporter).await;
        tracing::debug!(outcome = ?reconciliation.outcome, files = reconciliation.changes.len(), "reconciled");

        let base = settings
            .git
            .base_branch
            .as_deref()
            .or(workspace.default_branch())
            .unwrap_or(FALLBACK_BASE_BRANCH);
        let pr_url = publish::publish(
            workspace.path(),
            &PublishRequest {
                repo_url: &request.repo_url,
                branch: &branch_name,
                base,
                prompt: &request.prompt,
                session: &session,
                changes: &reconciliation.changes,
            },
            &self.config,
            reporter,
        )
        .await?;

        Ok(PublishedSession {
            pr_url,
            branch: branch_name,
            message: format!("Agent successfully implemented: {}", request.prompt),
            stats: SessionStats {
                messages: session.aggregate.message_count(),
                turns: session.aggregate.num_turns,
                total_cost_usd: session.aggregate.total_cost_usd,
            },
            summary: session.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_request_generates_id() {
        let a = SessionRequest::new("url", "p", None);
        let b = SessionRequest::new("url", "p", Some("  ".into()));
        assert_eq!(a.session_id.len(), 36);
        assert_ne!(a.session_id, b.session_id);
        let c = SessionRequest::new("url", "p", Some("given".into()));
        assert_eq!(c.session_id, "given");
    }

    #[test]
    fn test_success_result_json_shape() {
        let result = PipelineResult::Success(PublishedSession {
            pr_url: "https://github.com/o/r/pull/1".into(),
            branch: "agent/x".into(),
            summary: "done".into(),
            message: "Agent successfully implemented: x".into(),
            stats: SessionStats {
                messages: 7,
                turns: 4,
                total_cost_usd: 1.23,
            },
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["prUrl"], "https://github.com/o/r/pull/1");
        assert_eq!(value["branch"], "agent/x");
        assert_eq!(value["stats"]["messages"], 7);
        assert_eq!(value["stats"]["turns"], 4);
        assert_eq!(value["stats"]["totalCostUsd"], 1.23);
    }

    #[test]
    fn test_failure_result_json_shape() {
        let error = PipelineError::CloneFailed {
            stderr: "repository not found".into(),
        };
        let result = PipelineResult::from_error(&error);
        assert!(!result.is_success());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["stage"], "workspace");
        assert!(value["error"].as_str().unwrap().contains("clone"));
        assert!(value.get("prUrl").is_none());
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Stage::PullRequest).unwrap(),
            serde_json::json!("pull_request")
        );
    }
}
