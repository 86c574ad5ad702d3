use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::{AgentBackend, AgentRequest, AgentStream};
use crate::errors::AgentError;
use crate::stream::{AgentEvent, decode_line};

/// Runs the Claude CLI in `stream-json` mode and decodes its stdout.
pub struct ClaudeCli {
    command: String,
    api_key: SecretString,
}

impl ClaudeCli {
    pub fn new(command: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            command: command.into(),
            api_key,
        }
    }

    /// Command-line arguments for one session. The prompt goes last, behind
    /// `--`, so neither the variadic `--allowedTools` nor a leading `-` in the
    /// prompt can change how it is parsed.
    pub fn args(request: &AgentRequest) -> Vec<String> {
        vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
            "--permission-mode".to_string(),
            request.permission_mode.clone(),
            "--allowedTools".to_string(),
            request.allowed_tools.join(","),
            "-p".to_string(),
            "--".to_string(),
            request.prompt.clone(),
        ]
    }
}

#[async_trait]
impl AgentBackend for ClaudeCli {
    async fn start(&self, request: &AgentRequest) -> Result<AgentStream, AgentError> {
        let mut child = Command::new(&self.command)
            .args(Self::args(request))
            .current_dir(&request.working_dir)
            .env("ANTHROPIC_API_KEY", self.api_key.expose_secret())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AgentError::Unavailable {
                        command: self.command.clone(),
                        source: e,
                    }
                } else {
                    AgentError::Spawn(e)
                }
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AgentError::Spawn(std::io::Error::other("agent stdout was not captured"))
        })?;

        // Drain stderr concurrently so a chatty agent can't block on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                if let Err(e) = stderr.read_to_string(&mut buf).await {
                    tracing::debug!("failed to read agent stderr: {}", e);
                }
                buf
            })
        });

        let state = StreamState {
            lines: BufReader::new(stdout).lines(),
            child,
            stderr_task,
            pending: VecDeque::new(),
            saw_result: false,
            finished: false,
        };

        Ok(Box::pin(futures::stream::unfold(state, next_event)))
    }
}

struct StreamState {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    stderr_task: Option<JoinHandle<String>>,
    pending: VecDeque<AgentEvent>,
    saw_result: bool,
    finished: bool,
}

async fn next_event(
    mut state: StreamState,
) -> Option<(Result<AgentEvent, AgentError>, StreamState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            if matches!(event, AgentEvent::FinalResult(_)) {
                state.saw_result = true;
            }
            return Some((Ok(event), state));
        }
        if state.finished {
            return None;
        }

        match state.lines.next_line().await {
            Ok(Some(line)) => match decode_line(&line) {
                Ok(events) => state.pending.extend(events),
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            },
            Ok(None) => {
                state.finished = true;
                return match wait_for_exit(&mut state).await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), state)),
                };
            }
            Err(e) => {
                state.finished = true;
                return Some((Err(AgentError::Io(e)), state));
            }
        }
    }
}

async fn wait_for_exit(state: &mut StreamState) -> Result<(), AgentError> {
    let status = state.child.wait().await?;
    let stderr = match state.stderr_task.take() {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        return Ok(());
    }
    // A non-zero exit after the closing result (e.g. max turns reached) is
    // already described by that result.
    if state.saw_result {
        tracing::debug!(code = ?status.code(), "agent exited non-zero after its result");
        return Ok(());
    }
    Err(AgentError::Exited {
        code: status.code(),
        stderr: stderr.trim().to_string(),
    })
}
