//! Agent events decoded from the agent CLI's `stream-json` output.
//!
//! Each stdout line is one JSON message. A message is decoded at the boundary
//! into zero or more [`AgentEvent`]s; nothing downstream inspects raw JSON.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::AgentError;

/// One unit of the agent's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Session start: the tool inventory and the agent's own session handle.
    Init {
        tools: Vec<String>,
        session_handle: Option<String>,
    },
    AssistantText {
        text: String,
    },
    ToolInvocation {
        id: String,
        call: ToolCall,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    FinalResult(FinalResult),
    /// A well-formed message of a type this decoder doesn't know.
    Unrecognized {
        kind: String,
    },
}

/// A tool invocation, with the arguments the reporter cares about lifted out.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Read { file_path: String },
    Write { file_path: String },
    List { path: String },
    Shell { command: String },
    Other { name: String, input: Value },
}

impl ToolCall {
    pub fn from_tool_use(name: &str, input: Value) -> Self {
        let arg = |key: &str| {
            input
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        match name {
            "Read" => ToolCall::Read {
                file_path: arg("file_path"),
            },
            "Write" | "Edit" | "MultiEdit" => ToolCall::Write {
                file_path: arg("file_path"),
            },
            "LS" => ToolCall::List { path: arg("path") },
            "Bash" => ToolCall::Shell {
                command: arg("command"),
            },
            _ => ToolCall::Other {
                name: name.to_string(),
                input,
            },
        }
    }
}

/// Session statistics from the agent's closing `result` message.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult {
    pub num_turns: u32,
    pub duration_ms: u64,
    pub duration_api_ms: u64,
    pub total_cost_usd: f64,
    pub is_success: bool,
    pub result: Option<String>,
}

// ── Raw wire format ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamMessage {
    #[serde(rename = "system")]
    System {
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
    },

    #[serde(rename = "assistant")]
    Assistant { message: MessageBody },

    #[serde(rename = "user")]
    User { message: MessageBody },

    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        num_turns: u32,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        duration_api_ms: u64,
        #[serde(default)]
        total_cost_usd: f64,
    },
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: MessageContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Blocks(Vec<ContentBlock>),
    Text(String),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        id: String,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },

    #[serde(other)]
    Other,
}

/// Decode one line of agent output. Blank lines decode to no events.
pub fn decode_line(line: &str) -> Result<Vec<AgentEvent>, AgentError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed).map_err(|e| AgentError::Decode {
        message: format!("{}: {}", e, truncate_chars(trimmed, 120)),
    })?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| AgentError::Decode {
            message: format!("message has no type: {}", truncate_chars(trimmed, 120)),
        })?
        .to_string();

    if !matches!(kind.as_str(), "system" | "assistant" | "user" | "result") {
        return Ok(vec![AgentEvent::Unrecognized { kind }]);
    }

    let message: StreamMessage = serde_json::from_value(value).map_err(|e| AgentError::Decode {
        message: format!("{} message: {}", kind, e),
    })?;
    Ok(flatten(message))
}

fn flatten(message: StreamMessage) -> Vec<AgentEvent> {
    match message {
        StreamMessage::System {
            subtype,
            session_id,
            tools,
        } => {
            if subtype == "init" {
                vec![AgentEvent::Init {
                    tools,
                    session_handle: session_id,
                }]
            } else {
                vec![AgentEvent::Unrecognized {
                    kind: format!("system/{}", subtype),
                }]
            }
        }
        StreamMessage::Assistant { message } => match message.content {
            MessageContent::Text(text) => vec![AgentEvent::AssistantText { text }],
            MessageContent::Blocks(blocks) => blocks.into_iter().filter_map(block_event).collect(),
        },
        // User turns only matter for the tool results they carry; plain text is
        // the prompt echoed back.
        StreamMessage::User { message } => match message.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .into_iter()
                .filter(|block| matches!(block, ContentBlock::ToolResult { .. }))
                .filter_map(block_event)
                .collect(),
        },
        StreamMessage::Result {
            subtype,
            result,
            is_error,
            num_turns,
            duration_ms,
            duration_api_ms,
            total_cost_usd,
        } => vec![AgentEvent::FinalResult(FinalResult {
            num_turns,
            duration_ms,
            duration_api_ms,
            total_cost_usd,
            is_success: subtype == "success" && !is_error,
            result,
        })],
    }
}

fn block_event(block: ContentBlock) -> Option<AgentEvent> {
    match block {
        ContentBlock::Text { text } => Some(AgentEvent::AssistantText { text }),
        ContentBlock::ToolUse { name, input, id } => Some(AgentEvent::ToolInvocation {
            id,
            call: ToolCall::from_tool_use(&name, input),
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(AgentEvent::ToolResult {
            tool_use_id,
            content: render_tool_content(&content),
            is_error,
        }),
        // Thinking blocks and similar carry nothing for the feed.
        ContentBlock::Other => None,
    }
}

/// Tool results arrive either as a plain string or as a list of text blocks.
fn render_tool_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
