//! Conversation log entries.
//!
//! Each line of a session log is one JSON object. Lines are parsed into a
//! raw serde shape and normalized into [`LogMessage`]; anything that does
//! not parse is dropped by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool that replaces the whole todo list on every call.
const TODO_TOOL: &str = "TodoWrite";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
    Summary,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
}

/// Normalized content block.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Thinking {
        text: String,
    },
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        is_error: bool,
    },
}

/// One normalized log entry. `timestamp` is advisory; ordering is file
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub kind: MessageKind,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub todos: Vec<Todo>,
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub is_api_error: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLine {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    parent_uuid: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    todos: Value,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    is_api_error_message: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    stop_reason: Option<String>,
}

impl LogMessage {
    /// Parse one log line. Returns `None` for blank or malformed lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let raw: RawLine = serde_json::from_str(line).ok()?;
        Some(Self::from_raw(raw))
    }

    fn from_raw(raw: RawLine) -> Self {
        let (blocks, stop_reason) = match raw.message {
            Some(message) => (content_blocks(&message.content), message.stop_reason),
            None => (Vec::new(), None),
        };
        Self {
            kind: raw.kind,
            uuid: raw.uuid,
            parent_uuid: raw.parent_uuid,
            session_id: raw.session_id,
            timestamp: timestamp_text(&raw.timestamp),
            cwd: raw.cwd,
            git_branch: raw.git_branch,
            todos: todo_list(&raw.todos),
            blocks,
            stop_reason,
            is_api_error: raw.is_api_error_message.unwrap_or(false),
        }
    }

    pub fn is_user(&self) -> bool {
        self.kind == MessageKind::User
    }

    pub fn is_assistant(&self) -> bool {
        self.kind == MessageKind::Assistant
    }

    /// Whether this message answers the tool call `id`.
    pub fn has_tool_result_for(&self, id: &str) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == id))
    }

    pub fn has_tool_result(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }

    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A user turn that only records an interruption.
    pub fn is_interruption(&self) -> bool {
        self.is_user() && self.text().trim_start().starts_with("[Request interrupted")
    }

    /// Todo list carried by this message, either on the entry itself or as
    /// the input of a todo tool call.
    pub fn latest_todos(&self) -> Option<Vec<Todo>> {
        if !self.todos.is_empty() {
            return Some(self.todos.clone());
        }
        self.tool_uses()
            .filter(|(_, name, _)| *name == TODO_TOOL)
            .filter_map(|(_, _, input)| input.get("todos").map(todo_list))
            .last()
    }
}

/// Items that do not parse as a todo are dropped, not the whole list.
fn todo_list(value: &Value) -> Vec<Todo> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    }
}

/// ISO strings are kept as is; numeric epochs are kept as their digits.
fn timestamp_text(value: &Value) -> Option<String> {
    match value {
        Value::String(ts) => Some(ts.clone()),
        Value::Number(ts) => Some(ts.to_string()),
        _ => None,
    }
}

/// Content is either a plain string or an array of typed blocks.
fn content_blocks(content: &Value) -> Vec<ContentBlock> {
    match content {
        Value::String(text) => vec![ContentBlock::Text { text: text.clone() }],
        Value::Array(blocks) => blocks.iter().filter_map(content_block).collect(),
        _ => Vec::new(),
    }
}

fn content_block(block: &Value) -> Option<ContentBlock> {
    let str_field = |key: &str| block.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    match block.get("type").and_then(Value::as_str)? {
        "thinking" => Some(ContentBlock::Thinking {
            text: str_field("thinking"),
        }),
        "text" => Some(ContentBlock::Text {
            text: str_field("text"),
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            id: str_field("id"),
            name: str_field("name"),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        "tool_result" => Some(ContentBlock::ToolResult {
            tool_use_id: str_field("tool_use_id"),
            is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
        }),
        _ => None,
    }
}
