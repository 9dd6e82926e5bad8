//! Point-in-time session state rebuilt from the tail of a conversation log.

use serde::Serialize;

use super::log::{ContentBlock, LogMessage, Todo};
use crate::agent::claude::TOOL_VERBS;
use crate::agent::screen::text_prompt;
use crate::agent::{tool_verb, AgentResult};

/// Only the newest messages describe the current state.
pub const DEFAULT_WINDOW: usize = 20;

/// Trailing lines of assistant text searched for a question or menu.
const PROMPT_LINES: usize = 10;
/// Lines longer than this end the search for menu options.
const PROSE_LINE_CHARS: usize = 80;

const STOP_REASON_TOOL_USE: &str = "tool_use";
const PERMISSION_QUESTION: &str = "Waiting for permission...";

/// Derived state of one session. Recomputed on every read, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub last_activity: Option<String>,
    pub is_working: bool,
    pub is_waiting: bool,
    pub is_thinking: bool,
    pub current_tool: Option<String>,
    pub last_tool_name: Option<String>,
    pub pending_tool_use_id: Option<String>,
    pub pending_tool_name: Option<String>,
    pub is_waiting_permission: bool,
    pub todos: Vec<Todo>,
    pub question: Option<String>,
    pub choices: Vec<String>,
    pub last_assistant_text: Option<String>,
    pub error_text: Option<String>,
}

/// Replay the newest [`DEFAULT_WINDOW`] messages.
pub fn reconstruct(messages: &[LogMessage]) -> SessionState {
    reconstruct_window(messages, DEFAULT_WINDOW)
}

pub fn reconstruct_window(messages: &[LogMessage], window: usize) -> SessionState {
    let window = &messages[messages.len().saturating_sub(window)..];
    let mut state = SessionState::default();

    pair_tool_calls(window, &mut state);
    current_flags(window, &mut state);

    if state.question.is_some() && !state.is_working {
        state.is_waiting = true;
    }
    // Only a possible permission wait; the terminal classifier can see the
    // actual prompt and tell it apart from a slow tool.
    state.is_waiting_permission = state.pending_tool_use_id.is_some();
    state
}

/// Forward pass, oldest to newest: metadata, todos and tool call pairing.
///
/// Tool calls are not pipelined, so the latest call is the only one that
/// can be pending and the first result carrying its id clears it.
fn pair_tool_calls(window: &[LogMessage], state: &mut SessionState) {
    for msg in window {
        if msg.session_id.is_some() {
            state.session_id = msg.session_id.clone();
        }
        if msg.cwd.is_some() {
            state.cwd = msg.cwd.clone();
        }
        if msg.git_branch.is_some() {
            state.git_branch = msg.git_branch.clone();
        }
        if msg.timestamp.is_some() {
            state.last_activity = msg.timestamp.clone();
        }
        if let Some(todos) = msg.latest_todos() {
            state.todos = todos;
        }

        if msg.is_assistant() {
            for (id, name, _) in msg.tool_uses() {
                state.pending_tool_use_id = Some(id.to_string());
                state.pending_tool_name = Some(name.to_string());
                state.last_tool_name = Some(name.to_string());
            }
        } else if msg.is_user() {
            let resolved = state
                .pending_tool_use_id
                .as_deref()
                .map_or(false, |id| msg.has_tool_result_for(id));
            if resolved || msg.is_interruption() {
                state.pending_tool_use_id = None;
                state.pending_tool_name = None;
            }
        }
    }
}

/// Backward pass, newest to oldest, stopping at the first user message:
/// what the agent is doing right now.
fn current_flags(window: &[LogMessage], state: &mut SessionState) {
    let Some(last_idx) = window.len().checked_sub(1) else {
        return;
    };
    let mut seen_text = false;

    for (idx, msg) in window.iter().enumerate().rev() {
        let is_last = idx == last_idx;

        if msg.is_user() {
            if is_last {
                if msg.has_tool_result() {
                    state.is_working = true;
                } else {
                    state.is_waiting = true;
                }
            }
            break;
        }
        if !msg.is_assistant() {
            continue;
        }

        if msg.is_api_error && state.error_text.is_none() {
            state.error_text = Some(msg.text()).filter(|t| !t.is_empty());
        }

        for block in msg.blocks.iter().rev() {
            match block {
                ContentBlock::Thinking { .. } => {
                    if !seen_text && !state.is_thinking {
                        state.is_thinking = true;
                    }
                }
                ContentBlock::Text { text } => {
                    if !seen_text && !text.trim().is_empty() {
                        seen_text = true;
                        state.last_assistant_text = Some(text.clone());
                        let prompt = text_prompt(text, PROMPT_LINES, PROSE_LINE_CHARS);
                        state.question = prompt.question;
                        state.choices = prompt.choices;
                    }
                }
                ContentBlock::ToolUse { name, .. } => {
                    if is_last {
                        state.is_working = true;
                        if state.current_tool.is_none() {
                            state.current_tool = Some(name.clone());
                        }
                    }
                }
                ContentBlock::ToolResult { .. } => {}
            }
        }

        if is_last {
            if msg.stop_reason.as_deref() == Some(STOP_REASON_TOOL_USE) {
                state.is_working = true;
            } else if !state.is_working {
                state.is_waiting = true;
            }
        }
    }
}

impl SessionState {
    /// Project onto the same result shape the terminal classifiers produce.
    pub fn to_result(&self) -> AgentResult {
        if !self.choices.is_empty() {
            return AgentResult::choice(self.question.clone(), self.choices.clone());
        }
        if self.is_waiting_permission {
            let question = self
                .question
                .clone()
                .unwrap_or_else(|| PERMISSION_QUESTION.to_string());
            return AgentResult::question(question);
        }
        if let Some(question) = &self.question {
            return AgentResult::question(question.clone());
        }
        if let Some(error) = &self.error_text {
            return AgentResult::error(error.clone());
        }
        if self.is_working || self.current_tool.is_some() {
            let activity = match (&self.current_tool, self.is_thinking) {
                (Some(tool), _) => tool_verb(TOOL_VERBS, tool),
                (None, true) => "Thinking".to_string(),
                (None, false) => "Working".to_string(),
            };
            return AgentResult::working(activity);
        }
        if self.is_waiting {
            // Waiting for free-form input reads the same as a question.
            return AgentResult::awaiting_input();
        }
        AgentResult::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ResultKind;

    fn parse(lines: &[&str]) -> Vec<LogMessage> {
        lines.iter().filter_map(|l| LogMessage::parse_line(l)).collect()
    }

    fn user(text: &str) -> String {
        serde_json::json!({"type": "user", "message": {"role": "user", "content": text}}).to_string()
    }

    fn assistant_text(text: &str, stop: &str) -> String {
        serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "text", "text": text}], "stop_reason": stop}
        })
        .to_string()
    }

    fn tool_use(id: &str, name: &str) -> String {
        serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": id, "name": name, "input": {}}], "stop_reason": "tool_use"}
        })
        .to_string()
    }

    fn tool_result(id: &str) -> String {
        serde_json::json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": id, "content": "ok"}]}
        })
        .to_string()
    }

    fn replay(lines: &[String]) -> SessionState {
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        reconstruct(&parse(&refs))
    }

    #[test]
    fn test_latest_pending_call_resolved() {
        let state = replay(&[tool_use("A", "Read"), tool_use("B", "Bash"), tool_result("B")]);
        assert_eq!(state.pending_tool_use_id, None);
        assert_eq!(state.pending_tool_name, None);
        assert!(!state.is_waiting_permission);
        assert_eq!(state.last_tool_name.as_deref(), Some("Bash"));
        assert!(state.is_working);
    }

    #[test]
    fn test_unanswered_call_may_wait_for_permission() {
        let state = replay(&[user("delete build dir"), tool_use("A", "Bash")]);
        assert_eq!(state.pending_tool_use_id.as_deref(), Some("A"));
        assert!(state.is_waiting_permission);
        assert!(state.is_working);
        assert_eq!(state.current_tool.as_deref(), Some("Bash"));

        let result = state.to_result();
        assert_eq!(result.kind, ResultKind::Question);
        assert_eq!(result.question.as_deref(), Some("Waiting for permission..."));
    }

    #[test]
    fn test_question_in_final_text() {
        let state = replay(&[user("refactor"), assistant_text("Done.\nShould I run the tests?", "end_turn")]);
        assert_eq!(state.question.as_deref(), Some("Should I run the tests?"));
        assert!(state.is_waiting);
        assert!(!state.is_working);
        assert_eq!(state.to_result(), AgentResult::question("Should I run the tests?"));
    }

    #[test]
    fn test_choices_in_final_text() {
        let text = "Two options.\nWhich do you want?\n1. Keep the cache\n2. Drop the cache";
        let state = replay(&[user("help"), assistant_text(text, "end_turn")]);
        let result = state.to_result();
        assert_eq!(result.kind, ResultKind::Choice);
        assert_eq!(result.question.as_deref(), Some("Which do you want?"));
        assert_eq!(result.choices, vec!["Keep the cache", "Drop the cache"]);
    }

    #[test]
    fn test_finished_turn_waits_for_input() {
        let state = replay(&[user("hi"), assistant_text("All done.", "end_turn")]);
        assert!(state.is_waiting);
        let result = state.to_result();
        assert_eq!(result.kind, ResultKind::Question);
        assert_eq!(result.question, None);
    }

    #[test]
    fn test_tool_result_last_means_working() {
        let state = replay(&[user("go"), tool_use("A", "Read"), tool_result("A")]);
        assert!(state.is_working);
        assert!(!state.is_waiting);
        assert_eq!(state.to_result(), AgentResult::working("Working"));
    }

    #[test]
    fn test_trailing_user_prompt_waits() {
        let state = replay(&[assistant_text("Hello", "end_turn"), user("add a flag")]);
        assert!(state.is_waiting);
        assert!(!state.is_working);
        assert_eq!(state.last_assistant_text, None);
        assert_eq!(state.to_result(), AgentResult::awaiting_input());
    }

    #[test]
    fn test_interruption_waits() {
        let state = replay(&[tool_use("A", "Bash"), user("[Request interrupted by user for tool use]")]);
        assert!(state.is_waiting);
        assert!(!state.is_working);
        assert!(!state.is_waiting_permission);
    }

    #[test]
    fn test_thinking_with_tool_call_works() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "tool_use", "id": "T", "name": "Read", "input": {}}
            ], "stop_reason": "tool_use"}
        })
        .to_string();
        let mut state = replay(&[user("why?"), line]);
        assert!(state.is_thinking);
        assert!(state.is_working);
        state.is_waiting_permission = false;
        assert_eq!(state.to_result(), AgentResult::working("Reading file"));
    }

    #[test]
    fn test_thinking_before_text() {
        let line = serde_json::json!({
            "type": "assistant",
            "message": {"content": [{"type": "thinking", "thinking": "..."}], "stop_reason": null}
        })
        .to_string();
        let state = replay(&[user("why?"), line]);
        assert!(state.is_thinking);
        assert!(!state.is_working);
        assert!(state.is_waiting);
        assert_eq!(state.to_result(), AgentResult::awaiting_input());
    }

    #[test]
    fn test_current_tool_activity() {
        let state = replay(&[user("look"), tool_use("A", "Grep")]);
        assert_eq!(state.current_tool.as_deref(), Some("Grep"));
        let mut state = state;
        state.is_waiting_permission = false;
        assert_eq!(state.to_result(), AgentResult::working("Searching"));
    }

    #[test]
    fn test_api_error_text() {
        let line = serde_json::json!({
            "type": "assistant",
            "isApiErrorMessage": true,
            "message": {"content": [{"type": "text", "text": "API Error: 500"}], "stop_reason": "stop_sequence"}
        })
        .to_string();
        let state = replay(&[user("go"), line]);
        assert_eq!(state.error_text.as_deref(), Some("API Error: 500"));
        assert_eq!(state.to_result(), AgentResult::error("API Error: 500"));
    }

    #[test]
    fn test_metadata_and_todos() {
        let first = serde_json::json!({
            "type": "user", "sessionId": "s-1", "cwd": "/repo", "gitBranch": "main",
            "timestamp": "2025-01-01T00:00:00Z", "message": {"content": "start"}
        })
        .to_string();
        let todo = serde_json::json!({
            "type": "assistant", "timestamp": "2025-01-01T00:00:05Z",
            "message": {"content": [{"type": "tool_use", "id": "T", "name": "TodoWrite",
                "input": {"todos": [{"content": "write docs", "status": "pending"}]}}],
                "stop_reason": "tool_use"}
        })
        .to_string();
        let state = replay(&[first, todo, tool_result("T")]);
        assert_eq!(state.session_id.as_deref(), Some("s-1"));
        assert_eq!(state.cwd.as_deref(), Some("/repo"));
        assert_eq!(state.git_branch.as_deref(), Some("main"));
        assert_eq!(state.last_activity.as_deref(), Some("2025-01-01T00:00:05Z"));
        assert_eq!(state.todos.len(), 1);
        assert_eq!(state.todos[0].content, "write docs");
    }

    #[test]
    fn test_window_bounds_history() {
        let mut lines = vec![tool_use("OLD", "Bash")];
        for i in 0..DEFAULT_WINDOW {
            lines.push(user(&format!("message {}", i)));
        }
        let state = replay(&lines);
        assert_eq!(state.pending_tool_use_id, None);
        assert_eq!(state.last_tool_name, None);
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let lines = [user("go"), tool_use("A", "Read"), tool_result("A"), assistant_text("Proceed?", "end_turn")];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let messages = parse(&refs);
        assert_eq!(reconstruct(&messages), reconstruct(&messages));
    }

    #[test]
    fn test_empty_log_is_idle() {
        let state = reconstruct(&[]);
        assert_eq!(state, SessionState::default());
        assert_eq!(state.to_result(), AgentResult::idle());
    }
}
