//! Classifier for the structured agent: modal (vim-like) input, `⏺` tool
//! call markers, `⎿` tool results and `❯` cursor menus.

use once_cell::sync::Lazy;
use regex::Regex;

use super::screen::{self, unbox, Screen};
use super::{run_cascade, tool_verb, AgentKind, AgentResult, Mode, Rule, RECENT_LINES};

const SELECTED: char = '❯';
const QUESTION_LOOKBACK: usize = 15;
const INTERRUPT_WINDOW: usize = 5;
const TOOL_WINDOW: usize = 10;
const ERROR_WINDOW: usize = 10;
const TRAILING_QUESTION_WINDOW: usize = 15;
const MODE_WINDOW: usize = 5;
const SUGGESTION_WINDOW: usize = 6;

pub const TOOL_VERBS: &[(&str, &str)] = &[
    ("Read", "Reading file"),
    ("Write", "Writing file"),
    ("Edit", "Editing file"),
    ("MultiEdit", "Editing file"),
    ("Bash", "Running command"),
    ("Grep", "Searching"),
    ("Glob", "Searching"),
    ("WebFetch", "Fetching web page"),
    ("WebSearch", "Searching the web"),
    ("Task", "Running subagent"),
    ("TodoWrite", "Updating todos"),
    ("NotebookEdit", "Editing notebook"),
];

static RE_SPINNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[✻✽✶✳✢·*]\s+([A-Z][a-z]+)(?:…|\.\.\.)").unwrap()
});

static RE_TOOL_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*⏺\s+([A-Za-z_][\w-]*)\(").unwrap());

static RE_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[⏺⎿]\s+)?(?:API Error|Error:)").unwrap());

static RE_SUGGESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r#">\s+Try "([^"]+)""#).unwrap());

static RULES: &[Rule] = &[
    Rule {
        name: "cursor_choice",
        apply: cursor_choice,
    },
    Rule {
        name: "numbered_choice",
        apply: numbered_choice,
    },
    Rule {
        name: "interrupt_hint",
        apply: interrupt_hint,
    },
    Rule {
        name: "running_tool",
        apply: running_tool,
    },
    Rule {
        name: "error",
        apply: error,
    },
    Rule {
        name: "trailing_question",
        apply: trailing_question,
    },
];

pub fn detect(text: &str) -> bool {
    text.contains("Claude Code") || text.contains("? for shortcuts") || text.contains("esc to interrupt")
}

pub fn classify(text: &str) -> AgentResult {
    let screen = Screen::from_tail(text, RECENT_LINES);
    let result = run_cascade(AgentKind::Claude, RULES, &screen);
    let result = if result == AgentResult::idle() {
        result.with_suggestion(suggestion(&screen))
    } else {
        result
    };
    result.with_mode(mode(&screen))
}

/// Vim-mode indicator shown under the input box.
pub fn mode(screen: &Screen<'_>) -> Mode {
    for line in screen.tail(MODE_WINDOW).iter().rev() {
        if line.contains("-- INSERT --") {
            return Mode::Insert;
        }
        if line.contains("-- NORMAL --") {
            return Mode::Normal;
        }
    }
    Mode::Unknown
}

/// Placeholder hint shown in an empty prompt.
fn suggestion(screen: &Screen<'_>) -> Option<String> {
    screen
        .tail(SUGGESTION_WINDOW)
        .iter()
        .find_map(|l| RE_SUGGESTION.captures(l))
        .map(|caps| caps[1].to_string())
}

fn cursor_choice(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::cursor_choices(screen.lines(), SELECTED, QUESTION_LOOKBACK)
        .map(|p| AgentResult::choice(p.question, p.choices))
}

fn numbered_choice(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::numbered_choices(screen.lines()).map(|p| AgentResult::choice(p.question, p.choices))
}

fn interrupt_hint(screen: &Screen<'_>) -> Option<AgentResult> {
    let tail = screen.tail(INTERRUPT_WINDOW);
    if !tail.iter().any(|l| l.to_lowercase().contains("esc to interrupt")) {
        return None;
    }
    let verb = tail
        .iter()
        .rev()
        .find_map(|l| RE_SPINNER.captures(l))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "Working".to_string());
    Some(AgentResult::working(verb))
}

/// The newest `⏺ Tool(` call counts as running until a `⎿` result line
/// appears below it.
fn running_tool(screen: &Screen<'_>) -> Option<AgentResult> {
    let idx = screen.rposition(|l| unbox(l).starts_with('⏺'))?;
    if !screen.in_tail(idx, TOOL_WINDOW) {
        return None;
    }
    let caps = RE_TOOL_CALL.captures(screen.lines()[idx])?;
    if screen.lines()[idx + 1..].iter().any(|l| l.contains('⎿')) {
        return None;
    }
    Some(AgentResult::working(tool_verb(TOOL_VERBS, &caps[1])))
}

fn error(screen: &Screen<'_>) -> Option<AgentResult> {
    screen
        .tail(ERROR_WINDOW)
        .iter()
        .rev()
        .find(|l| RE_ERROR.is_match(l))
        .map(|l| AgentResult::error(unbox(l).trim_start_matches(['⏺', '⎿']).trim()))
}

fn trailing_question(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::trailing_question(screen, TRAILING_QUESTION_WINDOW).map(AgentResult::question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ResultKind;

    #[test]
    fn test_permission_menu() {
        let text = "\
╭──────────────────────────────────────────╮
│ Bash command                             │
│   cargo test                             │
│ Do you want to proceed?                  │
│   1. Yes                                 │
│ ❯ 2. Yes, and don't ask again            │
│   3. No, and tell Claude what to do      │
╰──────────────────────────────────────────╯";
        let result = classify(text);
        assert_eq!(result.kind, ResultKind::Choice);
        assert_eq!(result.question.as_deref(), Some("Do you want to proceed?"));
        assert_eq!(
            result.choices,
            vec!["Yes, and don't ask again", "Yes", "No, and tell Claude what to do"]
        );
    }

    #[test]
    fn test_interrupt_hint_with_spinner_verb() {
        let text = "⏺ I'll look at the tests.\n\n✻ Pondering… (12s · esc to interrupt)\n\n> \n? for shortcuts";
        assert_eq!(classify(text), AgentResult::working("Pondering"));
    }

    #[test]
    fn test_interrupt_hint_without_verb() {
        let text = "output\n  esc to interrupt";
        assert_eq!(classify(text), AgentResult::working("Working"));
    }

    #[test]
    fn test_running_tool() {
        let text = "⏺ Let me check.\n\n⏺ Read(src/main.rs)";
        assert_eq!(classify(text), AgentResult::working("Reading file"));

        let text = "⏺ Deploy(prod)";
        assert_eq!(classify(text), AgentResult::working("Running Deploy"));
    }

    #[test]
    fn test_finished_tool_is_not_running() {
        let text = "⏺ Read(src/main.rs)\n  ⎿  Read 120 lines\n\n> ";
        assert_eq!(classify(text).kind, ResultKind::Idle);
    }

    #[test]
    fn test_api_error() {
        let text = "⏺ Working on it\n  ⎿  API Error: 529 overloaded\n\n> ";
        let result = classify(text);
        assert_eq!(result.kind, ResultKind::Error);
        assert_eq!(result.error_snippet.as_deref(), Some("API Error: 529 overloaded"));
    }

    #[test]
    fn test_trailing_question() {
        let text = "⏺ The build passes now. Want me to commit the change?\n\n> ";
        let result = classify(text);
        assert_eq!(result.kind, ResultKind::Question);
    }

    #[test]
    fn test_mode_detected_independently() {
        let text = "✻ Thinking… (esc to interrupt)\n> \n  -- INSERT --";
        let result = classify(text);
        assert_eq!(result.kind, ResultKind::Working);
        assert_eq!(result.mode, Mode::Insert);

        let result = classify("> \n  -- NORMAL --");
        assert_eq!(result.kind, ResultKind::Idle);
        assert_eq!(result.mode, Mode::Normal);

        assert_eq!(classify("> ").mode, Mode::Unknown);
    }

    #[test]
    fn test_idle_suggestion() {
        let text = "╭────────────────────────────╮\n│ > Try \"fix lint errors\"    │\n╰────────────────────────────╯\n  ? for shortcuts";
        let result = classify(text);
        assert_eq!(result.kind, ResultKind::Idle);
        assert_eq!(result.suggestion.as_deref(), Some("fix lint errors"));
    }

    #[test]
    fn test_detect() {
        assert!(detect("✻ Welcome to Claude Code!"));
        assert!(detect("  ? for shortcuts"));
        assert!(!detect("$ ls -la"));
    }
}
