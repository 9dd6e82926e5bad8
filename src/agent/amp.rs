//! Classifier for the narrative agent: box-drawn status bar, spinner glyphs,
//! `‣` cursor menus and a status strip at the bottom of the screen.

use once_cell::sync::Lazy;
use regex::Regex;

use super::screen::{self, Screen};
use super::{run_cascade, tool_verb, AgentKind, AgentResult, Rule, RECENT_LINES};

const SELECTED: char = '‣';
const QUESTION_LOOKBACK: usize = 15;
const STATUS_STRIP_LINES: usize = 3;
const COMPLETED_TOOL_WINDOW: usize = 10;
const TRAILING_QUESTION_WINDOW: usize = 15;

/// Status strip markers, checked in this order.
const STATUS_STRIP: &[(&str, &str)] = &[
    ("running tools", "Running tools"),
    ("waiting for response", "Waiting for response"),
    ("esc to cancel", "Active"),
];

const TOOL_VERBS: &[(&str, &str)] = &[
    ("read", "Reading file"),
    ("grep", "Searching"),
    ("glob", "Searching"),
    ("codebase_search_agent", "Searching"),
    ("bash", "Running command"),
    ("edit_file", "Editing file"),
    ("create_file", "Editing file"),
    ("web_search", "Searching the web"),
    ("read_web_page", "Reading web page"),
    ("task", "Running subagent"),
    ("todo_write", "Updating todos"),
    ("todo_read", "Updating todos"),
];

static RE_SPINNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[✻✽✶✳✢·∴⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]\s+([A-Z][a-z]+)(?:…|\.\.\.)").unwrap()
});

static RE_ELAPSED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)(?:[A-Z][a-z]+ed|Thought|Thinking) for \d+(?:\.\d+)?[hms]\b").unwrap()
});

static RE_HOOKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\brunning\s+(?:[\w-]+\s+)?hooks?\b").unwrap());

static RE_ACTIVE_TOOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*⋯(?:\s+([A-Za-z_][\w-]*))?").unwrap());

static RE_COMPLETED_TOOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*✓\s+([A-Za-z_][\w-]*)").unwrap());

/// Context meter drawn into the top edge of the input box.
static RE_CONTEXT_METER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"╭─+\s*\d{1,3}% of \d+k\s*─*╮").unwrap());

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
        name: "status_strip",
        apply: status_strip,
    },
    Rule {
        name: "spinner",
        apply: spinner,
    },
    Rule {
        name: "elapsed_thinking",
        apply: elapsed_thinking,
    },
    Rule {
        name: "hooks",
        apply: hooks,
    },
    Rule {
        name: "active_tool",
        apply: active_tool,
    },
    Rule {
        name: "completed_tool",
        apply: completed_tool,
    },
    Rule {
        name: "trailing_question",
        apply: trailing_question,
    },
];

/// Whether `text` looks like this agent's screen.
///
/// The context meter alone is shared with other box-drawn UIs, so it only
/// counts together with one of the status strip markers.
pub fn detect(text: &str) -> bool {
    if text.contains("Welcome to Amp") {
        return true;
    }
    if !RE_CONTEXT_METER.is_match(text) {
        return false;
    }
    let lower = text.to_lowercase();
    STATUS_STRIP.iter().any(|(marker, _)| lower.contains(marker))
}

pub fn classify(text: &str) -> AgentResult {
    let screen = Screen::from_tail(text, RECENT_LINES);
    run_cascade(AgentKind::Amp, RULES, &screen)
}

fn cursor_choice(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::cursor_choices(screen.lines(), SELECTED, QUESTION_LOOKBACK)
        .map(|p| AgentResult::choice(p.question, p.choices))
}

fn numbered_choice(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::numbered_choices(screen.lines()).map(|p| AgentResult::choice(p.question, p.choices))
}

fn status_strip(screen: &Screen<'_>) -> Option<AgentResult> {
    let strip: Vec<String> = screen
        .tail(STATUS_STRIP_LINES)
        .iter()
        .map(|l| l.to_lowercase())
        .collect();
    STATUS_STRIP
        .iter()
        .find(|(marker, _)| strip.iter().any(|l| l.contains(marker)))
        .map(|(_, activity)| AgentResult::working(*activity))
}

fn spinner(screen: &Screen<'_>) -> Option<AgentResult> {
    screen
        .lines()
        .iter()
        .rev()
        .find_map(|l| RE_SPINNER.captures(l))
        .and_then(|caps| caps.get(1))
        .map(|verb| AgentResult::working(verb.as_str()))
}

fn elapsed_thinking(screen: &Screen<'_>) -> Option<AgentResult> {
    screen
        .lines()
        .iter()
        .any(|l| RE_ELAPSED.is_match(l))
        .then(|| AgentResult::working("Thinking"))
}

fn hooks(screen: &Screen<'_>) -> Option<AgentResult> {
    screen
        .lines()
        .iter()
        .any(|l| RE_HOOKS.is_match(l))
        .then(|| AgentResult::working("Running hooks"))
}

fn active_tool(screen: &Screen<'_>) -> Option<AgentResult> {
    let caps = screen
        .lines()
        .iter()
        .rev()
        .find_map(|l| RE_ACTIVE_TOOL.captures(l))?;
    let tool = caps.get(1).map_or("", |m| m.as_str());
    Some(AgentResult::working(tool_verb(TOOL_VERBS, tool)))
}

/// A finished tool still reads as working while it is near the bottom:
/// the next action usually follows right away.
fn completed_tool(screen: &Screen<'_>) -> Option<AgentResult> {
    let idx = screen.rposition(|l| RE_COMPLETED_TOOL.is_match(l))?;
    if !screen.in_tail(idx, COMPLETED_TOOL_WINDOW) {
        return None;
    }
    let caps = RE_COMPLETED_TOOL.captures(screen.lines()[idx])?;
    Some(AgentResult::working(tool_verb(TOOL_VERBS, &caps[1])))
}

fn trailing_question(screen: &Screen<'_>) -> Option<AgentResult> {
    screen::trailing_question(screen, TRAILING_QUESTION_WINDOW).map(AgentResult::question)
}
