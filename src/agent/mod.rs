//! Agent identification and terminal-output classification.
//!
//! Every supported agent has one [`Classifier`] entry in a fixed table. The
//! [`registry::Registry`] decides which entry applies to a pane; the entry's
//! `classify` function turns the pane's recent text into an [`AgentResult`].

pub mod amp;
pub mod ansi;
pub mod claude;
pub mod registry;
pub mod screen;

use serde::{Deserialize, Serialize};

use self::screen::Screen;

/// Lines of pane text a classifier looks at.
pub const RECENT_LINES: usize = 50;

/// Which agent a pane is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Modal agent with vim-like input and `⏺` tool markers
    Claude,
    /// Agent with a box-drawn status bar and spinner glyphs
    Amp,
    /// Nothing recognised
    #[default]
    Generic,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Amp => "amp",
            AgentKind::Generic => "generic",
        }
    }

    pub fn classifier(&self) -> &'static Classifier {
        match self {
            AgentKind::Claude => &CLASSIFIERS[0],
            AgentKind::Amp => &CLASSIFIERS[1],
            AgentKind::Generic => &GENERIC,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the agent is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    #[default]
    Idle,
    Working,
    Done,
    Question,
    Choice,
    Error,
}

/// Input mode for agents with modal editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Unknown,
    Insert,
    Normal,
}

/// Normalized classification of one pane or session.
///
/// Built only through the constructors below, which keep `choices` tied to
/// [`ResultKind::Choice`] and `question` to question/choice results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentResult {
    pub kind: ResultKind,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl AgentResult {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn done() -> Self {
        Self {
            kind: ResultKind::Done,
            ..Self::default()
        }
    }

    pub fn working(activity: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Working,
            activity: Some(activity.into()),
            ..Self::default()
        }
    }

    pub fn question(question: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Question,
            question: Some(question.into()),
            ..Self::default()
        }
    }

    /// Waiting for free-form input, with no specific question on screen.
    pub fn awaiting_input() -> Self {
        Self {
            kind: ResultKind::Question,
            ..Self::default()
        }
    }

    /// A menu. Falls back to a plain question when `choices` is empty.
    pub fn choice(question: Option<String>, choices: Vec<String>) -> Self {
        if choices.is_empty() {
            return match question {
                Some(q) => Self::question(q),
                None => Self::idle(),
            };
        }
        Self {
            kind: ResultKind::Choice,
            question,
            choices,
            ..Self::default()
        }
    }

    pub fn error(snippet: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Error,
            error_snippet: Some(snippet.into()),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// One entry of the classifier table.
pub struct Classifier {
    pub kind: AgentKind,
    /// Substrings of the process name that identify this agent
    pub commands: &'static [&'static str],
    /// Output heuristic used when the process name is inconclusive
    pub detect: fn(&str) -> bool,
    /// Recent, normalized text to result
    pub classify: fn(&str) -> AgentResult,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("kind", &self.kind)
            .field("commands", &self.commands)
            .finish()
    }
}

/// Detection order is registration order.
pub static CLASSIFIERS: [Classifier; 2] = [
    Classifier {
        kind: AgentKind::Claude,
        commands: &["claude"],
        detect: claude::detect,
        classify: claude::classify,
    },
    Classifier {
        kind: AgentKind::Amp,
        commands: &["amp"],
        detect: amp::detect,
        classify: amp::classify,
    },
];

static GENERIC: Classifier = Classifier {
    kind: AgentKind::Generic,
    commands: &[],
    detect: detect_nothing,
    classify: classify_nothing,
};

fn detect_nothing(_text: &str) -> bool {
    false
}

/// Unrecognised agents never leave idle.
fn classify_nothing(_text: &str) -> AgentResult {
    AgentResult::idle()
}

/// One step of a classification cascade. Position in the table is
/// priority; reordering a table changes behavior.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&Screen<'_>) -> Option<AgentResult>,
}

/// Evaluate `rules` in order and return the first match, or idle.
pub fn run_cascade(agent: AgentKind, rules: &[Rule], screen: &Screen<'_>) -> AgentResult {
    rules
        .iter()
        .find_map(|rule| {
            (rule.apply)(screen).map(|result| {
                tracing::trace!(agent = %agent, rule = rule.name, kind = ?result.kind, "cascade matched");
                result
            })
        })
        .unwrap_or_else(AgentResult::idle)
}

/// Classify `text` as `kind`, normalizing escape sequences first.
pub fn classify(kind: AgentKind, text: &str) -> AgentResult {
    let clean = ansi::strip_orphaned(text);
    (kind.classifier().classify)(&clean)
}

/// Map a tool name to a present-tense activity through `table`.
///
/// Lookup is case-insensitive. Unknown tools read `Running <tool>`, a
/// missing name reads `Working`.
pub fn tool_verb(table: &[(&str, &str)], tool: &str) -> String {
    let tool = tool.trim();
    if tool.is_empty() {
        return "Working".to_string();
    }
    table
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tool))
        .map(|(_, verb)| verb.to_string())
        .unwrap_or_else(|| format!("Running {}", tool))
}
