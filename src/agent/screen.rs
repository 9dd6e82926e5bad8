//! Line-oriented view over captured pane text, plus the prompt extraction
//! shared by the classifiers and the session log reconstructor.

use once_cell::sync::Lazy;
use regex::Regex;

/// Option lines longer than this are prose, not menu entries.
const MAX_OPTION_CHARS: usize = 120;

/// `1. Yes`, `2) No`, optionally behind a cursor glyph.
static RE_NUMBERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[❯‣>▸]\s*)?(\d{1,2})[.)]\s+(\S.*)$").unwrap());

/// Characters that frame boxes and panels.
const BOX_CHARS: &[char] = &[
    '│', '┃', '║', '╭', '╮', '╰', '╯', '─', '━', '┌', '┐', '└', '┘', '├', '┤', '═',
];

/// A question extracted from a prompt, with its menu options if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub question: Option<String>,
    pub choices: Vec<String>,
}

/// The recent lines of a pane, trailing blank rows removed.
#[derive(Debug, Clone)]
pub struct Screen<'a> {
    lines: Vec<&'a str>,
}

impl<'a> Screen<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::from_tail(text, usize::MAX)
    }

    /// Keep only the last `max_lines` lines of `text`.
    pub fn from_tail(text: &'a str, max_lines: usize) -> Self {
        let mut lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        while lines.last().map_or(false, |l| l.trim().is_empty()) {
            lines.pop();
        }
        let start = lines.len().saturating_sub(max_lines);
        Self {
            lines: lines.split_off(start),
        }
    }

    pub fn lines(&self) -> &[&'a str] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `n` lines.
    pub fn tail(&self, n: usize) -> &[&'a str] {
        &self.lines[self.lines.len().saturating_sub(n)..]
    }

    /// Whether line `idx` falls inside the last `n` lines.
    pub fn in_tail(&self, idx: usize, n: usize) -> bool {
        idx + n >= self.lines.len()
    }

    /// Index of the last line satisfying `pred`.
    pub fn rposition(&self, pred: impl Fn(&str) -> bool) -> Option<usize> {
        self.lines.iter().rposition(|l| pred(l))
    }
}

/// Trim whitespace and box borders from both ends of a line.
pub fn unbox(line: &str) -> &str {
    line.trim_matches(|c: char| c.is_whitespace() || BOX_CHARS.contains(&c))
}

/// A horizontal rule or box edge.
pub fn is_border(line: &str) -> bool {
    let t = line.trim();
    t.starts_with(['╭', '╰', '┌', '└', '├']) || (!t.is_empty() && t.chars().all(|c| BOX_CHARS.contains(&c)))
}

pub fn is_question(line: &str) -> bool {
    let t = unbox(line);
    t.len() > 1 && t.ends_with('?')
}

/// Option text with any cursor glyph and `N.` / `N)` numbering removed.
pub fn option_text(line: &str) -> &str {
    let t = unbox(line).trim_start_matches(['❯', '‣', '>', '▸']).trim();
    match RE_NUMBERED.captures(t) {
        Some(caps) => caps.get(2).map_or(t, |m| m.as_str().trim()),
        None => t,
    }
}

fn is_numbered(line: &str) -> bool {
    RE_NUMBERED.is_match(unbox(line))
}

fn starts_with_marker(line: &str, marker: char) -> bool {
    unbox(line).starts_with(marker)
}

/// A line that can sit next to the selected option in a menu.
fn is_sibling(line: &str) -> bool {
    let t = unbox(line);
    !t.is_empty() && !is_border(line) && !is_question(line) && t.chars().count() <= MAX_OPTION_CHARS
}

/// Column where a line's content starts, box borders counted as indent.
fn indent(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace() || BOX_CHARS.contains(c))
        .count()
}

/// Nearest question at or above `from`, looking back at most `lookback` lines.
fn question_above(lines: &[&str], from: usize, lookback: usize) -> Option<String> {
    let stop = from.saturating_sub(lookback);
    (stop..from)
        .rev()
        .find(|&i| is_question(lines[i]))
        .map(|i| unbox(lines[i]).to_string())
}

/// Cursor-style menu: the last line starting with `marker` plus the sibling
/// option lines around it. Siblings are indented past the marker column, so
/// flush prose above or below the menu is not an option. The selected option
/// is always returned first.
pub fn cursor_choices(lines: &[&str], marker: char, lookback: usize) -> Option<Prompt> {
    let selected_idx = lines.iter().rposition(|l| starts_with_marker(l, marker))?;
    let selected = option_text(lines[selected_idx]);
    if selected.is_empty() {
        return None;
    }

    let marker_col = indent(lines[selected_idx]);
    let is_option = |line: &str| is_sibling(line) && indent(line) > marker_col;

    let mut start = selected_idx;
    while start > 0 && is_option(lines[start - 1]) {
        start -= 1;
    }
    let mut end = selected_idx + 1;
    while end < lines.len() && is_option(lines[end]) {
        end += 1;
    }
    if end - start < 2 {
        return None;
    }

    let mut choices = vec![selected.to_string()];
    choices.extend(
        (start..end)
            .filter(|&i| i != selected_idx)
            .map(|i| option_text(lines[i]).to_string())
            .filter(|c| !c.is_empty()),
    );

    Some(Prompt {
        question: question_above(lines, start, lookback),
        choices,
    })
}

/// Numbered menu: two or more consecutive `N.` lines right after the last
/// question.
pub fn numbered_choices(lines: &[&str]) -> Option<Prompt> {
    let q_idx = lines.iter().rposition(|l| is_question(l))?;
    let choices: Vec<String> = lines[q_idx + 1..]
        .iter()
        .skip_while(|l| unbox(l).is_empty())
        .take_while(|l| is_numbered(l))
        .map(|l| option_text(l).to_string())
        .collect();
    if choices.len() < 2 {
        return None;
    }
    Some(Prompt {
        question: Some(unbox(lines[q_idx]).to_string()),
        choices,
    })
}

/// The last question line, if it sits within the last `window` lines.
pub fn trailing_question(screen: &Screen<'_>, window: usize) -> Option<String> {
    let idx = screen.rposition(is_question)?;
    screen
        .in_tail(idx, window)
        .then(|| unbox(screen.lines()[idx]).to_string())
}

/// Question and menu extraction over free text such as an assistant reply.
///
/// Looks at the last `window` non-blank lines. Choices are collected bottom
/// up and the scan stops at the question or at the first long line that is
/// not an option.
pub fn text_prompt(text: &str, window: usize, long_line: usize) -> Prompt {
    let all: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let lines = &all[all.len().saturating_sub(window)..];

    let mut options: Vec<(&str, bool)> = Vec::new();
    let mut question = None;
    for line in lines.iter().rev() {
        if is_question(line) {
            question = Some(unbox(line).to_string());
            break;
        }
        let cursor = starts_with_marker(line, '❯') || starts_with_marker(line, '‣');
        if is_numbered(line) || cursor {
            options.push((option_text(line), cursor));
        } else if line.chars().count() > long_line {
            break;
        }
    }

    if question.is_none() {
        question = lines
            .iter()
            .rev()
            .find(|l| is_question(l))
            .map(|l| unbox(l).to_string());
    }

    let mut choices = Vec::new();
    if options.len() >= 2 {
        options.reverse();
        if let Some(pos) = options.iter().position(|(_, cursor)| *cursor) {
            let selected = options.remove(pos);
            options.insert(0, selected);
        }
        choices = options.into_iter().map(|(c, _)| c.to_string()).collect();
    }

    Prompt { question, choices }
}
