//! Fusing state sources and ranking panes by urgency.
//!
//! A pane's screen, its session log and the hook's status record are merged
//! into one [`AgentResult`] by [`fuse`]. [`resolve`] then orders the panes
//! of a session so the one needing a human comes first.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::{PaneState, PaneStatus, Status, StatusRecord};
use crate::agent::claude::TOOL_VERBS;
use crate::agent::registry::{PaneId, PaneReport};
use crate::agent::{tool_verb, AgentKind, AgentResult, ResultKind};

const PERMISSION_QUESTION: &str = "Waiting for permission...";
const INPUT_QUESTION: &str = "Waiting for input...";

/// Attention rank: lower needs a human sooner.
pub trait Prioritized {
    fn priority(&self) -> u8;
}

pub const PRIORITY_NEEDS_INPUT: u8 = 0;
pub const PRIORITY_WORKING: u8 = 1;
pub const PRIORITY_DONE: u8 = 2;
pub const PRIORITY_OTHER: u8 = 3;

impl Prioritized for ResultKind {
    fn priority(&self) -> u8 {
        match self {
            ResultKind::Question | ResultKind::Choice => PRIORITY_NEEDS_INPUT,
            ResultKind::Working => PRIORITY_WORKING,
            ResultKind::Done => PRIORITY_DONE,
            ResultKind::Idle | ResultKind::Error => PRIORITY_OTHER,
        }
    }
}

impl Prioritized for AgentResult {
    fn priority(&self) -> u8 {
        self.kind.priority()
    }
}

impl Prioritized for Status {
    fn priority(&self) -> u8 {
        match self {
            Status::Waiting | Status::Permission => PRIORITY_NEEDS_INPUT,
            Status::Working => PRIORITY_WORKING,
            Status::Idle | Status::Unknown => PRIORITY_OTHER,
        }
    }
}

impl Prioritized for StatusRecord {
    fn priority(&self) -> u8 {
        self.status.priority()
    }
}

impl Prioritized for PaneState {
    fn priority(&self) -> u8 {
        match self {
            PaneState::Waiting => PRIORITY_NEEDS_INPUT,
            PaneState::Processing => PRIORITY_WORKING,
            PaneState::Done => PRIORITY_DONE,
            PaneState::Idle => PRIORITY_OTHER,
        }
    }
}

impl Prioritized for PaneStatus {
    fn priority(&self) -> u8 {
        self.state.priority()
    }
}

/// Merge the three views of one pane. First matching rule wins:
///
/// 1. a prompt or error on screen
/// 2. a menu in the log
/// 3. a permission request from the hook
/// 4. work visible on screen
/// 5. work reported by the hook
/// 6. anything non-idle in the log
/// 7. an input wait reported by the hook
/// 8. the screen as is
///
/// The screen's input mode is always kept.
pub fn fuse(screen: &AgentResult, log: Option<&AgentResult>, status: Option<&StatusRecord>) -> AgentResult {
    let fused = fuse_kind(screen, log, status);
    fused.with_mode(screen.mode)
}

fn fuse_kind(screen: &AgentResult, log: Option<&AgentResult>, status: Option<&StatusRecord>) -> AgentResult {
    if matches!(
        screen.kind,
        ResultKind::Choice | ResultKind::Question | ResultKind::Error
    ) {
        return screen.clone();
    }
    if let Some(log) = log.filter(|l| l.kind == ResultKind::Choice) {
        return log.clone();
    }
    let status_is = |wanted: Status| status.filter(|s| s.status == wanted);

    if let Some(record) = status_is(Status::Permission) {
        let question = record.message.clone().unwrap_or_else(|| PERMISSION_QUESTION.to_string());
        let mut result = AgentResult::question(question);
        result.activity = record.tool.as_deref().map(|tool| tool_verb(TOOL_VERBS, tool));
        return result;
    }
    if screen.kind == ResultKind::Working {
        return screen.clone();
    }
    if let Some(record) = status_is(Status::Working) {
        let activity = match (&record.tool, &record.message) {
            (Some(tool), _) => tool_verb(TOOL_VERBS, tool),
            (None, Some(message)) => message.clone(),
            (None, None) => "Working".to_string(),
        };
        return AgentResult::working(activity);
    }
    if let Some(log) = log.filter(|l| l.kind != ResultKind::Idle) {
        return log.clone();
    }
    if let Some(record) = status_is(Status::Waiting) {
        let question = record.message.clone().unwrap_or_else(|| INPUT_QUESTION.to_string());
        return AgentResult::question(question);
    }
    screen.clone()
}

/// Everything known about one pane before fusion.
#[derive(Debug, Clone)]
pub struct Observation {
    pub report: PaneReport,
    /// Projection of the session log, when one was found
    pub log: Option<AgentResult>,
}

impl Observation {
    pub fn new(report: PaneReport) -> Self {
        Self { report, log: None }
    }

    pub fn with_log(mut self, log: Option<AgentResult>) -> Self {
        self.log = log;
        self
    }
}

/// One ranked pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attention {
    pub pane: PaneId,
    pub agent: AgentKind,
    pub result: AgentResult,
    pub priority: u8,
}

impl Prioritized for Attention {
    fn priority(&self) -> u8 {
        self.priority
    }
}

/// Fuse every observation with its session's status record and rank them.
///
/// Records match by session label, legacy pane lines by pane id; stale
/// entries are ignored. A pane ranks by the more urgent of its fused result
/// and its legacy pane state. Equal ranks keep scan order.
pub fn resolve(
    records: &[StatusRecord],
    legacy: &[PaneStatus],
    observations: &[Observation],
    now: SystemTime,
    max_age: Duration,
) -> Vec<Attention> {
    let mut ranked: Vec<Attention> = observations
        .iter()
        .map(|obs| {
            let pane = &obs.report.pane;
            let record = records
                .iter()
                .find(|r| r.session_label == pane.session && r.is_fresh(now, max_age));
            let result = fuse(&obs.report.result, obs.log.as_ref(), record);

            let legacy_priority = legacy
                .iter()
                .filter(|p| p.matches(pane) && p.is_fresh(now, max_age))
                .map(|p| p.priority())
                .min();
            let priority = legacy_priority.map_or(result.priority(), |p| p.min(result.priority()));

            Attention {
                pane: pane.clone(),
                agent: obs.report.agent,
                result,
                priority,
            }
        })
        .collect();

    // Stable: ties stay in scan order.
    ranked.sort_by_key(|a| a.priority);
    ranked
}

/// The first item with the lowest priority.
pub fn most_urgent<T: Prioritized>(items: &[T]) -> Option<&T> {
    items.iter().min_by_key(|item| item.priority())
}
