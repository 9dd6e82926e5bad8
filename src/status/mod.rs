//! Status records written by the shell hook.
//!
//! Two channels share `status_dir`: `<label>.status` holds one record per
//! session, `<label>.panes` is the older per-pane channel. Both are best
//! effort; anything unreadable is skipped.

pub mod priority;

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::agent::registry::PaneId;
use crate::error::{Error, Result};

pub use priority::{fuse, most_urgent, resolve, Attention, Observation, Prioritized};

const STATUS_EXTENSION: &str = "status";
const PANES_EXTENSION: &str = "panes";

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Working,
    Waiting,
    Permission,
    #[default]
    Unknown,
}

impl Status {
    /// Accepts the hook's keyword aliases; anything else is `Unknown`.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "idle" => Status::Idle,
            "working" | "processing" | "busy" => Status::Working,
            "waiting" | "input" => Status::Waiting,
            "permission" => Status::Permission,
            _ => Status::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for StatusField {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let keyword = String::deserialize(deserializer)?;
        Ok(StatusField(Status::from_keyword(&keyword)))
    }
}

/// Status keyword with alias handling when read from JSON.
#[derive(Debug, Default)]
struct StatusField(Status);

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    status: StatusField,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    timestamp: Option<u64>,
}

/// One session's hook-written status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub session_label: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl StatusRecord {
    pub fn new(session_label: impl Into<String>, status: Status) -> Self {
        Self {
            session_label: session_label.into(),
            status,
            message: None,
            tool: None,
            timestamp: None,
        }
    }

    /// Parse a status file body: a JSON record first, else a bare keyword.
    /// Blank or garbled content yields `None`.
    pub fn parse(session_label: &str, contents: &str) -> Option<Self> {
        let contents = contents.trim();
        if contents.is_empty() {
            return None;
        }
        if contents.starts_with('{') {
            let raw: RawRecord = serde_json::from_str(contents).ok()?;
            return Some(Self {
                session_label: session_label.to_string(),
                status: raw.status.0,
                message: raw.message.filter(|m| !m.trim().is_empty()),
                tool: raw.tool.filter(|t| !t.trim().is_empty()),
                timestamp: raw.timestamp.map(normalize_timestamp),
            });
        }
        let keyword = contents.split_whitespace().next()?;
        if !keyword.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(Self::new(session_label, Status::from_keyword(keyword)))
    }

    pub fn is_fresh(&self, now: SystemTime, max_age: Duration) -> bool {
        is_fresh(self.timestamp, now, max_age)
    }
}

/// Entries without a timestamp never go stale.
fn is_fresh(timestamp: Option<u64>, now: SystemTime, max_age: Duration) -> bool {
    match timestamp {
        Some(ts) => {
            let written = UNIX_EPOCH + Duration::from_secs(ts);
            now.duration_since(written).map_or(true, |age| age <= max_age)
        }
        None => true,
    }
}

fn normalize_timestamp(ts: u64) -> u64 {
    if ts > MILLIS_THRESHOLD {
        ts / 1000
    } else {
        ts
    }
}

/// Legacy per-pane state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneState {
    Processing,
    Waiting,
    Done,
    Idle,
}

impl PaneState {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "processing" => Some(PaneState::Processing),
            "waiting" => Some(PaneState::Waiting),
            "done" => Some(PaneState::Done),
            "idle" => Some(PaneState::Idle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneStatus {
    pub pane_id: String,
    pub session_label: String,
    pub state: PaneState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl PaneStatus {
    /// Parse `"<paneId> <state> [timestamp]"`.
    pub fn parse_line(session_label: &str, line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let pane_id = fields.next()?;
        let state = PaneState::from_keyword(fields.next()?)?;
        let timestamp = fields.next().and_then(|t| t.parse().ok()).map(normalize_timestamp);
        Some(Self {
            pane_id: pane_id.to_string(),
            session_label: session_label.to_string(),
            state,
            timestamp,
        })
    }

    pub fn matches(&self, pane: &PaneId) -> bool {
        self.pane_id == pane.to_string()
    }

    pub fn is_fresh(&self, now: SystemTime, max_age: Duration) -> bool {
        is_fresh(self.timestamp, now, max_age)
    }
}

/// Every `<label>.status` record in `dir`. A missing directory is empty.
pub fn read_status_dir(dir: &Path) -> Result<Vec<StatusRecord>> {
    let mut records = Vec::new();
    for (label, contents) in files_with_extension(dir, STATUS_EXTENSION)? {
        match StatusRecord::parse(&label, &contents) {
            Some(record) => records.push(record),
            None => debug!(session = %label, "skipping unreadable status file"),
        }
    }
    Ok(records)
}

/// Legacy pane lines for `session_label`. A missing file is empty.
pub fn read_pane_statuses(dir: &Path, session_label: &str) -> Result<Vec<PaneStatus>> {
    let path = dir.join(format!("{}.{}", session_label, PANES_EXTENSION));
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(&path, e)),
    };

    let mut panes = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        match PaneStatus::parse_line(session_label, line) {
            Some(pane) => panes.push(pane),
            None => debug!(session = %session_label, line, "skipping malformed pane status"),
        }
    }
    Ok(panes)
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<(String, String)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping status dir entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != extension) {
            continue;
        }
        let Some(label) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => files.push((label.to_string(), contents)),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable status file"),
        }
    }
    Ok(files)
}
