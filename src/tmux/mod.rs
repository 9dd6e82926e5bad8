mod client;

pub use client::TmuxClient;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::registry::PaneId;

/// A tmux pane as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxPane {
    /// `session:window.pane`
    pub id: PaneId,
    /// Foreground process name (e.g., "claude", "zsh")
    pub command: String,
    /// Working directory of the foreground process
    pub cwd: PathBuf,
}

impl TmuxPane {
    pub fn new(id: PaneId, command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            id,
            command: command.into(),
            cwd: cwd.into(),
        }
    }

    /// Parse one `list-panes` line: `session|window|pane|command|cwd`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.splitn(5, '|').collect();
        if parts.len() < 5 {
            return None;
        }

        let window = parts[1].parse().ok()?;
        let pane = parts[2].parse().ok()?;
        Some(Self::new(PaneId::new(parts[0], window, pane), parts[3], parts[4]))
    }
}
