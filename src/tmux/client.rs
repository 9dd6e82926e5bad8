use anyhow::{Context, Result};
use std::process::Stdio;
use tokio::process::Command;

use super::TmuxPane;
use crate::agent::registry::PaneId;

/// `session|window|pane|command|cwd`; the path goes last since it may
/// contain the separator.
pub(super) const PANE_FORMAT: &str =
    "#{session_name}|#{window_index}|#{pane_index}|#{pane_current_command}|#{pane_current_path}";

/// Client for reading pane state via the tmux CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self {
            tmux_path: "tmux".to_string(),
        }
    }

    /// Check if tmux server is running
    pub async fn is_server_running(&self) -> bool {
        Command::new(&self.tmux_path)
            .arg("list-sessions")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// List every pane of every session
    pub async fn list_panes(&self) -> Result<Vec<TmuxPane>> {
        let output = Command::new(&self.tmux_path)
            .args(["list-panes", "-a", "-F", PANE_FORMAT])
            .output()
            .await
            .context("Failed to execute tmux list-panes")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-panes failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(TmuxPane::parse_line).collect())
    }

    /// Last `lines` lines of a pane, escape sequences included
    pub async fn capture_pane(&self, pane: &PaneId, lines: usize) -> Result<String> {
        let target = pane.to_string();
        let start = format!("-{}", lines);
        let output = Command::new(&self.tmux_path)
            .args(["capture-pane", "-p", "-e", "-J", "-S", &start, "-t", &target])
            .output()
            .await
            .with_context(|| format!("Failed to capture pane {}", target))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux capture-pane {} failed: {}", target, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}
