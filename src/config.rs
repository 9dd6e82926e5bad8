//! Runtime configuration: defaults, an optional JSON file, then environment
//! overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const ENV_CONFIG: &str = "AGENT_WATCH_CONFIG";
pub const ENV_PROJECTS_DIR: &str = "AGENT_WATCH_PROJECTS_DIR";
pub const ENV_STATUS_DIR: &str = "AGENT_WATCH_STATUS_DIR";
pub const ENV_CACHE_TTL: &str = "AGENT_WATCH_CACHE_TTL";

const DEFAULT_CACHE_TTL_SECS: u64 = 15;
const DEFAULT_RECENT_LINES: usize = 50;
const DEFAULT_LOG_WINDOW: usize = 20;
const DEFAULT_LOG_TAIL_BYTES: u64 = 256 * 1024;
const DEFAULT_STATUS_STALE_SECS: u64 = 300;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_ttl_secs: u64,
    pub recent_lines: usize,
    pub log_window: usize,
    pub log_tail_bytes: u64,
    pub status_stale_secs: u64,
    pub poll_interval_ms: u64,
    /// Root of the per-directory session log folders
    pub projects_dir: PathBuf,
    /// Where the shell hook writes status files
    pub status_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let claude_home = dirs::home_dir().unwrap_or_default().join(".claude");
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            recent_lines: DEFAULT_RECENT_LINES,
            log_window: DEFAULT_LOG_WINDOW,
            log_tail_bytes: DEFAULT_LOG_TAIL_BYTES,
            status_stale_secs: DEFAULT_STATUS_STALE_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            projects_dir: claude_home.join("projects"),
            status_dir: claude_home.join("agent-status"),
        }
    }
}

impl Config {
    /// Load from `$AGENT_WATCH_CONFIG` or the default config file, then
    /// apply environment overrides.
    ///
    /// A broken file named explicitly is an error; a broken default file is
    /// logged and ignored.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(ENV_CONFIG) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path).unwrap_or_else(|e| {
                    warn!(error = %e, "ignoring unreadable config file");
                    Self::default()
                }),
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = var(ENV_PROJECTS_DIR) {
            self.projects_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var(ENV_STATUS_DIR) {
            self.status_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = var(ENV_CACHE_TTL) {
            match ttl.parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(_) => warn!(value = %ttl, "ignoring invalid {}", ENV_CACHE_TTL),
            }
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn status_stale_after(&self) -> Duration {
        Duration::from_secs(self.status_stale_secs)
    }

    /// Never zero; a timer cannot tick at a zero period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("agent-watch").join("config.json"))
}
