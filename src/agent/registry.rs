//! Agent identity detection with a short-lived per-pane cache.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ansi, AgentKind, AgentResult, CLASSIFIERS};
use crate::error::Error;

/// Default lifetime of a cached detection.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Longer TTLs are clamped to this.
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interactive shells. A pane sitting at one of these is never classified
/// from its output, since scrollback may still hold an agent's last screen.
const SHELLS: &[&str] = &["bash", "zsh", "fish", "sh", "dash", "ksh", "tcsh", "csh", "nu", "pwsh"];

/// Session/window/pane coordinate of a tmux pane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PaneId {
    pub session: String,
    pub window: u32,
    pub pane: u32,
}

impl PaneId {
    pub fn new(session: impl Into<String>, window: u32, pane: u32) -> Self {
        Self {
            session: session.into(),
            window,
            pane,
        }
    }
}

impl std::fmt::Display for PaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.pane)
    }
}

impl FromStr for PaneId {
    type Err = Error;

    /// Parses `session:window.pane`. The session name may itself contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidPaneId(s.to_string());
        let (session, rest) = s.rsplit_once(':').ok_or_else(invalid)?;
        let (window, pane) = rest.split_once('.').ok_or_else(invalid)?;
        if session.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            session: session.to_string(),
            window: window.parse().map_err(|_| invalid())?,
            pane: pane.parse().map_err(|_| invalid())?,
        })
    }
}

/// A remembered detection for one pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDetection {
    pub agent_kind: AgentKind,
    pub observed_command: String,
    pub expires_at: Instant,
}

/// Per-pane detection cache. Lookups share a read lock; updates hold the
/// write lock only for the map mutation.
#[derive(Debug)]
pub struct DetectionCache {
    ttl: Duration,
    entries: RwLock<HashMap<PaneId, CachedDetection>>,
}

impl DetectionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: ttl.min(MAX_TTL),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached kind for `pane`, if unexpired and recorded for the same command.
    pub fn lookup(&self, pane: &PaneId, command: &str, now: Instant) -> Option<AgentKind> {
        let entries = self.entries.read();
        let cached = entries.get(pane)?;
        if now >= cached.expires_at {
            debug!(pane = %pane, "detection cache entry expired");
            return None;
        }
        if cached.observed_command != command {
            debug!(
                pane = %pane,
                cached = %cached.observed_command,
                current = %command,
                "command changed, ignoring cached detection"
            );
            return None;
        }
        Some(cached.agent_kind)
    }

    /// Overwrite the entry for `pane` with a fresh TTL.
    pub fn store(&self, pane: PaneId, kind: AgentKind, command: &str, now: Instant) {
        let entry = CachedDetection {
            agent_kind: kind,
            observed_command: command.to_string(),
            // Past the end of the clock the entry is simply born expired.
            expires_at: now.checked_add(self.ttl).unwrap_or(now),
        };
        self.entries.write().insert(pane, entry);
    }

    pub fn invalidate(&self, pane: &PaneId) {
        self.entries.write().remove(pane);
    }

    /// Drop expired entries, e.g. for panes that no longer exist.
    pub fn prune(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, cached| now < cached.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for DetectionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// A pane's detected agent together with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneReport {
    pub pane: PaneId,
    pub agent: AgentKind,
    pub result: AgentResult,
}

/// Decides which classifier applies to a pane and runs it.
///
/// One registry per process; the cache is injected so tests can build
/// isolated instances.
#[derive(Debug, Default)]
pub struct Registry {
    cache: DetectionCache,
}

impl Registry {
    pub fn new(cache: DetectionCache) -> Self {
        Self { cache }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(DetectionCache::new(ttl))
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    pub fn detect(&self, pane: &PaneId, command: &str, raw_output: &str) -> AgentKind {
        self.detect_at(pane, command, raw_output, Instant::now())
    }

    /// Detection with an explicit clock.
    ///
    /// Precedence: valid cache entry, command name, bare shell (always
    /// generic), output heuristics in registration order, generic.
    pub fn detect_at(&self, pane: &PaneId, command: &str, raw_output: &str, now: Instant) -> AgentKind {
        if let Some(kind) = self.cache.lookup(pane, command, now) {
            return kind;
        }

        let kind = detect_uncached(command, raw_output);
        debug!(pane = %pane, command = %command, agent = %kind, "detected agent");
        self.cache.store(pane.clone(), kind, command, now);
        kind
    }

    /// Detect the agent and classify the pane's recent output.
    pub fn classify(&self, pane: &PaneId, command: &str, raw_output: &str) -> PaneReport {
        let agent = self.detect(pane, command, raw_output);
        PaneReport {
            pane: pane.clone(),
            agent,
            result: super::classify(agent, raw_output),
        }
    }
}

fn command_basename(command: &str) -> String {
    let name = command.trim().rsplit('/').next().unwrap_or_default();
    name.trim_start_matches('-').to_lowercase()
}

pub fn is_shell(command: &str) -> bool {
    SHELLS.contains(&command_basename(command).as_str())
}

/// Detection without the cache.
pub fn detect_uncached(command: &str, raw_output: &str) -> AgentKind {
    let name = command_basename(command);
    if !name.is_empty() {
        if let Some(classifier) = CLASSIFIERS
            .iter()
            .find(|c| c.commands.iter().any(|hint| name.contains(hint)))
        {
            return classifier.kind;
        }
    }

    // Known tradeoff: an agent started from an already-open shell is not
    // recognised until the process name changes.
    if is_shell(&name) {
        return AgentKind::Generic;
    }

    let clean = ansi::strip_orphaned(raw_output);
    CLASSIFIERS
        .iter()
        .find(|c| (c.detect)(&clean))
        .map(|c| c.kind)
        .unwrap_or(AgentKind::Generic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pane() -> PaneId {
        PaneId::new("work", 1, 0)
    }

    #[test]
    fn test_pane_id_round_trip() {
        let id: PaneId = "work:1.2".parse().unwrap();
        assert_eq!(id, PaneId::new("work", 1, 2));
        assert_eq!(id.to_string(), "work:1.2");

        let id: PaneId = "a:b:3.0".parse().unwrap();
        assert_eq!(id.session, "a:b");
        assert!("nonsense".parse::<PaneId>().is_err());
        assert!(":1.2".parse::<PaneId>().is_err());
    }

    #[test]
    fn test_command_name_wins() {
        assert_eq!(detect_uncached("claude", ""), AgentKind::Claude);
        assert_eq!(detect_uncached("/usr/local/bin/amp", ""), AgentKind::Amp);
    }

    #[test]
    fn test_shell_short_circuits_output_heuristics() {
        let scrollback = "Welcome to Claude Code\n? for shortcuts";
        assert_eq!(detect_uncached("bash", scrollback), AgentKind::Generic);
        assert_eq!(detect_uncached("-zsh", scrollback), AgentKind::Generic);
        assert!(is_shell("/bin/fish"));
    }

    #[test]
    fn test_output_heuristics_fallback() {
        assert_eq!(detect_uncached("node", "Welcome to Claude Code"), AgentKind::Claude);
        assert_eq!(detect_uncached("node", "Welcome to Amp"), AgentKind::Amp);
        assert_eq!(detect_uncached("node", "\x1b[1mWelcome to Amp\x1b[0m"), AgentKind::Amp);
        assert_eq!(detect_uncached("vim", "plain text"), AgentKind::Generic);
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let registry = Registry::with_ttl(Duration::from_secs(15));
        let now = Instant::now();
        assert_eq!(registry.detect_at(&pane(), "node", "Welcome to Amp", now), AgentKind::Amp);

        // Banner scrolled away, but the cached detection still holds.
        let later = now + Duration::from_secs(5);
        assert_eq!(registry.detect_at(&pane(), "node", "", later), AgentKind::Amp);
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let registry = Registry::with_ttl(Duration::from_secs(15));
        let now = Instant::now();
        registry.detect_at(&pane(), "node", "Welcome to Amp", now);

        let later = now + Duration::from_secs(16);
        assert_eq!(registry.detect_at(&pane(), "node", "", later), AgentKind::Generic);
    }

    #[test]
    fn test_cache_invalidated_when_command_changes() {
        let registry = Registry::with_ttl(Duration::from_secs(15));
        let now = Instant::now();
        assert_eq!(registry.detect_at(&pane(), "amp", "", now), AgentKind::Amp);

        let soon = now + Duration::from_secs(1);
        let scrollback = "╭─50% of 168k─╮\nEsc to cancel";
        assert_eq!(registry.detect_at(&pane(), "bash", scrollback, soon), AgentKind::Generic);
    }

    #[test]
    fn test_generic_detection_is_cached_too() {
        let registry = Registry::default();
        let now = Instant::now();
        registry.detect_at(&pane(), "vim", "", now);
        assert_eq!(registry.cache().lookup(&pane(), "vim", now), Some(AgentKind::Generic));
    }

    #[test]
    fn test_cache_store_overwrites() {
        let cache = DetectionCache::new(Duration::from_secs(15));
        let now = Instant::now();
        cache.store(pane(), AgentKind::Amp, "node", now);
        cache.store(pane(), AgentKind::Claude, "node", now);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&pane(), "node", now), Some(AgentKind::Claude));
    }

    #[test]
    fn test_cache_prune_and_invalidate() {
        let cache = DetectionCache::new(Duration::from_secs(15));
        let now = Instant::now();
        cache.store(pane(), AgentKind::Amp, "amp", now);
        cache.store(PaneId::new("work", 1, 1), AgentKind::Claude, "claude", now);

        cache.invalidate(&pane());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.prune(now + Duration::from_secs(20)), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_huge_ttl_is_clamped() {
        let cache = DetectionCache::new(Duration::from_secs(u64::MAX));
        assert_eq!(cache.ttl(), MAX_TTL);

        let now = Instant::now();
        cache.store(pane(), AgentKind::Amp, "amp", now);
        assert_eq!(cache.lookup(&pane(), "amp", now), Some(AgentKind::Amp));
        assert_eq!(cache.lookup(&pane(), "amp", now + MAX_TTL), None);
    }

    #[test]
    fn test_concurrent_detection() {
        let registry = Arc::new(Registry::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let pane = PaneId::new("work", 0, i);
                    for _ in 0..100 {
                        assert_eq!(registry.detect(&pane, "claude", ""), AgentKind::Claude);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.cache().len(), 8);
    }

    #[test]
    fn test_classify_pane() {
        let registry = Registry::default();
        let report = registry.classify(&pane(), "amp", "Run this command?\n‣ Yes\n  No");
        assert_eq!(report.agent, AgentKind::Amp);
        assert_eq!(report.result.choices, vec!["Yes", "No"]);
    }
}
