use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::{Instant, SystemTime};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use agent_watch::session::load_session_state;
use agent_watch::status::{self, Attention, Observation};
use agent_watch::tmux::TmuxClient;
use agent_watch::{AgentKind, AgentResult, Config, Registry};

/// One line of output: a tmux session and its panes, most urgent first.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionReport<'a> {
    session: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    most_urgent: Option<&'a Attention>,
    panes: &'a [Attention],
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the reports
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let once = std::env::args().skip(1).any(|arg| arg == "--once");
    let config = Config::load()?;
    info!(
        projects_dir = %config.projects_dir.display(),
        status_dir = %config.status_dir.display(),
        interval_ms = config.poll_interval_ms,
        "starting agent-watch"
    );

    let registry = Registry::with_ttl(config.cache_ttl());
    let client = TmuxClient::new();

    if once {
        return poll(&client, &registry, &config).await;
    }

    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = poll(&client, &registry, &config).await {
                    warn!(error = %e, "poll failed");
                }
            }
            _ = &mut shutdown => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    Ok(())
}

/// Capture, classify, fuse and print every tmux session once.
async fn poll(client: &TmuxClient, registry: &Registry, config: &Config) -> Result<()> {
    if !client.is_server_running().await {
        debug!("tmux server not running");
        return Ok(());
    }

    let panes = client.list_panes().await?;
    let records = status::read_status_dir(&config.status_dir)?;

    let mut sessions: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
    for pane in panes {
        let text = match client.capture_pane(&pane.id, config.recent_lines).await {
            Ok(text) => text,
            Err(e) => {
                // Pane closed between listing and capture
                debug!(pane = %pane.id, error = %e, "skipping pane");
                continue;
            }
        };

        let report = registry.classify(&pane.id, &pane.command, &text);
        let log = match report.agent {
            AgentKind::Claude => session_log_result(config, &pane.cwd),
            _ => None,
        };
        sessions
            .entry(pane.id.session.clone())
            .or_default()
            .push(Observation::new(report).with_log(log));
    }

    let pruned = registry.cache().prune(Instant::now());
    if pruned > 0 {
        debug!(pruned, "dropped expired detections");
    }

    let now = SystemTime::now();
    let mut out = std::io::stdout().lock();
    for (session, observations) in &sessions {
        let legacy = status::read_pane_statuses(&config.status_dir, session).unwrap_or_else(|e| {
            debug!(session = %session, error = %e, "ignoring pane status file");
            Vec::new()
        });
        let ranked = status::resolve(&records, &legacy, observations, now, config.status_stale_after());
        let report = SessionReport {
            session,
            most_urgent: status::most_urgent(&ranked),
            panes: &ranked,
        };
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
    }
    out.flush()?;

    Ok(())
}

/// Log-derived result for a pane, if its working directory has a session.
fn session_log_result(config: &Config, cwd: &Path) -> Option<AgentResult> {
    match load_session_state(config, cwd) {
        Ok(state) => Some(state.to_result()),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            warn!(cwd = %cwd.display(), error = %e, "failed to read session log");
            None
        }
    }
}
