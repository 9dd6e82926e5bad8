//! Locating and reading session logs on disk.
//!
//! Logs live under `<projects_dir>/<encoded cwd>/<session id>.jsonl`. Only
//! the tail of the newest log is read; a partial first line and malformed
//! lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use super::log::LogMessage;
use super::state::{reconstruct_window, SessionState};
use crate::config::Config;
use crate::error::{Error, Result};

const LOG_EXTENSION: &str = "jsonl";

/// Directory name a working directory is filed under: every `/` and `.`
/// becomes `-`.
pub fn encode_cwd(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '.' || c == '\\' { '-' } else { c })
        .collect()
}

pub fn project_dir(projects_dir: &Path, cwd: &Path) -> PathBuf {
    projects_dir.join(encode_cwd(cwd))
}

/// Newest log file for `cwd`, by modification time.
pub fn find_session_log(projects_dir: &Path, cwd: &Path) -> Result<PathBuf> {
    let dir = project_dir(projects_dir, cwd);
    if !dir.is_dir() {
        return Err(Error::SessionNotFound {
            cwd: cwd.to_path_buf(),
        });
    }

    WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == LOG_EXTENSION)
        })
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.into_path())
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
        .ok_or_else(|| Error::SessionNotFound {
            cwd: cwd.to_path_buf(),
        })
}

/// Parse the last `tail_bytes` of a log file.
pub fn read_log_tail(path: &Path, tail_bytes: u64) -> Result<Vec<LogMessage>> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::SessionNotFound {
            cwd: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        },
        _ => Error::io(path, e),
    })?;
    let len = file.metadata().map_err(|e| Error::io(path, e))?.len();
    let start = len.saturating_sub(tail_bytes);
    // Back up one byte so a cut on a line boundary only discards the newline.
    let seek_to = start.saturating_sub(1);
    file.seek(SeekFrom::Start(seek_to))
        .map_err(|e| Error::io(path, e))?;

    let mut reader = BufReader::new(file);
    if start > 0 {
        let mut partial = Vec::new();
        reader
            .read_until(b'\n', &mut partial)
            .map_err(|e| Error::io(path, e))?;
    }

    let mut messages = Vec::new();
    let mut skipped = 0usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }
        match LogMessage::parse_line(&line) {
            Some(msg) => messages.push(msg),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(path = %path.display(), skipped, "skipped malformed log lines");
    }
    Ok(messages)
}

/// Read and replay the session running in `cwd`.
pub fn load_session_state(config: &Config, cwd: &Path) -> Result<SessionState> {
    let path = find_session_log(&config.projects_dir, cwd)?;
    let messages = read_log_tail(&path, config.log_tail_bytes)?;
    debug!(path = %path.display(), messages = messages.len(), "replaying session log");
    Ok(reconstruct_window(&messages, config.log_window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_log(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn test_encode_cwd() {
        assert_eq!(encode_cwd(Path::new("/home/me/my.repo")), "-home-me-my-repo");
    }

    #[test]
    fn test_missing_project_dir_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let err = find_session_log(root.path(), Path::new("/nowhere")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_project_dir_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(project_dir(root.path(), Path::new("/repo"))).unwrap();
        let err = find_session_log(root.path(), Path::new("/repo")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_finds_log_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = project_dir(root.path(), Path::new("/repo"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a log").unwrap();
        let log = write_log(&dir, "abc.jsonl", &[r#"{"type":"user","message":{"content":"hi"}}"#]);

        assert_eq!(find_session_log(root.path(), Path::new("/repo")).unwrap(), log);
    }

    #[test]
    fn test_read_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "s.jsonl",
            &[
                r#"{"type":"user","message":{"content":"one"}}"#,
                "{ this is not json",
                "",
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"two"}]}}"#,
            ],
        );
        let messages = read_log_tail(&path, 1 << 20).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text(), "two");
    }

    #[test]
    fn test_tail_read_drops_partial_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let first = r#"{"type":"user","message":{"content":"a long first message that will be cut"}}"#;
        let second = r#"{"type":"user","message":{"content":"kept"}}"#;
        let path = write_log(dir.path(), "s.jsonl", &[first, second]);

        let tail = (second.len() + 10) as u64;
        let messages = read_log_tail(&path, tail).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "kept");
    }

    #[test]
    fn test_tail_read_on_line_boundary_keeps_line() {
        let dir = tempfile::tempdir().unwrap();
        let first = r#"{"type":"user","message":{"content":"first"}}"#;
        let second = r#"{"type":"user","message":{"content":"second"}}"#;
        let path = write_log(dir.path(), "s.jsonl", &[first, second]);

        let messages = read_log_tail(&path, (second.len() + 1) as u64).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "second");

        let whole = (first.len() + second.len() + 2) as u64;
        assert_eq!(read_log_tail(&path, whole).unwrap().len(), 2);
    }

    #[test]
    fn test_load_session_state() {
        let root = tempfile::tempdir().unwrap();
        let dir = project_dir(root.path(), Path::new("/repo"));
        std::fs::create_dir_all(&dir).unwrap();
        write_log(
            &dir,
            "s.jsonl",
            &[
                r#"{"type":"user","sessionId":"s","message":{"content":"go"}}"#,
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Shall I continue?"}],"stop_reason":"end_turn"}}"#,
            ],
        );
        let config = Config {
            projects_dir: root.path().to_path_buf(),
            ..Config::default()
        };
        let state = load_session_state(&config, Path::new("/repo")).unwrap();
        assert_eq!(state.session_id.as_deref(), Some("s"));
        assert_eq!(state.question.as_deref(), Some("Shall I continue?"));
    }
}
