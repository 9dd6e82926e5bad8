use std::path::PathBuf;

/// Errors surfaced by the file-facing parts of the crate.
///
/// Classification, detection, reconstruction and ranking never fail; only
/// locating and reading files on disk does.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No session log exists for a working directory. Distinct from a log
    /// that exists but describes an idle session.
    #[error("no session log found for {cwd}")]
    SessionNotFound { cwd: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("invalid pane id: {0}")]
    InvalidPaneId(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SessionNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
