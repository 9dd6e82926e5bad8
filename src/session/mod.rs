//! Session state from the agent's own conversation log.

pub mod log;
pub mod reader;
pub mod state;

pub use log::{ContentBlock, LogMessage, MessageKind, Todo, TodoStatus};
pub use reader::{find_session_log, load_session_state, read_log_tail};
pub use state::{reconstruct, reconstruct_window, SessionState};
