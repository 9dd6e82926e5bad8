//! Works out which coding agent runs in each tmux pane and what it is
//! doing, from the pane's text, the agent's conversation log and the
//! status files its hooks write.

pub mod agent;
pub mod config;
pub mod error;
pub mod session;
pub mod status;
pub mod tmux;

pub use agent::registry::{PaneId, PaneReport, Registry};
pub use agent::{AgentKind, AgentResult, Mode, ResultKind};
pub use config::Config;
pub use error::{Error, Result};
pub use session::SessionState;
pub use status::{Attention, StatusRecord};
