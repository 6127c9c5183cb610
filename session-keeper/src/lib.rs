//! Session Keeper - keeps long-running commands alive in detachable sessions
//!
//! This crate drives GNU screen on behalf of the boot scripts:
//! - Detect whether a named session is running
//! - Create detached sessions with bounded scrollback
//! - Type commands into a session as if a user entered them
//! - Wrap a command in a restart-on-exit shell loop

pub mod backend;
pub mod controller;
pub mod listing;
pub mod logging;
pub mod persist;

#[cfg(test)]
mod testing;

pub use backend::{DryRunBackend, ScreenBackend, SessionBackend, DEFAULT_HISTORY_LINES};
pub use controller::{ensure_newline, SendOutcome, SessionController, StartOutcome};
pub use listing::{listing_contains, parse_listing, SessionEntry, SessionState};
pub use persist::{LaunchOutcome, PersistentCommand, DEFAULT_RESTART_DELAY_SECS};

/// Failures of the external session manager.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}
