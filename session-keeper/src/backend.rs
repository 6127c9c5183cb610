//! Session manager backends
//!
//! `SessionBackend` is the seam between the controller and the external
//! multiplexer:
//! - `ScreenBackend` drives GNU screen through its command line
//! - `DryRunBackend` prints what would be executed (no-op mode)
//!
//! The argument vectors are built by `ScreenCommand` so they can be checked
//! without spawning anything.

use std::process::{Output, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

use crate::SessionError;

/// Default scrollback kept by a new session.
pub const DEFAULT_HISTORY_LINES: u32 = 5000;

/// Operations the controller needs from a session manager.
#[allow(async_fn_in_trait)]
pub trait SessionBackend {
    /// Raw listing of sessions, optionally narrowed to `name`.
    async fn list(&self, name: Option<&str>) -> Result<String, SessionError>;

    /// Start a detached session keeping `history` lines of scrollback.
    async fn create(&self, name: &str, history: u32) -> Result<(), SessionError>;

    /// Write `text` into the session's input as if typed.
    async fn stuff(&self, name: &str, text: &str) -> Result<(), SessionError>;
}

/// Builds screen argument vectors without executing them.
pub struct ScreenCommand;

impl ScreenCommand {
    /// `screen -h <history> -dmS <name>`
    pub fn create(name: &str, history: u32) -> Vec<String> {
        vec![
            "-h".to_string(),
            history.to_string(),
            "-dmS".to_string(),
            name.to_string(),
        ]
    }

    /// `screen -S <name> -X stuff <text>`
    pub fn stuff(name: &str, text: &str) -> Vec<String> {
        vec![
            "-S".to_string(),
            name.to_string(),
            "-X".to_string(),
            "stuff".to_string(),
            text.to_string(),
        ]
    }

    /// `screen -ls [name]`
    pub fn list(name: Option<&str>) -> Vec<String> {
        let mut args = vec!["-ls".to_string()];
        if let Some(name) = name {
            args.push(name.to_string());
        }
        args
    }
}

/// GNU screen driven through its CLI.
#[derive(Debug, Clone)]
pub struct ScreenBackend {
    program: String,
    verbose: bool,
}

impl Default for ScreenBackend {
    fn default() -> Self {
        Self {
            program: "screen".to_string(),
            verbose: false,
        }
    }
}

impl ScreenBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            verbose: false,
        }
    }

    /// Print every command line before running it.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn render(&self, args: &[String]) -> String {
        let mut words = vec![self.program.clone()];
        words.extend(args.iter().cloned());
        shell_words::join(words)
    }

    async fn output(&self, args: &[String]) -> Result<Output, SessionError> {
        let rendered = self.render(args);
        if self.verbose {
            info!("cmd: {}", rendered);
        } else {
            debug!("cmd: {}", rendered);
        }

        AsyncCommand::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| SessionError::Spawn {
                command: rendered,
                source,
            })
    }

    /// Run to completion; a non-zero exit is fatal to the operation.
    async fn checked(&self, args: &[String]) -> Result<(), SessionError> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SessionError::Failed {
                command: self.render(args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl SessionBackend for ScreenBackend {
    async fn list(&self, name: Option<&str>) -> Result<String, SessionError> {
        // `screen -ls` exits non-zero when nothing is running; the text is
        // still the listing.
        let output = self.output(&ScreenCommand::list(name)).await?;
        let mut listing = String::from_utf8_lossy(&output.stdout).to_string();
        if listing.trim().is_empty() {
            listing = String::from_utf8_lossy(&output.stderr).to_string();
        }
        Ok(listing)
    }

    async fn create(&self, name: &str, history: u32) -> Result<(), SessionError> {
        self.checked(&ScreenCommand::create(name, history)).await
    }

    async fn stuff(&self, name: &str, text: &str) -> Result<(), SessionError> {
        self.checked(&ScreenCommand::stuff(name, text)).await
    }
}

impl<B: SessionBackend + ?Sized> SessionBackend for &B {
    async fn list(&self, name: Option<&str>) -> Result<String, SessionError> {
        (**self).list(name).await
    }

    async fn create(&self, name: &str, history: u32) -> Result<(), SessionError> {
        (**self).create(name, history).await
    }

    async fn stuff(&self, name: &str, text: &str) -> Result<(), SessionError> {
        (**self).stuff(name, text).await
    }
}

#[derive(Debug, Default)]
struct DryRunState {
    sessions: Vec<String>,
    injected: Vec<(String, String)>,
}

/// Echoes instead of executing. Sessions it pretends to create show up in
/// its own listing, so a dry run walks the same path as a fresh start.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    state: Mutex<DryRunState>,
}

impl DryRunBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions that would have been created.
    pub fn sessions(&self) -> Vec<String> {
        self.lock().sessions.clone()
    }

    /// `(session, text)` pairs that would have been typed.
    pub fn injected(&self) -> Vec<(String, String)> {
        self.lock().injected.clone()
    }

    fn lock(&self) -> MutexGuard<'_, DryRunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionBackend for DryRunBackend {
    async fn list(&self, name: Option<&str>) -> Result<String, SessionError> {
        let state = self.lock();
        let entries: Vec<String> = state
            .sessions
            .iter()
            .filter(|s| name.map_or(true, |n| s.as_str() == n))
            .enumerate()
            .map(|(i, s)| format!("\t{}.{}\t(Detached)", i + 1, s))
            .collect();
        if entries.is_empty() {
            return Ok("No Sockets found.\n".to_string());
        }
        Ok(format!("There are screens on:\n{}\n", entries.join("\n")))
    }

    async fn create(&self, name: &str, history: u32) -> Result<(), SessionError> {
        println!(
            "Would be starting screen with name '{}' ({} lines of history)",
            name, history
        );
        self.lock().sessions.push(name.to_string());
        Ok(())
    }

    async fn stuff(&self, name: &str, text: &str) -> Result<(), SessionError> {
        println!(
            "Would be executing the following in screen '{}':\n {}",
            name,
            text.trim_end_matches('\n')
        );
        let mut state = self.lock();
        state.injected.push((name.to_string(), text.to_string()));
        if text.trim_end() == "exit" {
            state.sessions.retain(|s| s != name);
        }
        Ok(())
    }
}
