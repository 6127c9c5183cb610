//! Named session control: detect, create, inject, exit.

use std::borrow::Cow;

use tracing::{debug, error, info};

use crate::backend::{SessionBackend, DEFAULT_HISTORY_LINES};
use crate::listing::listing_contains;
use crate::SessionError;

/// Result of `SessionController::start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Created,
    /// A session with the same name exists; nothing was created.
    AlreadyRunning,
}

/// Result of `SessionController::send_command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Injected,
    /// No session to inject into; nothing was sent.
    NoSession,
}

/// Drives one named session through a backend.
pub struct SessionController<B> {
    backend: B,
    name: String,
    history: u32,
}

impl<B: SessionBackend> SessionController<B> {
    pub fn new(backend: B, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            history: DEFAULT_HISTORY_LINES,
        }
    }

    pub fn with_history(mut self, history: u32) -> Self {
        self.history = history;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether the session manager currently lists this session.
    pub async fn exists(&self) -> Result<bool, SessionError> {
        let listing = self.backend.list(None).await?;
        let found = listing_contains(&listing, &self.name);
        debug!("Session '{}' exists: {}", self.name, found);
        Ok(found)
    }

    /// Raw listing of every session.
    pub async fn list(&self) -> Result<String, SessionError> {
        self.backend.list(None).await
    }

    /// Create the session unless one with the same name is running.
    pub async fn start(&self) -> Result<StartOutcome, SessionError> {
        if self.exists().await? {
            let listing = self.backend.list(Some(&self.name)).await?;
            error!(
                "Screen with name '{}' already exists. Starting new screen with same name is not allowed.\n{}",
                self.name,
                listing.trim_end()
            );
            return Ok(StartOutcome::AlreadyRunning);
        }

        self.backend.create(&self.name, self.history).await?;
        info!("Started screen '{}' ({} lines of history)", self.name, self.history);
        Ok(StartOutcome::Created)
    }

    /// Type `text` into the session, newline-terminated.
    pub async fn send_command(&self, text: &str) -> Result<SendOutcome, SessionError> {
        if !self.exists().await? {
            let listing = self.backend.list(None).await?;
            error!(
                "Screen with name '{}' does not exist. Screen must exist to run command inside it.\nScreen list:\n{}",
                self.name,
                listing.trim_end()
            );
            return Ok(SendOutcome::NoSession);
        }

        let line = ensure_newline(text);
        debug!("Injecting into '{}': {:?}", self.name, line);
        self.backend.stuff(&self.name, &line).await?;
        Ok(SendOutcome::Injected)
    }

    /// Ask the session's shell to exit.
    pub async fn exit(&self) -> Result<SendOutcome, SessionError> {
        self.send_command("exit").await
    }
}

/// Append a newline unless the text already ends with one.
pub fn ensure_newline(text: &str) -> Cow<'_, str> {
    if text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{}\n", text))
    }
}
