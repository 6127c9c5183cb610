//! In-memory session manager for tests: records calls and keeps a fake
//! process table.

use std::sync::Mutex;

use crate::backend::SessionBackend;
use crate::SessionError;

#[derive(Default)]
struct MockState {
    sessions: Vec<String>,
    created: Vec<(String, u32)>,
    injected: Vec<(String, String)>,
}

#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    fail_stuff: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(names: &[&str]) -> Self {
        let backend = Self::new();
        backend.state.lock().unwrap().sessions = names.iter().map(|n| n.to_string()).collect();
        backend
    }

    /// Make every injection fail as a non-zero exit would.
    pub fn failing_stuff(mut self) -> Self {
        self.fail_stuff = true;
        self
    }

    pub fn created(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn injected(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().injected.clone()
    }
}

impl SessionBackend for MockBackend {
    async fn list(&self, name: Option<&str>) -> Result<String, SessionError> {
        let state = self.state.lock().unwrap();
        let lines: Vec<String> = state
            .sessions
            .iter()
            .filter(|s| name.map_or(true, |n| s.as_str() == n))
            .enumerate()
            .map(|(i, s)| format!("\t{}.{}\t(Detached)", 1000 + i, s))
            .collect();
        if lines.is_empty() {
            return Ok("No Sockets found in /run/screen/S-test.\n".to_string());
        }
        Ok(format!(
            "There are screens on:\n{}\n{} Sockets in /run/screen/S-test.\n",
            lines.join("\n"),
            lines.len()
        ))
    }

    async fn create(&self, name: &str, history: u32) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        state.sessions.push(name.to_string());
        state.created.push((name.to_string(), history));
        Ok(())
    }

    async fn stuff(&self, name: &str, text: &str) -> Result<(), SessionError> {
        if self.fail_stuff {
            return Err(SessionError::Failed {
                command: format!("screen -S {} -X stuff", name),
                code: Some(1),
                stderr: "No screen session found.".to_string(),
            });
        }
        let mut state = self.state.lock().unwrap();
        state.injected.push((name.to_string(), text.to_string()));
        if text.trim_end() == "exit" {
            state.sessions.retain(|s| s != name);
        }
        Ok(())
    }
}
