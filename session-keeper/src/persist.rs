//! Shell line sequence that keeps a command running inside a session.

use std::path::PathBuf;

use tracing::{error, info};

use crate::backend::SessionBackend;
use crate::controller::{SendOutcome, SessionController, StartOutcome};
use crate::SessionError;

/// Default pause between restarts.
pub const DEFAULT_RESTART_DELAY_SECS: u64 = 300;

/// Result of `PersistentCommand::launch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new session was created and the command typed into it.
    Started,
    /// The session was already running; the command was typed anyway.
    Forced,
    /// The session was already running and `force` was off; nothing sent.
    Refused,
    /// The session went away before every line was typed.
    Vanished,
}

/// A command plus the restart policy it runs under.
#[derive(Debug, Clone)]
pub struct PersistentCommand {
    pub workdir: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    pub sleep_secs: u64,
    /// Wrap the command in an endless restart loop.
    pub looped: bool,
}

impl PersistentCommand {
    pub fn new(command: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            command: command.into(),
            args: Vec::new(),
            sleep_secs: DEFAULT_RESTART_DELAY_SECS,
            looped: true,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn sleep_secs(mut self, secs: u64) -> Self {
        self.sleep_secs = secs;
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// The command line with its appended arguments, arguments quoted.
    pub fn invocation(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_words::quote(arg));
        }
        line
    }

    /// Lines to type into the session, in execution order.
    pub fn lines(&self) -> Vec<String> {
        if !self.looped {
            return vec!["date".to_string(), self.invocation()];
        }

        vec![
            format!(
                "cd {}",
                shell_words::quote(&self.workdir.to_string_lossy())
            ),
            "while :; do".to_string(),
            "date".to_string(),
            self.invocation(),
            format!(
                "echo 'Sleeping for {} seconds (Ctrl-c to exit)...'",
                self.sleep_secs
            ),
            format!("sleep {}", self.sleep_secs),
            "done".to_string(),
        ]
    }

    /// Inject every line, one `send_command` per line. Stops at the first
    /// line the session did not receive.
    pub async fn inject<B: SessionBackend>(
        &self,
        controller: &SessionController<B>,
    ) -> Result<SendOutcome, SessionError> {
        for line in self.lines() {
            info!("Executing the following command in screen '{}': {}", controller.name(), line);
            if controller.send_command(&line).await? == SendOutcome::NoSession {
                return Ok(SendOutcome::NoSession);
            }
        }
        Ok(SendOutcome::Injected)
    }

    /// Make sure the session exists, then inject. An already running
    /// session only receives the command with `force`; it is never
    /// recreated.
    pub async fn launch<B: SessionBackend>(
        &self,
        controller: &SessionController<B>,
        force: bool,
    ) -> Result<LaunchOutcome, SessionError> {
        let outcome = if controller.exists().await? {
            if !force {
                error!(
                    "Screen with name '{}' already running. Use --force to send the command anyway. Exiting...",
                    controller.name()
                );
                return Ok(LaunchOutcome::Refused);
            }
            info!("Screen '{}' already running, forcing command injection", controller.name());
            LaunchOutcome::Forced
        } else {
            if controller.start().await? == StartOutcome::AlreadyRunning {
                return Ok(LaunchOutcome::Refused);
            }
            LaunchOutcome::Started
        };

        match self.inject(controller).await? {
            SendOutcome::Injected => Ok(outcome),
            SendOutcome::NoSession => Ok(LaunchOutcome::Vanished),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DryRunBackend;
    use crate::testing::MockBackend;

    fn sample() -> PersistentCommand {
        PersistentCommand::new("./telemetry-bridge", "/home/pi/bridge")
            .args(vec!["/dev/ttyACM0".to_string()])
            .sleep_secs(30)
    }

    #[test]
    fn test_looped_lines() {
        assert_eq!(
            sample().lines(),
            vec![
                "cd /home/pi/bridge",
                "while :; do",
                "date",
                "./telemetry-bridge /dev/ttyACM0",
                "echo 'Sleeping for 30 seconds (Ctrl-c to exit)...'",
                "sleep 30",
                "done",
            ]
        );
    }

    #[test]
    fn test_no_loop_lines() {
        assert_eq!(
            sample().looped(false).lines(),
            vec!["date", "./telemetry-bridge /dev/ttyACM0"]
        );
    }

    #[test]
    fn test_arguments_are_quoted() {
        let cmd = PersistentCommand::new("./run.sh", "/tmp my dir")
            .args(vec!["a b".to_string(), "plain".to_string()]);
        assert_eq!(cmd.invocation(), "./run.sh 'a b' plain");
        assert_eq!(cmd.lines()[0], "cd '/tmp my dir'");
    }

    #[tokio::test]
    async fn test_inject_preserves_order() {
        let controller = SessionController::new(MockBackend::with_sessions(&["bridge"]), "bridge");
        let outcome = sample().inject(&controller).await.unwrap();
        assert_eq!(outcome, SendOutcome::Injected);

        let sent: Vec<String> = controller
            .backend()
            .injected()
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        let expected: Vec<String> = sample().lines().into_iter().map(|l| format!("{}\n", l)).collect();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn test_inject_stops_without_session() {
        let controller = SessionController::new(MockBackend::new(), "bridge");
        let outcome = sample().inject(&controller).await.unwrap();
        assert_eq!(outcome, SendOutcome::NoSession);
        assert!(controller.backend().injected().is_empty());
    }

    fn typed(backend: &MockBackend) -> Vec<String> {
        backend.injected().into_iter().map(|(_, text)| text).collect()
    }

    #[tokio::test]
    async fn test_launch_fresh_session() {
        let controller = SessionController::new(MockBackend::new(), "bridge");
        assert_eq!(sample().launch(&controller, false).await.unwrap(), LaunchOutcome::Started);
        assert_eq!(controller.backend().created().len(), 1);
        assert_eq!(typed(controller.backend()).len(), 7);
    }

    #[tokio::test]
    async fn test_launch_refuses_running_session() {
        let controller = SessionController::new(MockBackend::with_sessions(&["bridge"]), "bridge");
        assert_eq!(sample().launch(&controller, false).await.unwrap(), LaunchOutcome::Refused);
        assert!(controller.backend().created().is_empty());
        assert!(controller.backend().injected().is_empty());
    }

    #[tokio::test]
    async fn test_launch_forced_into_running_session() {
        let controller = SessionController::new(MockBackend::with_sessions(&["bridge"]), "bridge");
        assert_eq!(sample().launch(&controller, true).await.unwrap(), LaunchOutcome::Forced);
        assert!(controller.backend().created().is_empty());
        assert_eq!(typed(controller.backend())[3], "./telemetry-bridge /dev/ttyACM0\n");
    }

    #[tokio::test]
    async fn test_launch_without_loop() {
        let controller = SessionController::new(MockBackend::new(), "bridge");
        let outcome = sample().looped(false).launch(&controller, false).await.unwrap();
        assert_eq!(outcome, LaunchOutcome::Started);
        assert_eq!(
            typed(controller.backend()),
            vec!["date\n", "./telemetry-bridge /dev/ttyACM0\n"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_launch_prints_every_line() {
        let controller = SessionController::new(DryRunBackend::new(), "bridge");
        assert_eq!(sample().launch(&controller, false).await.unwrap(), LaunchOutcome::Started);
        assert_eq!(controller.backend().sessions(), vec!["bridge"]);
        assert_eq!(controller.backend().injected().len(), sample().lines().len());
    }
}
