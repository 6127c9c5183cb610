//! Operator console used in place of the plain inter-cycle sleep.

use std::io::{BufRead, Write};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::source::{split_lines, SensorSource};

/// Wait after the operator sent something to the device.
pub const COMMAND_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Poll again.
    Continue,
    /// Stop the bridge.
    Quit,
}

/// Operator input is read on a detached thread and handed over a channel,
/// so a pending read never holds up runtime shutdown.
pub struct Console {
    lines: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

impl Console {
    pub fn stdin() -> Self {
        Self::from_std_reader(std::io::BufReader::new(std::io::stdin()))
    }

    pub fn from_std_reader(reader: impl BufRead + Send + 'static) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new()
            .name("console-input".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Console read failed: {}", e);
                            break;
                        }
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start console reader: {}", e);
        }
        Self {
            lines: rx,
            closed: false,
        }
    }

    /// Wait up to `wait` for operator input. Other text goes to the device
    /// and its reply is echoed, then the wait restarts at 30 s.
    pub async fn wait<S: SensorSource>(&mut self, wait: Duration, source: &mut S) -> ConsoleAction {
        let mut wait = wait;
        loop {
            if self.closed {
                tokio::time::sleep(wait).await;
                return ConsoleAction::Continue;
            }

            print!(
                "You have {} seconds to enter input...\nCommand [continue, quit]: ",
                wait.as_secs()
            );
            let _ = std::io::stdout().flush();

            let line = match tokio::time::timeout(wait, self.lines.recv()).await {
                Err(_) => {
                    println!("\nNo input read. Moving on...");
                    return ConsoleAction::Continue;
                }
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Console input closed");
                    self.closed = true;
                    continue;
                }
            };

            let command = line.trim();
            match command.to_lowercase().as_str() {
                "" | "continue" => return ConsoleAction::Continue,
                "quit" => return ConsoleAction::Quit,
                _ => {}
            }

            match source.query(command.as_bytes()).await {
                Ok(reply) => {
                    for line in split_lines(&reply) {
                        println!("{}", line);
                    }
                }
                Err(e) => warn!("Sending '{}' to {} failed: {}", command, source.describe(), e),
            }
            wait = COMMAND_WAIT;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    use std::io::Cursor;
    use std::os::unix::net::UnixStream;

    fn scripted(input: &'static str) -> Console {
        Console::from_std_reader(Cursor::new(input))
    }

    #[tokio::test]
    async fn test_quit_and_continue() {
        let mut source = ScriptedSource::new(Vec::<String>::new());
        let mut quitting = scripted("quit\n");
        assert_eq!(quitting.wait(Duration::from_secs(5), &mut source).await, ConsoleAction::Quit);

        let mut continuing = scripted("Continue\n");
        assert_eq!(
            continuing.wait(Duration::from_secs(5), &mut source).await,
            ConsoleAction::Continue
        );
        assert!(source.queries().is_empty());
    }

    #[tokio::test]
    async fn test_other_text_goes_to_device() {
        let mut source = ScriptedSource::new(["set ok\r\n"]);
        let mut console = scripted("s 42\nquit\n");
        assert_eq!(console.wait(Duration::from_secs(5), &mut source).await, ConsoleAction::Quit);
        assert_eq!(source.queries(), vec![b"s 42".to_vec()]);
    }

    #[tokio::test]
    async fn test_silence_times_out() {
        let (_operator, input) = UnixStream::pair().unwrap();
        let mut console = Console::from_std_reader(std::io::BufReader::new(input));
        let mut source = ScriptedSource::new(Vec::<String>::new());
        assert_eq!(
            console.wait(Duration::from_millis(50), &mut source).await,
            ConsoleAction::Continue
        );
    }

    #[test]
    fn test_pending_read_does_not_block_runtime_shutdown() {
        let (_operator, input) = UnixStream::pair().unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let mut console = Console::from_std_reader(std::io::BufReader::new(input));
        let mut source = ScriptedSource::new(Vec::<String>::new());
        let action = runtime.block_on(console.wait(Duration::from_millis(20), &mut source));
        assert_eq!(action, ConsoleAction::Continue);

        let started = std::time::Instant::now();
        drop(console);
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_input_sleeps_then_continues() {
        let mut source = ScriptedSource::new(Vec::<String>::new());
        let mut console = scripted("");
        let started = tokio::time::Instant::now();
        assert_eq!(
            console.wait(Duration::from_secs(60), &mut source).await,
            ConsoleAction::Continue
        );
        assert!(started.elapsed() >= Duration::from_secs(60));
    }
}
