//! screenctl - start, feed, exit or list named screen sessions
//!
//! `-s`, `-r` and `-e` may be combined; they run in the order start, every
//! `-r` command, then exit. With none of them the sessions are listed.

use anyhow::{bail, Context, Result};
use clap::Parser;
use session_keeper::{ScreenBackend, SessionBackend, SessionController, DEFAULT_HISTORY_LINES};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "screenctl",
    about = "Start, send commands to, exit or list named screen sessions",
    version
)]
struct Cli {
    /// Name of the screen to start, send commands to, or exit
    #[arg(value_name = "SCREEN_NAME")]
    screen_name: Option<String>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// List running screens
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Start a screen with the given name
    #[arg(short = 's', long = "start")]
    start: bool,

    /// Run command in the named screen (repeatable; quote commands with spaces)
    #[arg(short = 'r', long = "run", value_name = "CMD", allow_hyphen_values = true)]
    run: Vec<String>,

    /// Exit the named screen
    #[arg(short = 'e', long = "exit")]
    exit: bool,

    /// Scrollback lines kept by a new session
    #[arg(long, value_name = "LINES", default_value_t = DEFAULT_HISTORY_LINES)]
    history: u32,
}

impl Cli {
    fn has_action(&self) -> bool {
        self.start || !self.run.is_empty() || self.exit
    }

    fn validate(&self) -> Result<()> {
        match (&self.screen_name, self.has_action()) {
            (None, true) => bail!("If -s, -r or -e are specified, a screen name must be given"),
            (Some(name), false) => {
                bail!("Found unneeded argument '{}' when -s, -r or -e are not used", name)
            }
            _ => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    session_keeper::logging::init(cli.verbose);
    cli.validate()?;

    let backend = ScreenBackend::default().verbose(cli.verbose);

    if let Some(name) = cli.screen_name.clone() {
        let controller = SessionController::new(backend.clone(), name).with_history(cli.history);

        if cli.start {
            controller.start().await.context("Failed to start screen")?;
        }
        for cmd in &cli.run {
            controller
                .send_command(cmd)
                .await
                .with_context(|| format!("Failed to run '{}'", cmd))?;
        }
        if cli.exit {
            controller.exit().await.context("Failed to exit screen")?;
        }
    }

    if cli.list || !cli.has_action() {
        debug!("Listing screens");
        println!("{}", backend.list(None).await.context("Failed to list screens")?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_actions_need_a_name() {
        assert!(Cli::parse_from(["screenctl", "-s"]).validate().is_err());
        assert!(Cli::parse_from(["screenctl", "sensors"]).validate().is_err());
        assert!(Cli::parse_from(["screenctl"]).validate().is_ok());
        assert!(Cli::parse_from(["screenctl", "-l"]).validate().is_ok());
    }

    #[test]
    fn test_multiple_run_commands_keep_order() {
        let cli = Cli::parse_from(["screenctl", "-s", "-r", "cd /tmp", "-r", "ls -la", "-e", "x"]);
        cli.validate().unwrap();
        assert_eq!(cli.run, vec!["cd /tmp", "ls -la"]);
        assert!(cli.start && cli.exit);
    }
}
