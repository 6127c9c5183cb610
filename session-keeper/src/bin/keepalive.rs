//! keepalive - run a command persistently inside a named screen session
//!
//! The command is typed into the session wrapped in a restart loop, so it
//! survives terminal disconnects and is restarted after it exits.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use session_keeper::{
    DryRunBackend, LaunchOutcome, PersistentCommand, ScreenBackend, SessionBackend,
    SessionController, DEFAULT_HISTORY_LINES, DEFAULT_RESTART_DELAY_SECS,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "keepalive",
    about = "Run a command persistently inside a named screen session",
    version
)]
struct Cli {
    /// Command to run inside the session
    #[arg(
        value_name = "COMMAND",
        required_unless_present_any = ["exit", "list"]
    )]
    command: Option<String>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// No operation, just echo the commands
    #[arg(short = 'n', long = "noOp")]
    no_op: bool,

    /// Argument appended to the command (repeatable)
    #[arg(short = 'a', long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Session name (defaults to the command's file stem)
    #[arg(long = "screenName", value_name = "NAME", env = "KEEPALIVE_SCREEN_NAME")]
    screen_name: Option<String>,

    /// Seconds to sleep before restarting the command
    #[arg(
        short = 's',
        long = "sleep",
        value_name = "SECONDS",
        default_value_t = DEFAULT_RESTART_DELAY_SECS,
        env = "KEEPALIVE_SLEEP_SECS"
    )]
    sleep_secs: u64,

    /// Run the command once instead of in a restart loop
    #[arg(long = "noLoop")]
    no_loop: bool,

    /// Send the commands even if the session is already running
    #[arg(short, long)]
    force: bool,

    /// Exit the named session
    #[arg(
        short = 'e',
        long = "exit",
        conflicts_with_all = ["command", "list"],
        requires = "screen_name"
    )]
    exit: bool,

    /// List running sessions
    #[arg(short = 'l', long = "listScreens", conflicts_with = "command")]
    list: bool,

    /// Directory the loop changes into (defaults to this program's directory)
    #[arg(long, value_name = "DIR", env = "KEEPALIVE_WORKDIR")]
    workdir: Option<PathBuf>,

    /// Scrollback lines kept by a new session
    #[arg(long, value_name = "LINES", default_value_t = DEFAULT_HISTORY_LINES)]
    history: u32,
}

impl Cli {
    fn session_name(&self) -> Option<String> {
        self.screen_name.clone().or_else(|| {
            self.command
                .as_deref()
                .and_then(|c| Path::new(c).file_stem())
                .map(|s| s.to_string_lossy().to_string())
        })
    }

    fn workdir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.workdir {
            return Ok(dir.clone());
        }
        let exe = std::env::current_exe().context("Failed to locate keepalive executable")?;
        Ok(exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

async fn run<B: SessionBackend>(cli: &Cli, backend: B) -> Result<()> {
    if cli.list {
        print!("{}", backend.list(None).await.context("Failed to list sessions")?);
        return Ok(());
    }

    let name = cli
        .session_name()
        .context("Could not derive a session name; use --screenName")?;
    let controller = SessionController::new(backend, name).with_history(cli.history);

    if cli.exit {
        controller.exit().await.context("Failed to exit session")?;
        return Ok(());
    }

    let Some(command) = cli.command.as_deref() else {
        return Ok(());
    };

    let persistent = PersistentCommand::new(command, cli.workdir()?)
        .args(cli.args.iter().cloned())
        .sleep_secs(cli.sleep_secs)
        .looped(!cli.no_loop);

    match persistent
        .launch(&controller, cli.force)
        .await
        .context("Failed to launch command")?
    {
        LaunchOutcome::Vanished => {
            anyhow::bail!("Session '{}' disappeared while injecting", controller.name())
        }
        outcome => {
            info!("Screen '{}': {:?}", controller.name(), outcome);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    session_keeper::logging::init(cli.verbose);

    if cli.verbose {
        info!("Options: {:?}", cli);
    }

    // Listing has no side effects, so no-op mode still shows real sessions.
    if cli.no_op && !cli.list {
        run(&cli, DryRunBackend::new()).await
    } else {
        run(&cli, ScreenBackend::default().verbose(cli.verbose)).await
    }
}
