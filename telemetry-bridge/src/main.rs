//! telemetry-bridge - poll a station's sensor and forward readings
//!
//! Startup: load the config, identify the station, pick its profile.
//! Then poll forever until Ctrl-C (or `quit` on the console).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use telemetry_bridge::config::ConfigFile;
use telemetry_bridge::identity::{self, BANNER_ATTEMPTS, BANNER_RETRY_DELAY};
use telemetry_bridge::source::DEFAULT_BAUD;
use telemetry_bridge::{
    Console, DailyLog, DriverSource, SensorSource, SerialSource, TelemetryBridge,
    ThingSpeakReporter, Units, DEFAULT_API_BASE, DEFAULT_CONFIG_FILE,
};
use tracing::{info, warn};

/// The device resets when the port is opened.
const SETTLE_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(
    name = "telemetry-bridge",
    about = "Forward sensor readings to a remote metrics channel",
    version
)]
struct Cli {
    /// Serial device of the station controller
    #[arg(
        value_name = "SERIAL_PORT",
        required_unless_present = "driver",
        env = "TELEMETRY_SERIAL_PORT"
    )]
    serial_port: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Resolve and print the configuration, then exit
    #[arg(short = 'n', long = "noOp")]
    no_op: bool,

    /// Root of the daily log file names
    #[arg(
        short = 'l',
        long = "logFileRoot",
        value_name = "ROOT",
        default_value = "/tmp/telemetry-bridge",
        env = "TELEMETRY_LOG_ROOT"
    )]
    log_root: PathBuf,

    /// Configuration file
    #[arg(
        short = 'c',
        long = "configFile",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        env = "TELEMETRY_CONFIG_FILE"
    )]
    config: PathBuf,

    /// Let the operator type commands between polls
    #[arg(long)]
    interactive: bool,

    /// Read from an external sensor driver command instead of a serial port
    #[arg(long, value_name = "CMD", conflicts_with = "serial_port", env = "TELEMETRY_DRIVER")]
    driver: Option<String>,

    /// Report driver temperatures in Celsius
    #[arg(long)]
    metric: bool,

    /// Identify the station by hostname instead of the device banner
    #[arg(long = "hostname-identity")]
    hostname_identity: bool,

    /// Serial speed
    #[arg(long, value_name = "BAUD", default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// Base URL of the update endpoint, unless the profile names one
    #[arg(long = "api-url", value_name = "URL", default_value = DEFAULT_API_BASE, env = "TELEMETRY_API_URL")]
    api_url: String,
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if self.metric && self.driver.is_none() {
            anyhow::bail!("--metric only applies to --driver sources");
        }
        Ok(())
    }
}

async fn resolve_key<S: SensorSource>(cli: &Cli, config: &ConfigFile, source: &mut S) -> Result<String> {
    let banners = config.banner_map().context("Invalid banner map")?;
    let by_banner = !cli.hostname_identity && cli.driver.is_none() && !banners.is_empty();
    if by_banner {
        return identity::resolve_by_banner(source, &banners, BANNER_ATTEMPTS, BANNER_RETRY_DELAY)
            .await
            .context("Could not identify the station from its banner");
    }

    let hostname = identity::local_hostname();
    info!("Identifying station by hostname '{}'", hostname);
    let hosts = config.host_map().context("Invalid host map")?;
    identity::resolve_by_hostname(&hostname, &hosts).context("Could not identify the station from its hostname")
}

async fn run<S: SensorSource>(cli: &Cli, config: ConfigFile, mut source: S) -> Result<()> {
    let key = resolve_key(cli, &config, &mut source).await?;
    let profile = config
        .profile(&key)
        .with_context(|| format!("No usable profile for '{}'", key))?;
    info!("Station '{}' uses channel {}", key, profile.channel_id);

    if cli.no_op {
        println!("{} = {:#?}", key, profile);
        return Ok(());
    }

    let api_base = profile.api_url.clone().unwrap_or_else(|| cli.api_url.clone());
    let reporter = ThingSpeakReporter::new(&api_base, profile.write_key.clone());
    let mut bridge = TelemetryBridge::new(source, reporter, profile, DailyLog::new(&cli.log_root));
    if cli.interactive {
        bridge = bridge.with_console(Console::stdin());
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl-C received");
    };
    bridge.run(shutdown).await.context("Failed to close log file")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry_bridge::logging::init(cli.verbose);
    cli.validate()?;

    if cli.verbose {
        info!("Options: {:?}", cli);
    }

    let config = ConfigFile::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load config '{}'", cli.config.display()))?;

    if let Some(command) = &cli.driver {
        let units = if cli.metric { Units::Celsius } else { Units::Fahrenheit };
        let source = DriverSource::new(command, units).context("Invalid driver command")?;
        return run(&cli, config, source).await;
    }

    let Some(port) = &cli.serial_port else {
        anyhow::bail!("No serial port given");
    };
    let source = SerialSource::open(port, cli.baud)
        .with_context(|| format!("Failed to open serial port '{}'", port.display()))?;
    info!("Waiting {}s for the device to settle", SETTLE_DELAY.as_secs());
    tokio::time::sleep(SETTLE_DELAY).await;
    run(&cli, config, source).await
}
