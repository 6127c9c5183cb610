//! Telemetry Bridge - forwards sensor readings to a remote metrics channel
//!
//! One station per process:
//! - Identify the station (device banner or hostname) and pick its profile
//! - Poll the sensor, parse record lines with a data-only literal parser
//! - Append records to a per-day log file
//! - Push each record to the channel under a fixed deadline

pub mod bridge;
pub mod config;
pub mod console;
pub mod daily_log;
pub mod identity;
pub mod literal;
pub mod logging;
pub mod record;
pub mod report;
pub mod source;

#[cfg(test)]
mod testing;

pub use bridge::{CycleSummary, TelemetryBridge, LOCAL_FREQUENCY};
pub use config::{ChannelProfile, ConfigError, ConfigFile, DEFAULT_CONFIG_FILE};
pub use console::{Console, ConsoleAction};
pub use daily_log::{DailyLog, DailyLogError};
pub use identity::IdentityError;
pub use literal::{Literal, LiteralError};
pub use record::{Extracted, Reading};
pub use report::{
    ChannelPayload, ChannelReporter, ReportError, ThingSpeakReporter, DEFAULT_API_BASE,
    UPDATE_DEADLINE,
};
pub use source::{DriverSource, SensorSource, SerialSource, SourceError, Units};
