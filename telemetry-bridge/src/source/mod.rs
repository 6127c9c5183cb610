//! Sensor input sources
//!
//! A source answers a query with whatever text the sensor produced:
//! - `SerialSource`: writes a query byte to the device and drains its buffer
//! - `DriverSource`: runs an external reader program with read-with-retry
//!
//! The polling loop owns its source; nothing here is global.

mod driver;
mod serial;

pub use driver::{DriverSource, Units, DRIVER_RETRIES, DRIVER_RETRY_DELAY};
pub use serial::{SerialSource, DEFAULT_BAUD, DEFAULT_RESPONSE_DELAY};

use std::path::PathBuf;

/// Query byte asking the device for a reading.
pub const READING_QUERY: &[u8] = b"?";
/// Query byte asking the device for its identification banner.
pub const BANNER_QUERY: &[u8] = b"i";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open serial port '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to configure serial port '{path}': {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
    #[error("sensor I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sensor driver gave no usable reading after {attempts} attempts: {last}")]
    Driver { attempts: u32, last: String },
    #[error("this source cannot answer '{0}' queries")]
    Unsupported(String),
}

/// Something that can be asked for sensor output.
#[allow(async_fn_in_trait)]
pub trait SensorSource {
    /// Send `query` and return the text the sensor has produced.
    async fn query(&mut self, query: &[u8]) -> Result<String, SourceError>;

    /// Human-readable name for logs.
    fn describe(&self) -> String;
}

/// Split device output on CR/LF, trimming and dropping blank lines.
pub fn split_lines(raw: &str) -> Vec<&str> {
    raw.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
