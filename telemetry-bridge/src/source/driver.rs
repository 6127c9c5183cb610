use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use super::{split_lines, SensorSource, SourceError};

/// Attempts per reading, matching the DHT22 driver's read_retry.
pub const DRIVER_RETRIES: u32 = 15;
/// Pause between attempts; the sensor cannot be read faster than every 2 s.
pub const DRIVER_RETRY_DELAY: Duration = Duration::from_secs(2);

const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    Fahrenheit,
    Celsius,
}

/// Runs an external reader program that prints either a record line
/// (`{...}`) or `temperature_c,humidity`.
pub struct DriverSource {
    command: Vec<String>,
    units: Units,
    retries: u32,
    retry_delay: Duration,
}

impl DriverSource {
    /// `command` is a shell-style command line.
    pub fn new(command: &str, units: Units) -> Result<Self, SourceError> {
        let command = shell_words::split(command)
            .map_err(|e| SourceError::Unsupported(format!("driver command: {}", e)))?;
        if command.is_empty() {
            return Err(SourceError::Unsupported("empty driver command".to_string()));
        }
        Ok(Self {
            command,
            units,
            retries: DRIVER_RETRIES,
            retry_delay: DRIVER_RETRY_DELAY,
        })
    }

    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries.max(1);
        self.retry_delay = delay;
        self
    }

    async fn read_once(&self) -> Result<String, String> {
        let output = tokio::time::timeout(
            ATTEMPT_TIMEOUT,
            AsyncCommand::new(&self.command[0])
                .args(&self.command[1..])
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| "driver timed out".to_string())?
        .map_err(|e| format!("failed to run driver: {}", e))?;

        if !output.status.success() {
            return Err(format!(
                "driver exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        to_record_text(&stdout, self.units).ok_or_else(|| format!("unusable output: {:?}", stdout.trim()))
    }
}

impl SensorSource for DriverSource {
    async fn query(&mut self, query: &[u8]) -> Result<String, SourceError> {
        if query != super::READING_QUERY {
            return Err(SourceError::Unsupported(String::from_utf8_lossy(query).into_owned()));
        }

        let mut last = String::new();
        for attempt in 1..=self.retries {
            match self.read_once().await {
                Ok(text) => {
                    debug!("Driver reading on attempt {}", attempt);
                    return Ok(text);
                }
                Err(e) => {
                    warn!("Driver attempt {}/{} failed: {}", attempt, self.retries, e);
                    last = e;
                }
            }
            if attempt < self.retries {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(SourceError::Driver {
            attempts: self.retries,
            last,
        })
    }

    fn describe(&self) -> String {
        format!("driver '{}'", shell_words::join(&self.command))
    }
}

/// Normalise driver output into record text. Record lines pass through;
/// a `temperature_c,humidity` pair becomes `{'t': [..], 'h': [..]}`.
fn to_record_text(stdout: &str, units: Units) -> Option<String> {
    let lines = split_lines(stdout);
    if lines.iter().any(|l| l.starts_with('{')) {
        return Some(lines.join("\n"));
    }

    let line = lines.last()?;
    let mut numbers = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>());
    let temp_c = numbers.next()?.ok()?;
    let humidity = numbers.next()?.ok()?;
    if !temp_c.is_finite() || !humidity.is_finite() {
        return None;
    }

    let temperature = match units {
        Units::Fahrenheit => temp_c * 9.0 / 5.0 + 32.0,
        Units::Celsius => temp_c,
    };
    Some(format!("{{'t': [{:.2}], 'h': [{:.2}]}}", temperature, humidity))
}
