//! Channel payload construction and the remote update call.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::config::ChannelProfile;
use crate::literal::Literal;

/// Hard bound on one update call.
pub const UPDATE_DEADLINE: Duration = Duration::from_secs(120);
pub const DEFAULT_API_BASE: &str = "https://api.thingspeak.com";

/// Controller mode letters and the numeric code sent on channel 7.
pub const MODE_CODES: [(&str, i64); 7] = [
    ("O", 0),
    ("B", 1),
    ("E", 2),
    ("N", 3),
    ("P", 4),
    ("M", 5),
    ("D", 6),
];

/// Record fields carried on channels 5..=8 when present.
const CONTROLLER_FIELDS: [(u8, &str); 4] = [(5, "v"), (6, "p"), (7, "m"), (8, "lN")];

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("record has no field '{0}'")]
    MissingField(String),
    #[error("record field '{0}' is not numeric")]
    NotNumeric(String),
    #[error("unknown controller mode {0}")]
    UnknownMode(String),
    #[error("update request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("update endpoint answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("update was rejected by the channel (entry id 0)")]
    Rejected,
    #[error("update did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

pub fn mode_code(mode: &str) -> Option<i64> {
    MODE_CODES
        .iter()
        .find(|(letter, _)| *letter == mode)
        .map(|(_, code)| *code)
}

/// Numbered channel values plus the status text for one update.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPayload {
    pub fields: BTreeMap<u8, Literal>,
    pub status: String,
}

impl ChannelPayload {
    /// Map `record` onto channels using `profile.channel_keys` for 1..=K and
    /// the controller fields for 5..=8.
    pub fn build(
        record: &Literal,
        raw_line: &str,
        profile: &ChannelProfile,
        timestamp: &str,
    ) -> Result<Self, ReportError> {
        let mut fields = BTreeMap::new();

        for (index, key) in profile.channel_keys.iter().enumerate() {
            let value = record
                .get(key)
                .and_then(Literal::first)
                .ok_or_else(|| ReportError::MissingField(key.clone()))?;
            fields.insert(index as u8 + 1, numeric(value, key)?);
        }

        for (channel, key) in CONTROLLER_FIELDS {
            let Some(value) = record.get(key).and_then(Literal::first) else {
                continue;
            };
            let value = if key == "m" {
                let code = value
                    .as_str()
                    .and_then(mode_code)
                    .ok_or_else(|| ReportError::UnknownMode(value.to_string()))?;
                Literal::Int(code)
            } else {
                numeric(value, key)?
            };
            fields.insert(channel, value);
        }

        Ok(Self {
            fields,
            status: format!("{} {}", timestamp, raw_line),
        })
    }

    /// Form body for the update endpoint.
    pub fn form(&self, write_key: &str) -> Vec<(String, String)> {
        let mut form = Vec::with_capacity(self.fields.len() + 2);
        form.push(("api_key".to_string(), write_key.to_string()));
        for (channel, value) in &self.fields {
            form.push((format!("field{}", channel), value.to_string()));
        }
        form.push(("status".to_string(), self.status.clone()));
        form
    }
}

fn numeric(value: &Literal, key: &str) -> Result<Literal, ReportError> {
    match value {
        Literal::Int(_) | Literal::Float(_) => Ok(value.clone()),
        Literal::Bool(b) => Ok(Literal::Int(*b as i64)),
        _ => Err(ReportError::NotNumeric(key.to_string())),
    }
}

impl fmt::Display for ChannelPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (channel, value) in &self.fields {
            write!(f, "{}: {}, ", channel, value)?;
        }
        write!(f, "'status': {}}}", Literal::Str(self.status.clone()))
    }
}

/// Sends one payload to the remote channel, returning the entry id.
#[allow(async_fn_in_trait)]
pub trait ChannelReporter {
    async fn update(&self, payload: &ChannelPayload) -> Result<String, ReportError>;
}

/// ThingSpeak-style `POST <base>/update` with form fields.
pub struct ThingSpeakReporter {
    client: reqwest::Client,
    endpoint: String,
    write_key: String,
}

impl ThingSpeakReporter {
    pub fn new(api_base: &str, write_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/update", api_base.trim_end_matches('/')),
            write_key: write_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChannelReporter for ThingSpeakReporter {
    async fn update(&self, payload: &ChannelPayload) -> Result<String, ReportError> {
        debug!("POST {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header("User-Agent", "telemetry-bridge")
            .form(&payload.form(&self.write_key))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?.trim().to_string();
        if !status.is_success() {
            return Err(ReportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body == "0" {
            return Err(ReportError::Rejected);
        }
        Ok(body)
    }
}

/// Run one update under `deadline`; an expired call is dropped.
pub async fn update_with_deadline<R: ChannelReporter>(
    reporter: &R,
    payload: &ChannelPayload,
    deadline: Duration,
) -> Result<String, ReportError> {
    tokio::time::timeout(deadline, reporter.update(payload))
        .await
        .map_err(|_| ReportError::TimedOut(deadline))?
}
