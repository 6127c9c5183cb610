//! Configuration file handling
//!
//! The file holds one literal mapping:
//! - profile records keyed by station name
//! - `bannerToKeyMap`: device banner substring → profile key
//! - `hostToKeyMap`: hostname → profile key
//!
//! It is read once at startup and never written back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::literal::{self, Literal, LiteralError};

pub const DEFAULT_CONFIG_FILE: &str = "lucky7ToThingSpeak.conf";
pub const BANNER_MAP_KEY: &str = "bannerToKeyMap";
pub const HOST_MAP_KEY: &str = "hostToKeyMap";

/// Channels 1..=4 carry named fields; 5..=8 are the controller fields.
pub const MAX_CHANNEL_KEYS: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file '{path}' is not a valid literal: {source}")]
    Literal {
        path: PathBuf,
        #[source]
        source: LiteralError,
    },
    #[error("config file must contain a mapping")]
    NotAMapping,
    #[error("'{name}' must map strings to strings")]
    InvalidMap { name: String },
    #[error("could not find key '{key}' in config file; keys in file are {available:?}")]
    MissingProfile { key: String, available: Vec<String> },
    #[error("profile '{key}' is invalid: {reason}")]
    InvalidProfile { key: String, reason: String },
}

/// Channel settings for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub channel_id: String,
    pub write_key: String,
    /// Seconds between polls.
    pub update_frequency: u64,
    /// Record fields sent on channels 1..=N, in order.
    pub channel_keys: Vec<String>,
    /// Override for the update endpoint base URL.
    #[serde(default)]
    pub api_url: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(i) => i.to_string(),
    })
}

impl ChannelProfile {
    fn validate(self, key: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.update_frequency == 0 {
            return Err(invalid("update_frequency must be at least 1 second"));
        }
        if self.channel_keys.is_empty() || self.channel_keys.len() > MAX_CHANNEL_KEYS {
            return Err(invalid("channel_keys must name between 1 and 4 fields"));
        }
        if self.write_key.trim().is_empty() {
            return Err(invalid("write_key is empty"));
        }
        Ok(self)
    }
}

/// Parsed configuration document.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    root: Literal,
}

impl ConfigFile {
    /// Read and parse the file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let root = literal::parse(&content).map_err(|source| ConfigError::Literal {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_literal(root)
    }

    pub fn from_literal(root: Literal) -> Result<Self, ConfigError> {
        if !root.is_map() {
            return Err(ConfigError::NotAMapping);
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Literal {
        &self.root
    }

    /// Banner substring → profile key, in file order. Empty when absent.
    pub fn banner_map(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.string_map(BANNER_MAP_KEY)
    }

    /// Hostname → profile key, in file order. Empty when absent.
    pub fn host_map(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.string_map(HOST_MAP_KEY)
    }

    fn string_map(&self, name: &str) -> Result<Vec<(String, String)>, ConfigError> {
        let Some(value) = self.root.get(name) else {
            return Ok(Vec::new());
        };
        let Literal::Map(entries) = value else {
            return Err(ConfigError::InvalidMap { name: name.to_string() });
        };
        entries
            .iter()
            .map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
                _ => Err(ConfigError::InvalidMap { name: name.to_string() }),
            })
            .collect()
    }

    /// The profile stored under `key`.
    pub fn profile(&self, key: &str) -> Result<ChannelProfile, ConfigError> {
        let value = self.root.get(key).ok_or_else(|| ConfigError::MissingProfile {
            key: key.to_string(),
            available: self.keys(),
        })?;
        let profile: ChannelProfile =
            serde_json::from_value(value.to_json()).map_err(|e| ConfigError::InvalidProfile {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        profile.validate(key)
    }

    /// Top-level keys, for diagnostics.
    pub fn keys(&self) -> Vec<String> {
        match &self.root {
            Literal::Map(entries) => entries.iter().map(|(k, _)| match k {
                Literal::Str(s) => s.clone(),
                other => other.to_string(),
            }).collect(),
            _ => Vec::new(),
        }
    }
}
