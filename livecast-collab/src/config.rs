//! Broadcast configuration.
//!
//! [`BroadcastSettings`] is the loose, user-editable form (every field
//! optional, settings-file keys). [`ConnectionConfig`] is the validated,
//! immutable form one broadcast attempt runs with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT_URL: &str = "http://vsshare.net/signalr";
pub const DEFAULT_HUB_NAME: &str = "broadcast";

/// Reasons a broadcast is refused before anything is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    #[error("missing required setting `{0}`")]
    MissingField(&'static str),

    #[error("already connected")]
    AlreadyConnected,
}

/// Settings file could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bound on the transport's automatic reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
    /// Pause before each attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Everything one broadcast attempt needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub endpoint_url: String,
    pub hub_name: String,
    pub user_name: String,
    pub access_token: String,
    pub room_name: String,
    pub room_token: String,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    /// Check that every required field is present.
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let required = [
            ("url", &self.endpoint_url),
            ("hubName", &self.hub_name),
            ("userName", &self.user_name),
            ("userToken", &self.access_token),
            ("roomName", &self.room_name),
            ("roomToken", &self.room_token),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(PreconditionError::MissingField(*name)),
            None => Ok(()),
        }
    }

    /// WebSocket URL of the hub: `http(s)` becomes `ws(s)`, hub name appended.
    pub fn socket_url(&self) -> String {
        let endpoint = self.endpoint_url.trim_end_matches('/');
        let endpoint = if let Some(rest) = endpoint.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = endpoint.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            endpoint.to_string()
        };
        format!("{endpoint}/{}", self.hub_name)
    }
}

/// User-facing settings, as stored in the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastSettings {
    pub url: Option<String>,
    pub hub_name: Option<String>,
    pub user_name: Option<String>,
    pub user_token: Option<String>,
    pub room_name: Option<String>,
    pub room_token: Option<String>,
    /// Automatic reconnect attempts before giving up
    pub max_reconnect_attempts: Option<u32>,
    /// Pause between reconnect attempts, in milliseconds
    pub reconnect_delay_ms: Option<u64>,
}

impl BroadcastSettings {
    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Overlay values from `LIVECAST_*` environment variables.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup (environment-style keys).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let slots = [
            ("LIVECAST_URL", &mut self.url),
            ("LIVECAST_HUB", &mut self.hub_name),
            ("LIVECAST_USER", &mut self.user_name),
            ("LIVECAST_TOKEN", &mut self.user_token),
            ("LIVECAST_ROOM", &mut self.room_name),
            ("LIVECAST_ROOM_TOKEN", &mut self.room_token),
        ];
        for (key, slot) in slots {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
        self
    }

    /// Resolve defaults and validate.
    pub fn into_config(self) -> Result<ConnectionConfig, PreconditionError> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let defaults = ReconnectPolicy::default();
        let config = ConnectionConfig {
            endpoint_url: present(self.url).unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
            hub_name: present(self.hub_name).unwrap_or_else(|| DEFAULT_HUB_NAME.to_string()),
            user_name: present(self.user_name).ok_or(PreconditionError::MissingField("userName"))?,
            access_token: present(self.user_token)
                .ok_or(PreconditionError::MissingField("userToken"))?,
            room_name: present(self.room_name).ok_or(PreconditionError::MissingField("roomName"))?,
            room_token: present(self.room_token)
                .ok_or(PreconditionError::MissingField("roomToken"))?,
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts.unwrap_or(defaults.max_attempts),
                delay: self
                    .reconnect_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.delay),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
