//! # Peer Configuration
//!
//! Each peer gets its own immutable [`PeerConfig`]. Values come from
//! [`Default`], from serde (file based), or from `COURIER_*` environment
//! variables via [`PeerConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Upper bound on every configured timeout and interval.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Guarantees the transport gives a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Unreliable,
    UnreliableSequenced,
    ReliableUnordered,
    ReliableSequenced,
    #[default]
    ReliableOrdered,
}

impl DeliveryMethod {
    pub fn is_reliable(&self) -> bool {
        matches!(
            self,
            DeliveryMethod::ReliableUnordered
                | DeliveryMethod::ReliableSequenced
                | DeliveryMethod::ReliableOrdered
        )
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryMethod::Unreliable => "unreliable",
            DeliveryMethod::UnreliableSequenced => "unreliable_sequenced",
            DeliveryMethod::ReliableUnordered => "reliable_unordered",
            DeliveryMethod::ReliableSequenced => "reliable_sequenced",
            DeliveryMethod::ReliableOrdered => "reliable_ordered",
        };
        f.write_str(name)
    }
}

impl FromStr for DeliveryMethod {
    type Err = ConfigError;

    /// Accepts `reliable_ordered`, `reliable-ordered` and `ReliableOrdered` alike.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "unreliable" => Ok(DeliveryMethod::Unreliable),
            "unreliablesequenced" => Ok(DeliveryMethod::UnreliableSequenced),
            "reliableunordered" => Ok(DeliveryMethod::ReliableUnordered),
            "reliablesequenced" => Ok(DeliveryMethod::ReliableSequenced),
            "reliableordered" => Ok(DeliveryMethod::ReliableOrdered),
            _ => Err(ConfigError::Invalid(format!("unknown delivery method '{s}'"))),
        }
    }
}

/// Per-send delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DeliveryOptions {
    pub method: DeliveryMethod,
    pub channel: u8,
}

impl DeliveryOptions {
    pub fn new(method: DeliveryMethod, channel: u8) -> Self {
        Self { method, channel }
    }
}

/// Configuration of one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Application name, usable as the connect credential.
    pub app_identifier: String,
    /// Default time a request waits for its response.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Time `Peer::connect` waits for the remote to approve.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Channel used when a send does not name one.
    pub default_channel: u8,
    /// Delivery method used when a send does not name one.
    pub delivery_method: DeliveryMethod,
    /// Decision of the default authenticator.
    pub accept_by_default: bool,
    /// How often expired requests are swept.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Largest inbound frame the default deserializer accepts.
    pub max_packet_size: u64,
    /// Buffered entries per subscriber of the local error channel.
    pub error_channel_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            app_identifier: "courier".to_string(),
            request_timeout: Duration::from_millis(5_000),
            connect_timeout: Duration::from_millis(15_000),
            default_channel: 0,
            delivery_method: DeliveryMethod::ReliableOrdered,
            accept_by_default: true,
            sweep_interval: Duration::from_millis(50),
            max_packet_size: courier_types::DEFAULT_MAX_PACKET_SIZE,
            error_channel_capacity: 256,
        }
    }
}

impl PeerConfig {
    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURIER_APP_ID`: application identifier (default: courier)
    /// - `COURIER_REQUEST_TIMEOUT_MS`: request timeout (default: 5000)
    /// - `COURIER_CONNECT_TIMEOUT_MS`: connect timeout (default: 15000)
    /// - `COURIER_DEFAULT_CHANNEL`: default channel (default: 0)
    /// - `COURIER_DELIVERY_METHOD`: default delivery method (default: reliable_ordered)
    /// - `COURIER_ACCEPT_BY_DEFAULT`: default authenticator decision (default: true)
    /// - `COURIER_SWEEP_INTERVAL_MS`: timeout sweep interval (default: 50)
    /// - `COURIER_MAX_PACKET_SIZE`: max inbound frame in bytes (default: 1048576)
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(app) = lookup("COURIER_APP_ID") {
            config.app_identifier = app;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "COURIER_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "COURIER_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(channel) = parse_var(&lookup, "COURIER_DEFAULT_CHANNEL") {
            config.default_channel = channel;
        }
        if let Some(method) = parse_var(&lookup, "COURIER_DELIVERY_METHOD") {
            config.delivery_method = method;
        }
        if let Some(accept) = parse_var(&lookup, "COURIER_ACCEPT_BY_DEFAULT") {
            config.accept_by_default = accept;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "COURIER_SWEEP_INTERVAL_MS") {
            config.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var(&lookup, "COURIER_MAX_PACKET_SIZE") {
            config.max_packet_size = size;
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout cannot be 0".into(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }

        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("sweep_interval", self.sweep_interval),
        ] {
            if value > MAX_TIMEOUT {
                return Err(ConfigError::InvalidTimeout(format!(
                    "{name} cannot exceed {}s",
                    MAX_TIMEOUT.as_secs()
                )));
            }
        }

        if self.max_packet_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_packet_size cannot be 0".into(),
            ));
        }

        if self.error_channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "error_channel_capacity cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Delivery options for sends that do not override them.
    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions::new(self.delivery_method, self.default_channel)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparsable configuration value");
            None
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
