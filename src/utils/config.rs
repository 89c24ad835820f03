//! Tracking configuration loaded from JSON

use crate::core::{
    Anchor, AnchorConfiguration, AnchorCountError, ANCHOR_COUNT, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_MAX_RANGE, DEFAULT_POLL_INTERVAL_MS, MAX_READ_TIMEOUT_MS,
};
use crate::hardware::SerialConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    AnchorCount(#[from] AnchorCountError),
    #[error("anchors are collinear or coincident")]
    DegenerateGeometry,
}

/// One anchor entry in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub x: f64,
    pub y: f64,
    /// Radio address as printed by the firmware, e.g. `"0x1a2b"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl AnchorConfig {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, address: None }
    }

    fn parse_address(&self) -> Result<Option<u32>, ConfigError> {
        let Some(text) = self.address.as_deref() else {
            return Ok(None);
        };
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u32::from_str_radix(digits, 16)
            .map(Some)
            .map_err(|e| ConfigError::InvalidParameter {
                parameter: "anchors.address".to_string(),
                value: text.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Complete configuration of a tracking session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub serial: SerialConfig,
    /// Exactly four anchors; the first is the solver reference
    pub anchors: Vec<AnchorConfig>,
    /// Largest accepted distance (device units)
    pub max_range: u32,
    /// Median filter window length
    pub history_capacity: usize,
    /// Poll cadence for the display loop (milliseconds)
    pub poll_interval_ms: u64,
    /// Map tokens to anchors by radio address instead of line order
    pub match_by_address: bool,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            anchors: Vec::new(),
            max_range: DEFAULT_MAX_RANGE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            match_by_address: false,
            debug_logging: false,
        }
    }
}

impl TrackingConfig {
    /// Load and validate a configuration file. Does not log; callers
    /// usually read the configuration before a logger exists.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Anchor set for the solver, with parsed addresses
    pub fn anchor_configuration(&self) -> Result<AnchorConfiguration, ConfigError> {
        let anchors = self
            .anchors
            .iter()
            .map(|a| -> Result<Anchor, ConfigError> {
                let anchor = Anchor::new(a.x, a.y);
                Ok(match a.parse_address()? {
                    Some(address) => anchor.with_address(address),
                    None => anchor,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AnchorConfiguration::try_from(anchors.as_slice())?)
    }

    /// Check every parameter
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(invalid("serial.port", &self.serial.port, "must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", self.serial.baud_rate, "must be positive"));
        }
        if self.serial.read_timeout_ms == 0 || self.serial.read_timeout_ms > MAX_READ_TIMEOUT_MS {
            return Err(invalid(
                "serial.read_timeout_ms",
                self.serial.read_timeout_ms,
                &format!("must be in 1..={MAX_READ_TIMEOUT_MS}"),
            ));
        }
        if self.max_range == 0 {
            return Err(invalid("max_range", self.max_range, "must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(invalid("history_capacity", self.history_capacity, "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", self.poll_interval_ms, "must be positive"));
        }
        if self.anchors.len() != ANCHOR_COUNT {
            return Err(AnchorCountError { found: self.anchors.len() }.into());
        }
        if self.anchors.iter().any(|a| !a.x.is_finite() || !a.y.is_finite()) {
            return Err(invalid("anchors", "non-finite", "coordinates must be finite"));
        }

        let anchors = self.anchor_configuration()?;
        if anchors.is_degenerate() {
            return Err(ConfigError::DegenerateGeometry);
        }

        let addresses: Vec<u32> = anchors.anchors().iter().filter_map(|a| a.address).collect();
        let unique: HashSet<u32> = addresses.iter().copied().collect();
        if unique.len() != addresses.len() {
            return Err(invalid("anchors.address", "duplicate", "addresses must be unique"));
        }
        if self.match_by_address && addresses.len() != ANCHOR_COUNT {
            return Err(invalid(
                "match_by_address",
                true,
                "every anchor needs an address",
            ));
        }

        Ok(())
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
