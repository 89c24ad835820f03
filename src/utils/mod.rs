//! Configuration utilities

pub mod config;

pub use config::{AnchorConfig, ConfigError, TrackingConfig};
