//! UWB Real-Time Positioning
//!
//! Ingests ranging telemetry from a serial-connected UWB tag, estimates a
//! 2D position against four fixed anchors by least-squares
//! multilateration, and smooths the result with a sliding median.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod utils;
pub mod hardware;
pub mod api;

// Re-export commonly used types
pub use crate::core::{
    Anchor, AnchorConfiguration, DistanceVector, Point2, PositionEstimate, RangingSample,
    ANCHOR_COUNT, DEFAULT_MAX_RANGE,
};
pub use algorithms::{Multilateration, Solution};
pub use processing::{MedianFilter, ParseError, RangingParser, TokenMapping};
pub use hardware::{
    CommError, CommResult, LinkFactory, MockDevice, MockLinkFactory, RangingLink, RangingReader,
    SerialConfig, SerialLinkFactory,
};
pub use api::{PositioningSession, SessionError, SessionResult, SessionState, SessionStatistics};
pub use utils::{ConfigError, TrackingConfig};
