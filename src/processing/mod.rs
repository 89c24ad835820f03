//! Telemetry parsing and position smoothing

pub mod median;
pub mod parser;

pub use median::MedianFilter;
pub use parser::{ParseError, RangingParser, RangingToken, TokenMapping};
