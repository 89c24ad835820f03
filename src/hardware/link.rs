//! Line-oriented link interface and factory traits

use crate::hardware::CommResult;
use std::time::Duration;

/// Hardware abstraction for a newline-delimited ranging telemetry source.
///
/// Implementations block for at most their configured read timeout.
pub trait RangingLink: Send {
    /// Read one complete line, without its terminator.
    /// Returns Ok(None) when the read timed out without completing a line.
    fn read_line(&mut self) -> CommResult<Option<String>>;

    /// Release the underlying device. Further reads return Ok(None).
    fn close(&mut self);

    /// Whether the device handle is still held
    fn is_open(&self) -> bool;

    /// Longest time a single `read_line` call blocks
    fn read_timeout(&self) -> Duration;

    /// Device name for diagnostics
    fn name(&self) -> &str;
}

/// Opens links on demand, so a session can start, stop and start again
pub trait LinkFactory: Send {
    fn open(&self) -> CommResult<Box<dyn RangingLink>>;

    /// Device name for diagnostics
    fn name(&self) -> &str;
}
