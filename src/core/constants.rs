//! Physical constants and system parameters

/// Number of fixed anchors the ranging firmware reports against
pub const ANCHOR_COUNT: usize = 4;

/// Largest distance (device units) accepted from a ranging report
pub const DEFAULT_MAX_RANGE: u32 = 8000;

/// Number of raw estimates kept by the median filter
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Baud rate of the UWB radio's serial console
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial read timeout (milliseconds)
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Longest read timeout a link may use, so the reader thread notices a
/// stop request well within `STOP_JOIN_TIMEOUT_MS`
pub const MAX_READ_TIMEOUT_MS: u64 = 500;

/// Cadence of the display-side poll loop (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Upper bound on how long `stop()` waits for the reader thread (milliseconds)
pub const STOP_JOIN_TIMEOUT_MS: u64 = 1000;
