//! Common API types and data structures

use crate::hardware::{CommError, ReaderStatistics};
use thiserror::Error;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by session lifecycle calls
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// `start()` called while a reader is already running
    #[error("session is already reading")]
    AlreadyReading,
    /// The device could not be opened
    #[error(transparent)]
    Connection(#[from] CommError),
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Reading,
}

/// Counters kept by the polling side of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatistics {
    /// Samples taken from the reader
    pub samples_received: u64,
    /// Samples without enough well-formed tokens
    pub malformed_samples: u64,
    /// Samples with a distance outside `(0, max_range]`
    pub out_of_range_samples: u64,
    /// Samples whose linear system was singular or non-finite
    pub degenerate_solutions: u64,
    /// Smoothed positions returned by `poll()`
    pub positions_produced: u64,
    /// Reader counters at the time of the snapshot
    pub reader: ReaderStatistics,
}

impl SessionStatistics {
    /// Samples that ended without a position
    pub fn discarded_samples(&self) -> u64 {
        self.malformed_samples + self.out_of_range_samples + self.degenerate_solutions
    }
}
