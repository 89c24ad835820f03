//! Session API consumed by the display layer
//!
//! The embedding application creates a [`PositioningSession`], calls
//! `start()`, then `poll()` from its UI timer (every 10-50 ms) and draws
//! whatever position comes back.

pub mod session;
pub mod types;

pub use session::PositioningSession;
pub use types::{SessionError, SessionResult, SessionState, SessionStatistics};
