//! Core types and constants for the UWB positioning system

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
