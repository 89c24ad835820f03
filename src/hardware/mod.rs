//! Hardware abstraction for the UWB radio
//!
//! The radio streams newline-delimited ranging reports over a serial
//! console. A [`RangingReader`] owns the link on a background thread and
//! publishes the freshest report through a [`SampleMailbox`].

pub mod error;
pub mod link;
pub mod mailbox;
pub mod mock;
pub mod reader;
pub mod serial;

pub use error::{CommError, CommResult};
pub use link::{LinkFactory, RangingLink};
pub use mailbox::SampleMailbox;
pub use mock::{MockDevice, MockLinkFactory};
pub use reader::{RangingReader, ReaderStatistics};
pub use serial::{SerialConfig, SerialLink, SerialLinkFactory};
