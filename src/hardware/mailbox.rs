//! Single-slot latest-value mailbox shared between the reader thread and
//! the polling thread.

use crate::core::RangingSample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded single slot. A new sample overwrites any unread one, so
/// the consumer only ever sees the freshest line.
#[derive(Debug, Default)]
pub struct SampleMailbox {
    slot: Mutex<Option<RangingSample>>,
    overwritten: AtomicU64,
}

impl SampleMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<RangingSample>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a sample, discarding any unread one
    pub fn put(&self, sample: RangingSample) {
        if self.lock().replace(sample).is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the freshest sample, leaving the slot empty
    pub fn take(&self) -> Option<RangingSample> {
        self.lock().take()
    }

    /// Drop anything unread
    pub fn clear(&self) {
        self.lock().take();
    }

    /// Number of samples discarded unread
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
