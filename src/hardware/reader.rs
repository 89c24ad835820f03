//! Background serial ingestion for ranging telemetry

use crate::core::{RangingSample, MAX_READ_TIMEOUT_MS, STOP_JOIN_TIMEOUT_MS};
use crate::hardware::mailbox::SampleMailbox;
use crate::hardware::serial::{SerialConfig, SerialLinkFactory};
use crate::hardware::{CommError, CommResult, LinkFactory, RangingLink};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pause after a failed read so a dead device does not spin the loop
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Counters maintained by the reader thread
#[derive(Debug, Default)]
struct ReaderCounters {
    lines_read: AtomicU64,
    lines_forwarded: AtomicU64,
    read_errors: AtomicU64,
}

/// Snapshot of reader activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReaderStatistics {
    /// Complete lines received from the device
    pub lines_read: u64,
    /// Lines that passed the `=` pre-filter
    pub lines_forwarded: u64,
    /// Transient read failures
    pub read_errors: u64,
    /// Forwarded lines overwritten before anyone read them
    pub samples_dropped: u64,
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Handle to a running reader. Owns the background thread, which in turn
/// exclusively owns the device link.
pub struct RangingReader {
    port_name: String,
    stop: Arc<AtomicBool>,
    mailbox: Arc<SampleMailbox>,
    counters: Arc<ReaderCounters>,
    worker: Option<Worker>,
}

impl RangingReader {
    /// Open `port` at `baud_rate` and start reading in the background
    pub fn start(port: &str, baud_rate: u32) -> CommResult<Self> {
        Self::open(&SerialLinkFactory::new(SerialConfig::new(port, baud_rate)))
    }

    /// Open a link from `factory` and start reading in the background
    pub fn open(factory: &dyn LinkFactory) -> CommResult<Self> {
        let link = factory.open()?;
        Self::spawn(link)
    }

    /// Start the read loop on an already opened link. Links that may block
    /// longer than `MAX_READ_TIMEOUT_MS` per read are rejected, since the
    /// thread only checks for a stop request between reads.
    pub fn spawn(mut link: Box<dyn RangingLink>) -> CommResult<Self> {
        let port_name = link.name().to_string();
        let timeout_ms = u64::try_from(link.read_timeout().as_millis()).unwrap_or(u64::MAX);
        if timeout_ms > MAX_READ_TIMEOUT_MS {
            link.close();
            return Err(CommError::ReadTimeoutTooLong {
                port: port_name,
                timeout_ms,
                max_ms: MAX_READ_TIMEOUT_MS,
            });
        }
        let stop = Arc::new(AtomicBool::new(false));
        let mailbox = Arc::new(SampleMailbox::new());
        let counters = Arc::new(ReaderCounters::default());
        let (done_tx, done) = mpsc::channel();

        let handle = {
            let stop = Arc::clone(&stop);
            let mailbox = Arc::clone(&mailbox);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name(format!("uwb-reader:{port_name}"))
                .spawn(move || {
                    read_loop(link, &stop, &mailbox, &counters);
                    let _ = done_tx.send(());
                })
                .map_err(|e| CommError::Spawn {
                    reason: e.to_string(),
                })?
        };

        log::debug!("reader started on {port_name}");

        Ok(Self {
            port_name,
            stop,
            mailbox,
            counters,
            worker: Some(Worker { handle, done }),
        })
    }

    /// Freshest line received since the last call, if any. Older unread
    /// lines are discarded.
    pub fn latest(&self) -> Option<RangingSample> {
        self.mailbox.take()
    }

    /// Signal the thread to exit and wait for it to release the device.
    /// With a link honouring its read timeout this takes at most one read.
    /// The device is always closed when this returns. Safe to call
    /// repeatedly.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        let bound = Duration::from_millis(STOP_JOIN_TIMEOUT_MS);
        if let Err(RecvTimeoutError::Timeout) = worker.done.recv_timeout(bound) {
            log::warn!(
                "reader thread for {} did not stop within {}ms; still waiting for it to close the device",
                self.port_name,
                STOP_JOIN_TIMEOUT_MS
            );
        }
        if worker.handle.join().is_err() {
            log::warn!("reader thread for {} panicked", self.port_name);
        }
        self.mailbox.clear();
        log::debug!("reader stopped on {}", self.port_name);
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn statistics(&self) -> ReaderStatistics {
        ReaderStatistics {
            lines_read: self.counters.lines_read.load(Ordering::Relaxed),
            lines_forwarded: self.counters.lines_forwarded.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
            samples_dropped: self.mailbox.overwritten(),
        }
    }
}

impl Drop for RangingReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    mut link: Box<dyn RangingLink>,
    stop: &AtomicBool,
    mailbox: &SampleMailbox,
    counters: &ReaderCounters,
) {
    while !stop.load(Ordering::Acquire) {
        match link.read_line() {
            Ok(Some(line)) => {
                counters.lines_read.fetch_add(1, Ordering::Relaxed);
                // Cheap pre-filter; full token parsing happens on the poll side
                if line.contains('=') {
                    counters.lines_forwarded.fetch_add(1, Ordering::Relaxed);
                    mailbox.put(RangingSample::new(line));
                }
            }
            Ok(None) => {}
            Err(e) => {
                counters.read_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("{e}");
                thread::sleep(READ_ERROR_BACKOFF);
            }
        }
    }
    link.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockDevice, MockLinkFactory};
    use std::time::Instant;

    fn wait_for<F: FnMut() -> bool>(mut condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_reader_forwards_only_ranging_lines() {
        let device = MockDevice::new("mock0");
        let mut reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();

        device.push_line("boot: firmware v1.2");
        device.push_line("0xAAAA: =100 0xBBBB: =200 0xCCCC: =300 0xDDDD: =400");

        let mut sample = None;
        assert!(wait_for(|| {
            sample = reader.latest();
            sample.is_some()
        }));
        assert!(sample.unwrap().as_str().starts_with("0xAAAA"));

        let stats = reader.statistics();
        assert_eq!(stats.lines_read, 2);
        assert_eq!(stats.lines_forwarded, 1);

        reader.stop();
    }

    #[test]
    fn test_latest_drops_stale_samples() {
        let device = MockDevice::new("mock0");
        let mut reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();

        for i in 1..=5 {
            device.push_line(format!("0xAAAA: ={i}"));
        }
        assert!(wait_for(|| device.pending_events() == 0
            && reader.statistics().lines_forwarded == 5));

        assert_eq!(reader.latest().unwrap().as_str(), "0xAAAA: =5");
        assert!(reader.latest().is_none());
        reader.stop();
    }

    #[test]
    fn test_read_errors_do_not_stop_reader() {
        let device = MockDevice::new("mock0");
        let mut reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();

        device.push_read_error("framing error");
        device.push_read_error("framing error");
        device.push_line("0xAAAA: =42");

        assert!(wait_for(|| reader.statistics().lines_forwarded == 1));
        assert_eq!(reader.statistics().read_errors, 2);
        assert!(reader.is_running());
        reader.stop();
    }

    #[test]
    fn test_stop_releases_device() {
        let device = MockDevice::new("mock0");
        let mut reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();
        assert!(device.is_open());

        reader.stop();
        assert!(!device.is_open());
        assert!(!reader.is_running());

        // Second stop is a no-op
        reader.stop();

        // Device can be reopened straight away
        let reader = RangingReader::open(&MockLinkFactory::new(device.clone()));
        assert!(reader.is_ok());
    }

    #[test]
    fn test_open_failure_spawns_nothing() {
        let device = MockDevice::new("mock0");
        device.fail_open("no such device");
        let result = RangingReader::open(&MockLinkFactory::new(device.clone()));
        assert!(matches!(result, Err(CommError::ConnectionFailed { .. })));
        assert_eq!(device.open_count(), 0);
    }

    #[test]
    fn test_slow_read_timeout_rejected() {
        let device = MockDevice::new("mock0").with_read_timeout(Duration::from_secs(2));
        let result = RangingReader::open(&MockLinkFactory::new(device.clone()));
        assert!(matches!(
            result,
            Err(CommError::ReadTimeoutTooLong { timeout_ms: 2000, max_ms: 500, .. })
        ));
        assert!(!device.is_open());
    }

    #[test]
    fn test_stop_within_bound_at_max_timeout() {
        let device = MockDevice::new("mock0").with_read_timeout(Duration::from_millis(400));
        let mut reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();

        let started = Instant::now();
        reader.stop();
        assert!(started.elapsed() < Duration::from_millis(STOP_JOIN_TIMEOUT_MS));
        assert!(!device.is_open());
    }

    /// Link that blocks far longer than the timeout it advertises
    struct StuckLink {
        closed: Arc<AtomicBool>,
    }

    impl RangingLink for StuckLink {
        fn read_line(&mut self) -> CommResult<Option<String>> {
            thread::sleep(Duration::from_millis(1300));
            Ok(None)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        fn read_timeout(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn name(&self) -> &str {
            "stuck"
        }
    }

    #[test]
    fn test_stop_never_returns_with_device_open() {
        let closed = Arc::new(AtomicBool::new(false));
        let link = StuckLink { closed: Arc::clone(&closed) };
        let mut reader = RangingReader::spawn(Box::new(link)).unwrap();

        // Let the thread enter its first blocking read
        thread::sleep(Duration::from_millis(50));
        reader.stop();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!reader.is_running());
    }

    #[test]
    fn test_drop_stops_reader() {
        let device = MockDevice::new("mock0");
        {
            let _reader = RangingReader::open(&MockLinkFactory::new(device.clone())).unwrap();
            assert!(device.is_open());
        }
        assert!(!device.is_open());
    }
}
