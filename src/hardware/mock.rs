//! Mock radio link for testing and development

use crate::hardware::{CommError, CommResult, LinkFactory, RangingLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Scripted event delivered by a mock link
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Line(String),
    ReadError(String),
}

#[derive(Debug, Default)]
struct DeviceState {
    events: VecDeque<MockEvent>,
    open: bool,
    open_count: u32,
    fail_open: Option<String>,
}

/// Shared handle to a simulated UWB radio.
///
/// Clones refer to the same device, so a test can keep one handle while the
/// reader thread owns the link opened from another.
#[derive(Debug, Clone)]
pub struct MockDevice {
    name: String,
    state: Arc<Mutex<DeviceState>>,
    read_timeout: Duration,
}

impl MockDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(DeviceState::default())),
            read_timeout: Duration::from_millis(5),
        }
    }

    /// How long an empty read blocks before reporting a timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a telemetry line
    pub fn push_line(&self, line: impl Into<String>) {
        self.lock().events.push_back(MockEvent::Line(line.into()));
    }

    /// Queue a transient read failure
    pub fn push_read_error(&self, reason: impl Into<String>) {
        self.lock().events.push_back(MockEvent::ReadError(reason.into()));
    }

    /// Make subsequent opens fail, as if the device were unplugged
    pub fn fail_open(&self, reason: impl Into<String>) {
        self.lock().fail_open = Some(reason.into());
    }

    /// Let subsequent opens succeed again
    pub fn allow_open(&self) {
        self.lock().fail_open = None;
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn open_count(&self) -> u32 {
        self.lock().open_count
    }

    pub fn pending_events(&self) -> usize {
        self.lock().events.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a link to this device
    pub fn open_link(&self) -> CommResult<MockLink> {
        let mut state = self.lock();
        if let Some(reason) = &state.fail_open {
            return Err(CommError::ConnectionFailed {
                port: self.name.clone(),
                reason: reason.clone(),
            });
        }
        if state.open {
            return Err(CommError::ConnectionFailed {
                port: self.name.clone(),
                reason: "device busy".to_string(),
            });
        }
        state.open = true;
        state.open_count += 1;
        drop(state);

        Ok(MockLink {
            device: self.clone(),
            closed: false,
        })
    }
}

/// Link opened from a [`MockDevice`]
pub struct MockLink {
    device: MockDevice,
    closed: bool,
}

impl RangingLink for MockLink {
    fn read_line(&mut self) -> CommResult<Option<String>> {
        if self.closed {
            return Ok(None);
        }

        let event = self.device.lock().events.pop_front();
        match event {
            Some(MockEvent::Line(line)) => Ok(Some(line)),
            Some(MockEvent::ReadError(reason)) => Err(CommError::Read {
                port: self.device.name.clone(),
                reason,
            }),
            None => {
                thread::sleep(self.device.read_timeout);
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.device.lock().open = false;
        }
    }

    fn is_open(&self) -> bool {
        !self.closed
    }

    fn read_timeout(&self) -> Duration {
        self.device.read_timeout
    }

    fn name(&self) -> &str {
        &self.device.name
    }
}

impl Drop for MockLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Factory handing out links to one [`MockDevice`]
#[derive(Debug, Clone)]
pub struct MockLinkFactory {
    device: MockDevice,
}

impl MockLinkFactory {
    pub fn new(device: MockDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

impl LinkFactory for MockLinkFactory {
    fn open(&self) -> CommResult<Box<dyn RangingLink>> {
        Ok(Box::new(self.device.open_link()?))
    }

    fn name(&self) -> &str {
        self.device.name()
    }
}
