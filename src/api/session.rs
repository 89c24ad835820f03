//! Positioning session: lifecycle and per-tick pipeline
//!
//! A session owns one [`RangingReader`] while reading. Each `poll()` takes
//! the freshest telemetry line, parses it, solves for a raw position and
//! feeds the median filter, all on the caller's thread.

use crate::algorithms::Multilateration;
use crate::api::types::{SessionError, SessionResult, SessionState, SessionStatistics};
use crate::core::{AnchorConfiguration, PositionEstimate, RangingSample, DEFAULT_POLL_INTERVAL_MS};
use crate::hardware::{LinkFactory, RangingReader, SerialLinkFactory};
use crate::processing::{MedianFilter, RangingParser, TokenMapping};
use crate::utils::{ConfigError, TrackingConfig};
use std::ops::ControlFlow;
use std::thread;
use std::time::{Duration, Instant};

/// UWB positioning session
pub struct PositioningSession {
    anchors: AnchorConfiguration,
    solver: Multilateration,
    parser: RangingParser,
    filter: MedianFilter,
    factory: Box<dyn LinkFactory>,
    reader: Option<RangingReader>,
    stats: SessionStatistics,
    last_position: Option<PositionEstimate>,
    poll_interval: Duration,
}

impl PositioningSession {
    /// Create a stopped session with default solver and filter settings
    pub fn new(anchors: AnchorConfiguration, factory: Box<dyn LinkFactory>) -> Self {
        Self {
            anchors,
            solver: Multilateration::default(),
            parser: RangingParser::new(),
            filter: MedianFilter::default(),
            factory,
            reader: None,
            stats: SessionStatistics::default(),
            last_position: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Create a stopped session on the serial port named in `config`
    pub fn from_config(config: &TrackingConfig) -> Result<Self, ConfigError> {
        let factory = SerialLinkFactory::new(config.serial.clone());
        Self::with_factory(config, Box::new(factory))
    }

    /// Create a stopped session from `config`, opening links from `factory`
    pub fn with_factory(
        config: &TrackingConfig,
        factory: Box<dyn LinkFactory>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let anchors = config.anchor_configuration()?;
        let mapping = TokenMapping::for_anchors(&anchors, config.match_by_address);

        Ok(Self::new(anchors, factory)
            .with_solver(Multilateration::new(config.max_range))
            .with_parser(RangingParser::with_mapping(mapping))
            .with_history_capacity(config.history_capacity)
            .with_poll_interval(config.poll_interval()))
    }

    pub fn with_solver(mut self, solver: Multilateration) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_parser(mut self, parser: RangingParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.filter = MedianFilter::new(capacity);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stopped -> Reading. Opens the device and spawns the reader; on
    /// failure the session stays stopped.
    pub fn start(&mut self) -> SessionResult<()> {
        if self.reader.is_some() {
            return Err(SessionError::AlreadyReading);
        }

        let reader = RangingReader::open(self.factory.as_ref()).map_err(|e| {
            log::warn!("could not start tracking on {}: {e}", self.factory.name());
            e
        })?;

        self.filter.clear();
        self.reader = Some(reader);
        log::info!("tracking started on {}", self.factory.name());
        Ok(())
    }

    /// Reading -> Stopped. The device is released before this returns.
    /// No-op when already stopped.
    pub fn stop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
            self.stats.reader = reader.statistics();
            log::info!("tracking stopped on {}", self.factory.name());
        }
    }

    pub fn state(&self) -> SessionState {
        if self.reader.is_some() {
            SessionState::Reading
        } else {
            SessionState::Stopped
        }
    }

    pub fn is_reading(&self) -> bool {
        self.state() == SessionState::Reading
    }

    /// One tick: returns the updated smoothed position, or `None` when no
    /// new usable sample arrived. Never blocks.
    pub fn poll(&mut self) -> Option<PositionEstimate> {
        let sample = self.reader.as_ref()?.latest()?;
        self.process_sample(&sample)
    }

    /// Run one sample through parse, solve and filter
    pub fn process_sample(&mut self, sample: &RangingSample) -> Option<PositionEstimate> {
        self.stats.samples_received += 1;

        let distances = match self.parser.parse(sample.as_str()) {
            Ok(distances) => distances,
            Err(e) => {
                self.stats.malformed_samples += 1;
                log::trace!("discarding sample: {e}");
                return None;
            }
        };

        if !distances.is_within_range(self.solver.max_range) {
            self.stats.out_of_range_samples += 1;
            log::trace!("discarding out-of-range distances {:?}", distances.as_array());
            return None;
        }

        let Some(raw) = self.solver.solve(&distances, &self.anchors) else {
            self.stats.degenerate_solutions += 1;
            log::debug!("no solution for distances {:?}", distances.as_array());
            return None;
        };

        let smoothed = self.filter.update(raw)?;
        self.last_position = Some(smoothed);
        self.stats.positions_produced += 1;
        Some(smoothed)
    }

    /// Poll on a fixed cadence on the calling thread. `on_tick` receives
    /// each tick's result (`None` when nothing new arrived). Returns when
    /// the callback breaks or the session is stopped.
    pub fn poll_every<F>(&mut self, interval: Duration, mut on_tick: F)
    where
        F: FnMut(Option<PositionEstimate>) -> ControlFlow<()>,
    {
        let mut next_tick = Instant::now();
        while self.is_reading() {
            let position = self.poll();
            if on_tick(position).is_break() {
                return;
            }
            next_tick += interval;
            let now = Instant::now();
            if next_tick > now {
                thread::sleep(next_tick - now);
            } else {
                next_tick = now;
            }
        }
    }

    /// Last smoothed position, kept through silent ticks and after `stop()`
    pub fn current_position(&self) -> Option<PositionEstimate> {
        self.last_position
    }

    pub fn anchors(&self) -> &AnchorConfiguration {
        &self.anchors
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn history_len(&self) -> usize {
        self.filter.len()
    }

    pub fn statistics(&self) -> SessionStatistics {
        let mut stats = self.stats;
        if let Some(reader) = &self.reader {
            stats.reader = reader.statistics();
        }
        stats
    }
}

impl Drop for PositioningSession {
    fn drop(&mut self) {
        self.stop();
    }
}
