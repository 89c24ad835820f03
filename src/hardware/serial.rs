//! Serial/UART link to the UWB radio

use crate::core::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS};
use crate::hardware::{CommError, CommResult, LinkFactory, RangingLink};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader};
use std::time::Duration;

/// Lines longer than this (excluding the terminator) are dropped
pub const MAX_LINE_LENGTH: usize = 1024;

/// Serial port parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM4`
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout (milliseconds)
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl SerialConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Reassembles newline-terminated lines from a byte stream that may time
/// out mid-line. Lines longer than [`MAX_LINE_LENGTH`] are dropped whole.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
    /// Set after an oversized fragment; bytes are dropped up to the next `\n`
    discarding: bool,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read from `reader` until a line completes or the read times out.
    /// Returns Ok(None) on timeout, EOF, or when a dropped line ends.
    pub fn read_line<R: BufRead>(&mut self, reader: &mut R) -> io::Result<Option<String>> {
        match reader.read_until(b'\n', &mut self.pending) {
            Ok(_) if self.pending.ends_with(b"\n") => {
                if self.discarding || self.pending.len() > MAX_LINE_LENGTH + 2 {
                    log::debug!("dropped oversized line");
                    self.reset();
                    return Ok(None);
                }
                Ok(Some(self.take_line()))
            }
            // EOF or timeout mid-line: keep the fragment for the next read
            Ok(_) => {
                self.check_overflow();
                Ok(None)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                self.check_overflow();
                Ok(None)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Forget any partial line
    pub fn reset(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }

    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.pending.clear();
        line
    }

    fn check_overflow(&mut self) {
        if self.discarding {
            self.pending.clear();
        } else if self.pending.len() > MAX_LINE_LENGTH {
            log::debug!("dropping {} bytes without line terminator", self.pending.len());
            self.pending.clear();
            self.discarding = true;
        }
    }
}

/// Open serial port assembling newline-terminated lines
pub struct SerialLink {
    port_name: String,
    read_timeout: Duration,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
    assembler: LineAssembler,
}

impl SerialLink {
    /// Open the configured port
    pub fn open(config: &SerialConfig) -> CommResult<Self> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(config.read_timeout())
            .open()
            .map_err(|e| CommError::ConnectionFailed {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        log::info!("opened {} at {} baud", config.port, config.baud_rate);

        Ok(Self {
            port_name: config.port.clone(),
            read_timeout: config.read_timeout(),
            reader: Some(BufReader::new(port)),
            assembler: LineAssembler::new(),
        })
    }
}

impl RangingLink for SerialLink {
    fn read_line(&mut self) -> CommResult<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        self.assembler.read_line(reader).map_err(|e| CommError::Read {
            port: self.port_name.clone(),
            reason: e.to_string(),
        })
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::info!("closed {}", self.port_name);
        }
        self.assembler.reset();
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`SerialLink`]s for a fixed port configuration
#[derive(Debug, Clone)]
pub struct SerialLinkFactory {
    config: SerialConfig,
}

impl SerialLinkFactory {
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl LinkFactory for SerialLinkFactory {
    fn open(&self) -> CommResult<Box<dyn RangingLink>> {
        Ok(Box::new(SerialLink::open(&self.config)?))
    }

    fn name(&self) -> &str {
        &self.config.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;

    /// Byte source replaying chunks and errors; empty means timed out
    struct ScriptedPort {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedPort {
        fn new() -> Self {
            Self { script: VecDeque::new() }
        }

        fn bytes(mut self, data: &[u8]) -> Self {
            self.script.push_back(Ok(data.to_vec()));
            self
        }

        fn timeout(mut self) -> Self {
            self.script
                .push_back(Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")));
            self
        }

        fn error(mut self, kind: io::ErrorKind) -> Self {
            self.script.push_back(Err(io::Error::new(kind, "device error")));
            self
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(mut data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.script.push_front(Ok(data.split_off(n)));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            }
        }
    }

    #[test]
    fn test_line_joined_across_timeouts() {
        let port = ScriptedPort::new()
            .bytes(b"0xAAAA: =1 0x")
            .timeout()
            .bytes(b"BBBB: =2\r\n");
        let mut reader = BufReader::new(port);
        let mut assembler = LineAssembler::new();

        assert_eq!(assembler.read_line(&mut reader).unwrap(), None);
        assert_eq!(
            assembler.read_line(&mut reader).unwrap(),
            Some("0xAAAA: =1 0xBBBB: =2".to_string())
        );
        assert_eq!(assembler.read_line(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_oversized_line_dropped_whole() {
        let port = ScriptedPort::new()
            .bytes(&[b'x'; 1100])
            .timeout()
            .bytes(b"0xCCCC: =3 0xDDDD: =4 0xEEEE: =5 0xFFFF: =6\n")
            .bytes(b"0xAAAA: =1\n");
        let mut reader = BufReader::new(port);
        let mut assembler = LineAssembler::new();

        assert_eq!(assembler.read_line(&mut reader).unwrap(), None);
        assert!(assembler.is_discarding());
        // Tail of the oversized line is not forwarded
        assert_eq!(assembler.read_line(&mut reader).unwrap(), None);
        assert!(!assembler.is_discarding());
        assert_eq!(
            assembler.read_line(&mut reader).unwrap(),
            Some("0xAAAA: =1".to_string())
        );
    }

    #[test]
    fn test_oversized_complete_line_dropped() {
        let mut data = vec![b'y'; 2000];
        data.push(b'\n');
        data.extend_from_slice(b"ok =1\n");
        let mut reader = BufReader::new(ScriptedPort::new().bytes(&data));
        let mut assembler = LineAssembler::new();

        assert_eq!(assembler.read_line(&mut reader).unwrap(), None);
        assert_eq!(assembler.read_line(&mut reader).unwrap(), Some("ok =1".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut reader = BufReader::new(ScriptedPort::new().bytes(b"0xAAAA: =1 \xff\n"));
        let mut assembler = LineAssembler::new();
        assert_eq!(
            assembler.read_line(&mut reader).unwrap(),
            Some("0xAAAA: =1 \u{FFFD}".to_string())
        );
    }

    #[test]
    fn test_device_error_is_reported() {
        let port = ScriptedPort::new()
            .error(io::ErrorKind::BrokenPipe)
            .bytes(b"0xAAAA: =1\n");
        let mut reader = BufReader::new(port);
        let mut assembler = LineAssembler::new();

        let err = assembler.read_line(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(
            assembler.read_line(&mut reader).unwrap(),
            Some("0xAAAA: =1".to_string())
        );
    }

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyACM0", 115200);
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = SerialConfig::new("/dev/uwb-positioning-no-such-device", 115200);
        let err = SerialLinkFactory::new(config).open().err().unwrap();
        match err {
            CommError::ConnectionFailed { port, .. } => {
                assert_eq!(port, "/dev/uwb-positioning-no-such-device")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
