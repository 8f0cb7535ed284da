//! Host end of the serial link to the controller.
//!
//! Outbound traffic is one byte per [`MotorCommand`]; inbound traffic is
//! `\n`-terminated lines (telemetry and `!` status). The orchestrator is the
//! only writer, so implementations need no internal locking.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use rover_types::{MotorCommand, RoverError};
use tracing::{debug, info, warn};

pub const DEFAULT_BAUD: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Longest inbound line kept; longer input is treated as line noise.
pub const MAX_LINE_LEN: usize = 512;
/// Completed lines held before the oldest is dropped.
const MAX_PENDING_LINES: usize = 256;

pub trait SerialLink: Send {
    /// Write one command byte.
    ///
    /// # Errors
    ///
    /// [`RoverError::LinkIo`] when the write does not reach the port.
    fn send(&mut self, command: MotorCommand) -> Result<(), RoverError>;

    /// Return the next complete inbound line, without waiting for one.
    fn poll_line(&mut self) -> Result<Option<String>, RoverError>;

    /// Drop the current connection and open a fresh one.
    fn reconnect(&mut self) -> Result<(), RoverError>;

    /// Release the port. Later sends fail until [`reconnect`][Self::reconnect].
    fn close(&mut self);

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn send(&mut self, command: MotorCommand) -> Result<(), RoverError> {
        (**self).send(command)
    }

    fn poll_line(&mut self) -> Result<Option<String>, RoverError> {
        (**self).poll_line()
    }

    fn reconnect(&mut self) -> Result<(), RoverError> {
        (**self).reconnect()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Line assembly
// ────────────────────────────────────────────────────────────────────────────

/// Turns arbitrary byte chunks into complete lines.
///
/// `\r` before `\n` is stripped, blank lines are skipped, and a line that
/// grows past its bound is discarded up to the next `\n`.
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    ready: VecDeque<String>,
    max_len: usize,
    discarding: bool,
}

impl LineAssembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(1024)),
            ready: VecDeque::new(),
            max_len,
            discarding: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if byte == b'\n' {
                if !self.discarding {
                    let line = String::from_utf8_lossy(&self.buf);
                    let line = line.trim_end_matches('\r');
                    if !line.is_empty() {
                        if self.ready.len() == MAX_PENDING_LINES {
                            self.ready.pop_front();
                        }
                        self.ready.push_back(line.to_string());
                    }
                }
                self.discarding = false;
                self.buf.clear();
            } else if !self.discarding {
                if self.buf.len() >= self.max_len {
                    warn!(max_len = self.max_len, "inbound line too long, discarding");
                    self.discarding = true;
                    self.buf.clear();
                } else {
                    self.buf.push(byte);
                }
            }
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Forget partial and completed lines, e.g. after a reconnect.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.ready.clear();
        self.discarding = false;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// serialport-backed link
// ────────────────────────────────────────────────────────────────────────────

/// A link over a real serial device such as `/dev/ttyUSB0`.
pub struct SerialPortLink {
    path: String,
    baud: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
    assembler: LineAssembler,
}

impl SerialPortLink {
    pub fn open(path: &str, baud: u32) -> Result<Self, RoverError> {
        let mut link = Self {
            path: path.to_string(),
            baud,
            port: None,
            assembler: LineAssembler::default(),
        };
        link.port = Some(link.open_port()?);
        info!(path, baud, "serial link open");
        Ok(link)
    }

    fn open_port(&self) -> Result<Box<dyn serialport::SerialPort>, RoverError> {
        serialport::new(&self.path, self.baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| RoverError::LinkIo(format!("open {}: {e}", self.path)))
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, RoverError> {
        self.port
            .as_mut()
            .ok_or_else(|| RoverError::LinkIo(format!("{} is closed", self.path)))
    }
}

impl SerialLink for SerialPortLink {
    fn send(&mut self, command: MotorCommand) -> Result<(), RoverError> {
        let port = self.port_mut()?;
        let write_err = |e: std::io::Error| RoverError::LinkIo(format!("write {command}: {e}"));
        port.write_all(&[command.to_byte()]).map_err(write_err)?;
        port.flush().map_err(write_err)
    }

    fn poll_line(&mut self) -> Result<Option<String>, RoverError> {
        if let Some(line) = self.assembler.next_line() {
            return Ok(Some(line));
        }
        let port = self.port_mut()?;
        let pending = port
            .bytes_to_read()
            .map_err(|e| RoverError::LinkIo(format!("poll: {e}")))?;
        if pending == 0 {
            return Ok(None);
        }
        let mut chunk = [0u8; 256];
        let n = match port.read(&mut chunk) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => return Err(RoverError::LinkIo(format!("read: {e}"))),
        };
        self.assembler.push(&chunk[..n]);
        Ok(self.assembler.next_line())
    }

    fn reconnect(&mut self) -> Result<(), RoverError> {
        debug!(path = %self.path, "reopening serial port");
        self.port = None;
        self.assembler.clear();
        self.port = Some(self.open_port()?);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!(path = %self.path, "serial link closed");
        }
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud)
    }
}

/// Names of serial ports visible to the OS.
pub fn available_ports() -> Result<Vec<String>, RoverError> {
    serialport::available_ports()
        .map(|ports| ports.into_iter().map(|p| p.port_name).collect())
        .map_err(|e| RoverError::LinkIo(format!("enumerate ports: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_lines_across_chunks() {
        let mut la = LineAssembler::default();
        la.push(b"T,1,A");
        assert_eq!(la.next_line(), None);
        la.push(b",5\r\n!ok\n");
        assert_eq!(la.next_line().as_deref(), Some("T,1,A,5"));
        assert_eq!(la.next_line().as_deref(), Some("!ok"));
        assert_eq!(la.next_line(), None);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut la = LineAssembler::default();
        la.push(b"\n\r\nx\n");
        assert_eq!(la.next_line().as_deref(), Some("x"));
        assert_eq!(la.next_line(), None);
    }

    #[test]
    fn overlong_garbage_is_discarded_until_newline() {
        let mut la = LineAssembler::new(8);
        la.push(b"0123456789abcdef");
        la.push(b"tail\nok\n");
        assert_eq!(la.next_line().as_deref(), Some("ok"));
        assert_eq!(la.next_line(), None);
    }

    #[test]
    fn clear_drops_partial_input() {
        let mut la = LineAssembler::default();
        la.push(b"half");
        la.clear();
        la.push(b"line\n");
        assert_eq!(la.next_line().as_deref(), Some("line"));
    }

    #[test]
    fn opening_a_missing_device_is_a_link_fault() {
        let err = SerialPortLink::open("/dev/rover-does-not-exist", DEFAULT_BAUD)
            .err()
            .unwrap();
        assert_eq!(err.kind(), "link_io");
    }
}
