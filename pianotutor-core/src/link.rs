//! Connection to the strip controller.
//!
//! The controller has a one-byte receive buffer and stops reading while it
//! pushes pixels to the strip, so every command is preceded by a ping/pong
//! exchange and only sent once the controller has answered. Failed writes
//! close the connection and retry on a fresh one; when retries run out the
//! command is dropped and only the log knows about it.

use std::io;

use pianotutor_types::Rgb;

use crate::error::{TutorError, TutorResult};
use crate::protocol::{is_pong, Command};
use crate::transport::{Connector, Transport, READ_TIMEOUT};

/// Reconnect-and-retry attempts after a failed write.
pub const WRITE_RETRIES: u32 = 2;

pub enum ConnectionState {
    Disconnected,
    Connected(Box<dyn Transport>),
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected(_) => write!(f, "Connected"),
        }
    }
}

pub struct Link {
    connector: Box<dyn Connector>,
    device: String,
    state: ConnectionState,
    /// Pixels were written since the controller last showed its buffer.
    needs_flush: bool,
    handshake_attempts: Option<u32>,
    /// Open already failed for this device; later failures log quietly.
    open_failed: bool,
}

impl Link {
    pub fn new(connector: Box<dyn Connector>, device: impl Into<String>) -> Self {
        Self {
            connector,
            device: device.into(),
            state: ConnectionState::Disconnected,
            needs_flush: false,
            handshake_attempts: None,
            open_failed: false,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Point at another device, dropping any open connection.
    pub fn set_device(&mut self, device: impl Into<String>) {
        self.close();
        self.device = device.into();
        self.open_failed = false;
    }

    pub fn set_handshake_attempts(&mut self, attempts: Option<u32>) {
        self.handshake_attempts = attempts;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn needs_flush(&self) -> bool {
        self.needs_flush
    }

    /// Open the device if it is not open yet.
    pub fn ensure_connected(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.connector.open(&self.device) {
            Ok(transport) => {
                log::info!(target: "link", "connected to {}", self.device);
                self.state = ConnectionState::Connected(transport);
                self.open_failed = false;
                true
            }
            Err(e) => {
                if self.open_failed {
                    log::debug!(target: "link", "{}", e);
                } else {
                    log::warn!(target: "link", "{}", e);
                }
                self.open_failed = true;
                false
            }
        }
    }

    pub fn close(&mut self) {
        if self.is_connected() {
            log::debug!(target: "link", "closing {}", self.device);
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Set one pixel in the controller's buffer.
    pub fn set_pixel(&mut self, led: u8, color: Rgb) {
        if self.ensure_connected() {
            self.send(Command::SetPixel { led, color });
        }
    }

    /// Show the controller's buffer on the strip, if anything changed.
    pub fn flush(&mut self) {
        if self.ensure_connected() && self.needs_flush {
            self.send(Command::Flush);
        }
    }

    /// Blank the whole strip; the controller flushes on its own.
    pub fn clear_all(&mut self) {
        if self.ensure_connected() {
            self.send(Command::ClearAll);
        }
    }

    /// Send with handshake and retries. Returns false if the command was dropped.
    pub fn send(&mut self, command: Command) -> bool {
        let frame = command.encode();
        let mut retries = WRITE_RETRIES;
        loop {
            match self.exchange(&frame) {
                Ok(()) => {
                    log::debug!(target: "link", "written {} bytes: {}", frame.len(), command);
                    match command {
                        Command::SetPixel { .. } => self.needs_flush = true,
                        Command::Flush | Command::ClearAll => self.needs_flush = false,
                        Command::Ping => {}
                    }
                    return true;
                }
                Err(e) => {
                    log::warn!(target: "link", "write of {} to {} failed: {}", command, self.device, e);
                    self.close();
                    if retries == 0 {
                        log::error!(target: "link", "dropping {} after {} retries", command, WRITE_RETRIES);
                        if command.needs_flush() {
                            self.needs_flush = true;
                        }
                        return false;
                    }
                    retries -= 1;
                    self.ensure_connected();
                }
            }
        }
    }

    fn exchange(&mut self, frame: &[u8]) -> TutorResult<()> {
        let attempts = self.handshake_attempts;
        let ConnectionState::Connected(transport) = &mut self.state else {
            return Err(TutorError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "device not connected",
            )));
        };
        handshake(transport.as_mut(), attempts)?;
        transport.write_all(frame)?;
        Ok(())
    }
}

/// Ping until the controller answers. `max_attempts: None` waits forever.
pub fn handshake(transport: &mut dyn Transport, max_attempts: Option<u32>) -> TutorResult<()> {
    let ping = Command::Ping.encode();
    let mut pong = [0u8; 1];
    let mut attempts = 0u32;
    loop {
        if max_attempts.is_some_and(|max| attempts >= max) {
            return Err(TutorError::ProtocolTimeout { attempts });
        }
        attempts += 1;
        transport.write_all(&ping)?;
        if transport.read(&mut pong, READ_TIMEOUT)? == 1 && is_pong(pong[0]) {
            return Ok(());
        }
        log::trace!(target: "link", "no pong (attempt {})", attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TestDevice;

    fn link(device: &TestDevice) -> Link {
        Link::new(Box::new(device.connector()), "/dev/test")
    }

    #[test]
    fn test_connects_lazily() {
        let device = TestDevice::new();
        let mut link = link(&device);
        assert!(!link.is_connected());
        assert_eq!(device.opens(), 0);

        link.set_pixel(3, Rgb::new(1, 2, 3));
        assert!(link.is_connected());
        assert_eq!(device.opens(), 1);
        assert_eq!(device.lines(), vec!["H03010203"]);
        assert!(link.needs_flush());
    }

    #[test]
    fn test_every_command_is_preceded_by_a_ping() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(0, Rgb::BLACK);
        link.set_pixel(1, Rgb::BLACK);
        link.flush();
        assert_eq!(device.pings(), 3);
    }

    #[test]
    fn test_handshake_waits_for_pong() {
        let device = TestDevice::new();
        let mut link = link(&device);
        device.ignore_next_pings(4);
        link.set_pixel(0, Rgb::BLACK);
        assert_eq!(device.pings(), 5);
        assert_eq!(device.commands().len(), 1);
    }

    #[test]
    fn test_bounded_handshake_times_out() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_handshake_attempts(Some(3));
        assert!(link.ensure_connected());
        device.stall(true);

        assert!(!link.send(Command::Flush));
        // three pings per attempt, initial attempt plus two retries
        assert_eq!(device.pings(), 9);
        assert!(device.commands().is_empty());
        assert!(!link.is_connected());
    }

    #[test]
    fn test_flush_only_when_owed() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.flush();
        assert!(device.commands().is_empty());

        link.set_pixel(9, Rgb::new(16, 0, 0));
        link.flush();
        link.flush();
        assert_eq!(device.lines(), vec!["H09100000", "F"]);
        assert!(!link.needs_flush());
    }

    #[test]
    fn test_clear_all_settles_flush() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(9, Rgb::new(16, 0, 0));
        link.clear_all();
        assert!(!link.needs_flush());
        assert_eq!(device.lines(), vec!["H09100000", "c"]);
    }

    #[test]
    fn test_write_failure_reconnects_and_retries() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(1, Rgb::BLACK);
        device.fail_next_writes(1);

        link.set_pixel(2, Rgb::BLACK);
        assert_eq!(device.opens(), 2);
        assert_eq!(device.lines(), vec!["H01000000", "H02000000"]);
        assert!(link.is_connected());
    }

    #[test]
    fn test_retries_exhausted_drops_command() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(1, Rgb::BLACK);
        link.flush();
        device.clear();

        device.fail_next_writes(3);
        link.set_pixel(2, Rgb::BLACK);
        assert!(device.commands().is_empty());
        assert!(!link.is_connected());
        // the next command starts over on a fresh connection
        assert!(link.needs_flush());
        link.flush();
        assert_eq!(device.lines(), vec!["F"]);
    }

    #[test]
    fn test_failed_flush_stays_owed() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(1, Rgb::BLACK);
        device.fail_next_writes(3);
        link.flush();
        assert!(link.needs_flush());
    }

    #[test]
    fn test_unavailable_device_skips_writes() {
        let device = TestDevice::new();
        let mut link = link(&device);
        device.fail_next_opens(2);
        link.set_pixel(1, Rgb::BLACK);
        link.set_pixel(2, Rgb::BLACK);
        assert!(!link.is_connected());
        assert!(!link.needs_flush());

        link.set_pixel(3, Rgb::BLACK);
        assert_eq!(device.lines(), vec!["H03000000"]);
    }

    #[test]
    fn test_reconnect_failure_during_retry() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(1, Rgb::BLACK);
        device.fail_next_writes(1);
        device.fail_next_opens(1);

        // first retry cannot reopen, second one can
        link.set_pixel(2, Rgb::BLACK);
        assert_eq!(device.lines(), vec!["H01000000", "H02000000"]);
        assert_eq!(device.opens(), 2);
    }

    #[test]
    fn test_set_device_closes() {
        let device = TestDevice::new();
        let mut link = link(&device);
        link.set_pixel(1, Rgb::BLACK);
        link.set_device("/dev/other");
        assert!(!link.is_connected());
        assert_eq!(link.device(), "/dev/other");

        link.set_pixel(1, Rgb::BLACK);
        assert_eq!(
            device.opened_paths(),
            vec!["/dev/test".to_string(), "/dev/other".to_string()]
        );
    }
}
