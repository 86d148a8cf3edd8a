//! In-memory controller for tests.
//!
//! `TestDevice` behaves like the strip controller: it greets each new
//! connection with the banner, answers pings, and records every other command
//! it receives. Failures can be queued to exercise the reconnect paths.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{await_banner, Connector, Transport};
use crate::error::{TutorError, TutorResult};
use crate::protocol::{parse_line, Command, PONG};

const BANNER: &[u8; 25] = b"PianoTutor v1.0 is ready!";

#[derive(Debug, Default)]
struct DeviceState {
    commands: Vec<Command>,
    unparsed: Vec<Vec<u8>>,
    line: Vec<u8>,
    to_host: VecDeque<u8>,
    pings: usize,
    opens: usize,
    opened_paths: Vec<String>,
    fail_opens: usize,
    fail_writes: usize,
    silent_pings: usize,
    unanswered_pings: bool,
}

/// Shared handle to a simulated controller. Clones observe the same device.
#[derive(Debug, Clone, Default)]
pub struct TestDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl TestDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose transports all talk to this device.
    pub fn connector(&self) -> TestConnector {
        TestConnector {
            device: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every non-ping command received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    /// Received commands rendered as wire lines (without newlines).
    pub fn lines(&self) -> Vec<String> {
        self.lock().commands.iter().map(|c| c.to_string()).collect()
    }

    /// Forget recorded commands (counters are kept).
    pub fn clear(&self) {
        let mut state = self.lock();
        state.commands.clear();
        state.unparsed.clear();
    }

    /// Lines that did not parse as commands.
    pub fn unparsed(&self) -> Vec<Vec<u8>> {
        self.lock().unparsed.clone()
    }

    pub fn pings(&self) -> usize {
        self.lock().pings
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    pub fn opened_paths(&self) -> Vec<String> {
        self.lock().opened_paths.clone()
    }

    /// Make the next `n` opens fail as if the device were unplugged.
    pub fn fail_next_opens(&self, n: usize) {
        self.lock().fail_opens = n;
    }

    /// Make the next `n` payload writes fail with a broken pipe.
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().fail_writes = n;
    }

    /// Leave the next `n` pings unanswered.
    pub fn ignore_next_pings(&self, n: usize) {
        self.lock().silent_pings = n;
    }

    /// Stop answering pings altogether (a stalled controller).
    pub fn stall(&self, stalled: bool) {
        self.lock().unanswered_pings = stalled;
    }

    fn receive(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if data == Command::Ping.encode().as_slice() {
            state.pings += 1;
            if state.unanswered_pings {
                return Ok(data.len());
            }
            if state.silent_pings > 0 {
                state.silent_pings -= 1;
            } else {
                state.to_host.push_back(PONG);
            }
            return Ok(data.len());
        }

        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        for &byte in data {
            if byte == b'\n' {
                let line = std::mem::take(&mut state.line);
                match parse_line(&line) {
                    Some(cmd) => state.commands.push(cmd),
                    None => state.unparsed.push(line),
                }
            } else {
                state.line.push(byte);
            }
        }
        Ok(data.len())
    }

    fn send_to_host(&self, buf: &mut [u8]) -> usize {
        let mut state = self.lock();
        let n = buf.len().min(state.to_host.len());
        for (slot, byte) in buf.iter_mut().zip(state.to_host.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

/// Connector handing out transports to a `TestDevice`.
#[derive(Debug, Clone)]
pub struct TestConnector {
    device: TestDevice,
}

impl TestConnector {
    pub fn device(&self) -> &TestDevice {
        &self.device
    }
}

impl Connector for TestConnector {
    fn open(&self, path: &str) -> TutorResult<Box<dyn Transport>> {
        {
            let mut state = self.device.lock();
            if state.fail_opens > 0 {
                state.fail_opens -= 1;
                return Err(TutorError::DeviceUnavailable {
                    path: path.to_string(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
                });
            }
            state.opens += 1;
            state.opened_paths.push(path.to_string());
            state.line.clear();
            state.to_host.clear();
            state.to_host.extend(BANNER.iter().copied());
        }
        let mut transport = TestTransport {
            device: self.device.clone(),
        };
        await_banner(&mut transport)?;
        Ok(Box::new(transport))
    }
}

struct TestTransport {
    device: TestDevice,
}

impl Transport for TestTransport {
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        Ok(self.device.send_to_host(buf))
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.device.receive(data)
    }
}
