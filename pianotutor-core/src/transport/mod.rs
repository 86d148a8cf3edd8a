//! Byte-stream transport to the strip controller.
//!
//! `Transport` is the synchronous duplex stream the link talks through;
//! `Connector` opens one for a device path. The serial implementation talks to
//! real hardware, the test implementation records frames in memory so the
//! key-state logic can be exercised without a controller attached.

mod serial;
mod testing;

use std::io;
use std::thread;
use std::time::Duration;

pub use serial::{SerialConnector, SerialPort};
pub use testing::{TestConnector, TestDevice};

use crate::error::TutorResult;

/// Length of the "PianoTutor v1.0 is ready!" greeting sent after reset.
pub const BANNER_LEN: usize = 25;
/// Pause after the banner before the controller accepts commands.
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);
/// Read timeout used while waiting for the banner and for pongs.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A duplex byte stream to the controller.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes. Returns `Ok(0)` when nothing arrived within `timeout`.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Write some prefix of `data`, returning how many bytes went out.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Write all of `data`, continuing after partial writes.
    fn write_all(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            match self.write(data) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "device accepted no bytes",
                    ))
                }
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Opens transports by device path. Closing is dropping the transport.
pub trait Connector: Send {
    /// Open `path` and wait until the controller is ready for commands.
    fn open(&self, path: &str) -> TutorResult<Box<dyn Transport>>;
}

/// Consume the startup banner, then give the controller its settle delay.
///
/// Timeouts are not errors here: a controller that is still resetting simply
/// keeps us waiting.
pub fn await_banner(transport: &mut dyn Transport) -> io::Result<()> {
    let mut buf = [0u8; BANNER_LEN];
    let mut remaining = BANNER_LEN;
    while remaining > 0 {
        remaining -= transport.read(&mut buf[..remaining], READ_TIMEOUT)?;
    }
    thread::sleep(SETTLE_DELAY);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out its input a few bytes at a time and accepts at most `chunk` bytes per write.
    struct Trickle {
        input: VecDeque<u8>,
        output: Vec<u8>,
        chunk: usize,
    }

    impl Transport for Trickle {
        fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            let n = buf.len().min(self.chunk).min(self.input.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.input.pop_front().unwrap_or_default();
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let n = data.len().min(self.chunk);
            self.output.extend_from_slice(&data[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_write_all_handles_partial_writes() {
        let mut t = Trickle {
            input: VecDeque::new(),
            output: Vec::new(),
            chunk: 3,
        };
        t.write_all(b"H47100010\n").unwrap();
        assert_eq!(t.output, b"H47100010\n");
    }

    #[test]
    fn test_write_all_rejects_zero_length_writes() {
        let mut t = Trickle {
            input: VecDeque::new(),
            output: Vec::new(),
            chunk: 0,
        };
        let err = t.write_all(b"F\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_await_banner_consumes_exactly_the_banner() {
        let mut input: VecDeque<u8> = b"PianoTutor v1.0 is ready!".iter().copied().collect();
        input.push_back(b'P');
        let mut t = Trickle {
            input,
            output: Vec::new(),
            chunk: 4,
        };
        await_banner(&mut t).unwrap();
        assert_eq!(t.input, VecDeque::from(vec![b'P']));
    }
}
