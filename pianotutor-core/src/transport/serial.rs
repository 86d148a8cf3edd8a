//! Serial-port transport.
//!
//! On Unix the device is switched to raw 8N1 at 115200 baud with no flow
//! control, and reads are bounded with `poll`. Elsewhere the device is opened
//! as a plain read/write file and reads block until data arrives. No line
//! settings are applied there, so the port must already be set to 115200 8N1
//! (for example with `mode COM3 baud=115200 data=8 parity=n stop=1` on Windows).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{await_banner, Connector, Transport};
use crate::error::{TutorError, TutorResult};

/// Opens serial devices by path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, path: &str) -> TutorResult<Box<dyn Transport>> {
        let unavailable = |source| TutorError::DeviceUnavailable {
            path: path.to_string(),
            source,
        };
        let mut port = SerialPort::open(path).map_err(unavailable)?;
        log::debug!(target: "transport", "opened {}, waiting for banner", path);
        await_banner(&mut port)?;
        Ok(Box::new(port))
    }
}

/// An open serial device.
#[derive(Debug)]
pub struct SerialPort {
    file: File,
}

impl SerialPort {
    #[cfg(unix)]
    pub fn open(path: &str) -> io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        configure_raw(file.as_raw_fd())?;
        Ok(Self { file })
    }

    #[cfg(not(unix))]
    pub fn open(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }
}

impl Transport for SerialPort {
    #[cfg(unix)]
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        use std::os::unix::io::AsRawFd;

        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // SAFETY: `pfd` is a valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(0);
        }
        self.file.read(buf)
    }

    #[cfg(not(unix))]
    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.file.write(data)
    }
}

#[cfg(unix)]
fn configure_raw(fd: libc::c_int) -> io::Result<()> {
    // SAFETY: termios is plain old data; tcgetattr fills it before it is read.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor owned by the caller.
    if unsafe { libc::tcgetattr(fd, &mut tio) } < 0 {
        return Err(io::Error::last_os_error());
    }

    tio.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
    tio.c_cflag |= libc::CS8 | libc::CREAD | libc::CLOCAL;
    tio.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    tio.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ECHOE | libc::ISIG);
    tio.c_oflag = 0;
    // Tenths of a second; VMIN 0 lets a read return empty-handed.
    tio.c_cc[libc::VTIME] = 1;
    tio.c_cc[libc::VMIN] = 0;

    // SAFETY: `tio` was initialised by tcgetattr above.
    unsafe {
        if libc::cfsetispeed(&mut tio, libc::B115200) < 0
            || libc::cfsetospeed(&mut tio, libc::B115200) < 0
        {
            return Err(io::Error::last_os_error());
        }
        if libc::tcsetattr(fd, libc::TCSAFLUSH, &tio) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
