//! Error type shared by the transport, link and configuration layers.
//!
//! None of these reach callers of `Tutor` operations: the link logs them and
//! degrades to dropping the frame.

use std::fmt;
use std::io;

/// Result type for driver operations.
pub type TutorResult<T = ()> = Result<T, TutorError>;

#[derive(Debug)]
pub enum TutorError {
    /// The serial device could not be opened (missing, busy, no permission).
    DeviceUnavailable { path: String, source: io::Error },
    /// Read or write failure on an open device.
    Io(io::Error),
    /// The device never answered the liveness ping.
    ProtocolTimeout { attempts: u32 },
    Config(String),
    Midi(String),
}

impl fmt::Display for TutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceUnavailable { path, source } => {
                write!(f, "device {} unavailable: {}", path, source)
            }
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::ProtocolTimeout { attempts } => {
                write!(f, "no liveness response after {} pings", attempts)
            }
            Self::Config(msg) => write!(f, "config error: {}", msg),
            Self::Midi(msg) => write!(f, "MIDI error: {}", msg),
        }
    }
}

impl std::error::Error for TutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DeviceUnavailable { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TutorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for TutorError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
