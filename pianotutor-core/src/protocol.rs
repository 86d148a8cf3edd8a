//! Line-based ASCII protocol spoken by the strip controller.
//!
//! Wire format, one command per line:
//!
//! | command   | bytes                      |
//! |-----------|----------------------------|
//! | ping      | `P\n` (answered by `P`)    |
//! | set pixel | `H` led r g b `\n`, each field two lowercase hex digits |
//! | flush     | `F\n`                      |
//! | clear all | `c\n` (also flushes)       |
//!
//! There is no checksum or length prefix; the ping handshake before every
//! write is what keeps the controller in sync.

use std::fmt;

use pianotutor_types::Rgb;

/// Byte the controller sends back for a ping.
pub const PONG: u8 = b'P';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    SetPixel { led: u8, color: Rgb },
    Flush,
    ClearAll,
}

impl Command {
    /// Encode as the newline-terminated line sent over the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut line = self.to_string().into_bytes();
        line.push(b'\n');
        line
    }

    /// Whether the command changes the controller's pixel buffer without showing it.
    pub fn needs_flush(&self) -> bool {
        matches!(self, Command::SetPixel { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ping => write!(f, "P"),
            Command::SetPixel { led, color } => {
                write!(f, "H{:02x}{:02x}{:02x}{:02x}", led, color.r, color.g, color.b)
            }
            Command::Flush => write!(f, "F"),
            Command::ClearAll => write!(f, "c"),
        }
    }
}

/// Whether a byte read back after a ping is the controller's answer.
pub fn is_pong(byte: u8) -> bool {
    byte == PONG
}

/// Parse one line (with or without its trailing newline) back into a command.
pub fn parse_line(line: &[u8]) -> Option<Command> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    match line {
        b"P" => Some(Command::Ping),
        b"F" => Some(Command::Flush),
        b"c" => Some(Command::ClearAll),
        [b'H', fields @ ..] if fields.len() == 8 => {
            let text = std::str::from_utf8(fields).ok()?;
            let byte = |i: usize| u8::from_str_radix(text.get(i..i + 2)?, 16).ok();
            Some(Command::SetPixel {
                led: byte(0)?,
                color: Rgb::new(byte(2)?, byte(4)?, byte(6)?),
            })
        }
        _ => None,
    }
}
