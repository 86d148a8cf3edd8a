//! # pianotutor-core
//!
//! Driver for the PianoTutor LED strip. Mirrors note events onto a strip of
//! addressable LEDs mounted above a keyboard, so a learner sees which keys to
//! press next, and reports whether the keys actually played were the expected ones.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pianotutor_core::config::Config;
//! use pianotutor_core::Tutor;
//!
//! let settings = Config::load().to_settings();
//! let tutor = Tutor::serial(&settings)?;
//!
//! // score playback: light the next notes
//! tutor.add_key(60, 90, Some(0), 0);
//! tutor.add_key(64, 90, Some(0), 1);
//! tutor.flush();
//!
//! // performer input: clear what was hit, learn whether it was expected
//! let result = tutor.key_pressed(60, 72);
//! ```
//!
//! ## Module Overview
//!
//! - [`tutor`]: `Tutor`, the thread-safe facade hosts call
//! - [`keys`]: per-pitch slot table and active-note bookkeeping
//! - [`mapper`]: pitch to LED index, channel to colour
//! - [`link`]: handshake, retry and reconnect on top of a transport
//! - [`protocol`]: the controller's ASCII line commands
//! - [`transport`]: serial port and in-memory test device
//! - [`scheduler`]: deferred flushes
//! - [`config`]: TOML configuration (embedded defaults + user override)
//! - [`midi`]: MIDI input for hosts that read a keyboard directly

pub mod config;
pub mod error;
pub mod keys;
pub mod link;
pub mod mapper;
pub mod midi;
pub mod protocol;
pub mod scheduler;
pub mod transport;
pub mod tutor;

pub use error::{TutorError, TutorResult};
pub use scheduler::{FlushScheduler, ManualScheduler, TimerThread};
pub use transport::{SerialConnector, TestConnector, TestDevice};
pub use tutor::Tutor;

pub use pianotutor_types::{Calibration, ColorSlot, KeyMatch, Rgb, TutorSettings};
