//! # pianotutor-types
//!
//! Shared type definitions for the PianoTutor LED driver.
//! Plain data used by pianotutor-core and pianotutor-bridge: colours,
//! calibration, key-press results and the settings bundle loaded from config.

mod settings;

pub use settings::{
    Calibration, TutorSettings, DEFAULT_COEFFICIENT, DEFAULT_COLORS, DEFAULT_FLUSH_DELAY_MS,
    DEFAULT_REFERENCE_LIGHT, DEFAULT_SERIAL_DEVICE,
};

/// An RGB triple as sent to the strip (one byte per component).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    /// Dim grey for a key the performer pressed but has not released yet.
    pub const PRESSED: Rgb = Rgb::new(2, 2, 2);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Dimmed version used for look-ahead notes.
    pub fn dimmed(self) -> Self {
        Self::new(self.r / 8, self.g / 8, self.b / 8)
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Index into the calibration colour table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ColorSlot {
    /// Channel-less notes (wrong keys, mistakes).
    Mistake,
    EvenChannel,
    OddChannel,
}

impl ColorSlot {
    pub const ALL: [ColorSlot; 3] = [
        ColorSlot::Mistake,
        ColorSlot::EvenChannel,
        ColorSlot::OddChannel,
    ];

    /// Slot used for a note on `channel`; `None` means no channel.
    pub fn for_channel(channel: Option<u32>) -> Self {
        match channel {
            None => ColorSlot::Mistake,
            Some(c) if c % 2 == 0 => ColorSlot::EvenChannel,
            Some(_) => ColorSlot::OddChannel,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// What a performer key press matched in the key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// Nothing lit (or nothing that can be consumed) at that pitch.
    NoMatch,
    /// A sounding note was matched and released.
    Active,
    /// A look-ahead note was matched while nothing else sounded; carries its depth.
    Preview(u32),
}

impl KeyMatch {
    /// Integer form: -1 for no match, 0 for an active note, the depth for a preview.
    pub fn code(self) -> i64 {
        match self {
            KeyMatch::NoMatch => -1,
            KeyMatch::Active => 0,
            KeyMatch::Preview(future) => i64::from(future),
        }
    }

    pub fn is_match(self) -> bool {
        !matches!(self, KeyMatch::NoMatch)
    }
}
