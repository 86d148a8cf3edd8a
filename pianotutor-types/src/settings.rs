//! Calibration and driver settings.

use serde::{Deserialize, Serialize};

use crate::{ColorSlot, Rgb};

/// LED index lit for middle C on a freshly built tutor.
pub const DEFAULT_REFERENCE_LIGHT: i32 = 71;
/// LEDs per semitone; negative when the strip runs right to left.
pub const DEFAULT_COEFFICIENT: f64 = -2.0;
/// Mistake, even-channel and odd-channel colours.
pub const DEFAULT_COLORS: [Rgb; 3] = [
    Rgb::new(16, 0, 0),
    Rgb::new(16, 0, 16),
    Rgb::new(0, 16, 16),
];
/// Delay before a key-press triggered flush is sent.
pub const DEFAULT_FLUSH_DELAY_MS: u64 = 5;

#[cfg(windows)]
pub const DEFAULT_SERIAL_DEVICE: &str = "COM0";
#[cfg(not(windows))]
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyACM0";

/// Mapping from pitches to LEDs and the colours to light them with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// LED index assigned to pitch 60.
    pub reference_light: i32,
    /// LEDs per semitone; the sign gives the strip orientation.
    pub coefficient: f64,
    pub colors: [Rgb; 3],
}

impl Calibration {
    pub fn color(&self, slot: ColorSlot) -> Rgb {
        self.colors[slot.index()]
    }

    pub fn set_color(&mut self, slot: ColorSlot, color: Rgb) {
        self.colors[slot.index()] = color;
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            reference_light: DEFAULT_REFERENCE_LIGHT,
            coefficient: DEFAULT_COEFFICIENT,
            colors: DEFAULT_COLORS,
        }
    }
}

/// Everything a tutor can be configured with in one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorSettings {
    pub serial_device: String,
    pub calibration: Calibration,
    /// Keep pressed keys lit in grey until the note is released.
    pub lit_until_release: bool,
    pub flush_delay_ms: u64,
    /// Upper bound on ping attempts per handshake; `None` spins until the device answers.
    pub handshake_attempts: Option<u32>,
}

impl Default for TutorSettings {
    fn default() -> Self {
        Self {
            serial_device: DEFAULT_SERIAL_DEVICE.to_string(),
            calibration: Calibration::default(),
            lit_until_release: false,
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
            handshake_attempts: None,
        }
    }
}
