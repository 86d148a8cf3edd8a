//! Pitch to LED index and note to colour.

use pianotutor_types::{Calibration, ColorSlot, Rgb};

/// Pitch whose LED is `Calibration::reference_light`.
pub const REFERENCE_PITCH: u8 = 60;

/// LED index for `pitch`, clamped to the strip's addressable range.
///
/// Below the reference pitch the reference LED moves one step against the
/// strip direction and offsets are counted from 59, which keeps the gap around
/// middle C the same width as the others.
pub fn pitch_to_light(calibration: &Calibration, pitch: u8) -> u8 {
    let reference = f64::from(calibration.reference_light);
    let (reference, offset) = if pitch >= REFERENCE_PITCH {
        (reference, i32::from(pitch) - i32::from(REFERENCE_PITCH))
    } else {
        let step = if calibration.coefficient > 0.0 { -1.0 } else { 1.0 };
        (
            reference + step,
            i32::from(pitch) - i32::from(REFERENCE_PITCH - 1),
        )
    };
    let led = (f64::from(offset) * calibration.coefficient + reference).round();
    if led.is_nan() {
        return 0;
    }
    led.clamp(0.0, 255.0) as u8
}

/// How far `reference_light` moves so that `pitch` lands where pitch 60 used to.
/// Saturates at the `i32` range.
pub fn reference_shift(calibration: &Calibration, pitch: u8) -> i32 {
    let offset = i32::from(pitch) - i32::from(REFERENCE_PITCH);
    (f64::from(offset) * calibration.coefficient).round() as i32
}

/// Colour for a note on `channel`; look-ahead notes are dimmed.
pub fn note_color(calibration: &Calibration, channel: Option<u32>, future: u32) -> Rgb {
    let color = calibration.color(ColorSlot::for_channel(channel));
    if future > 0 {
        color.dimmed()
    } else {
        color
    }
}
