//! The driver facade.
//!
//! `Tutor` is shared between the host's UI thread, its real-time MIDI thread
//! and the flush timer. One mutex guards everything; each operation holds it
//! for its whole duration, including the blocking serial exchange.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use pianotutor_types::{Calibration, ColorSlot, KeyMatch, Rgb, TutorSettings};

use crate::error::TutorResult;
use crate::keys::{KeyTable, LightOp, LightSink};
use crate::link::Link;
use crate::mapper::{note_color, pitch_to_light, reference_shift};
use crate::scheduler::{FlushScheduler, TimerThread};
use crate::transport::{Connector, SerialConnector};

struct TutorState {
    keys: KeyTable,
    calibration: Calibration,
    link: Link,
    lit_until_release: bool,
    flush_delay: Duration,
}

impl TutorState {
    fn new(connector: Box<dyn Connector>, settings: &TutorSettings) -> Self {
        let mut link = Link::new(connector, settings.serial_device.clone());
        link.set_handshake_attempts(settings.handshake_attempts);
        Self {
            keys: KeyTable::new(),
            calibration: settings.calibration.clone(),
            link,
            lit_until_release: settings.lit_until_release,
            flush_delay: Duration::from_millis(settings.flush_delay_ms),
        }
    }

    fn sink(&mut self) -> (&mut KeyTable, HardwareSink<'_>) {
        (
            &mut self.keys,
            HardwareSink {
                link: &mut self.link,
                calibration: &self.calibration,
            },
        )
    }

    fn clear_all(&mut self, channel: Option<u32>) {
        match channel {
            None => {
                self.link.clear_all();
                self.keys.reset();
            }
            Some(channel) => {
                let (keys, mut sink) = self.sink();
                keys.clear_channel(channel, &mut sink);
                self.link.flush();
            }
        }
    }
}

/// Turns key-table decisions into pixel writes.
struct HardwareSink<'a> {
    link: &'a mut Link,
    calibration: &'a Calibration,
}

impl LightSink for HardwareSink<'_> {
    fn apply(&mut self, op: LightOp) {
        let (pitch, color) = match op {
            LightOp::Lit {
                pitch,
                channel,
                future,
            } => (pitch, note_color(self.calibration, channel, future)),
            LightOp::Pressed { pitch } => (pitch, Rgb::PRESSED),
            LightOp::Off { pitch } => (pitch, Rgb::BLACK),
        };
        let led = pitch_to_light(self.calibration, pitch);
        self.link.set_pixel(led, color);
    }
}

/// Real-time LED feedback for a piano keyboard.
///
/// Cheap to clone; clones drive the same strip.
#[derive(Clone)]
pub struct Tutor {
    state: Arc<Mutex<TutorState>>,
    scheduler: Arc<dyn FlushScheduler>,
}

impl Tutor {
    pub fn new(connector: impl Connector + 'static, scheduler: Arc<dyn FlushScheduler>) -> Self {
        Self::with_settings(connector, scheduler, &TutorSettings::default())
    }

    pub fn with_settings(
        connector: impl Connector + 'static,
        scheduler: Arc<dyn FlushScheduler>,
        settings: &TutorSettings,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TutorState::new(Box::new(connector), settings))),
            scheduler,
        }
    }

    /// A tutor on the configured serial device with its own flush timer thread.
    pub fn serial(settings: &TutorSettings) -> TutorResult<Self> {
        let timer = TimerThread::spawn()?;
        Ok(Self::with_settings(SerialConnector, Arc::new(timer), settings))
    }

    fn lock(&self) -> MutexGuard<'_, TutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Light `pitch` for a note on `channel` (`None` for a mistake), `future`
    /// steps ahead of the current position. Velocity 0 releases the key.
    pub fn add_key(&self, pitch: u8, velocity: u8, channel: Option<u32>, future: u32) {
        let mut state = self.lock();
        let (keys, mut sink) = state.sink();
        keys.add_key(pitch, velocity, channel, future, Instant::now(), &mut sink);
    }

    pub fn clear_key(&self, pitch: u8, mark: bool) {
        let mut state = self.lock();
        let (keys, mut sink) = state.sink();
        keys.clear_key(pitch, mark, Instant::now(), &mut sink);
    }

    /// Blank everything, or only the notes of one channel.
    pub fn clear_all_keys(&self, channel: Option<u32>) {
        self.lock().clear_all(channel);
    }

    /// Report a key the performer played. A match schedules a flush.
    pub fn key_pressed(&self, pitch: u8, velocity: u8) -> KeyMatch {
        let (result, delay) = {
            let mut state = self.lock();
            let lit_until_release = state.lit_until_release;
            let delay = state.flush_delay;
            let (keys, mut sink) = state.sink();
            let result =
                keys.key_pressed(pitch, velocity, lit_until_release, Instant::now(), &mut sink);
            (result, delay)
        };
        if result.is_match() {
            self.schedule_flush(delay);
        }
        result
    }

    fn schedule_flush(&self, delay: Duration) {
        let state: Weak<Mutex<TutorState>> = Arc::downgrade(&self.state);
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(state) = state.upgrade() else { return };
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.link.needs_flush() {
                    state.link.flush();
                }
            }),
        );
    }

    pub fn flush(&self) {
        self.lock().link.flush();
    }

    pub fn active_count(&self) -> usize {
        self.lock().keys.active_count()
    }

    pub fn set_reference_light(&self, light: i32) {
        self.lock().calibration.reference_light = light;
    }

    pub fn reference_light(&self) -> i32 {
        self.lock().calibration.reference_light
    }

    /// Recalibrate so that `pitch` lights the LED pitch 60 used to light.
    pub fn set_reference_pitch(&self, pitch: u8) {
        let mut state = self.lock();
        state.clear_all(None);
        let shift = reference_shift(&state.calibration, pitch);
        let light = &mut state.calibration.reference_light;
        *light = light.saturating_sub(shift);
        log::info!(
            target: "tutor",
            "reference pitch {} -> reference light {}",
            pitch,
            state.calibration.reference_light
        );
    }

    pub fn set_coefficient(&self, coefficient: f64) {
        self.lock().calibration.coefficient = coefficient;
    }

    pub fn coefficient(&self) -> f64 {
        self.lock().calibration.coefficient
    }

    pub fn color(&self, slot: ColorSlot) -> Rgb {
        self.lock().calibration.color(slot)
    }

    pub fn set_color(&self, slot: ColorSlot, color: Rgb) {
        self.lock().calibration.set_color(slot, color);
    }

    /// Switch devices. The current connection is closed; the new one opens on next use.
    pub fn set_serial_device(&self, path: impl Into<String>) {
        self.lock().link.set_device(path);
    }

    pub fn serial_device(&self) -> String {
        self.lock().link.device().to_string()
    }

    pub fn set_lit_until_release(&self, enabled: bool) {
        self.lock().lit_until_release = enabled;
    }

    pub fn lit_until_release(&self) -> bool {
        self.lock().lit_until_release
    }

    pub fn calibration(&self) -> Calibration {
        self.lock().calibration.clone()
    }

    /// Replace calibration and behaviour settings in one step.
    pub fn apply_settings(&self, settings: &TutorSettings) {
        let mut state = self.lock();
        state.calibration = settings.calibration.clone();
        state.lit_until_release = settings.lit_until_release;
        state.flush_delay = Duration::from_millis(settings.flush_delay_ms);
        state.link.set_handshake_attempts(settings.handshake_attempts);
        if state.link.device() != settings.serial_device {
            state.link.set_device(settings.serial_device.clone());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().link.is_connected()
    }

    /// Pixels were written that the strip does not show yet.
    pub fn needs_flush(&self) -> bool {
        self.lock().link.needs_flush()
    }
}
