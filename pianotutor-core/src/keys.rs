//! Per-pitch key state.
//!
//! `KeyTable` decides which LEDs should be lit from the stream of note
//! events the host sends (sounding notes, look-ahead previews, channel-less
//! mistakes) and the keys the performer actually presses. It never touches
//! hardware itself: every LED change is handed to a `LightSink` in the order
//! it happens, so the caller can turn it into wire commands.

use std::time::{Duration, Instant};

use pianotutor_types::KeyMatch;

/// One slot per possible pitch value.
pub const SLOT_COUNT: usize = 256;

/// A preview that turns into a sounding note within this window of being
/// marked is cleared straight away: the flash would be too short to see.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// A note the host asked to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// 1..=127
    pub velocity: u8,
    pub channel: u32,
    /// 0 = sounding now, otherwise how far ahead the note is.
    pub future: u32,
    /// Last time a release was marked on this preview.
    pub marked: Option<Instant>,
}

impl Note {
    pub fn is_active(&self) -> bool {
        self.future == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteSlot {
    #[default]
    Unused,
    /// Lit in the mistake colour by an event without a channel.
    Channelless,
    /// The performer pressed this sounding key; it stays grey until the note is released.
    PendingRelease { channel: u32 },
    Occupied(Note),
}

impl NoteSlot {
    /// Whether this slot counts towards the active total.
    pub fn is_active(&self) -> bool {
        matches!(self, NoteSlot::Occupied(note) if note.is_active())
    }

    pub fn is_lit(&self) -> bool {
        !matches!(self, NoteSlot::Unused)
    }
}

/// An LED change produced by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightOp {
    /// Light the key for a note; `channel: None` is the mistake colour.
    Lit {
        pitch: u8,
        channel: Option<u32>,
        future: u32,
    },
    /// Show the key as pressed and waiting for release.
    Pressed { pitch: u8 },
    Off { pitch: u8 },
}

/// Receives LED changes from the table as they are decided.
pub trait LightSink {
    fn apply(&mut self, op: LightOp);
}

impl LightSink for Vec<LightOp> {
    fn apply(&mut self, op: LightOp) {
        self.push(op);
    }
}

/// The slot table and its count of sounding notes.
#[derive(Debug, Clone)]
pub struct KeyTable {
    slots: [NoteSlot; SLOT_COUNT],
    active: usize,
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyTable {
    pub fn new() -> Self {
        Self {
            slots: [NoteSlot::Unused; SLOT_COUNT],
            active: 0,
        }
    }

    pub fn slot(&self, pitch: u8) -> NoteSlot {
        self.slots[usize::from(pitch)]
    }

    /// Number of notes sounding now (previews and grey keys excluded).
    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Pitches with something lit, in ascending order.
    pub fn lit_pitches(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(move |&p| self.slots[usize::from(p)].is_lit())
    }

    fn decrement(&mut self, pitch: u8) {
        match self.active.checked_sub(1) {
            Some(n) => self.active = n,
            None => log::error!(target: "keys", "active count underflow at pitch {}", pitch),
        }
    }

    /// Show a note. Velocity 0 is a release.
    pub fn add_key(
        &mut self,
        pitch: u8,
        velocity: u8,
        channel: Option<u32>,
        future: u32,
        now: Instant,
        sink: &mut impl LightSink,
    ) {
        if velocity == 0 {
            self.clear_key(pitch, false, now, sink);
            return;
        }

        let index = usize::from(pitch);
        if let NoteSlot::Occupied(current) = self.slots[index] {
            if current.velocity == velocity
                && Some(current.channel) == channel
                && current.future == future
            {
                return;
            }
        }
        log::debug!(
            target: "keys",
            "add_key: p={}, v={}, c={:?}, f={}",
            pitch, velocity, channel, future
        );

        let Some(channel) = channel else {
            if self.slots[index].is_active() {
                self.decrement(pitch);
            }
            self.slots[index] = NoteSlot::Channelless;
            sink.apply(LightOp::Lit {
                pitch,
                channel: None,
                future: 0,
            });
            return;
        };

        let mut marked = None;
        match self.slots[index] {
            NoteSlot::Occupied(current) => {
                if future == 0 && current.future > 0 {
                    self.active += 1;
                    marked = current.marked;
                } else if future > current.future
                    || (future == current.future && velocity < current.velocity)
                {
                    return;
                }
            }
            _ => {
                if future == 0 {
                    self.active += 1;
                }
            }
        }

        self.slots[index] = NoteSlot::Occupied(Note {
            velocity,
            channel,
            future,
            marked: None,
        });
        sink.apply(LightOp::Lit {
            pitch,
            channel: Some(channel),
            future,
        });

        // The light still goes on first; the device just never shows it.
        if let Some(marked) = marked {
            if now.saturating_duration_since(marked) < DEBOUNCE_WINDOW {
                log::debug!(target: "keys", "pitch {} released too fast, clearing", pitch);
                sink.apply(LightOp::Off { pitch });
                self.decrement(pitch);
                self.slots[index] = NoteSlot::Unused;
            }
        }
    }

    /// Release a note. With `mark`, a preview is kept lit but remembers the
    /// release time for the debounce check.
    pub fn clear_key(&mut self, pitch: u8, mark: bool, now: Instant, sink: &mut impl LightSink) {
        let index = usize::from(pitch);
        match self.slots[index] {
            NoteSlot::Unused => {}
            NoteSlot::Channelless | NoteSlot::PendingRelease { .. } => {
                log::debug!(target: "keys", "clear_key: p={}", pitch);
                sink.apply(LightOp::Off { pitch });
                self.slots[index] = NoteSlot::Unused;
            }
            NoteSlot::Occupied(note) if note.is_active() => {
                log::debug!(target: "keys", "clear_key: p={}", pitch);
                sink.apply(LightOp::Off { pitch });
                self.decrement(pitch);
                self.slots[index] = NoteSlot::Unused;
            }
            NoteSlot::Occupied(mut note) => {
                if mark {
                    note.marked = Some(now);
                    self.slots[index] = NoteSlot::Occupied(note);
                }
            }
        }
    }

    /// The performer played `pitch`.
    pub fn key_pressed(
        &mut self,
        pitch: u8,
        velocity: u8,
        lit_until_release: bool,
        now: Instant,
        sink: &mut impl LightSink,
    ) -> KeyMatch {
        if velocity == 0 {
            return KeyMatch::NoMatch;
        }
        let index = usize::from(pitch);
        match self.slots[index] {
            NoteSlot::Occupied(note) if note.is_active() => {
                if lit_until_release {
                    log::debug!(target: "keys", "marking key as pressed: pitch={}", pitch);
                    self.slots[index] = NoteSlot::PendingRelease {
                        channel: note.channel,
                    };
                    sink.apply(LightOp::Pressed { pitch });
                } else {
                    log::debug!(target: "keys", "clearing key: pitch={}", pitch);
                    self.slots[index] = NoteSlot::Unused;
                    sink.apply(LightOp::Off { pitch });
                }
                self.decrement(pitch);
                KeyMatch::Active
            }
            NoteSlot::Occupied(note) if self.active == 0 => {
                log::debug!(target: "keys", "skipping ahead to preview: pitch={}", pitch);
                self.clear_key(pitch, true, now, sink);
                KeyMatch::Preview(note.future)
            }
            _ => KeyMatch::NoMatch,
        }
    }

    /// Forget every note without producing LED changes (the caller blanks the strip).
    pub fn reset(&mut self) {
        self.slots = [NoteSlot::Unused; SLOT_COUNT];
        self.active = 0;
    }

    /// Release every note shown for `channel`.
    pub fn clear_channel(&mut self, channel: u32, sink: &mut impl LightSink) {
        for pitch in 0..=u8::MAX {
            let index = usize::from(pitch);
            let matches = match self.slots[index] {
                NoteSlot::Occupied(note) => note.channel == channel,
                NoteSlot::PendingRelease { channel: c } => c == channel,
                NoteSlot::Unused | NoteSlot::Channelless => false,
            };
            if matches {
                if self.slots[index].is_active() {
                    self.decrement(pitch);
                }
                sink.apply(LightOp::Off { pitch });
                self.slots[index] = NoteSlot::Unused;
            }
        }
    }
}
