//! MIDI keyboard input.
//!
//! The tutor itself never reads MIDI; hosts feed it. This module is what the
//! bridge uses to turn a hardware keyboard or a sequencer port into tutor calls.

use midir::{MidiInput, MidiInputConnection};

use crate::error::{TutorError, TutorResult};

const CLIENT_NAME: &str = "pianotutor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent {
    /// Driver timestamp in microseconds.
    pub timestamp_us: u64,
    pub kind: MidiEventKind,
}

/// The channel messages the tutor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEventKind {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// One MIDI input connection. Dropping it disconnects.
pub struct MidiInputManager {
    connection: Option<MidiInputConnection<()>>,
    connected_port_name: Option<String>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        Self {
            connection: None,
            connected_port_name: None,
        }
    }

    /// Input ports currently visible to the system.
    pub fn list_ports() -> TutorResult<Vec<MidiPortInfo>> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| TutorError::Midi(e.to_string()))?;
        Ok(midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo { index, name })
            })
            .collect())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to input port `port_index`. `handler` runs on midir's
    /// real-time thread for every recognised message.
    pub fn connect<F>(&mut self, port_index: usize, mut handler: F) -> TutorResult<()>
    where
        F: FnMut(MidiEvent) + Send + 'static,
    {
        self.disconnect();

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| TutorError::Midi(e.to_string()))?;
        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| TutorError::Midi(format!("no MIDI input port {}", port_index)))?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_in
            .connect(
                port,
                "pianotutor-input",
                move |timestamp_us, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        handler(MidiEvent { timestamp_us, kind });
                    }
                },
                (),
            )
            .map_err(|e| TutorError::Midi(e.to_string()))?;

        log::info!(target: "midi", "listening on {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.connected_port_name = None;
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Decode one channel message. Note-on with velocity 0 is a note-off.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    let (&status, rest) = data.split_first()?;
    let channel = status & 0x0F;
    let [first, second, ..] = *rest else {
        return None;
    };

    match status & 0xF0 {
        0x80 => Some(MidiEventKind::NoteOff {
            channel,
            note: first,
        }),
        0x90 if second == 0 => Some(MidiEventKind::NoteOff {
            channel,
            note: first,
        }),
        0x90 => Some(MidiEventKind::NoteOn {
            channel,
            note: first,
            velocity: second,
        }),
        0xB0 => Some(MidiEventKind::ControlChange {
            channel,
            controller: first,
            value: second,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        assert_eq!(
            parse_midi_message(&[0x93, 60, 100]),
            Some(MidiEventKind::NoteOn {
                channel: 3,
                note: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_parse_note_off_forms() {
        let off = Some(MidiEventKind::NoteOff {
            channel: 0,
            note: 60,
        });
        assert_eq!(parse_midi_message(&[0x80, 60, 64]), off);
        assert_eq!(parse_midi_message(&[0x90, 60, 0]), off);
    }

    #[test]
    fn test_parse_control_change() {
        assert_eq!(
            parse_midi_message(&[0xB0, 64, 127]),
            Some(MidiEventKind::ControlChange {
                channel: 0,
                controller: 64,
                value: 127
            })
        );
    }

    #[test]
    fn test_ignores_short_and_unknown_messages() {
        assert!(parse_midi_message(&[]).is_none());
        assert!(parse_midi_message(&[0x90, 60]).is_none());
        assert!(parse_midi_message(&[0xE0, 0x00, 0x40]).is_none());
        assert!(parse_midi_message(&[0xF8]).is_none());
    }

    #[test]
    fn test_new_manager_is_disconnected() {
        let manager = MidiInputManager::new();
        assert!(!manager.is_connected());
        assert!(manager.connected_port_name().is_none());
    }
}
