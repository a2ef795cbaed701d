//! MIDI channel messages spoken by the MIDImix
//!
//! The surface only sends notes (buttons) and control changes (knobs and
//! faders), and only understands notes back (button LEDs). Everything else
//! is dropped at parse time.

use std::fmt;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Button released, or LED off
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Button pressed, or LED on
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Knob or fader position
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    /// Parse one three-byte channel message
    ///
    /// Note On with velocity 0 is reported as Note Off. Running status,
    /// truncated input and other message types return None.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let &[status, data1, data2, ..] = data else {
            return None;
        };
        let channel = status & 0x0F;
        let (data1, data2) = (data1 & 0x7F, data2 & 0x7F);

        let message = match status & 0xF0 {
            NOTE_OFF => MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: data2,
            },
            NOTE_ON if data2 == 0 => MidiMessage::NoteOff {
                channel,
                note: data1,
                velocity: 0,
            },
            NOTE_ON => MidiMessage::NoteOn {
                channel,
                note: data1,
                velocity: data2,
            },
            CONTROL_CHANGE => MidiMessage::ControlChange {
                channel,
                cc: data1,
                value: data2,
            },
            _ => return None,
        };
        Some(message)
    }

    /// Wire bytes of the message
    pub fn encode(&self) -> [u8; 3] {
        let (kind, data1, data2) = match *self {
            MidiMessage::NoteOff { note, velocity, .. } => (NOTE_OFF, note, velocity),
            MidiMessage::NoteOn { note, velocity, .. } => (NOTE_ON, note, velocity),
            MidiMessage::ControlChange { cc, value, .. } => (CONTROL_CHANGE, cc, value),
        };
        [kind | (self.channel() & 0x0F), data1 & 0x7F, data2 & 0x7F]
    }

    /// Channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ch = self.channel() + 1;
        match *self {
            MidiMessage::NoteOff { note, velocity, .. } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", ch, note, velocity)
            }
            MidiMessage::NoteOn { note, velocity, .. } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", ch, note, velocity)
            }
            MidiMessage::ControlChange { cc, value, .. } => {
                write!(f, "CC ch:{} cc:{} v:{}", ch, cc, value)
            }
        }
    }
}

pub mod convert {
    /// Scale a 7-bit controller value to [0.0, 1.0]
    ///
    /// `max` is the raw value the control reports at its end stop.
    pub fn normalize(value: u8, max: u8) -> f64 {
        if max == 0 {
            return 0.0;
        }
        (f64::from(value) / f64::from(max)).min(1.0)
    }
}

/// Space-separated hex dump for logs
pub fn format_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_button_press() {
        assert_eq!(
            MidiMessage::parse(&[0x90, 3, 127]),
            Some(MidiMessage::NoteOn { channel: 0, note: 3, velocity: 127 })
        );
    }

    #[test]
    fn test_note_on_velocity_zero_is_release() {
        assert_eq!(
            MidiMessage::parse(&[0x91, 3, 0]),
            Some(MidiMessage::NoteOff { channel: 1, note: 3, velocity: 0 })
        );
    }

    #[test]
    fn test_parse_knob() {
        assert_eq!(
            MidiMessage::parse(&[0xB0, 19, 64]),
            Some(MidiMessage::ControlChange { channel: 0, cc: 19, value: 64 })
        );
    }

    #[test]
    fn test_rejects_unsupported_input() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 3]), None);
        // Running status
        assert_eq!(MidiMessage::parse(&[0x03, 127, 0]), None);
        // Program change, pitch bend, sysex
        assert_eq!(MidiMessage::parse(&[0xC0, 1, 0]), None);
        assert_eq!(MidiMessage::parse(&[0xE0, 0, 0x40]), None);
        assert_eq!(MidiMessage::parse(&[0xF0, 0x47, 0xF7]), None);
    }

    #[test]
    fn test_encode_led_messages() {
        let on = MidiMessage::NoteOn { channel: 0, note: 3, velocity: 127 };
        assert_eq!(on.encode(), [0x90, 3, 127]);
        let off = MidiMessage::NoteOff { channel: 2, note: 3, velocity: 0 };
        assert_eq!(off.encode(), [0x82, 3, 0]);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(convert::normalize(0, 127), 0.0);
        assert_eq!(convert::normalize(127, 127), 1.0);
        assert_eq!(convert::normalize(127, 100), 1.0);
        assert_eq!(convert::normalize(5, 0), 0.0);
    }

    #[test]
    fn test_display() {
        let msg = MidiMessage::ControlChange { channel: 0, cc: 19, value: 64 };
        assert_eq!(msg.to_string(), "CC ch:1 cc:19 v:64");
        assert_eq!(format_hex(&[0x90, 0x03, 0x7F]), "90 03 7F");
        assert_eq!(format_hex(&[]), "");
    }
}
