use serde::{Deserialize, Serialize};

use crate::Channel;

/// Pitch bend value at rest.
pub const PITCH_BEND_CENTER: u16 = 8192;
/// Largest 14-bit pitch bend value.
pub const PITCH_BEND_MAX: u16 = 16383;

const CC_DATA_ENTRY_MSB: u8 = 6;
const CC_DATA_ENTRY_LSB: u8 = 38;
const CC_RPN_LSB: u8 = 100;
const CC_RPN_MSB: u8 = 101;
const CC_ALL_NOTES_OFF: u8 = 123;

/// Channel voice messages emitted by the output sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn {
        channel: Channel,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: Channel,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: Channel,
        controller: u8,
        value: u8,
    },
    /// 14-bit bend, 8192 is centered.
    PitchBend { channel: Channel, value: u16 },
}

impl MidiMessage {
    /// Encode into raw bytes.
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => [0x80 | (channel & 0x0f), note & 0x7f, velocity & 0x7f],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0f), controller & 0x7f, value & 0x7f],
            MidiMessage::PitchBend { channel, value } => {
                let value = value.min(PITCH_BEND_MAX);
                [
                    0xE0 | (channel & 0x0f),
                    (value & 0x7f) as u8,
                    (value >> 7) as u8,
                ]
            }
        }
    }

    /// Pitch bend from a normalized value in [-1, 1].
    pub fn pitch_bend(channel: Channel, normalized: f64) -> Self {
        let clamped = normalized.clamp(-1.0, 1.0);
        let value = ((clamped + 1.0) / 2.0 * PITCH_BEND_MAX as f64).round() as u16;
        MidiMessage::PitchBend { channel, value }
    }

    /// RPN 0 sequence setting the bend range, terminated by the null RPN.
    pub fn pitch_bend_range(channel: Channel, semitones: u8, cents: u8) -> [Self; 6] {
        let cc = |controller, value| MidiMessage::ControlChange {
            channel,
            controller,
            value,
        };
        [
            cc(CC_RPN_MSB, 0),
            cc(CC_RPN_LSB, 0),
            cc(CC_DATA_ENTRY_MSB, semitones),
            cc(CC_DATA_ENTRY_LSB, cents),
            cc(CC_RPN_MSB, 127),
            cc(CC_RPN_LSB, 127),
        ]
    }

    pub fn all_notes_off(channel: Channel) -> Self {
        MidiMessage::ControlChange {
            channel,
            controller: CC_ALL_NOTES_OFF,
            value: 0,
        }
    }
}
