use thiserror::Error;

use crate::{Channel, Millis};

/// Errors produced by the note-output engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MidiOutError {
    /// An event was submitted earlier than the last accepted event.
    #[error("event at {time}ms precedes last accepted event at {last}ms")]
    CausalViolation { time: Millis, last: Millis },
    /// A time string could not be parsed.
    #[error("invalid time specification: {0:?}")]
    InvalidTime(String),
    #[error("invalid note duration: {0}")]
    InvalidDuration(f64),
    #[error("invalid frequency: {0}Hz")]
    InvalidFrequency(f64),
    /// Channel number outside 0-15.
    #[error("invalid MIDI channel {0}")]
    InvalidChannel(Channel),
    #[error("MIDI channel {0} configured more than once")]
    DuplicateChannel(Channel),
    #[error("pitch bend range of {0} semitones is not supported")]
    InvalidBendRange(u8),
}

impl MidiOutError {
    pub fn is_causal_violation(&self) -> bool {
        matches!(self, MidiOutError::CausalViolation { .. })
    }
}
