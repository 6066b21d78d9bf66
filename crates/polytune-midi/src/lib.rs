//! Polyphonic microtonal MIDI output.
//!
//! Arbitrary frequencies are spread over a fixed set of MIDI channels, each
//! retuned with pitch bend. Channels sharing the same bend are reused, and
//! when every channel is taken the least recently allocated one is stolen.

pub mod backend_midir;
pub mod config;
pub mod error;
pub mod frequency;
pub mod message;
pub mod out;
pub mod schedule;
pub mod sink;
pub mod voice;

pub use backend_midir::{list_output_ports, MidirSink};
pub use config::MidiOutConfig;
pub use error::MidiOutError;
pub use frequency::{map_frequency, PitchMapping};
pub use message::MidiMessage;
pub use out::{LogCallback, MidiOut, NoteOffHandle};
pub use schedule::{Note, Score, ScoreNote, TimeSpec};
pub use sink::{OutputSink, RecordingSink, SinkEvent};
pub use voice::{VoiceAllocator, VoiceId};

/// Timestamp in milliseconds on the output sink's monotonic clock.
pub type Millis = f64;

/// MIDI channel number, 0-15.
pub type Channel = u8;

/// Velocity used when a note does not specify one.
pub const DEFAULT_VELOCITY: u8 = 64;
