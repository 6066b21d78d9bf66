//! Output sink abstraction consumed by [`MidiOut`](crate::MidiOut).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Channel, Millis};

/// Destination for channel-level MIDI output.
///
/// Timed operations carry an absolute timestamp on the sink's own clock.
/// The sink is responsible for firing them when due; the engine only
/// guarantees that it submits them in non-decreasing time order.
pub trait OutputSink {
    /// Current time on the sink's monotonic clock.
    fn now(&self) -> Millis;

    fn set_pitch_bend_range(&mut self, channel: Channel, semitones: u8, cents: u8);

    /// Set the channel bend, `value` normalized to [-1, 1].
    fn set_pitch_bend(&mut self, channel: Channel, value: f64, time: Millis);

    fn note_on(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis);

    fn note_off(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis);

    /// Drop anything queued but not yet sent, where supported.
    fn clear(&mut self);

    /// Silence every channel immediately.
    fn all_notes_off(&mut self);
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn now(&self) -> Millis {
        (**self).now()
    }

    fn set_pitch_bend_range(&mut self, channel: Channel, semitones: u8, cents: u8) {
        (**self).set_pitch_bend_range(channel, semitones, cents)
    }

    fn set_pitch_bend(&mut self, channel: Channel, value: f64, time: Millis) {
        (**self).set_pitch_bend(channel, value, time)
    }

    fn note_on(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        (**self).note_on(channel, note, velocity, time)
    }

    fn note_off(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        (**self).note_off(channel, note, velocity, time)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn all_notes_off(&mut self) {
        (**self).all_notes_off()
    }
}

/// Call recorded by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkEvent {
    PitchBendRange {
        channel: Channel,
        semitones: u8,
        cents: u8,
    },
    PitchBend {
        channel: Channel,
        value: f64,
        time: Millis,
    },
    NoteOn {
        channel: Channel,
        note: u8,
        velocity: u8,
        time: Millis,
    },
    NoteOff {
        channel: Channel,
        note: u8,
        velocity: u8,
        time: Millis,
    },
    Clear,
    AllNotesOff,
}

impl SinkEvent {
    /// Timestamp for timed events.
    pub fn time(&self) -> Option<Millis> {
        match *self {
            SinkEvent::PitchBend { time, .. }
            | SinkEvent::NoteOn { time, .. }
            | SinkEvent::NoteOff { time, .. } => Some(time),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, SinkEvent::NoteOn { .. } | SinkEvent::NoteOff { .. })
    }
}

#[derive(Debug, Default)]
struct Recording {
    now: Millis,
    events: Vec<SinkEvent>,
}

/// In-memory sink with a manually advanced clock.
///
/// Clones share the same log and clock, so a copy kept by the caller can
/// inspect what the engine emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock to an absolute time.
    pub fn set_now(&self, now: Millis) {
        self.inner.lock().now = now;
    }

    pub fn advance(&self, delta: Millis) {
        self.inner.lock().now += delta;
    }

    /// Snapshot of every recorded call.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.inner.lock().events.clone()
    }

    /// Recorded note-on and note-off calls only.
    pub fn notes(&self) -> Vec<SinkEvent> {
        self.inner
            .lock()
            .events
            .iter()
            .filter(|event| event.is_note())
            .cloned()
            .collect()
    }

    /// Retrieves and clears the recorded calls.
    pub fn drain(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut self.inner.lock().events)
    }

    fn push(&self, event: SinkEvent) {
        self.inner.lock().events.push(event);
    }
}

impl OutputSink for RecordingSink {
    fn now(&self) -> Millis {
        self.inner.lock().now
    }

    fn set_pitch_bend_range(&mut self, channel: Channel, semitones: u8, cents: u8) {
        self.push(SinkEvent::PitchBendRange {
            channel,
            semitones,
            cents,
        });
    }

    fn set_pitch_bend(&mut self, channel: Channel, value: f64, time: Millis) {
        self.push(SinkEvent::PitchBend {
            channel,
            value,
            time,
        });
    }

    fn note_on(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        self.push(SinkEvent::NoteOn {
            channel,
            note,
            velocity,
            time,
        });
    }

    fn note_off(&mut self, channel: Channel, note: u8, velocity: u8, time: Millis) {
        self.push(SinkEvent::NoteOff {
            channel,
            note,
            velocity,
            time,
        });
    }

    fn clear(&mut self) {
        self.push(SinkEvent::Clear);
    }

    fn all_notes_off(&mut self) {
        self.push(SinkEvent::AllNotesOff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_log_and_clock() {
        let observer = RecordingSink::new();
        let mut sink = observer.clone();
        observer.set_now(25.0);
        assert_eq!(sink.now(), 25.0);

        sink.note_on(1, 60, 100, 25.0);
        sink.set_pitch_bend(1, 0.25, 25.0);
        sink.all_notes_off();
        assert_eq!(observer.events().len(), 3);
        assert_eq!(observer.notes().len(), 1);
        assert_eq!(observer.events()[1].time(), Some(25.0));
        assert_eq!(observer.events()[2].time(), None);

        assert_eq!(observer.drain().len(), 3);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn boxed_sink_forwards_calls() {
        let observer = RecordingSink::new();
        let mut boxed: Box<dyn OutputSink> = Box::new(observer.clone());
        boxed.note_off(4, 61, 0, 10.0);
        assert_eq!(
            observer.events(),
            vec![SinkEvent::NoteOff {
                channel: 4,
                note: 61,
                velocity: 0,
                time: 10.0
            }]
        );
    }
}
