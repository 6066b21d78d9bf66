//! Note-on/note-off front end tying the voice pool to an output sink.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::MidiOutConfig;
use crate::error::MidiOutError;
use crate::frequency::map_frequency;
use crate::sink::OutputSink;
use crate::voice::{Allocation, VoiceAllocator, VoiceId};
use crate::{Channel, Millis, DEFAULT_VELOCITY};

/// Observer for human-readable diagnostics.
pub type LogCallback = Box<dyn Fn(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SoundingNote {
    voice: VoiceId,
    channel: Channel,
    note: u8,
}

/// Explicit handle for ending a note started by [`MidiOut::note_on`].
///
/// A no-op handle is returned when nothing was sent. Releasing a handle
/// twice sends two note-offs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoteOffHandle {
    sounding: Option<SoundingNote>,
}

impl NoteOffHandle {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.sounding.is_none()
    }

    pub fn channel(&self) -> Option<Channel> {
        self.sounding.map(|s| s.channel)
    }

    pub fn note(&self) -> Option<u8> {
        self.sounding.map(|s| s.note)
    }

    /// End the note. Equivalent to [`MidiOut::note_off`].
    pub fn release<S: OutputSink>(
        &self,
        out: &mut MidiOut<S>,
        velocity: Option<u8>,
        time: Option<Millis>,
    ) -> Result<(), MidiOutError> {
        out.note_off(self, velocity, time)
    }
}

/// Polyphonic microtonal note output over a fixed set of pitch-bent channels.
///
/// Every timed call must carry a time no earlier than the previous one.
pub struct MidiOut<S: OutputSink> {
    sink: Option<S>,
    voices: VoiceAllocator,
    bend_range: u8,
    last_time: Millis,
    epoch: Instant,
    log: Option<LogCallback>,
}

impl<S: OutputSink> fmt::Debug for MidiOut<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiOut")
            .field("connected", &self.sink.is_some())
            .field("voices", &self.voices)
            .field("bend_range", &self.bend_range)
            .field("last_time", &self.last_time)
            .finish()
    }
}

impl<S: OutputSink> MidiOut<S> {
    /// Validate the configuration and program the bend range on every channel.
    pub fn new(sink: Option<S>, config: &MidiOutConfig) -> Result<Self, MidiOutError> {
        config.validate()?;
        let mut out = Self {
            sink,
            voices: VoiceAllocator::new(config.channels.iter().copied()),
            bend_range: config.pitch_bend_range,
            last_time: 0.0,
            epoch: Instant::now(),
            log: None,
        };
        if let Some(sink) = out.sink.as_mut() {
            for &channel in &config.channels {
                sink.set_pitch_bend_range(channel, config.pitch_bend_range, 0);
            }
        }
        out.last_time = out.now();
        Ok(out)
    }

    /// Engine with no output device. Every operation is a no-op.
    pub fn disconnected(config: &MidiOutConfig) -> Result<Self, MidiOutError> {
        Self::new(None, config)
    }

    /// Attach a diagnostics callback.
    pub fn with_logger(mut self, log: impl Fn(&str) + Send + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    /// Give up the engine and return its sink.
    pub fn into_sink(self) -> Option<S> {
        self.sink
    }

    pub fn voices(&self) -> &VoiceAllocator {
        &self.voices
    }

    pub fn pitch_bend_range(&self) -> u8 {
        self.bend_range
    }

    /// Time of the last accepted event.
    pub fn last_time(&self) -> Millis {
        self.last_time
    }

    /// Current time on the sink clock, or since construction without a sink.
    pub fn now(&self) -> Millis {
        match &self.sink {
            Some(sink) => sink.now(),
            None => self.epoch.elapsed().as_secs_f64() * 1000.0,
        }
    }

    fn emit(&self, message: impl FnOnce() -> String) {
        if let Some(log) = &self.log {
            log(&message());
        }
    }

    /// Resolve `time` and check it against the causal floor without moving it.
    fn check_time(&self, time: Option<Millis>) -> Result<Millis, MidiOutError> {
        let time = time.unwrap_or_else(|| self.now());
        if !time.is_finite() {
            return Err(MidiOutError::InvalidTime(time.to_string()));
        }
        if time < self.last_time {
            return Err(MidiOutError::CausalViolation {
                time,
                last: self.last_time,
            });
        }
        Ok(time)
    }

    /// Start a note at `hz`, at `time` or now.
    pub fn note_on(
        &mut self,
        hz: f64,
        velocity: Option<u8>,
        time: Option<Millis>,
    ) -> Result<NoteOffHandle, MidiOutError> {
        if self.sink.is_none() || self.voices.is_empty() {
            return Ok(NoteOffHandle::noop());
        }
        let time = self.check_time(time)?;
        let mapping = map_frequency(hz)?;
        self.last_time = time;
        if !mapping.in_midi_range() {
            warn!(hz, note = mapping.note, "frequency outside MIDI note range");
            return Ok(NoteOffHandle::noop());
        }
        let note = mapping.note as u8;
        let Some(allocation) = self.voices.allocate(mapping.cents) else {
            return Ok(NoteOffHandle::noop());
        };
        let voice = allocation.voice();
        let Some(channel) = self.voices.voice(voice).map(|v| v.channel()) else {
            return Ok(NoteOffHandle::noop());
        };

        match allocation {
            Allocation::Reused(_) => {
                debug!(channel, cents = mapping.cents, "reusing channel");
                self.emit(|| {
                    format!("reusing channel {channel} at {:+.3} cents", mapping.cents)
                });
            }
            Allocation::Stolen { previous, .. } => {
                debug!(channel, cents = mapping.cents, ?previous, "retuning channel");
            }
        }

        let bend = mapping.cents / (self.bend_range as f64 * 100.0);
        let velocity = velocity.unwrap_or(DEFAULT_VELOCITY).min(127);
        debug!(hz, note, channel, bend, velocity, time, "note on");
        self.emit(|| {
            format!(
                "note on {hz:.3}Hz -> note {note} {:+.3} cents, \
                 channel {channel}, bend {bend:.5}, at {time:.1}ms",
                mapping.cents
            )
        });

        if let Some(sink) = self.sink.as_mut() {
            sink.set_pitch_bend(channel, bend, time);
            sink.note_on(channel, note, velocity, time);
        }

        Ok(NoteOffHandle {
            sounding: Some(SoundingNote {
                voice,
                channel,
                note,
            }),
        })
    }

    /// End a note started by [`MidiOut::note_on`], at `time` or now.
    pub fn note_off(
        &mut self,
        handle: &NoteOffHandle,
        velocity: Option<u8>,
        time: Option<Millis>,
    ) -> Result<(), MidiOutError> {
        let Some(sounding) = handle.sounding else {
            return Ok(());
        };
        if self.sink.is_none() {
            return Ok(());
        }
        let time = self.check_time(time)?;
        self.last_time = time;
        let velocity = velocity.unwrap_or(DEFAULT_VELOCITY).min(127);
        self.voices.expire(sounding.voice);
        debug!(
            channel = sounding.channel,
            note = sounding.note,
            time,
            "note off"
        );
        self.emit(|| {
            format!(
                "note off {} on channel {} at {time:.1}ms",
                sounding.note, sounding.channel
            )
        });
        if let Some(sink) = self.sink.as_mut() {
            sink.note_off(sounding.channel, sounding.note, velocity, time);
        }
        Ok(())
    }

    /// Cancel pending output where the sink supports it and silence all channels.
    ///
    /// The causal floor is reset to the current time.
    pub fn clear(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            sink.clear();
            sink.all_notes_off();
        }
        self.last_time = self.now();
        debug!(floor = self.last_time, "cleared output");
    }
}
