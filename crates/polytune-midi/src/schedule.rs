//! Batch scheduling of notes into one causal on/off timeline.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::MidiOutError;
use crate::out::{MidiOut, NoteOffHandle};
use crate::sink::OutputSink;
use crate::Millis;

/// Start time of a note.
///
/// Parses from `"+250"` (relative to now) or `"1200.5"` (absolute), and
/// deserializes from either such a string or a bare number (absolute).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    Absolute(Millis),
    /// Offset from the batch's shared "now".
    Relative(Millis),
}

impl TimeSpec {
    pub fn now() -> Self {
        TimeSpec::Relative(0.0)
    }

    pub fn resolve(&self, now: Millis) -> Millis {
        match *self {
            TimeSpec::Absolute(time) => time,
            TimeSpec::Relative(offset) => now + offset,
        }
    }
}

impl Default for TimeSpec {
    fn default() -> Self {
        TimeSpec::now()
    }
}

impl FromStr for TimeSpec {
    type Err = MidiOutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (relative, digits) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let value: f64 = digits
            .parse()
            .map_err(|_| MidiOutError::InvalidTime(s.to_string()))?;
        if !value.is_finite() || (relative && digits.starts_with(['+', '-'])) {
            return Err(MidiOutError::InvalidTime(s.to_string()));
        }
        Ok(if relative {
            TimeSpec::Relative(value)
        } else {
            TimeSpec::Absolute(value)
        })
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::Absolute(time) => write!(f, "{time}"),
            TimeSpec::Relative(offset) => write!(f, "+{offset}"),
        }
    }
}

impl From<Millis> for TimeSpec {
    fn from(time: Millis) -> Self {
        TimeSpec::Absolute(time)
    }
}

impl Serialize for TimeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeSpec::Absolute(time) => serializer.serialize_f64(*time),
            TimeSpec::Relative(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for TimeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(time) => Ok(TimeSpec::Absolute(time)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// One note to play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub frequency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<u8>,
    #[serde(default)]
    pub time: TimeSpec,
    /// Length in milliseconds.
    pub duration: Millis,
}

impl Note {
    pub fn new(frequency: f64, time: TimeSpec, duration: Millis) -> Self {
        Self {
            frequency,
            attack: None,
            release: None,
            time,
            duration,
        }
    }

    pub fn velocities(mut self, attack: u8, release: u8) -> Self {
        self.attack = Some(attack);
        self.release = Some(release);
        self
    }
}

/// Note of a timed score, offsets in milliseconds from the start of playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreNote {
    pub frequency: f64,
    pub start_ms: Millis,
    pub end_ms: Millis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score {
    pub notes: Vec<ScoreNote>,
}

impl Score {
    /// Convert to notes timed relative to the moment they are played.
    pub fn to_notes(&self) -> Result<Vec<Note>, MidiOutError> {
        self.notes
            .iter()
            .map(|n| {
                let duration = n.end_ms - n.start_ms;
                if duration.is_nan() || duration < 0.0 {
                    return Err(MidiOutError::InvalidDuration(duration));
                }
                Ok(Note::new(
                    n.frequency,
                    TimeSpec::Relative(n.start_ms),
                    duration,
                ))
            })
            .collect()
    }

    /// Offset of the last note end.
    pub fn length_ms(&self) -> Millis {
        self.notes.iter().map(|n| n.end_ms).fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ScheduledEvent {
    On {
        time: Millis,
        note: usize,
        frequency: f64,
        velocity: Option<u8>,
    },
    Off {
        time: Millis,
        start: Millis,
        note: usize,
        velocity: Option<u8>,
    },
}

impl ScheduledEvent {
    fn time(&self) -> Millis {
        match *self {
            ScheduledEvent::On { time, .. } | ScheduledEvent::Off { time, .. } => time,
        }
    }

    /// Order among events sharing a timestamp: offs of notes that started
    /// earlier, then ons, then offs of notes starting at that same instant.
    fn rank(&self) -> u8 {
        match *self {
            ScheduledEvent::Off { time, start, .. } if start < time => 0,
            ScheduledEvent::On { .. } => 1,
            ScheduledEvent::Off { .. } => 2,
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.time()
            .total_cmp(&other.time())
            .then_with(|| self.rank().cmp(&other.rank()))
    }
}

fn expand(notes: &[Note], now: Millis) -> Result<Vec<ScheduledEvent>, MidiOutError> {
    let mut events = Vec::with_capacity(notes.len() * 2);
    for (index, note) in notes.iter().enumerate() {
        if !note.frequency.is_finite() || note.frequency <= 0.0 {
            return Err(MidiOutError::InvalidFrequency(note.frequency));
        }
        if !note.duration.is_finite() || note.duration < 0.0 {
            return Err(MidiOutError::InvalidDuration(note.duration));
        }
        let start = note.time.resolve(now);
        if !start.is_finite() {
            return Err(MidiOutError::InvalidTime(note.time.to_string()));
        }
        events.push(ScheduledEvent::On {
            time: start,
            note: index,
            frequency: note.frequency,
            velocity: note.attack,
        });
        events.push(ScheduledEvent::Off {
            time: start + note.duration,
            start,
            note: index,
            velocity: note.release,
        });
    }
    events.sort_by(ScheduledEvent::order);
    Ok(events)
}

impl<S: OutputSink> MidiOut<S> {
    /// Play a batch of notes.
    ///
    /// Relative start times share one "now" captured at the start of the
    /// call. The whole batch is validated before anything is sent; a causal
    /// violation part way through stops dispatch at the offending event.
    pub fn play_notes(&mut self, notes: &[Note]) -> Result<(), MidiOutError> {
        let now = self.now();
        let events = expand(notes, now)?;
        debug!(
            notes = notes.len(),
            events = events.len(),
            now,
            "dispatching batch"
        );

        let mut handles = vec![NoteOffHandle::noop(); notes.len()];
        for event in events {
            match event {
                ScheduledEvent::On {
                    time,
                    note,
                    frequency,
                    velocity,
                } => {
                    handles[note] = self.note_on(frequency, velocity, Some(time))?;
                }
                ScheduledEvent::Off {
                    time,
                    note,
                    velocity,
                    ..
                } => {
                    let handle = std::mem::take(&mut handles[note]);
                    self.note_off(&handle, velocity, Some(time))?;
                }
            }
        }
        Ok(())
    }

    /// Play a score starting now.
    pub fn play_score(&mut self, score: &Score) -> Result<(), MidiOutError> {
        let notes = score.to_notes()?;
        self.play_notes(&notes)
    }
}
