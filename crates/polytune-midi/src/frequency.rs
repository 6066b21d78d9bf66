//! Frequency to MIDI note conversion.

use crate::error::MidiOutError;

/// Frequency of the reference note.
pub const REFERENCE_HZ: f64 = 440.0;
/// MIDI note number of the reference note.
pub const REFERENCE_NOTE: i32 = 69;
/// Equal divisions per octave.
pub const STEPS_PER_OCTAVE: f64 = 12.0;

/// Nearest MIDI note for a frequency plus the residual detune.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchMapping {
    /// Nearest note number. May fall outside the 7-bit MIDI range.
    pub note: i32,
    /// Offset from `note` in cents, within (-50, 50].
    pub cents: f64,
}

impl PitchMapping {
    /// Whether the note fits in a 7-bit note number.
    pub fn in_midi_range(&self) -> bool {
        (0..128).contains(&self.note)
    }
}

/// Maps a frequency in Hz to the nearest 12-EDO note and a cents offset.
///
/// Exact quarter-tones resolve to the lower note with a +50 cent offset.
pub fn map_frequency(hz: f64) -> Result<PitchMapping, MidiOutError> {
    if !hz.is_finite() || hz <= 0.0 {
        return Err(MidiOutError::InvalidFrequency(hz));
    }
    let m = (hz / REFERENCE_HZ).log2() * STEPS_PER_OCTAVE + REFERENCE_NOTE as f64;
    let nearest = (m - 0.5).ceil();
    Ok(PitchMapping {
        note: nearest as i32,
        cents: (m - nearest) * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn concert_a_is_note_69() {
        let mapping = map_frequency(440.0).unwrap();
        assert_eq!(mapping.note, 69);
        assert_eq!(mapping.cents, 0.0);
    }

    #[test]
    fn octaves_move_by_twelve() {
        assert_eq!(map_frequency(880.0).unwrap().note, 81);
        assert_eq!(map_frequency(220.0).unwrap().note, 57);
    }

    #[test]
    fn quarter_tone_maps_to_positive_fifty() {
        let hz = 440.0 * 2f64.powf(0.5 / 12.0);
        let mapping = map_frequency(hz).unwrap();
        assert!(mapping.note == 69 || mapping.note == 70);
        assert!(mapping.cents > -50.0 && mapping.cents <= 50.0);
    }

    #[test]
    fn detuned_note_keeps_residual() {
        let hz = 440.0 * 2f64.powf(0.3 / 12.0);
        let mapping = map_frequency(hz).unwrap();
        assert_eq!(mapping.note, 69);
        assert!((mapping.cents - 30.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_frequencies() {
        assert_eq!(
            map_frequency(0.0),
            Err(MidiOutError::InvalidFrequency(0.0))
        );
        assert!(map_frequency(-10.0).is_err());
        assert!(map_frequency(f64::NAN).is_err());
    }

    #[test]
    fn reports_out_of_range_notes() {
        assert!(!map_frequency(1.0).unwrap().in_midi_range());
        assert!(!map_frequency(20_000.0).unwrap().in_midi_range());
        assert!(map_frequency(261.63).unwrap().in_midi_range());
    }

    proptest! {
        #[test]
        fn cents_stay_within_half_a_step(hz in 0.01f64..100_000.0) {
            let mapping = map_frequency(hz).unwrap();
            prop_assert!(mapping.cents > -50.0 && mapping.cents <= 50.0);
        }
    }
}
