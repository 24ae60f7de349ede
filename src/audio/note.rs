use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// C0 in 12-TET with A4 = 440 Hz.
const C0_HZ: f32 = 16.351_598;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    const NAMES: [&'static str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    /// Semitones above C, 0..12.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wraps any index into the octave.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::NAMES
            .iter()
            .position(|&candidate| candidate == name)
            .map(Self::from_index)
            .ok_or_else(|| AnalysisError::UnknownPitchClass(s.to_string()))
    }
}

impl TryFrom<String> for PitchClass {
    type Error = AnalysisError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PitchClass> for String {
    fn from(pitch_class: PitchClass) -> Self {
        pitch_class.name().to_string()
    }
}

/// A frequency quantized to the nearest equal-tempered note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Name plus octave, e.g. "A4".
    pub label: String,
    pub pitch_class: PitchClass,
    pub octave: i32,
    pub frequency: f32,
    /// Deviation from the nearest note, -50..=50.
    pub cents: i32,
}

/// Maps a frequency to its nearest note. Returns `None` for non-positive or
/// non-finite input.
pub fn frequency_to_note(frequency: f32) -> Option<NoteEvent> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }

    let half_steps = 12.0 * (frequency / C0_HZ).log2();
    let nearest = half_steps.round();

    // Octave follows the nearest note so B→C rollovers land in the next octave.
    let octave = (nearest / 12.0).floor() as i32;
    let pitch_class = PitchClass::from_index(nearest.rem_euclid(12.0) as usize);
    let cents = ((half_steps - nearest) * 100.0).round() as i32;

    Some(NoteEvent {
        label: format!("{}{}", pitch_class, octave),
        pitch_class,
        octave,
        frequency,
        cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a440() {
        let note = frequency_to_note(440.0).unwrap();
        assert_eq!(note.pitch_class, PitchClass::A);
        assert_eq!(note.octave, 4);
        assert_eq!(note.label, "A4");
        assert_eq!(note.cents, 0);
        assert_eq!(note.frequency, 440.0);
    }

    #[test]
    fn test_middle_c_and_sharps() {
        let c4 = frequency_to_note(261.63).unwrap();
        assert_eq!(c4.label, "C4");
        assert!(c4.cents.abs() <= 1);

        let cs4 = frequency_to_note(277.18).unwrap();
        assert_eq!(cs4.label, "C#4");

        let e2 = frequency_to_note(82.41).unwrap();
        assert_eq!(e2.label, "E2");
    }

    #[test]
    fn test_cents_are_signed() {
        // A quarter tone around A4
        let sharp = frequency_to_note(446.0).unwrap();
        assert_eq!(sharp.pitch_class, PitchClass::A);
        assert!(sharp.cents > 20 && sharp.cents < 27, "got {}", sharp.cents);

        let flat = frequency_to_note(434.0).unwrap();
        assert_eq!(flat.pitch_class, PitchClass::A);
        assert!(flat.cents < -20 && flat.cents > -27, "got {}", flat.cents);

        for freq in [50.0, 123.4, 440.0, 999.9, 3000.0] {
            let note = frequency_to_note(freq).unwrap();
            assert!((-50..=50).contains(&note.cents));
        }
    }

    #[test]
    fn test_rollover_into_next_octave() {
        // Slightly flat C5 should round up to C5, not wrap to C4
        let note = frequency_to_note(520.0).unwrap();
        assert_eq!(note.pitch_class, PitchClass::C);
        assert_eq!(note.octave, 5);
        assert!(note.cents < 0);
    }

    #[test]
    fn test_rejects_invalid_frequencies() {
        assert!(frequency_to_note(0.0).is_none());
        assert!(frequency_to_note(-440.0).is_none());
        assert!(frequency_to_note(f32::NAN).is_none());
        assert!(frequency_to_note(f32::INFINITY).is_none());
    }

    #[test]
    fn test_pitch_class_parsing() {
        assert_eq!("C#".parse::<PitchClass>().unwrap(), PitchClass::CSharp);
        assert_eq!(" B ".parse::<PitchClass>().unwrap(), PitchClass::B);
        assert_eq!(
            "H".parse::<PitchClass>(),
            Err(AnalysisError::UnknownPitchClass("H".to_string()))
        );

        for pc in PitchClass::ALL {
            assert_eq!(pc.to_string().parse::<PitchClass>().unwrap(), pc);
        }
    }
}
