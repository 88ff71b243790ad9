//! MIDI pitches, scientific note names and chord resolution.
//!
//! `Pitch` is a MIDI note number with C4 = 60. Names parse with sharps or
//! flats (`"G#4"`, `"Ab4"`) and print with sharps.

use core::fmt;
use core::str::FromStr;

const SHARP_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pitch(u8);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PitchParseError {
    #[error("empty note name")]
    Empty,
    #[error("unknown pitch class in note name {0:?}")]
    PitchClass(String),
    #[error("missing or invalid octave in note name {0:?}")]
    Octave(String),
    #[error("note {0:?} is outside the MIDI range")]
    Range(String),
}

impl Pitch {
    #[inline]
    pub const fn from_midi(midi: u8) -> Self { Self(midi) }

    #[inline]
    pub const fn midi(self) -> u8 { self.0 }

    /// Pitch class 0..12 (C = 0).
    #[inline]
    pub const fn pitch_class(self) -> u8 { self.0 % 12 }

    /// Scientific octave (C4 = 60 → 4).
    #[inline]
    pub fn octave(self) -> i8 { (self.0 / 12) as i8 - 1 }

    /// Shift by `semitones`, `None` when leaving 0..=127.
    #[inline]
    pub fn offset(self, semitones: i16) -> Option<Self> {
        let m = i16::from(self.0) + semitones;
        u8::try_from(m).ok().filter(|m| *m <= 127).map(Self)
    }

    /// Parse a bare pitch class (`"G#"`) at the given octave.
    pub fn from_class(class: &str, octave: i8) -> Result<Self, PitchParseError> {
        format!("{class}{octave}").parse()
    }

    /// Playback-rate ratio that re-pitches a sample rooted at `self` to `target`.
    #[inline]
    pub fn ratio_to(self, target: Pitch) -> f64 {
        let semis = f64::from(target.0) - f64::from(self.0);
        (semis / 12.0).exp2()
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SHARP_NAMES[self.pitch_class() as usize], self.octave())
    }
}

impl FromStr for Pitch {
    type Err = PitchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars.next().ok_or(PitchParseError::Empty)?;
        let base: i64 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(PitchParseError::PitchClass(s.to_string())),
        };
        let rest = chars.as_str();
        let accidental_len = rest.chars().take_while(|c| *c == '#' || *c == 'b').count();
        let (accidentals, octave) = rest.split_at(accidental_len);
        let sharps = accidentals.chars().filter(|c| *c == '#').count() as i64;
        let shift = sharps - (accidentals.len() as i64 - sharps);
        let octave: i64 = octave.parse().map_err(|_| PitchParseError::Octave(s.to_string()))?;
        let midi = octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(12))
            .and_then(|m| m.checked_add(base + shift));
        midi.and_then(|m| u8::try_from(m).ok())
            .filter(|m| *m <= 127)
            .map(Pitch)
            .ok_or_else(|| PitchParseError::Range(s.to_string()))
    }
}

/// Chord qualities the schedulers can resolve. Only the minor seventh is used
/// by the pieces, but the resolution is table driven.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChordQuality {
    MinorSeventh,
}

impl ChordQuality {
    #[inline]
    pub const fn intervals(self) -> &'static [i16] {
        match self {
            ChordQuality::MinorSeventh => &[0, 3, 7, 10],
        }
    }

    /// Chord tones above `tonic`, lowest first. Tones past MIDI 127 are dropped.
    pub fn notes(self, tonic: Pitch) -> Vec<Pitch> {
        self.intervals().iter().filter_map(|i| tonic.offset(*i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Pitch {
        s.parse().unwrap()
    }

    #[test]
    fn parses_naturals_sharps_and_flats() {
        assert_eq!(p("C4").midi(), 60);
        assert_eq!(p("A4").midi(), 69);
        assert_eq!(p("G#4"), p("Ab4"));
        assert_eq!(p("F5").midi(), 77);
        assert_eq!(p("C-1").midi(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!("".parse::<Pitch>(), Err(PitchParseError::Empty));
        assert!(matches!("H4".parse::<Pitch>(), Err(PitchParseError::PitchClass(_))));
        assert!(matches!("F".parse::<Pitch>(), Err(PitchParseError::Octave(_))));
        assert_eq!(p("G9").midi(), 127);
        assert!(matches!("A9".parse::<Pitch>(), Err(PitchParseError::Range(_))));
    }

    #[test]
    fn huge_octaves_and_accidental_runs_are_out_of_range() {
        for name in ["C3000", "C300", "C-3000", "C9223372036854775807", "C-9223372036854775808"] {
            assert!(matches!(name.parse::<Pitch>(), Err(PitchParseError::Range(_))), "{name}");
        }
        let flats = format!("C{}4", "b".repeat(40_000));
        assert!(matches!(flats.parse::<Pitch>(), Err(PitchParseError::Range(_))));
        assert_eq!(p("B#3").midi(), 60);
    }

    #[test]
    fn displays_with_sharps() {
        assert_eq!(p("Bb3").to_string(), "A#3");
        assert_eq!(Pitch::from_class("G#", 5).unwrap().to_string(), "G#5");
    }

    #[test]
    fn minor_seventh_on_f4() {
        let names: Vec<String> = ChordQuality::MinorSeventh.notes(p("F4")).iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["F4", "G#4", "C5", "D#5"]);
    }

    #[test]
    fn octave_ratio_is_two() {
        assert!((p("A3").ratio_to(p("A4")) - 2.0).abs() < 1e-12);
        assert!((p("A4").ratio_to(p("A3")) - 0.5).abs() < 1e-12);
    }
}
