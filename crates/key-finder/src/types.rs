use midi_file::TimeSignature;
use serde::{Deserialize, Serialize};

use crate::harmony::{KeyChange, NoteStatistics};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Octave-independent note identity, always in `0..12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PitchClass(u8);

impl PitchClass {
    pub const C: PitchClass = PitchClass(0);

    /// Reduces `value` mod 12.
    pub fn new(value: u8) -> Self {
        PitchClass(value % 12)
    }

    pub fn from_note(note: u8) -> Self {
        Self::new(note)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[usize::from(self.0)]
    }

    /// Shift upwards by `semitones`, wrapping at the octave.
    pub fn transpose(self, semitones: u8) -> Self {
        Self::new(self.0 + semitones % 12)
    }

    pub fn all() -> impl Iterator<Item = PitchClass> {
        (0..12).map(PitchClass)
    }
}

impl std::fmt::Display for PitchClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    /// Scale degrees above the root. Minor is the natural minor.
    pub fn intervals(self) -> &'static [u8; 7] {
        match self {
            KeyMode::Major => &[0, 2, 4, 5, 7, 9, 11],
            KeyMode::Minor => &[0, 2, 3, 5, 7, 8, 10],
        }
    }
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Major => write!(f, "Major"),
            KeyMode::Minor => write!(f, "Minor"),
        }
    }
}

/// One (root, mode) hypothesis and how well it matched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyCandidate {
    pub root: PitchClass,
    pub mode: KeyMode,
    /// Pearson correlation against the mode's profile, in `[-1, 1]`.
    pub correlation: f64,
    /// `(correlation + 1) / 2`, clamped to `[0, 1]`.
    pub confidence: f64,
}

impl KeyCandidate {
    pub fn new(root: PitchClass, mode: KeyMode, correlation: f64) -> Self {
        Self {
            root,
            mode,
            correlation,
            confidence: confidence_from_correlation(correlation),
        }
    }

    pub fn key_name(&self) -> String {
        format!("{} {}", self.root, self.mode)
    }
}

pub fn confidence_from_correlation(correlation: f64) -> f64 {
    ((correlation + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Analysis of one file. Produced once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub root: PitchClass,
    pub mode: KeyMode,
    pub confidence: f64,
    pub tempo_bpm: f64,
    /// Sounding note count scaled by seconds per tick; not the span between
    /// the first and last event.
    pub duration_seconds: f64,
    pub note_count: usize,
    pub time_signature: Option<TimeSignature>,
    /// Runner-up keys, best first. Never contains the primary key.
    #[serde(default)]
    pub alternatives: Vec<KeyCandidate>,
    /// Windows where the key moved away from the window before, in time
    /// order. Empty for files of eight seconds or less.
    #[serde(default)]
    pub key_changes: Vec<KeyChange>,
    /// Chord names per one-second window, consecutive repeats collapsed.
    #[serde(default)]
    pub chord_progression: Vec<String>,
    #[serde(default)]
    pub note_stats: NoteStatistics,
}

impl AnalysisResult {
    /// E.g. `"A Minor"`.
    pub fn key_name(&self) -> String {
        format!("{} {}", self.root, self.mode)
    }

    /// Whether `note` (any octave) belongs to the detected scale.
    pub fn contains_note(&self, note: u8) -> bool {
        let offset = (note % 12 + 12 - self.root.value()) % 12;
        self.mode.intervals().contains(&offset)
    }

    /// Pitch classes of the detected scale, starting at the root.
    pub fn scale(&self) -> Vec<PitchClass> {
        self.mode
            .intervals()
            .iter()
            .map(|&i| self.root.transpose(i))
            .collect()
    }
}
