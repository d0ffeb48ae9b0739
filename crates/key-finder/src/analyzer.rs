use std::path::Path;

use midi_file::DecodedFile;
use tracing::debug;

use crate::harmony::NoteTimeline;
use crate::histogram::PitchClassHistogram;
use crate::key::{detect_key, KeyDetection, DEFAULT_MIN_ALTERNATIVE_CONFIDENCE};
use crate::types::AnalysisResult;
use crate::{Error, Result};

/// Trait for key analysis backends.
///
/// Implementations only see decoded files; reading and decoding are
/// provided on top of [`MusicAnalyzer::analyze`].
pub trait MusicAnalyzer: Send + Sync {
    fn analyze(&self, file: &DecodedFile) -> AnalysisResult;

    fn analyze_bytes(&self, bytes: &[u8]) -> Result<AnalysisResult> {
        let file = midi_file::decode(bytes)?;
        Ok(self.analyze(&file))
    }

    fn analyze_path(&self, path: &Path) -> Result<AnalysisResult> {
        let bytes = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.analyze_bytes(&bytes)
    }
}

/// Krumhansl-Schmuckler key detection over a note-count histogram.
///
/// `min_alternative_confidence` gates both the runner-up keys and the
/// windowed key changes.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicAnalyzer {
    min_alternative_confidence: f64,
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self {
            min_alternative_confidence: DEFAULT_MIN_ALTERNATIVE_CONFIDENCE,
        }
    }
}

impl HeuristicAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_alternative_confidence(min_alternative_confidence: f64) -> Self {
        Self {
            min_alternative_confidence,
        }
    }

    /// Key of the notes struck between `start` and `end` seconds, both
    /// inclusive. An empty range gives [`KeyDetection::sentinel`].
    pub fn analyze_range(&self, file: &DecodedFile, start: f64, end: f64) -> KeyDetection {
        NoteTimeline::from_file(file)
            .detect_key_in_range(start, end, self.min_alternative_confidence)
            .unwrap_or_else(KeyDetection::sentinel)
    }
}

impl MusicAnalyzer for HeuristicAnalyzer {
    fn analyze(&self, file: &DecodedFile) -> AnalysisResult {
        let histogram = PitchClassHistogram::from_file(file);
        let detection = detect_key(&histogram, self.min_alternative_confidence);
        let note_count = histogram.total();
        let timeline = NoteTimeline::from_file(file);

        let result = AnalysisResult {
            root: detection.best.root,
            mode: detection.best.mode,
            confidence: detection.best.confidence,
            tempo_bpm: file.tempo_bpm,
            duration_seconds: duration_seconds(note_count, file.ticks_per_beat, file.tempo_bpm),
            note_count: note_count as usize,
            time_signature: file.time_signature,
            alternatives: detection.alternatives,
            key_changes: timeline.key_changes(self.min_alternative_confidence),
            chord_progression: timeline.chord_progression(),
            note_stats: timeline.note_statistics(),
        };

        debug!(
            key = %result.key_name(),
            confidence = result.confidence,
            notes = result.note_count,
            key_changes = result.key_changes.len(),
            chords = result.chord_progression.len(),
            "analyzed"
        );
        result
    }
}

/// Sounding note count read as ticks, converted at the file tempo.
fn duration_seconds(note_count: u64, ticks_per_beat: u16, tempo_bpm: f64) -> f64 {
    if ticks_per_beat == 0 || tempo_bpm <= 0.0 {
        return 0.0;
    }
    note_count as f64 / f64::from(ticks_per_beat) * (60.0 / tempo_bpm)
}
