//! Key and scale detection for Standard MIDI Files.
//!
//! Reduces a [`midi_file::DecodedFile`] to a pitch-class histogram and
//! classifies it by correlating against the Krumhansl-Kessler major and
//! minor profiles at all twelve roots.
//!
//! ```
//! use key_finder::{HeuristicAnalyzer, KeyMode, MusicAnalyzer};
//! use midi_file::{write_smf, TrackWriter};
//!
//! let mut track = TrackWriter::new().tempo_bpm(0, 120.0);
//! for pitch in [60, 62, 64, 65, 67, 69, 71, 72] {
//!     track = track.note_on(0, 0, pitch, 100).note_off(480, 0, pitch);
//! }
//! let bytes = write_smf(0, 480, &[track.finish()]);
//!
//! let result = HeuristicAnalyzer::new().analyze_bytes(&bytes).unwrap();
//! assert_eq!(result.key_name(), "C Major");
//! assert_eq!(result.mode, KeyMode::Major);
//! ```

pub mod analyzer;
pub mod harmony;
pub mod histogram;
pub mod key;
pub mod scan;
pub mod store;
pub mod types;

pub use analyzer::{HeuristicAnalyzer, MusicAnalyzer};
pub use harmony::{KeyChange, NoteStatistics, NoteTimeline};
pub use histogram::PitchClassHistogram;
pub use key::{detect_key, pearson, KeyDetection, MAJOR_PROFILE, MINOR_PROFILE};
pub use scan::{
    discover_midi_files, scan_files, spawn_scan, FileAnalysis, ScanContext, ScanEvent,
    ScanFailure, ScanOptions, ScanReport,
};
pub use store::{AnalysisStore, MemoryStore};
pub use types::{AnalysisResult, KeyCandidate, KeyMode, PitchClass};

use std::path::PathBuf;

use midi_file::DecodeError;

/// Per-file analysis failure. Never fatal to a batch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to decode: {0}")]
    Decode(#[from] DecodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
