#![allow(dead_code)]

use std::path::{Path, PathBuf};

use midi_file::{write_smf, TrackWriter};

pub const C_MAJOR: [u8; 8] = [60, 62, 64, 65, 67, 69, 71, 72];
pub const A_MINOR: [u8; 8] = [57, 59, 60, 62, 64, 65, 67, 69];

/// Quarter notes on channel 0 at 480 ticks per beat, tempo first.
pub fn scale_file(pitches: &[u8], bpm: f64) -> Vec<u8> {
    let mut track = TrackWriter::new().tempo_bpm(0, bpm);
    for &pitch in pitches {
        track = track.note_on(0, 0, pitch, 100).note_off(480, 0, pitch);
    }
    write_smf(0, 480, &[track.end_of_track(0).finish()])
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}
