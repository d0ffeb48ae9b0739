#![allow(dead_code)]

use midi_file::{decode, write_smf, DecodedFile, TrackWriter};

/// Quarter notes on channel 0 at 480 ticks per beat, tempo first.
pub fn scale(pitches: &[u8], bpm: f64) -> DecodedFile {
    let mut track = TrackWriter::new().tempo_bpm(0, bpm);
    for &pitch in pitches {
        track = track.note_on(0, 0, pitch, 100).note_off(480, 0, pitch);
    }
    let bytes = write_smf(0, 480, &[track.end_of_track(0).finish()]);
    decode(&bytes).unwrap()
}

pub fn is_all_notes_off(message: &[u8; 3]) -> bool {
    message[0] & 0xF0 == 0xB0 && message[1] == 123 && message[2] == 0
}

pub fn notes(messages: &[[u8; 3]]) -> Vec<[u8; 3]> {
    messages
        .iter()
        .filter(|m| !is_all_notes_off(m))
        .copied()
        .collect()
}
