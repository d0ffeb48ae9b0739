use midi_file::{write_smf, TrackWriter};

/// One quarter note per pitch at 480 ticks per beat, preceded by a 120 BPM tempo.
pub fn scale_track(pitches: &[u8]) -> TrackWriter {
    let mut track = TrackWriter::new().tempo_bpm(0, 120.0);
    for &pitch in pitches {
        track = track.note_on(0, 0, pitch, 100).note_off(480, 0, pitch);
    }
    track
}

pub fn c_major_file() -> Vec<u8> {
    let track = scale_track(&[60, 62, 64, 65, 67, 69, 71, 72])
        .end_of_track(0)
        .finish();
    write_smf(0, 480, &[track])
}
