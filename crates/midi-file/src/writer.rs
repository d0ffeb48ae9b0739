//! Minimal SMF encoder.
//!
//! Emits explicit status bytes for every event except those written with
//! [`TrackWriter::raw`], which passes bytes through untouched so running
//! status and malformed streams can be produced on purpose.

use crate::event::{META_END_OF_TRACK, META_SET_TEMPO, META_TIME_SIGNATURE, META_TRACK_NAME};

/// Append `value` as a variable-length quantity.
pub fn encode_vlq(value: u32, out: &mut Vec<u8>) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0x00 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

/// Builds the body of one `MTrk` chunk.
#[derive(Debug, Clone, Default)]
pub struct TrackWriter {
    body: Vec<u8>,
}

impl TrackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta time followed by `bytes` verbatim.
    pub fn raw(mut self, delta: u32, bytes: &[u8]) -> Self {
        encode_vlq(delta, &mut self.body);
        self.body.extend_from_slice(bytes);
        self
    }

    pub fn note_on(self, delta: u32, channel: u8, note: u8, velocity: u8) -> Self {
        self.raw(delta, &[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(self, delta: u32, channel: u8, note: u8) -> Self {
        self.raw(delta, &[0x80 | (channel & 0x0F), note & 0x7F, 0])
    }

    pub fn control_change(self, delta: u32, channel: u8, controller: u8, value: u8) -> Self {
        self.raw(delta, &[0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F])
    }

    pub fn program_change(self, delta: u32, channel: u8, program: u8) -> Self {
        self.raw(delta, &[0xC0 | (channel & 0x0F), program & 0x7F])
    }

    pub fn meta(mut self, delta: u32, meta_type: u8, payload: &[u8]) -> Self {
        encode_vlq(delta, &mut self.body);
        self.body.push(0xFF);
        self.body.push(meta_type);
        encode_vlq(payload.len() as u32, &mut self.body);
        self.body.extend_from_slice(payload);
        self
    }

    pub fn tempo_micros(self, delta: u32, micros_per_beat: u32) -> Self {
        let b = micros_per_beat.to_be_bytes();
        self.meta(delta, META_SET_TEMPO, &b[1..])
    }

    pub fn tempo_bpm(self, delta: u32, bpm: f64) -> Self {
        self.tempo_micros(delta, (60_000_000.0 / bpm).round() as u32)
    }

    /// `denominator_power` is the exponent: 2 = quarter, 3 = eighth.
    pub fn time_signature(self, delta: u32, numerator: u8, denominator_power: u8) -> Self {
        self.meta(delta, META_TIME_SIGNATURE, &[numerator, denominator_power, 24, 8])
    }

    pub fn track_name(self, delta: u32, name: &str) -> Self {
        self.meta(delta, META_TRACK_NAME, name.as_bytes())
    }

    pub fn end_of_track(self, delta: u32) -> Self {
        self.meta(delta, META_END_OF_TRACK, &[])
    }

    pub fn finish(self) -> Vec<u8> {
        self.body
    }
}

/// Wrap track bodies in a header and `MTrk` chunks.
pub fn write_smf(format: u16, division: u16, tracks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(14 + tracks.iter().map(|t| t.len() + 8).sum::<usize>());
    out.extend_from_slice(b"MThd");
    out.extend_from_slice(&6u32.to_be_bytes());
    out.extend_from_slice(&format.to_be_bytes());
    out.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    out.extend_from_slice(&division.to_be_bytes());

    for track in tracks {
        out.extend_from_slice(b"MTrk");
        out.extend_from_slice(&(track.len() as u32).to_be_bytes());
        out.extend_from_slice(track);
    }

    out
}
