//! SMF header, chunk scan, and per-track event decoding.
//!
//! The decoder favours partial recovery: unknown bytes between chunks are
//! skipped, oversized tracks are clamped to the buffer, and a track that
//! ends mid-event keeps every event decoded before the cut.

use tracing::debug;

use crate::cursor::{ByteCursor, CursorError};
use crate::event::{
    DecodedFile, DecodedTrack, Division, EventKind, FileHeader, TimeSignature, TimedEvent,
    DEFAULT_TEMPO_BPM, META_SET_TEMPO, META_TIME_SIGNATURE, META_TRACK_NAME,
};
use crate::DecodeError;

const HEADER_TAG: [u8; 4] = *b"MThd";
const TRACK_TAG: [u8; 4] = *b"MTrk";
const HEADER_LEN: u32 = 6;
/// Tag + length + 6-byte payload.
const HEADER_CHUNK_LEN: usize = 14;

/// File-wide meta state. Only the most recent value of each is kept.
#[derive(Debug, Clone, Copy)]
struct MetaState {
    tempo_bpm: f64,
    time_signature: Option<TimeSignature>,
}

/// Decode a complete Standard MIDI File.
///
/// Fails only when the header itself is unusable. Damage inside track data
/// shows up as [`DecodedTrack::truncated`] instead.
pub fn decode(bytes: &[u8]) -> crate::Result<DecodedFile> {
    let cursor = ByteCursor::new(bytes);
    let (header, body_start) = decode_header(&cursor)?;
    let ticks_per_beat = header.division.ticks_per_beat();

    let mut meta = MetaState {
        tempo_bpm: DEFAULT_TEMPO_BPM,
        time_signature: None,
    };

    let tracks: Vec<DecodedTrack> = track_chunks(bytes, body_start)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let track = decode_track(chunk, &mut meta);
            debug!(
                track = index,
                events = track.events.len(),
                truncated = track.truncated,
                "decoded track"
            );
            track
        })
        .collect();

    if usize::from(header.track_count) != tracks.len() {
        debug!(
            declared = header.track_count,
            found = tracks.len(),
            "track count differs from header"
        );
    }

    Ok(DecodedFile {
        header,
        ticks_per_beat,
        tracks,
        tempo_bpm: meta.tempo_bpm,
        time_signature: meta.time_signature,
    })
}

fn decode_header(cursor: &ByteCursor<'_>) -> crate::Result<(FileHeader, usize)> {
    match cursor.tag_at(0) {
        Some(tag) if tag == HEADER_TAG => {}
        Some(tag) => {
            return Err(DecodeError::InvalidHeader(format!(
                "expected MThd, found {:02X?}",
                tag
            )))
        }
        None => {
            return Err(DecodeError::Truncated {
                offset: 0,
                wanted: HEADER_CHUNK_LEN,
                available: cursor.len(),
            })
        }
    }

    let (length, pos) = cursor.read_u32_be(4)?;
    if length != HEADER_LEN {
        return Err(DecodeError::InvalidHeader(format!(
            "header length {length}, expected {HEADER_LEN}"
        )));
    }

    let (format, pos) = cursor.read_u16_be(pos)?;
    let (track_count, pos) = cursor.read_u16_be(pos)?;
    let (division, pos) = cursor.read_u16_be(pos)?;

    if format > 2 {
        return Err(DecodeError::InvalidHeader(format!(
            "unsupported format {format}"
        )));
    }

    let division = Division::from_raw(division);
    if let Division::Smpte(raw) = division {
        debug!(raw, "SMPTE division, using fallback ticks per beat");
    }

    Ok((
        FileHeader {
            format,
            track_count,
            division,
        },
        pos,
    ))
}

/// Locate every `MTrk` chunk body from `start` onwards.
///
/// Bytes that do not begin a track tag are skipped one at a time. A body
/// whose declared length runs past the buffer is clamped to the buffer end.
fn track_chunks(bytes: &[u8], start: usize) -> Vec<&[u8]> {
    let cursor = ByteCursor::new(bytes);
    let mut chunks = Vec::new();
    let mut index = start;
    let mut skipped = 0usize;

    while index.saturating_add(8) <= bytes.len() {
        if cursor.tag_at(index) != Some(TRACK_TAG) {
            index += 1;
            skipped += 1;
            continue;
        }

        let Ok((declared, body_start)) = cursor.read_u32_be(index + 4) else {
            break;
        };
        let declared = usize::try_from(declared).unwrap_or(usize::MAX);
        let end = body_start.saturating_add(declared).min(bytes.len());
        if end - body_start < declared {
            debug!(
                offset = index,
                declared,
                available = end - body_start,
                "clamping track to end of buffer"
            );
        }

        chunks.push(&bytes[body_start..end]);
        index = end;
    }

    if skipped > 0 {
        debug!(skipped, "skipped bytes outside track chunks");
    }

    chunks
}

fn decode_track(data: &[u8], meta: &mut MetaState) -> DecodedTrack {
    let mut decoder = TrackDecoder {
        cursor: ByteCursor::new(data),
        tick: 0,
        running_status: None,
        track: DecodedTrack::default(),
    };

    let mut pos = 0;
    while pos < decoder.cursor.len() {
        match decoder.step(pos, meta) {
            Ok(next) => pos = next,
            Err(err) => {
                debug!(%err, events = decoder.track.events.len(), "track truncated");
                decoder.track.truncated = true;
                break;
            }
        }
    }

    decoder.track
}

struct TrackDecoder<'a> {
    cursor: ByteCursor<'a>,
    tick: u64,
    /// Last channel-message status byte (< 0xF0).
    running_status: Option<u8>,
    track: DecodedTrack,
}

impl TrackDecoder<'_> {
    /// Decode one delta-time + event starting at `pos`; returns the next position.
    fn step(&mut self, pos: usize, meta: &mut MetaState) -> Result<usize, CursorError> {
        let (delta, pos) = self.cursor.read_vlq(pos)?;
        self.tick = self.tick.saturating_add(delta);

        let (byte, after) = self.cursor.read_u8(pos)?;
        let (status, pos) = if byte & 0x80 == 0 {
            match self.running_status {
                Some(status) => (status, pos),
                None => {
                    debug!(offset = pos, "data byte without running status, resyncing");
                    return Ok(after);
                }
            }
        } else {
            if byte < 0xF0 {
                self.running_status = Some(byte);
            }
            (byte, after)
        };

        let channel = status & 0x0F;
        let (kind, next) = match status & 0xF0 {
            0x80 => {
                let ([note, velocity], next) = self.two(pos)?;
                (
                    EventKind::NoteOff {
                        channel,
                        note,
                        velocity,
                    },
                    next,
                )
            }
            0x90 => {
                let ([note, velocity], next) = self.two(pos)?;
                (
                    EventKind::NoteOn {
                        channel,
                        note,
                        velocity,
                    },
                    next,
                )
            }
            0xA0 => {
                let ([note, pressure], next) = self.two(pos)?;
                (
                    EventKind::PolyAftertouch {
                        channel,
                        note,
                        pressure,
                    },
                    next,
                )
            }
            0xB0 => {
                let ([controller, value], next) = self.two(pos)?;
                (
                    EventKind::ControlChange {
                        channel,
                        controller,
                        value,
                    },
                    next,
                )
            }
            0xC0 => {
                let (program, next) = self.cursor.read_u8(pos)?;
                (EventKind::ProgramChange { channel, program }, next)
            }
            0xD0 => {
                let (pressure, next) = self.cursor.read_u8(pos)?;
                (EventKind::ChannelPressure { channel, pressure }, next)
            }
            0xE0 => {
                let ([lsb, msb], next) = self.two(pos)?;
                let value = u16::from(lsb & 0x7F) | (u16::from(msb & 0x7F) << 7);
                (EventKind::PitchBend { channel, value }, next)
            }
            _ => match status {
                0xFF => self.meta_event(pos, meta)?,
                0xF0 | 0xF7 => self.sysex(pos),
                _ => {
                    debug!(status, offset = pos, "unrecognized status, skipping one byte");
                    return Ok(pos + 1);
                }
            },
        };

        self.track.events.push(TimedEvent {
            tick: self.tick,
            kind,
        });
        Ok(next)
    }

    fn two(&self, pos: usize) -> Result<([u8; 2], usize), CursorError> {
        let (bytes, next) = self.cursor.bytes(pos, 2)?;
        Ok(([bytes[0], bytes[1]], next))
    }

    fn meta_event(
        &mut self,
        pos: usize,
        meta: &mut MetaState,
    ) -> Result<(EventKind, usize), CursorError> {
        let (meta_type, pos) = self.cursor.read_u8(pos)?;
        let (length, pos) = self.cursor.read_vlq(pos)?;
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        let (payload, next) = self.cursor.bytes(pos, length)?;

        match (meta_type, payload.len()) {
            (META_SET_TEMPO, 3) => {
                let micros = u32::from_be_bytes([0, payload[0], payload[1], payload[2]]);
                if micros > 0 {
                    meta.tempo_bpm = 60_000_000.0 / f64::from(micros);
                    debug!(tick = self.tick, bpm = meta.tempo_bpm, "set tempo");
                }
            }
            (META_TIME_SIGNATURE, 4) => {
                if let Some(denominator) = 1u32.checked_shl(u32::from(payload[1])) {
                    meta.time_signature = Some(TimeSignature {
                        numerator: payload[0],
                        denominator,
                    });
                }
            }
            (META_TRACK_NAME, _) if self.track.name.is_none() => {
                self.track.name = Some(String::from_utf8_lossy(payload).into_owned());
            }
            _ => {}
        }

        Ok((
            EventKind::Meta {
                meta_type,
                payload: payload.to_vec(),
            },
            next,
        ))
    }

    /// Skip to and including the next 0xF7, or to the end of the track.
    fn sysex(&self, pos: usize) -> (EventKind, usize) {
        let (rest, _) = self
            .cursor
            .bytes(pos, self.cursor.len().saturating_sub(pos))
            .unwrap_or((&[], pos));
        match rest.iter().position(|&b| b == 0xF7) {
            Some(end) => (
                EventKind::SysEx {
                    payload: rest[..end].to_vec(),
                },
                pos + end + 1,
            ),
            None => (
                EventKind::SysEx {
                    payload: rest.to_vec(),
                },
                pos + rest.len(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
        let mut out = b"MThd".to_vec();
        out.extend_from_slice(&6u32.to_be_bytes());
        out.extend_from_slice(&format.to_be_bytes());
        out.extend_from_slice(&tracks.to_be_bytes());
        out.extend_from_slice(&division.to_be_bytes());
        out
    }

    fn track(body: &[u8]) -> Vec<u8> {
        let mut out = b"MTrk".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn meta_state() -> MetaState {
        MetaState {
            tempo_bpm: DEFAULT_TEMPO_BPM,
            time_signature: None,
        }
    }

    #[test]
    fn header_fields() {
        let bytes = header(1, 3, 960);
        let (h, pos) = decode_header(&ByteCursor::new(&bytes)).unwrap();
        assert_eq!(h.format, 1);
        assert_eq!(h.track_count, 3);
        assert_eq!(h.division, Division::TicksPerBeat(960));
        assert_eq!(pos, 14);
    }

    #[test]
    fn header_wrong_tag_is_invalid() {
        let mut bytes = header(0, 1, 480);
        bytes[0] = b'X';
        assert!(matches!(
            decode_header(&ByteCursor::new(&bytes)),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn header_wrong_length_is_invalid() {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&8u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 1, 1, 0xE0, 0, 0]);
        assert!(matches!(
            decode_header(&ByteCursor::new(&bytes)),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn header_format_above_two_is_invalid() {
        let bytes = header(3, 1, 480);
        assert!(matches!(
            decode_header(&ByteCursor::new(&bytes)),
            Err(DecodeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn short_header_is_truncated() {
        let bytes = header(0, 1, 480);
        for len in [0, 3, 4, 7, 10, 13] {
            assert!(
                matches!(
                    decode_header(&ByteCursor::new(&bytes[..len])),
                    Err(DecodeError::Truncated { .. })
                ),
                "len {len}"
            );
        }
    }

    #[test]
    fn chunk_scan_skips_padding_and_clamps() {
        let mut bytes = header(1, 2, 480);
        bytes.extend_from_slice(&[0x00, 0x00, 0xAA]);
        bytes.extend(track(&[0x00, 0xFF, 0x2F, 0x00]));
        // declared length 100 but only 4 bytes remain
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x90, 0x3C, 0x40]);

        let chunks = track_chunks(&bytes, 14);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], &[0x00, 0xFF, 0x2F, 0x00][..]);
        assert_eq!(chunks[1], &[0x00, 0x90, 0x3C, 0x40][..]);
    }

    #[test]
    fn running_status_reuses_previous_channel_status() {
        let body = [0x00, 0x91, 60, 100, 0x60, 64, 90];
        let mut meta = meta_state();
        let decoded = decode_track(&body, &mut meta);
        assert_eq!(
            decoded.events,
            vec![
                TimedEvent {
                    tick: 0,
                    kind: EventKind::NoteOn {
                        channel: 1,
                        note: 60,
                        velocity: 100
                    }
                },
                TimedEvent {
                    tick: 0x60,
                    kind: EventKind::NoteOn {
                        channel: 1,
                        note: 64,
                        velocity: 90
                    }
                },
            ]
        );
        assert!(!decoded.truncated);
    }

    #[test]
    fn meta_and_sysex_do_not_replace_running_status() {
        let body = [
            0x00, 0x90, 60, 100, // note on
            0x00, 0xF0, 0x7E, 0x7F, 0xF7, // sysex
            0x00, 0xFF, 0x01, 0x02, b'h', b'i', // text meta
            0x10, 62, 100, // running status note on
        ];
        let decoded = decode_track(&body, &mut meta_state());
        assert_eq!(decoded.events.len(), 4);
        assert_eq!(
            decoded.events[1].kind,
            EventKind::SysEx {
                payload: vec![0x7E, 0x7F]
            }
        );
        assert_eq!(
            decoded.events[3],
            TimedEvent {
                tick: 0x10,
                kind: EventKind::NoteOn {
                    channel: 0,
                    note: 62,
                    velocity: 100
                }
            }
        );
    }

    #[test]
    fn channel_messages_of_every_width() {
        let body = [
            0x00, 0xA2, 60, 30, // poly aftertouch
            0x00, 0xB2, 7, 100, // control change
            0x00, 0xC2, 5, // program change
            0x00, 0xD2, 44, // channel pressure
            0x00, 0xE2, 0x00, 0x40, // pitch bend centre
        ];
        let decoded = decode_track(&body, &mut meta_state());
        let kinds: Vec<_> = decoded.events.into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PolyAftertouch {
                    channel: 2,
                    note: 60,
                    pressure: 30
                },
                EventKind::ControlChange {
                    channel: 2,
                    controller: 7,
                    value: 100
                },
                EventKind::ProgramChange {
                    channel: 2,
                    program: 5
                },
                EventKind::ChannelPressure {
                    channel: 2,
                    pressure: 44
                },
                EventKind::PitchBend {
                    channel: 2,
                    value: 8192
                },
            ]
        );
    }

    #[test]
    fn tempo_and_time_signature_meta() {
        let body = [
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 us = 120 bpm
            0x00, 0xFF, 0x58, 0x04, 0x06, 0x03, 0x18, 0x08, // 6/8
            0x00, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40, // 1000000 us = 60 bpm
        ];
        let mut meta = meta_state();
        decode_track(&body, &mut meta);
        assert_eq!(meta.tempo_bpm, 60.0);
        assert_eq!(
            meta.time_signature,
            Some(TimeSignature {
                numerator: 6,
                denominator: 8
            })
        );
    }

    #[test]
    fn malformed_tempo_lengths_are_ignored() {
        let body = [
            0x00, 0xFF, 0x51, 0x02, 0x07, 0xA1, // wrong length
            0x00, 0xFF, 0x51, 0x03, 0x00, 0x00, 0x00, // zero micros
        ];
        let mut meta = meta_state();
        let decoded = decode_track(&body, &mut meta);
        assert_eq!(meta.tempo_bpm, DEFAULT_TEMPO_BPM);
        assert_eq!(decoded.events.len(), 2);
    }

    #[test]
    fn first_track_name_is_kept() {
        let body = [
            0x00, 0xFF, 0x03, 0x04, b'L', b'e', b'a', b'd', //
            0x00, 0xFF, 0x03, 0x03, b'A', b'l', b't',
        ];
        let decoded = decode_track(&body, &mut meta_state());
        assert_eq!(decoded.name.as_deref(), Some("Lead"));
    }

    #[test]
    fn unterminated_sysex_runs_to_track_end() {
        let body = [0x00, 0xF0, 0x01, 0x02, 0x03];
        let decoded = decode_track(&body, &mut meta_state());
        assert_eq!(
            decoded.events,
            vec![TimedEvent {
                tick: 0,
                kind: EventKind::SysEx {
                    payload: vec![1, 2, 3]
                }
            }]
        );
        assert!(!decoded.truncated);
    }

    #[test]
    fn stray_data_byte_without_status_is_skipped() {
        let body = [0x00, 0x3C, 0x00, 0x90, 60, 100];
        let decoded = decode_track(&body, &mut meta_state());
        assert_eq!(decoded.events.len(), 1);
        assert!(decoded.events[0].kind.is_sounding_note_on());
    }

    #[test]
    fn unrecognized_system_status_resyncs_by_one_byte() {
        // 0xF4 is undefined; the byte after it is skipped
        let body = [0x00, 0xF4, 0x55, 0x00, 0x90, 60, 100];
        let decoded = decode_track(&body, &mut meta_state());
        assert_eq!(decoded.events.len(), 1);
    }

    #[test]
    fn truncated_note_keeps_prefix() {
        let body = [0x00, 0x90, 60, 100, 0x10, 0x90, 62];
        let decoded = decode_track(&body, &mut meta_state());
        assert!(decoded.truncated);
        assert_eq!(decoded.events.len(), 1);
    }

    #[test]
    fn meta_payload_past_track_end_is_truncated() {
        let body = [0x00, 0x90, 60, 100, 0x00, 0xFF, 0x01, 0x10, b'x'];
        let decoded = decode_track(&body, &mut meta_state());
        assert!(decoded.truncated);
        assert_eq!(decoded.events.len(), 1);
    }

    #[test]
    fn ticks_accumulate_monotonically() {
        let body = [
            0x00, 0x90, 60, 100, //
            0x83, 0x60, 0x80, 60, 0, // +480
            0x00, 0x90, 62, 100, // +0
            0x81, 0x00, 0x80, 62, 0, // +128
        ];
        let decoded = decode_track(&body, &mut meta_state());
        let ticks: Vec<u64> = decoded.events.iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 480, 480, 608]);
    }
}
