//! Decoded SMF data model.

use serde::{Deserialize, Serialize};

/// Ticks per quarter note substituted for SMPTE-timed files.
pub const SMPTE_FALLBACK_TICKS_PER_BEAT: u16 = 480;

/// Tempo assumed until a Set Tempo meta event is seen.
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

pub const META_TRACK_NAME: u8 = 0x03;
pub const META_END_OF_TRACK: u8 = 0x2F;
pub const META_SET_TEMPO: u8 = 0x51;
pub const META_TIME_SIGNATURE: u8 = 0x58;

/// Header `division` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Division {
    /// Top bit clear: ticks per quarter note.
    TicksPerBeat(u16),
    /// Top bit set: SMPTE frames and ticks per frame, kept raw.
    Smpte(u16),
}

impl Division {
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x8000 == 0 {
            Division::TicksPerBeat(raw)
        } else {
            Division::Smpte(raw)
        }
    }

    /// Ticks per quarter note, with SMPTE and zero resolved to 480.
    pub fn ticks_per_beat(&self) -> u16 {
        match *self {
            Division::TicksPerBeat(0) | Division::Smpte(_) => SMPTE_FALLBACK_TICKS_PER_BEAT,
            Division::TicksPerBeat(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// 0, 1 or 2. Not differentiated downstream.
    pub format: u16,
    /// Declared count; the decoder does not enforce it.
    pub track_count: u16,
    pub division: Division,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    /// Already expanded from the power-of-two byte.
    pub denominator: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// Raw 14-bit value, 8192 = centre.
    PitchBend { channel: u8, value: u16 },
    Meta { meta_type: u8, payload: Vec<u8> },
    SysEx { payload: Vec<u8> },
}

impl EventKind {
    /// Note On with non-zero velocity. Velocity 0 is a Note Off.
    pub fn is_sounding_note_on(&self) -> bool {
        matches!(self, EventKind::NoteOn { velocity, .. } if *velocity > 0)
    }

    /// Status/data triple for Note On and Note Off, as found in the file.
    pub fn note_bytes(&self) -> Option<[u8; 3]> {
        match *self {
            EventKind::NoteOn {
                channel,
                note,
                velocity,
            } => Some([0x90 | (channel & 0x0F), note, velocity]),
            EventKind::NoteOff {
                channel,
                note,
                velocity,
            } => Some([0x80 | (channel & 0x0F), note, velocity]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub tick: u64,
    pub kind: EventKind,
}

/// One `MTrk` chunk. Events are non-decreasing in `tick`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTrack {
    pub name: Option<String>,
    pub events: Vec<TimedEvent>,
    /// Decoding hit the end of the track mid-event; `events` is the prefix
    /// decoded up to that point.
    pub truncated: bool,
}

impl DecodedTrack {
    pub fn end_tick(&self) -> u64 {
        self.events.last().map(|e| e.tick).unwrap_or(0)
    }
}

/// Everything the analysis and playback paths need from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedFile {
    pub header: FileHeader,
    /// Resolved once from the header and shared by all tracks.
    pub ticks_per_beat: u16,
    pub tracks: Vec<DecodedTrack>,
    /// Last Set Tempo seen anywhere in the file, in BPM.
    pub tempo_bpm: f64,
    /// Last Time Signature seen, if any.
    pub time_signature: Option<TimeSignature>,
}

impl DecodedFile {
    /// All events from every track, in track order.
    pub fn events(&self) -> impl Iterator<Item = &TimedEvent> {
        self.tracks.iter().flat_map(|t| t.events.iter())
    }

    pub fn is_truncated(&self) -> bool {
        self.tracks.iter().any(|t| t.truncated)
    }

    pub fn tick_to_beat(&self, tick: u64) -> f64 {
        tick as f64 / f64::from(self.ticks_per_beat)
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    /// Latest event tick in any track.
    pub fn end_tick(&self) -> u64 {
        self.tracks
            .iter()
            .map(DecodedTrack::end_tick)
            .max()
            .unwrap_or(0)
    }

    /// `tick` in seconds at the file tempo.
    pub fn tick_to_seconds(&self, tick: u64) -> f64 {
        self.tick_to_beat(tick) * self.seconds_per_beat()
    }

    /// Time of the last event, in seconds at the file tempo.
    pub fn length_seconds(&self) -> f64 {
        self.tick_to_seconds(self.end_tick())
    }
}
