//! Standard MIDI File decoding.
//!
//! The decoder is the single source of truth for event data: analysis and
//! playback both consume [`DecodedFile`] and never look at raw bytes.
//!
//! ```
//! let bytes = [
//!     b'M', b'T', b'h', b'd', 0, 0, 0, 6, 0, 0, 0, 1, 0x01, 0xE0,
//!     b'M', b'T', b'r', b'k', 0, 0, 0, 4, 0x00, 0x90, 60, 100,
//! ];
//! let file = midi_file::decode(&bytes).unwrap();
//! assert_eq!(file.ticks_per_beat, 480);
//! assert_eq!(file.tracks[0].events.len(), 1);
//! ```

pub mod cursor;
pub mod decoder;
pub mod event;
pub mod writer;

pub use cursor::{ByteCursor, CursorError};
pub use decoder::decode;
pub use event::{
    DecodedFile, DecodedTrack, Division, EventKind, FileHeader, TimeSignature, TimedEvent,
    DEFAULT_TEMPO_BPM, SMPTE_FALLBACK_TICKS_PER_BEAT,
};
pub use writer::{encode_vlq, write_smf, TrackWriter};

/// Errors that leave a file with no usable decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated: needed {wanted} bytes at offset {offset}, buffer holds {available}")]
    Truncated {
        offset: usize,
        wanted: usize,
        available: usize,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl From<CursorError> for DecodeError {
    fn from(err: CursorError) -> Self {
        DecodeError::Truncated {
            offset: err.offset,
            wanted: err.wanted,
            available: err.available,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
