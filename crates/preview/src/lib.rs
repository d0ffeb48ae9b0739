//! Tick-accurate playback of decoded MIDI files.
//!
//! A [`Session`] turns a [`midi_file::DecodedFile`] into a beat-sorted list
//! of note messages and fires them against a clock at a fixed tempo.
//! [`spawn_player`] runs a session in its own tokio task.
//!
//! Stopping, cancelling, and completing all end with Control Change 123
//! (all notes off) on every channel.

pub mod clock;
pub mod event;
pub mod player;
pub mod session;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{load_events, PlaybackEvent};
pub use player::{
    spawn_player, PlayerCommand, PlayerError, PlayerHandle, PlayerOptions, PlayerStatus,
};
pub use session::{PlayerState, PollOutcome, Session, SessionOptions};
pub use sink::{
    all_notes_off_messages, list_output_ports, ChannelSink, MidiError, MidiPortInfo, MidiSink,
    MidirSink, RecordingSink, ALL_NOTES_OFF,
};
