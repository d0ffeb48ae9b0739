use midi_file::DecodedFile;
use serde::{Deserialize, Serialize};

/// A note message placed in tempo-independent musical time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    /// Quarter notes from the start of the file.
    pub beat: f64,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl PlaybackEvent {
    pub fn bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

/// Flatten every Note On/Off across all tracks, sorted by beat.
///
/// The sort is stable, so events sharing a beat keep their track order.
pub fn load_events(file: &DecodedFile) -> Vec<PlaybackEvent> {
    let mut events: Vec<PlaybackEvent> = file
        .events()
        .filter_map(|event| {
            let [status, data1, data2] = event.kind.note_bytes()?;
            Some(PlaybackEvent {
                beat: file.tick_to_beat(event.tick),
                status,
                data1,
                data2,
            })
        })
        .collect();
    events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
    events
}
