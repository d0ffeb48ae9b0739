//! Single playback session.
//!
//! Synchronous and clock-free: every call that depends on time takes `now`
//! explicitly, and every call that can emit MIDI takes the sink. The async
//! player in [`crate::player`] is a thin driver around this type.

use std::time::Duration;

use midi_file::DecodedFile;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::{load_events, PlaybackEvent};
use crate::sink::{all_notes_off_messages, MidiSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Loaded,
    Playing,
    Stopped,
    Completed,
}

impl PlayerState {
    /// Nothing is playing and nothing is about to start.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PlayerState::Idle | PlayerState::Stopped | PlayerState::Completed
        )
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loaded => "loaded",
            PlayerState::Playing => "playing",
            PlayerState::Stopped => "stopped",
            PlayerState::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Half-width of the firing window around the current beat.
    pub tolerance_beats: f64,
    /// Beats of silence after the last event before completing.
    pub completion_tail_beats: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            tolerance_beats: 0.01,
            completion_tail_beats: 1.0,
        }
    }
}

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub fired: usize,
    /// Events whose window passed between two polls.
    pub missed: usize,
    pub completed: bool,
}

#[derive(Debug)]
pub struct Session {
    options: SessionOptions,
    state: PlayerState,
    events: Vec<PlaybackEvent>,
    file_tempo_bpm: f64,
    tempo_bpm: f64,
    started_at: Duration,
    /// Index of the first event not yet fired or dropped.
    cursor: usize,
    position_beats: f64,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: PlayerState::Idle,
            events: Vec::new(),
            file_tempo_bpm: midi_file::DEFAULT_TEMPO_BPM,
            tempo_bpm: midi_file::DEFAULT_TEMPO_BPM,
            started_at: Duration::ZERO,
            cursor: 0,
            position_beats: 0.0,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn position_beats(&self) -> f64 {
        self.position_beats
    }

    /// Effective tempo of the current or last run.
    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn events(&self) -> &[PlaybackEvent] {
        &self.events
    }

    /// Replace the loaded events. A running session is stopped first.
    ///
    /// Returns `false`, leaving the session `Idle`, when the file has no
    /// note events.
    pub fn load(&mut self, file: &DecodedFile, sink: &mut dyn MidiSink) -> bool {
        if self.is_playing() {
            self.stop(sink);
        }

        self.events = load_events(file);
        self.file_tempo_bpm = file.tempo_bpm;
        self.tempo_bpm = file.tempo_bpm;
        self.cursor = 0;
        self.position_beats = 0.0;

        if self.events.is_empty() {
            debug!("nothing to play");
            self.state = PlayerState::Idle;
            return false;
        }

        info!(
            events = self.events.len(),
            tempo_bpm = self.file_tempo_bpm,
            "playback loaded"
        );
        self.state = PlayerState::Loaded;
        true
    }

    /// Decode and load. Undecodable input leaves the session `Idle`.
    pub fn load_bytes(&mut self, bytes: &[u8], sink: &mut dyn MidiSink) -> bool {
        match midi_file::decode(bytes) {
            Ok(file) => self.load(&file, sink),
            Err(err) => {
                debug!(%err, "playback load failed");
                if self.is_playing() {
                    self.stop(sink);
                }
                self.events.clear();
                self.state = PlayerState::Idle;
                false
            }
        }
    }

    /// Start from beat 0 at `tempo_override`, or the file tempo when `None`.
    ///
    /// A running session is stopped first. Returns `false` when nothing is
    /// loaded.
    pub fn play(
        &mut self,
        now: Duration,
        tempo_override: Option<f64>,
        sink: &mut dyn MidiSink,
    ) -> bool {
        if self.is_playing() {
            self.stop(sink);
        }
        if self.state == PlayerState::Idle || self.events.is_empty() {
            debug!("play ignored, nothing loaded");
            return false;
        }

        self.tempo_bpm = match tempo_override {
            Some(bpm) if bpm.is_finite() && bpm > 0.0 => bpm,
            Some(bpm) => {
                warn!(bpm, "ignoring invalid tempo override");
                self.file_tempo_bpm
            }
            None => self.file_tempo_bpm,
        };
        self.started_at = now;
        self.cursor = 0;
        self.position_beats = 0.0;
        self.state = PlayerState::Playing;

        info!(tempo_bpm = self.tempo_bpm, "playback started");
        true
    }

    /// Halt and silence all 16 channels. Always sends the all-notes-off
    /// burst, even when nothing was playing.
    ///
    /// Returns the state left behind: `Stopped` when playback was running,
    /// otherwise the unchanged state (e.g. `Completed` when the last poll
    /// already finished).
    pub fn stop(&mut self, sink: &mut dyn MidiSink) -> PlayerState {
        if self.is_playing() {
            self.state = PlayerState::Stopped;
            info!(position_beats = self.position_beats, "playback stopped");
        }
        silence(sink);
        self.state
    }

    /// One scheduler tick.
    ///
    /// Fires every pending event with `beat` in `[elapsed - tol, elapsed + tol)`.
    /// Each event fires at most once; one whose window ended before this
    /// poll is dropped.
    pub fn poll(&mut self, now: Duration, sink: &mut dyn MidiSink) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        if !self.is_playing() {
            return outcome;
        }

        let elapsed = now.saturating_sub(self.started_at).as_secs_f64();
        let seconds_per_beat = 60.0 / self.tempo_bpm;
        let elapsed_beats = elapsed / seconds_per_beat;
        self.position_beats = elapsed_beats;

        let lower = elapsed_beats - self.options.tolerance_beats;
        let upper = elapsed_beats + self.options.tolerance_beats;

        while let Some(event) = self.events.get(self.cursor) {
            if event.beat >= upper {
                break;
            }
            self.cursor += 1;
            if event.beat < lower {
                outcome.missed += 1;
                continue;
            }
            if let Err(err) = sink.send(event.bytes()) {
                warn!(%err, beat = event.beat, "MIDI send failed");
            }
            outcome.fired += 1;
        }

        if outcome.fired > 0 || outcome.missed > 0 {
            debug!(
                beat = elapsed_beats,
                fired = outcome.fired,
                missed = outcome.missed,
                "poll"
            );
        }

        let last_beat = self.events.last().map(|e| e.beat).unwrap_or(0.0);
        if elapsed_beats > last_beat + self.options.completion_tail_beats {
            silence(sink);
            self.state = PlayerState::Completed;
            outcome.completed = true;
            info!(position_beats = elapsed_beats, "playback completed");
        }

        outcome
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

fn silence(sink: &mut dyn MidiSink) {
    for message in all_notes_off_messages() {
        if let Err(err) = sink.send(message) {
            warn!(%err, "all notes off failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::sink::RecordingSink;
    use midi_file::{decode, write_smf, TrackWriter};
    use pretty_assertions::assert_eq;

    fn two_note_file(bpm: f64) -> DecodedFile {
        let track = TrackWriter::new()
            .tempo_bpm(0, bpm)
            .note_on(0, 0, 60, 100)
            .note_off(480, 0, 60)
            .note_on(0, 0, 64, 100)
            .note_off(480, 0, 64)
            .finish();
        decode(&write_smf(0, 480, &[track])).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn note_messages(sink: &RecordingSink) -> Vec<[u8; 3]> {
        sink.messages()
            .into_iter()
            .filter(|m| m[0] & 0xF0 != 0xB0)
            .collect()
    }

    fn cc123_count(sink: &RecordingSink) -> usize {
        sink.messages()
            .iter()
            .filter(|m| m[0] & 0xF0 == 0xB0 && m[1] == 123)
            .count()
    }

    #[test]
    fn starts_idle_and_ignores_play() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        assert_eq!(session.state(), PlayerState::Idle);
        assert!(!session.play(ms(0), None, &mut sink));
        assert_eq!(session.state(), PlayerState::Idle);
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn load_failure_stays_idle() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        assert!(!session.load_bytes(b"garbage", &mut sink));
        assert_eq!(session.state(), PlayerState::Idle);

        let empty = TrackWriter::new().tempo_bpm(0, 90.0).finish();
        assert!(!session.load_bytes(&write_smf(0, 480, &[empty]), &mut sink));
        assert_eq!(session.state(), PlayerState::Idle);
    }

    #[test]
    fn fires_each_event_once_at_fine_polling() {
        let clock = ManualClock::new();
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        assert!(session.load(&two_note_file(120.0), &mut sink));
        assert_eq!(session.state(), PlayerState::Loaded);
        assert!(session.play(clock.now(), None, &mut sink));

        // 120 bpm: 500 ms per beat, window is +-5 ms
        while session.is_playing() {
            session.poll(clock.now(), &mut sink);
            clock.advance(ms(1));
        }

        assert_eq!(session.state(), PlayerState::Completed);
        assert_eq!(
            note_messages(&sink),
            vec![[0x90, 60, 100], [0x80, 60, 0], [0x90, 64, 100], [0x80, 64, 0]]
        );
        assert_eq!(cc123_count(&sink), 16);
    }

    #[test]
    fn window_boundaries() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(60.0), &mut sink);
        session.play(ms(0), None, &mut sink);

        // 60 bpm: 1 beat per second; the second note on sits at beat 1.0
        let outcome = session.poll(ms(10), &mut sink);
        assert_eq!(outcome.fired, 1, "beat 0 is inside [0.0, 0.02)");

        let outcome = session.poll(ms(989), &mut sink);
        assert_eq!(outcome.fired, 0, "beat 1.0 is not below 0.999");

        let outcome = session.poll(ms(991), &mut sink);
        assert_eq!(outcome.fired, 2, "off and on at beat 1.0");
        assert_eq!(outcome.missed, 0);
    }

    #[test]
    fn coarse_polling_drops_missed_events() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);

        assert_eq!(session.poll(ms(0), &mut sink).fired, 1);
        // jump straight past beat 1.0 (500 ms) and its window
        let outcome = session.poll(ms(700), &mut sink);
        assert_eq!(outcome.fired, 0);
        assert_eq!(outcome.missed, 2);
        // never retried
        assert_eq!(session.poll(ms(701), &mut sink).fired, 0);
        assert_eq!(note_messages(&sink), vec![[0x90, 60, 100]]);
    }

    #[test]
    fn repeated_polls_do_not_refire() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        for _ in 0..5 {
            session.poll(ms(2), &mut sink);
        }
        assert_eq!(note_messages(&sink).len(), 1);
    }

    #[test]
    fn tempo_override_rescales_time() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), Some(60.0), &mut sink);
        assert_eq!(session.tempo_bpm(), 60.0);
        session.poll(ms(0), &mut sink);

        // at 60 bpm beat 1.0 is one second in, not half a second
        assert_eq!(session.poll(ms(500), &mut sink).fired, 0);
        assert_eq!(session.position_beats(), 0.5);
        assert_eq!(session.poll(ms(1_000), &mut sink).fired, 2);
    }

    #[test]
    fn invalid_override_falls_back_to_file_tempo() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(90.0), &mut sink);
        session.play(ms(0), Some(0.0), &mut sink);
        assert!((session.tempo_bpm() - 90.0).abs() < 1e-3);
    }

    #[test]
    fn completes_one_beat_after_last_event() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(60.0), &mut sink);
        session.play(ms(0), None, &mut sink);

        // last event at beat 2.0
        assert!(!session.poll(ms(3_000), &mut sink).completed);
        assert!(session.is_playing());
        let outcome = session.poll(ms(3_001), &mut sink);
        assert!(outcome.completed);
        assert_eq!(session.state(), PlayerState::Completed);
        assert_eq!(cc123_count(&sink), 16);

        // completed sessions do nothing further
        assert_eq!(session.poll(ms(5_000), &mut sink), PollOutcome::default());
    }

    #[test]
    fn stop_after_completion_keeps_completed() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        session.poll(ms(0), &mut sink);
        session.poll(ms(500), &mut sink);
        assert!(session.poll(ms(1_600), &mut sink).completed);
        sink.clear();

        assert_eq!(session.stop(&mut sink), PlayerState::Completed);
        assert_eq!(session.state(), PlayerState::Completed);
        assert!(session.state().is_settled());
        assert_eq!(cc123_count(&sink), 16);
    }

    #[test]
    fn stop_silences_every_channel() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        session.poll(ms(0), &mut sink);
        sink.clear();

        assert_eq!(session.stop(&mut sink), PlayerState::Stopped);
        assert_eq!(session.state(), PlayerState::Stopped);
        let expected: Vec<[u8; 3]> = (0..16u8).map(|ch| [0xB0 | ch, 123, 0]).collect();
        assert_eq!(sink.messages(), expected);

        // stopped sessions no longer fire
        assert_eq!(session.poll(ms(500), &mut sink).fired, 0);
    }

    #[test]
    fn play_while_playing_stops_first_and_restarts() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        session.poll(ms(0), &mut sink);

        assert!(session.play(ms(100), None, &mut sink));
        assert_eq!(cc123_count(&sink), 16);
        assert!(session.is_playing());
        // beat 0 fires again relative to the new start
        assert_eq!(session.poll(ms(100), &mut sink).fired, 1);
    }

    #[test]
    fn stopped_session_can_replay() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        session.stop(&mut sink);
        assert!(session.play(ms(50), None, &mut sink));
        assert_eq!(session.poll(ms(50), &mut sink).fired, 1);
    }

    #[test]
    fn load_while_playing_stops_first() {
        let mut sink = RecordingSink::new();
        let mut session = Session::default();
        session.load(&two_note_file(120.0), &mut sink);
        session.play(ms(0), None, &mut sink);
        assert!(session.load(&two_note_file(100.0), &mut sink));
        assert_eq!(cc123_count(&sink), 16);
        assert_eq!(session.state(), PlayerState::Loaded);
    }
}
