//! Time-windowed views of a file: key changes, a chord progression, and
//! note statistics.
//!
//! Everything here works on a [`NoteTimeline`], the note events of all
//! tracks merged in time order with each tick resolved to seconds at the
//! file tempo. The whole-file classification is still [`detect_key`] over
//! the whole-file histogram.

use std::collections::{BTreeMap, BTreeSet};

use midi_file::{DecodedFile, EventKind};
use serde::{Deserialize, Serialize};

use crate::histogram::PitchClassHistogram;
use crate::key::{detect_key, KeyDetection};
use crate::types::{KeyCandidate, PitchClass};

/// Width of each key detection window.
pub const KEY_WINDOW_SECONDS: f64 = 4.0;

/// Distance between successive key windows.
pub const KEY_HOP_SECONDS: f64 = 2.0;

/// Files no longer than this report no key changes.
pub const MIN_KEY_CHANGE_SECONDS: f64 = 8.0;

pub const CHORD_WINDOW_SECONDS: f64 = 1.0;

/// A window whose best key differs from the window before it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyChange {
    /// Start of the window, in seconds.
    pub time_seconds: f64,
    pub key: KeyCandidate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteStatistics {
    /// Sounding Note On count per MIDI note number.
    pub distribution: BTreeMap<u8, usize>,
    /// Mean note number of every sounding Note On; 0 when there are none.
    pub average_pitch: f64,
    pub lowest: Option<u8>,
    pub highest: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NoteEvent {
    seconds: f64,
    note: u8,
    /// Note On with non-zero velocity; everything else releases the note.
    sounding: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoteTimeline {
    events: Vec<NoteEvent>,
    length_seconds: f64,
}

impl NoteTimeline {
    pub fn from_file(file: &DecodedFile) -> Self {
        let mut notes: Vec<(u64, u8, bool)> = file
            .events()
            .filter_map(|event| match event.kind {
                EventKind::NoteOn { note, velocity, .. } => Some((event.tick, note, velocity > 0)),
                EventKind::NoteOff { note, .. } => Some((event.tick, note, false)),
                _ => None,
            })
            .collect();
        // stable, so same-tick events keep track order
        notes.sort_by_key(|&(tick, _, _)| tick);

        let events = notes
            .into_iter()
            .map(|(tick, note, sounding)| NoteEvent {
                seconds: file.tick_to_seconds(tick),
                note,
                sounding,
            })
            .collect();

        Self {
            events,
            length_seconds: file.length_seconds(),
        }
    }

    /// Time of the last event in the file, notes or not.
    pub fn length_seconds(&self) -> f64 {
        self.length_seconds
    }

    /// Sounding Note Ons with `start <= t <= end`.
    pub fn histogram_in_range(&self, start: f64, end: f64) -> PitchClassHistogram {
        let mut histogram = PitchClassHistogram::default();
        for event in self.events.iter().filter(|e| e.sounding) {
            if event.seconds > end {
                break;
            }
            if event.seconds >= start {
                histogram.add_note(event.note);
            }
        }
        histogram
    }

    /// Key of the notes struck in `[start, end]`, or `None` if there are none.
    pub fn detect_key_in_range(
        &self,
        start: f64,
        end: f64,
        min_alternative_confidence: f64,
    ) -> Option<KeyDetection> {
        let histogram = self.histogram_in_range(start, end);
        if histogram.is_empty() {
            return None;
        }
        Some(detect_key(&histogram, min_alternative_confidence))
    }

    /// Slide a 4 s window in 2 s hops and record each window whose key
    /// differs from the previous window's.
    ///
    /// A window with no notes has no key, so the next window is never a
    /// change relative to it. Changes below `min_confidence` are not
    /// recorded but still become the key the next window is compared with.
    pub fn key_changes(&self, min_confidence: f64) -> Vec<KeyChange> {
        let length = self.length_seconds;
        let mut changes = Vec::new();
        if length <= MIN_KEY_CHANGE_SECONDS {
            return changes;
        }

        let mut previous: Option<KeyCandidate> = None;
        for start in window_starts(length, KEY_HOP_SECONDS) {
            let end = (start + KEY_WINDOW_SECONDS).min(length);
            let current = self
                .detect_key_in_range(start, end, min_confidence)
                .map(|detection| detection.best);

            if let (Some(before), Some(now)) = (previous, current) {
                let moved = before.root != now.root || before.mode != now.mode;
                if moved && now.confidence >= min_confidence {
                    changes.push(KeyChange {
                        time_seconds: start,
                        key: now,
                    });
                }
            }
            previous = current;
        }
        changes
    }

    /// One chord name per one-second window, skipping windows with fewer
    /// than two pitch classes and collapsing consecutive repeats.
    pub fn chord_progression(&self) -> Vec<String> {
        let mut chords: Vec<String> = Vec::new();
        for start in window_starts(self.length_seconds, CHORD_WINDOW_SECONDS) {
            let Some(chord) = self.chord_in_range(start, start + CHORD_WINDOW_SECONDS) else {
                continue;
            };
            if chords.last() != Some(&chord) {
                chords.push(chord);
            }
        }
        chords
    }

    /// Name the pitch classes held at any note event inside `[start, end]`.
    pub fn chord_in_range(&self, start: f64, end: f64) -> Option<String> {
        let mut held = BTreeSet::new();
        let mut heard = [false; 12];

        for event in self.events.iter().take_while(|e| e.seconds <= end) {
            if event.sounding {
                held.insert(event.note);
            } else {
                held.remove(&event.note);
            }
            if event.seconds >= start {
                for &note in &held {
                    heard[usize::from(note % 12)] = true;
                }
            }
        }

        name_chord(&heard)
    }

    pub fn note_statistics(&self) -> NoteStatistics {
        let mut stats = NoteStatistics::default();
        let mut sum = 0u64;
        let mut count = 0usize;

        for event in self.events.iter().filter(|e| e.sounding) {
            *stats.distribution.entry(event.note).or_default() += 1;
            sum += u64::from(event.note);
            count += 1;
        }

        if count > 0 {
            stats.average_pitch = sum as f64 / count as f64;
        }
        stats.lowest = stats.distribution.keys().next().copied();
        stats.highest = stats.distribution.keys().next_back().copied();
        stats
    }
}

/// `0, step, 2 * step, ...` while below `length`.
fn window_starts(length: f64, step: f64) -> impl Iterator<Item = f64> {
    (0u32..)
        .map(move |i| f64::from(i) * step)
        .take_while(move |&start| start < length)
}

/// Major or minor triad on the lowest root that has one, else the lowest
/// pitch class. Fewer than two pitch classes is not a chord.
fn name_chord(heard: &[bool; 12]) -> Option<String> {
    let active: Vec<PitchClass> = PitchClass::all()
        .filter(|pc| heard[usize::from(pc.value())])
        .collect();
    if active.len() < 2 {
        return None;
    }

    for &root in &active {
        let has = |interval: u8| heard[usize::from(root.transpose(interval).value())];
        if has(4) && has(7) {
            return Some(root.name().to_string());
        }
        if has(3) && has(7) {
            return Some(format!("{}m", root.name()));
        }
    }
    Some(active[0].name().to_string())
}
