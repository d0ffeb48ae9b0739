use midi_file::{DecodedFile, EventKind, TimedEvent};

/// Count of sounding Note On events per pitch class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitchClassHistogram {
    counts: [u64; 12],
}

impl PitchClassHistogram {
    pub fn from_counts(counts: [u64; 12]) -> Self {
        Self { counts }
    }

    /// Every sounding Note On across all tracks. Velocity 0 is ignored.
    pub fn from_file(file: &DecodedFile) -> Self {
        Self::from_events(file.events())
    }

    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a TimedEvent>) -> Self {
        let mut histogram = Self::default();
        for event in events {
            if let EventKind::NoteOn { note, velocity, .. } = event.kind {
                if velocity > 0 {
                    histogram.add_note(note);
                }
            }
        }
        histogram
    }

    pub fn add_note(&mut self, note: u8) {
        self.counts[usize::from(note % 12)] += 1;
    }

    pub fn counts(&self) -> &[u64; 12] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Entries sum to 1, or are all zero when empty.
    pub fn normalized(&self) -> [f64; 12] {
        let total = self.total();
        let mut out = [0.0; 12];
        if total == 0 {
            return out;
        }
        let total = total as f64;
        for (slot, &count) in out.iter_mut().zip(&self.counts) {
            *slot = count as f64 / total;
        }
        out
    }

    /// Transpose every note up by `semitones`: `H'[i] = H[(i - k) mod 12]`.
    pub fn rotate(&self, semitones: usize) -> Self {
        let k = semitones % 12;
        let mut counts = [0; 12];
        for (i, &count) in self.counts.iter().enumerate() {
            counts[(i + k) % 12] = count;
        }
        Self { counts }
    }
}
