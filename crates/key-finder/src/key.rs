use crate::histogram::PitchClassHistogram;
use crate::types::{KeyCandidate, KeyMode, PitchClass};

/// Krumhansl-Kessler major key profile (probe-tone ratings, tonic first).
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile.
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Runner-up keys reported alongside the best match.
pub const MAX_ALTERNATIVES: usize = 3;

pub const DEFAULT_MIN_ALTERNATIVE_CONFIDENCE: f64 = 0.6;

/// Best key plus ranked runners-up.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDetection {
    pub best: KeyCandidate,
    pub alternatives: Vec<KeyCandidate>,
}

impl KeyDetection {
    /// Returned when there are no notes to classify.
    pub fn sentinel() -> Self {
        Self {
            best: KeyCandidate {
                root: PitchClass::C,
                mode: KeyMode::Major,
                correlation: 0.0,
                confidence: 0.0,
            },
            alternatives: Vec::new(),
        }
    }
}

/// Correlate a histogram against all 24 keys in search order: roots
/// ascending, major before minor at each root.
///
/// Empty histograms produce no candidates.
pub fn rank_keys(histogram: &PitchClassHistogram) -> Vec<KeyCandidate> {
    if histogram.is_empty() {
        return Vec::new();
    }

    let normalized = histogram.normalized();
    let mut candidates = Vec::with_capacity(24);

    for root in 0..12usize {
        // Rotate histogram so root = index 0
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = normalized[(i + root) % 12];
        }

        let root = PitchClass::new(root as u8);
        candidates.push(KeyCandidate::new(
            root,
            KeyMode::Major,
            pearson(&rotated, &MAJOR_PROFILE),
        ));
        candidates.push(KeyCandidate::new(
            root,
            KeyMode::Minor,
            pearson(&rotated, &MINOR_PROFILE),
        ));
    }

    candidates
}

/// Krumhansl-Schmuckler key detection.
///
/// Ties keep the earlier candidate in search order, so results are
/// reproducible bit for bit.
pub fn detect_key(
    histogram: &PitchClassHistogram,
    min_alternative_confidence: f64,
) -> KeyDetection {
    let candidates = rank_keys(histogram);
    let Some(first) = candidates.first().copied() else {
        return KeyDetection::sentinel();
    };

    let mut best = first;
    for candidate in &candidates[1..] {
        if candidate.correlation > best.correlation {
            best = *candidate;
        }
    }

    let mut alternatives: Vec<KeyCandidate> = candidates
        .into_iter()
        .filter(|c| (c.root, c.mode) != (best.root, best.mode))
        .filter(|c| c.confidence >= min_alternative_confidence)
        .collect();
    // stable: equal confidences stay in search order
    alternatives.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    alternatives.truncate(MAX_ALTERNATIVES);

    KeyDetection { best, alternatives }
}

/// Pearson correlation coefficient between two equal-length vectors.
///
/// Returns exactly 0.0 when either side has zero variance, including the
/// rounding residue left by normalizing a uniform histogram.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);

    let x_mean: f64 = x.iter().sum::<f64>() / n as f64;
    let y_mean: f64 = y.iter().sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for (a, b) in x.iter().zip(y) {
        let xd = a - x_mean;
        let yd = b - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}
