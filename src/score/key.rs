//! Key estimation from pitch-class distributions (Krumhansl-Kessler profiles)

use super::Score;
use crate::error::{Result, ToolkitError};
use serde::Serialize;
use std::fmt;

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

const KEY_NAMES: [&str; 12] = ["C", "C#", "D", "E-", "E", "F", "F#", "G", "A-", "A", "B-", "B"];

/// Major or minor mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Major,
    Minor,
}

/// Estimated key with its profile correlation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Key {
    /// Pitch class of the tonic, 0 = C
    pub tonic: usize,
    pub mode: Mode,
    pub correlation: f64,
}

impl Key {
    pub fn tonic_name(&self) -> &'static str {
        KEY_NAMES[self.tonic % 12]
    }

    /// Circle-of-fifths position of the key signature
    pub fn fifths(&self) -> i8 {
        let major_tonic = match self.mode {
            Mode::Major => self.tonic,
            Mode::Minor => (self.tonic + 3) % 12,
        };
        // pitch class -> fifths, preferring the spelling with fewer accidentals
        const FIFTHS: [i8; 12] = [0, -5, 2, -3, 4, -1, 6, 1, -4, 3, -2, 5];
        FIFTHS[major_tonic]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Mode::Major => write!(f, "{} major", self.tonic_name()),
            Mode::Minor => write!(f, "{} minor", self.tonic_name().to_lowercase()),
        }
    }
}

/// Duration-weighted pitch-class histogram of every note in the score
pub fn pitch_class_histogram(score: &Score) -> [f64; 12] {
    let mut histogram = [0.0; 12];
    for event in score.events() {
        let weight = if event.duration > 0.0 { event.duration } else { 1.0 };
        for pitch in event.pitches() {
            histogram[pitch.pitch_class()] += weight;
        }
    }
    histogram
}

/// Best-correlated key over all 24 major/minor rotations
pub fn estimate_key_from_histogram(histogram: &[f64; 12]) -> Result<Key> {
    if histogram.iter().all(|&v| v <= 0.0) {
        return Err(ToolkitError::Analysis(
            "Cannot estimate key: score has no pitched notes".to_string(),
        ));
    }

    let mut best = Key {
        tonic: 0,
        mode: Mode::Major,
        correlation: f64::NEG_INFINITY,
    };
    for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
        for tonic in 0..12 {
            let rotated: Vec<f64> = (0..12).map(|pc| profile[(pc + 12 - tonic) % 12]).collect();
            let r = pearson(histogram, &rotated);
            if r > best.correlation {
                best = Key {
                    tonic,
                    mode,
                    correlation: r,
                };
            }
        }
    }
    Ok(best)
}

/// Estimate the key of a score
pub fn estimate_key(score: &Score) -> Result<Key> {
    estimate_key_from_histogram(&pitch_class_histogram(score))
}

/// Pearson correlation; zero when either side is constant
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}
