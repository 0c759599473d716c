//! Score statistics and instrument substitution

use crate::audio::ensure_parent_dir;
use crate::config::Config;
use crate::error::{require_input, Result};
use crate::instruments::{self, Resolution};
use crate::score::key::estimate_key;
use crate::score::{format_quarter_length, read_score, write_score, Score, ScoreFormat};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

const UNKNOWN: &str = "Unknown";
const UNNAMED_PART: &str = "Unnamed Instrument";

/// Outcome of key estimation; a failure does not fail the analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum KeyAnalysis {
    Estimated {
        key: String,
        correlation: f64,
        /// Key signature of the estimate as a circle-of-fifths position
        fifths: i8,
    },
    Failed { message: String },
}

/// Summary statistics of a notation file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub title: String,
    pub composer: String,
    pub instruments: Vec<String>,
    pub key: KeyAnalysis,
    /// Notes and chords; a chord counts once
    pub total_notes: usize,
    /// Most frequent pitches by name with octave, chord members counted individually
    pub pitch_distribution: Vec<(String, usize)>,
    /// Every quarter length with its count, most frequent first
    pub duration_distribution: Vec<(String, usize)>,
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Basic Information:")?;
        writeln!(f, "Title: {}", self.title)?;
        writeln!(f, "Composer: {}", self.composer)?;
        writeln!(f, "Instruments: {}", self.instruments.join(", "))?;

        writeln!(f, "\nKey Analysis:")?;
        match &self.key {
            KeyAnalysis::Estimated { key, fifths, .. } => {
                writeln!(f, "Estimated key: {}", key)?;
                writeln!(f, "Key signature: {}", describe_fifths(*fifths))?;
            }
            KeyAnalysis::Failed { message } => writeln!(f, "Key analysis failed: {}", message)?,
        }

        writeln!(f, "\nNote Statistics:")?;
        writeln!(f, "Total notes: {}", self.total_notes)?;

        writeln!(f, "\nPitch Distribution:")?;
        for (pitch, count) in &self.pitch_distribution {
            writeln!(f, "{}: {} occurrences", pitch, count)?;
        }

        writeln!(f, "\nRhythm Analysis:")?;
        for (duration, count) in &self.duration_distribution {
            writeln!(f, "Duration {}: {} occurrences", duration, count)?;
        }
        Ok(())
    }
}

/// `2 sharps`, `1 flat`, `no accidentals`
fn describe_fifths(fifths: i8) -> String {
    let count = fifths.unsigned_abs();
    let kind = if fifths > 0 { "sharp" } else { "flat" };
    match count {
        0 => "no accidentals".to_string(),
        1 => format!("1 {}", kind),
        n => format!("{} {}s", n, kind),
    }
}

/// Count occurrences keeping first-seen order, then sort by count (stable, descending)
fn ranked<I: IntoIterator<Item = String>>(items: I) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(name, _)| *name == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Build the report for an already-parsed score
pub fn score_report(score: &Score, config: &Config) -> ScoreReport {
    let title = score
        .metadata
        .title
        .clone()
        .unwrap_or_else(|| UNKNOWN.to_string());
    let composer = score
        .metadata
        .composer
        .clone()
        .unwrap_or_else(|| UNKNOWN.to_string());
    let instruments = score
        .parts
        .iter()
        .map(|p| {
            p.name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNNAMED_PART.to_string())
        })
        .collect();

    let key = match estimate_key(score) {
        Ok(key) => KeyAnalysis::Estimated {
            key: key.to_string(),
            correlation: key.correlation,
            fifths: key.fifths(),
        },
        Err(e) => KeyAnalysis::Failed {
            message: e.to_string(),
        },
    };

    let mut pitch_distribution = ranked(
        score
            .events()
            .flat_map(|e| e.pitches().iter().map(|p| p.name_with_octave())),
    );
    pitch_distribution.truncate(config.analysis.top_pitches);

    let duration_distribution = ranked(score.events().map(|e| format_quarter_length(e.duration)));

    ScoreReport {
        title,
        composer,
        instruments,
        key,
        total_notes: score.events().count(),
        pitch_distribution,
        duration_distribution,
    }
}

/// Load a MusicXML or MIDI file and compute its report
pub fn analyze_score(input: &Path, config: &Config) -> Result<ScoreReport> {
    require_input(input)?;
    tracing::info!("Loading score: {}", input.display());
    let score = read_score(input, config)?;
    Ok(score_report(&score, config))
}

/// Default output for an instrument change: `<stem>_<name><ext>` beside the input
pub fn instrument_output_path(input: &Path, name: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match input.extension() {
        Some(ext) => format!("{}_{}.{}", stem, name, ext.to_string_lossy()),
        None => format!("{}_{}", stem, name),
    };
    input.with_file_name(file_name)
}

/// Replace the instrument of every part.
///
/// `name` is looked up as an exact class name, then as a lowercase synonym;
/// anything else falls back to piano with a warning. Output is MIDI for a
/// `.mid`/`.midi` path and MusicXML otherwise.
pub fn change_instrument(
    input: &Path,
    name: &str,
    output: Option<&Path>,
    config: &Config,
) -> Result<PathBuf> {
    require_input(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| instrument_output_path(input, name));
    ensure_parent_dir(&output)?;

    tracing::info!("Loading file: {}", input.display());
    let mut score = read_score(input, config)?;

    let (instrument, resolution) = instruments::resolve(name);
    if resolution == Resolution::Fallback {
        println!("Instrument '{}' not found, using piano as default.", name);
    }
    tracing::debug!("resolved '{}' to {} ({:?})", name, instrument.class_name, resolution);

    for part in &mut score.parts {
        part.set_instrument(instrument.clone());
    }

    let format = match ScoreFormat::from_extension(&output) {
        Some(ScoreFormat::Midi) => ScoreFormat::Midi,
        _ => ScoreFormat::MusicXml,
    };
    write_score(&score, &output, format, config)?;
    tracing::info!("Instrument changed to {}, saved to {}", instrument.name, output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Event, Metadata, Part, Pitch};

    fn sample_score() -> Score {
        let mut melody = Part::new("P1");
        melody.name = Some("Flute".to_string());
        for (i, n) in [60u8, 62, 64, 60, 67, 60].iter().enumerate() {
            melody.events.push(Event::note(i as f64, 1.0, Pitch::from_midi(*n)));
        }
        let mut accomp = Part::new("P2");
        let mut chord = Event::note(0.0, 2.0, Pitch::from_midi(48));
        chord.push_pitch(Pitch::from_midi(52));
        chord.push_pitch(Pitch::from_midi(55));
        accomp.events.push(chord);
        Score {
            metadata: Metadata {
                title: Some("Study".to_string()),
                composer: None,
            },
            parts: vec![melody, accomp],
            ..Score::default()
        }
    }

    #[test]
    fn test_report_fields() {
        let report = score_report(&sample_score(), &Config::default());
        assert_eq!(report.title, "Study");
        assert_eq!(report.composer, "Unknown");
        assert_eq!(report.instruments, vec!["Flute", "Unnamed Instrument"]);
        assert_eq!(report.total_notes, 7);
        assert_eq!(report.pitch_distribution[0], ("C4".to_string(), 3));
        assert_eq!(report.pitch_distribution.len(), 7);
        assert_eq!(
            report.duration_distribution,
            vec![("1.0".to_string(), 6), ("2.0".to_string(), 1)]
        );
        match &report.key {
            KeyAnalysis::Estimated { key, .. } => assert!(key.ends_with("major")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_score_reports_key_failure() {
        let report = score_report(&Score::default(), &Config::default());
        assert!(matches!(report.key, KeyAnalysis::Failed { .. }));
        assert!(report.to_string().contains("Key analysis failed:"));
    }

    #[test]
    fn test_top_pitches_limit() {
        let mut part = Part::new("P1");
        for n in 40u8..70 {
            part.events.push(Event::note(n as f64, 0.5, Pitch::from_midi(n)));
        }
        let score = Score {
            parts: vec![part],
            ..Score::default()
        };
        let report = score_report(&score, &Config::default());
        assert_eq!(report.pitch_distribution.len(), 10);
    }

    #[test]
    fn test_instrument_output_path() {
        assert_eq!(
            instrument_output_path(Path::new("/s/song.musicxml"), "violin"),
            PathBuf::from("/s/song_violin.musicxml")
        );
    }

    #[test]
    fn test_display_sections() {
        let text = score_report(&sample_score(), &Config::default()).to_string();
        for section in ["Basic Information:", "Key Analysis:", "Note Statistics:", "Pitch Distribution:", "Rhythm Analysis:"] {
            assert!(text.contains(section), "missing {}", section);
        }
        assert!(text.contains("C4: 3 occurrences"));
        assert!(text.contains("Duration 1.0: 6 occurrences"));
        assert!(text.contains("Key signature: "));
    }

    #[test]
    fn test_key_signature_follows_estimate() {
        let mut part = Part::new("P1");
        // D major scale with a long tonic
        for (i, n) in [62u8, 64, 66, 67, 69, 71, 73, 74, 62, 69].iter().enumerate() {
            part.events.push(Event::note(i as f64, if *n == 62 { 2.0 } else { 1.0 }, Pitch::from_midi(*n)));
        }
        let score = Score {
            parts: vec![part],
            ..Score::default()
        };
        let report = score_report(&score, &Config::default());
        match &report.key {
            KeyAnalysis::Estimated { key, fifths, .. } => {
                assert_eq!(key, "D major");
                assert_eq!(*fifths, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(report.to_string().contains("Key signature: 2 sharps"));
        assert_eq!(describe_fifths(-1), "1 flat");
    }
}
