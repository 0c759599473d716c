//! MIDI / MusicXML conversion, analysis and instrument substitution through files

use music_tools::analysis::KeyAnalysis;
use music_tools::config::Config;
use music_tools::score::{read_score, write_score, Event, Metadata, Part, Pitch, Score, ScoreFormat};
use music_tools::{analyze_score, change_instrument, midi_to_musicxml, musicxml_to_midi};
use std::path::Path;

/// Two-part C major phrase with a closing chord
fn phrase() -> Score {
    let mut melody = Part::new("P1");
    melody.name = Some("Melody".to_string());
    for (i, n) in [60u8, 62, 64, 65, 67, 69, 71, 72].iter().enumerate() {
        melody.events.push(Event::note(i as f64 * 0.5, 0.5, Pitch::from_midi(*n)));
    }
    melody.events.push(Event::note(4.0, 4.0, Pitch::from_midi(72)));

    let mut bass = Part::new("P2");
    bass.name = Some("Bass".to_string());
    let mut chord = Event::note(0.0, 4.0, Pitch::from_midi(48));
    chord.push_pitch(Pitch::from_midi(55));
    bass.events.push(chord);
    bass.events.push(Event::note(4.0, 4.0, Pitch::from_midi(43)));

    Score {
        metadata: Metadata {
            title: Some("Phrase".to_string()),
            composer: Some("Anon".to_string()),
        },
        parts: vec![melody, bass],
        tempo_bpm: Some(96.0),
        ..Score::default()
    }
}

/// Single-measure MusicXML document with the given `<beats>` text
fn musicxml_with_beats(beats: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0">
  <part-list><score-part id="P1"><part-name>Flute</part-name></score-part></part-list>
  <part id="P1">
    <measure number="1">
      <attributes>
        <divisions>1</divisions>
        <time><beats>{}</beats><beat-type>8</beat-type></time>
      </attributes>
      <note><pitch><step>E</step><octave>5</octave></pitch><duration>1</duration></note>
    </measure>
  </part>
</score-partwise>"#,
        beats
    )
}

fn midi_numbers(score: &Score) -> Vec<Vec<i32>> {
    score
        .parts
        .iter()
        .map(|p| {
            p.events
                .iter()
                .flat_map(|e| e.pitches().iter().map(Pitch::midi))
                .collect()
        })
        .collect()
}

fn write_phrase_midi(dir: &Path, config: &Config) -> std::path::PathBuf {
    let path = dir.join("phrase.mid");
    write_score(&phrase(), &path, ScoreFormat::Midi, config).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midi_musicxml_midi_preserves_pitches() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let midi = write_phrase_midi(dir.path(), &config);

        let xml = midi_to_musicxml(&midi, None, &config).unwrap();
        assert_eq!(xml, dir.path().join("phrase.musicxml"));
        let text = std::fs::read_to_string(&xml).unwrap();
        assert!(text.contains("<score-partwise"));

        let back = musicxml_to_midi(&xml, Some(&dir.path().join("back.mid")), &config).unwrap();
        let original = read_score(&midi, &config).unwrap();
        let round_trip = read_score(&back, &config).unwrap();

        assert_eq!(midi_numbers(&original), midi_numbers(&round_trip));
        assert_eq!(round_trip.metadata.title.as_deref(), Some("Phrase"));
        assert!((round_trip.duration() - 8.0).abs() < 1e-9);
        assert_eq!(round_trip.tempo_bpm.map(|t| t.round()), Some(96.0));
    }

    #[test]
    fn test_analyze_reports_c_major() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let midi = write_phrase_midi(dir.path(), &config);
        let xml = midi_to_musicxml(&midi, None, &config).unwrap();

        let report = analyze_score(&xml, &config).unwrap();
        assert_eq!(report.title, "Phrase");
        assert_eq!(report.total_notes, 11);
        assert_eq!(report.pitch_distribution[0], ("C5".to_string(), 2));
        match &report.key {
            KeyAnalysis::Estimated { key, .. } => assert_eq!(key, "C major"),
            other => panic!("unexpected key result {:?}", other),
        }

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["key"]["status"], "estimated");
        assert_eq!(json["key"]["fifths"], 0);
    }

    #[test]
    fn test_change_instrument_by_synonym() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let midi = write_phrase_midi(dir.path(), &config);
        let xml = midi_to_musicxml(&midi, None, &config).unwrap();

        let output = change_instrument(&xml, "violin", None, &config).unwrap();
        assert_eq!(output, dir.path().join("phrase_violin.musicxml"));

        let score = read_score(&output, &config).unwrap();
        assert_eq!(score.parts.len(), 2);
        for part in &score.parts {
            assert_eq!(part.name.as_deref(), Some("Violin"));
            assert_eq!(part.instrument.as_ref().map(|i| i.midi_program), Some(40));
        }
    }

    #[test]
    fn test_change_instrument_unknown_falls_back_to_piano() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let midi = write_phrase_midi(dir.path(), &config);

        let output = dir.path().join("piano.mid");
        change_instrument(&midi, "theremin-ish", Some(&output), &config).unwrap();

        let score = read_score(&output, &config).unwrap();
        for part in &score.parts {
            let instrument = part.instrument.as_ref().unwrap();
            assert_eq!(instrument.midi_program, 0);
            assert_eq!(instrument.name, "Piano");
        }
    }

    #[test]
    fn test_compound_time_signature_beats() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        let path = dir.path().join("compound.musicxml");
        std::fs::write(&path, musicxml_with_beats("3+2")).unwrap();
        let score = read_score(&path, &config).unwrap();
        assert_eq!(score.time_signature.numerator, 5);
        assert_eq!(score.time_signature.denominator, 8);

        // Too large for a time signature: ignored, notes still read
        let path = dir.path().join("oversized.musicxml");
        std::fs::write(&path, musicxml_with_beats("200+200")).unwrap();
        let score = read_score(&path, &config).unwrap();
        assert_eq!(score.time_signature.numerator, 4);
        assert_eq!(score.time_signature.denominator, 4);
        assert_eq!(score.events().count(), 1);

        let path = dir.path().join("malformed.musicxml");
        std::fs::write(&path, musicxml_with_beats("3+x")).unwrap();
        let score = read_score(&path, &config).unwrap();
        assert_eq!(score.time_signature.numerator, 4);
    }
}
