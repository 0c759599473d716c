//! Score object model shared by the MIDI and MusicXML codecs

pub mod key;
pub mod midi;
pub mod musicxml;

use crate::audio::extension_of;
use crate::config::Config;
use crate::error::{require_input, Result, ToolkitError};
use crate::instruments::Instrument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

const STEPS: [char; 7] = ['C', 'D', 'E', 'F', 'G', 'A', 'B'];
const STEP_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Spelled pitch (step, chromatic alteration, octave)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub step: char,
    pub alter: i8,
    pub octave: i8,
}

impl Pitch {
    pub fn new(step: char, alter: i8, octave: i8) -> Self {
        Self {
            step: step.to_ascii_uppercase(),
            alter,
            octave,
        }
    }

    /// Spell a MIDI note number with sharps
    pub fn from_midi(note: u8) -> Self {
        const SPELLING: [(char, i8); 12] = [
            ('C', 0),
            ('C', 1),
            ('D', 0),
            ('D', 1),
            ('E', 0),
            ('F', 0),
            ('F', 1),
            ('G', 0),
            ('G', 1),
            ('A', 0),
            ('A', 1),
            ('B', 0),
        ];
        let (step, alter) = SPELLING[(note % 12) as usize];
        Self::new(step, alter, (note / 12) as i8 - 1)
    }

    /// MIDI note number (may fall outside 0-127 for exotic spellings)
    pub fn midi(&self) -> i32 {
        let idx = STEPS.iter().position(|&s| s == self.step).unwrap_or(0);
        (self.octave as i32 + 1) * 12 + STEP_SEMITONES[idx] + self.alter as i32
    }

    pub fn pitch_class(&self) -> usize {
        self.midi().rem_euclid(12) as usize
    }

    /// Name without octave, flats written as `-` (e.g. `B-`, `F#`)
    pub fn name(&self) -> String {
        let accidental = match self.alter {
            a if a > 0 => "#".repeat(a as usize),
            a if a < 0 => "-".repeat((-a) as usize),
            _ => String::new(),
        };
        format!("{}{}", self.step, accidental)
    }

    /// Name with octave, e.g. `C#4`
    pub fn name_with_octave(&self) -> String {
        format!("{}{}", self.name(), self.octave)
    }

    /// Parse `C4`, `F#3`, `B-2` or `Bb2`
    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.trim().chars().peekable();
        let step = chars.next()?.to_ascii_uppercase();
        if !STEPS.contains(&step) {
            return None;
        }
        let mut alter = 0i8;
        while let Some(&c) = chars.peek() {
            match c {
                '#' => alter += 1,
                '-' | 'b' => alter -= 1,
                _ => break,
            }
            chars.next();
        }
        let octave: i8 = chars.collect::<String>().parse().ok()?;
        Some(Self::new(step, alter, octave))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name_with_octave())
    }
}

/// A sounding element of a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Note(Pitch),
    Chord(Vec<Pitch>),
}

/// Note or chord placed in time, measured in quarter lengths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub offset: f64,
    pub duration: f64,
    pub kind: EventKind,
    pub velocity: u8,
}

impl Event {
    pub fn note(offset: f64, duration: f64, pitch: Pitch) -> Self {
        Self {
            offset,
            duration,
            kind: EventKind::Note(pitch),
            velocity: DEFAULT_VELOCITY,
        }
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }

    pub fn pitches(&self) -> &[Pitch] {
        match &self.kind {
            EventKind::Note(p) => std::slice::from_ref(p),
            EventKind::Chord(ps) => ps,
        }
    }

    /// Add a pitch, turning a note into a chord
    pub fn push_pitch(&mut self, pitch: Pitch) {
        self.kind = match std::mem::replace(&mut self.kind, EventKind::Chord(Vec::new())) {
            EventKind::Note(p) => EventKind::Chord(vec![p, pitch]),
            EventKind::Chord(mut ps) => {
                ps.push(pitch);
                EventKind::Chord(ps)
            }
        };
    }
}

pub const DEFAULT_VELOCITY: u8 = 90;

/// A single sounding pitch before chord grouping
#[derive(Debug, Clone, Copy)]
pub(crate) struct NoteSpan {
    pub offset: f64,
    pub duration: f64,
    pub pitch: Pitch,
    pub velocity: u8,
}

/// Merge spans sharing onset and duration (compared on a `1/resolution` grid) into chords
pub(crate) fn group_spans(spans: Vec<NoteSpan>, resolution: f64) -> Vec<Event> {
    let mut grouped: BTreeMap<(i64, i64), Event> = BTreeMap::new();
    for span in spans {
        let key = (
            (span.offset * resolution).round() as i64,
            (span.duration * resolution).round() as i64,
        );
        match grouped.get_mut(&key) {
            Some(event) if !event.pitches().contains(&span.pitch) => event.push_pitch(span.pitch),
            Some(_) => {}
            None => {
                let mut event = Event::note(span.offset, span.duration, span.pitch);
                event.velocity = span.velocity;
                grouped.insert(key, event);
            }
        }
    }

    let mut events: Vec<Event> = grouped.into_values().collect();
    for event in &mut events {
        if let EventKind::Chord(pitches) = &mut event.kind {
            pitches.sort_by_key(Pitch::midi);
        }
    }
    events
}

/// One instrument line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    pub name: Option<String>,
    pub instrument: Option<Instrument>,
    pub events: Vec<Event>,
}

impl Part {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            instrument: None,
            events: Vec::new(),
        }
    }

    /// Replace any existing instrument and rename the part after it
    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.name = Some(instrument.name.clone());
        self.instrument = Some(instrument);
    }

    /// Sort events by onset, then lowest pitch
    pub fn sort_events(&mut self) {
        self.events.sort_by(|a, b| {
            a.offset
                .total_cmp(&b.offset)
                .then_with(|| lowest_midi(a).cmp(&lowest_midi(b)))
        });
    }

    pub fn end(&self) -> f64 {
        self.events.iter().fold(0.0, |acc, e| acc.max(e.end()))
    }
}

fn lowest_midi(event: &Event) -> i32 {
    event.pitches().iter().map(Pitch::midi).min().unwrap_or(0)
}

/// Title and composer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub composer: Option<String>,
}

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    /// Measure length in quarter lengths
    pub fn measure_length(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }
}

/// Key signature as circle-of-fifths position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub fifths: i8,
    pub minor: bool,
}

/// A complete notation document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub metadata: Metadata,
    pub parts: Vec<Part>,
    pub tempo_bpm: Option<f64>,
    pub time_signature: TimeSignature,
    pub key_signature: Option<KeySignature>,
}

impl Score {
    /// Every note and chord across all parts
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.parts.iter().flat_map(|p| p.events.iter())
    }

    /// Length of the longest part in quarter lengths
    pub fn duration(&self) -> f64 {
        self.parts.iter().fold(0.0, |acc, p| acc.max(p.end()))
    }
}

/// Supported notation file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreFormat {
    Midi,
    MusicXml,
}

impl ScoreFormat {
    /// Format implied by a file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        match extension_of(path).as_str() {
            "mid" | "midi" | "smf" => Some(ScoreFormat::Midi),
            "musicxml" | "xml" => Some(ScoreFormat::MusicXml),
            _ => None,
        }
    }

    /// Sniff the format from file content, falling back to the extension
    pub fn detect(path: &Path, bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"MThd") {
            return Some(ScoreFormat::Midi);
        }
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
        let head = head.trim_start_matches('\u{feff}').trim_start();
        if head.starts_with("<?xml") || head.contains("<score-partwise") || head.contains("<score-timewise") {
            return Some(ScoreFormat::MusicXml);
        }
        Self::from_extension(path)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ScoreFormat::Midi => "mid",
            ScoreFormat::MusicXml => "musicxml",
        }
    }
}

/// Read a MIDI or MusicXML file, sniffing the format
pub fn read_score(path: &Path, config: &Config) -> Result<Score> {
    require_input(path)?;
    let bytes = std::fs::read(path)?;
    match ScoreFormat::detect(path, &bytes) {
        Some(ScoreFormat::Midi) => midi::parse_midi(&bytes, config),
        Some(ScoreFormat::MusicXml) => {
            let text = String::from_utf8_lossy(&bytes);
            musicxml::parse_musicxml(&text)
        }
        None => Err(ToolkitError::NotationParse(format!(
            "Unrecognized notation format: {}",
            path.display()
        ))),
    }
}

/// Write `score` to `path` in the given format
pub fn write_score(score: &Score, path: &Path, format: ScoreFormat, config: &Config) -> Result<()> {
    crate::audio::ensure_parent_dir(path)?;
    match format {
        ScoreFormat::Midi => {
            let bytes = midi::write_midi(score, config)?;
            std::fs::write(path, bytes)?;
        }
        ScoreFormat::MusicXml => {
            let xml = musicxml::write_musicxml(score, config)?;
            std::fs::write(path, xml)?;
        }
    }
    Ok(())
}

/// Format a quarter length the way analysis output prints it (`1.0`, `0.5`, `1/3`)
pub fn format_quarter_length(q: f64) -> String {
    for denominator in [1u32, 2, 4, 8, 16, 32, 64] {
        let scaled = q * denominator as f64;
        if (scaled - scaled.round()).abs() < 1e-6 {
            let s = format!("{}", q);
            return if s.contains('.') { s } else { format!("{}.0", s) };
        }
    }
    for denominator in [3u32, 6, 12, 24, 5, 7] {
        let scaled = q * denominator as f64;
        if (scaled - scaled.round()).abs() < 1e-6 {
            let numerator = scaled.round() as u32;
            let g = gcd(numerator, denominator);
            return format!("{}/{}", numerator / g, denominator / g);
        }
    }
    format!("{:.4}", q)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}
