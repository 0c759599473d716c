//! MusicXML (score-partwise) reading and writing

use super::midi::{assign_channels, PERCUSSION_CHANNEL};
use super::{
    group_spans, Event, KeySignature, Metadata, NoteSpan, Part, Pitch, Score, TimeSignature,
    DEFAULT_VELOCITY,
};
use crate::config::Config;
use crate::error::{Result, ToolkitError};
use crate::instruments::{self, Instrument};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashMap;

/// Resolution used when comparing parsed offsets
const OFFSET_RESOLUTION: f64 = 100_000.0;

/// Velocity that MusicXML `dynamics="100"` stands for
const FORTE_VELOCITY: f64 = 90.0;

const DOCTYPE: &str = "<!DOCTYPE score-partwise PUBLIC \"-//Recordare//DTD MusicXML 4.0 Partwise//EN\" \"http://www.musicxml.org/dtds/partwise.dtd\">";

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn child_number(node: Node, name: &str) -> Option<f64> {
    child_text(node, name).and_then(|t| t.parse::<f64>().ok())
}

fn parse_error(message: impl Into<String>) -> ToolkitError {
    ToolkitError::NotationParse(message.into())
}

/// Instrument declared for a part in `part-list`
#[derive(Debug, Default)]
struct PartHeader {
    name: Option<String>,
    instrument_name: Option<String>,
    abbreviation: Option<String>,
    sound: Option<String>,
    /// 1-based, as written in the file
    midi_channel: Option<u8>,
    /// 1-based, as written in the file
    midi_program: Option<u8>,
    volume: Option<f64>,
}

impl PartHeader {
    fn parse(node: Node) -> Self {
        let score_instrument = child(node, "score-instrument");
        let midi_instrument = child(node, "midi-instrument");
        Self {
            name: child_text(node, "part-name").map(str::to_string),
            abbreviation: child_text(node, "part-abbreviation").map(str::to_string),
            instrument_name: score_instrument
                .and_then(|n| child_text(n, "instrument-name"))
                .map(str::to_string),
            sound: score_instrument
                .and_then(|n| child_text(n, "instrument-sound"))
                .map(str::to_string),
            midi_channel: midi_instrument
                .and_then(|n| child_number(n, "midi-channel"))
                .map(|c| c.clamp(1.0, 16.0) as u8),
            midi_program: midi_instrument
                .and_then(|n| child_number(n, "midi-program"))
                .map(|p| p.clamp(1.0, 128.0) as u8),
            volume: midi_instrument.and_then(|n| child_number(n, "volume")),
        }
    }

    fn instrument(&self) -> Option<Instrument> {
        let percussion = self.midi_channel == Some(PERCUSSION_CHANNEL + 1);
        let by_name = [&self.instrument_name, &self.name]
            .into_iter()
            .flatten()
            .find_map(|name| find_by_display_name(name));

        let mut instrument = match (by_name, self.midi_program) {
            (Some(instrument), _) => instrument,
            (None, Some(program)) => instruments::from_midi_program(program - 1, percussion),
            (None, None) if percussion => instruments::from_midi_program(0, true),
            (None, None) => return None,
        };
        if let Some(program) = self.midi_program {
            instrument.midi_program = program - 1;
        }
        if let Some(channel) = self.midi_channel {
            instrument.midi_channel = Some(channel - 1);
        }
        if let Some(volume) = self.volume {
            instrument.volume = Some((volume.clamp(0.0, 100.0) / 100.0 * 127.0).round() as u8);
        }
        if let Some(abbreviation) = &self.abbreviation {
            instrument.abbreviation = abbreviation.clone();
        }
        if self.sound.is_some() {
            instrument.sound = self.sound.clone();
        }
        Some(instrument)
    }
}

fn find_by_display_name(name: &str) -> Option<Instrument> {
    instruments::class_names()
        .into_iter()
        .filter_map(instruments::lookup_class)
        .find(|i| i.name.eq_ignore_ascii_case(name) || i.class_name.eq_ignore_ascii_case(name))
}

fn parse_pitch(note: Node) -> Option<Pitch> {
    if let Some(pitch) = child(note, "pitch") {
        let step = child_text(pitch, "step")?.chars().next()?;
        let alter = child_number(pitch, "alter").unwrap_or(0.0).round() as i8;
        let octave = child_number(pitch, "octave")? as i8;
        return Some(Pitch::new(step, alter, octave));
    }
    // Percussion notes carry only a display position
    let unpitched = child(note, "unpitched")?;
    let step = child_text(unpitched, "display-step")?.chars().next()?;
    let octave = child_number(unpitched, "display-octave")? as i8;
    Some(Pitch::new(step, 0, octave))
}

/// A parsed note before tie merging
#[derive(Debug, Clone, Copy)]
struct RawNote {
    span: NoteSpan,
    tie_start: bool,
    tie_stop: bool,
}

/// Merge tied notes into single spans
fn merge_ties(notes: Vec<RawNote>) -> Vec<NoteSpan> {
    let mut merged: Vec<RawNote> = Vec::with_capacity(notes.len());
    // midi number -> index of a note waiting for its tie continuation
    let mut open: HashMap<i32, usize> = HashMap::new();

    for note in notes {
        let midi = note.span.pitch.midi();
        if note.tie_stop {
            if let Some(&idx) = open.get(&midi) {
                let prev = &mut merged[idx];
                let prev_end = prev.span.offset + prev.span.duration;
                if (prev_end - note.span.offset).abs() < 1.0 / OFFSET_RESOLUTION * 10.0 {
                    prev.span.duration += note.span.duration;
                    if !note.tie_start {
                        open.remove(&midi);
                    }
                    continue;
                }
            }
        }
        if note.tie_start {
            open.insert(midi, merged.len());
        } else {
            open.remove(&midi);
        }
        merged.push(note);
    }

    merged.into_iter().map(|n| n.span).collect()
}

/// Sum of a compound `beats` value such as `3+2`; `None` when malformed or above 255
fn compound_beats(text: &str) -> Option<u8> {
    let total = text.split('+').try_fold(0u32, |acc, part| {
        acc.checked_add(part.trim().parse::<u32>().ok()?)
    })?;
    u8::try_from(total).ok()
}

/// Parse MusicXML text into a score
pub fn parse_musicxml(text: &str) -> Result<Score> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)
        .map_err(|e| parse_error(format!("Invalid MusicXML: {}", e)))?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "score-partwise" => {}
        "score-timewise" => {
            return Err(parse_error("score-timewise documents are not supported"));
        }
        other => {
            return Err(parse_error(format!(
                "Expected <score-partwise> root element, found <{}>",
                other
            )));
        }
    }

    let mut score = Score {
        metadata: parse_metadata(root),
        ..Score::default()
    };

    let headers: HashMap<String, PartHeader> = child(root, "part-list")
        .map(|list| {
            list.children()
                .filter(|n| n.has_tag_name("score-part"))
                .filter_map(|n| Some((n.attribute("id")?.to_string(), PartHeader::parse(n))))
                .collect()
        })
        .unwrap_or_default();

    let mut time_signature: Option<TimeSignature> = None;

    for part_node in root.children().filter(|n| n.has_tag_name("part")) {
        let id = part_node.attribute("id").unwrap_or("").to_string();
        let mut part = Part::new(if id.is_empty() {
            format!("P{}", score.parts.len() + 1)
        } else {
            id.clone()
        });
        if let Some(header) = headers.get(&id) {
            part.name = header.name.clone();
            part.instrument = header.instrument();
        }

        let mut divisions = 1.0;
        // Measure start and position, in quarter lengths
        let mut measure_start = 0.0;
        let mut raw_notes: Vec<RawNote> = Vec::new();

        for measure in part_node.children().filter(|n| n.has_tag_name("measure")) {
            let mut cursor = measure_start;
            let mut measure_end = measure_start;
            let mut last_onset = measure_start;

            for element in measure.children().filter(|n| n.is_element()) {
                match element.tag_name().name() {
                    "attributes" => {
                        if let Some(d) = child_number(element, "divisions") {
                            if d > 0.0 {
                                divisions = d;
                            }
                        }
                        if let Some(time) = child(element, "time") {
                            let beats = child_text(time, "beats").and_then(compound_beats);
                            let beat_type = child_number(time, "beat-type")
                                .and_then(|b| u8::try_from(b as i64).ok());
                            if let (Some(numerator), Some(denominator), None) =
                                (beats, beat_type, time_signature)
                            {
                                time_signature = Some(TimeSignature {
                                    numerator: numerator.max(1),
                                    denominator: denominator.max(1),
                                });
                            }
                        }
                        if let Some(key) = child(element, "key") {
                            if score.key_signature.is_none() {
                                if let Some(fifths) = child_number(key, "fifths") {
                                    score.key_signature = Some(KeySignature {
                                        fifths: fifths as i8,
                                        minor: child_text(key, "mode") == Some("minor"),
                                    });
                                }
                            }
                        }
                    }
                    "direction" | "sound" => {
                        if score.tempo_bpm.is_none() {
                            score.tempo_bpm = element
                                .descendants()
                                .filter(|n| n.has_tag_name("sound"))
                                .find_map(|n| n.attribute("tempo"))
                                .and_then(|t| t.trim().parse::<f64>().ok())
                                .filter(|t| *t > 0.0);
                        }
                    }
                    "backup" => {
                        cursor -= child_number(element, "duration").unwrap_or(0.0) / divisions;
                        cursor = cursor.max(measure_start);
                    }
                    "forward" => {
                        cursor += child_number(element, "duration").unwrap_or(0.0) / divisions;
                        measure_end = f64::max(measure_end, cursor);
                    }
                    "note" => {
                        if child(element, "grace").is_some() || child(element, "cue").is_some() {
                            continue;
                        }
                        let duration =
                            child_number(element, "duration").unwrap_or(0.0) / divisions;
                        let is_chord = child(element, "chord").is_some();
                        let onset = if is_chord { last_onset } else { cursor };

                        if child(element, "rest").is_none() {
                            if let Some(pitch) = parse_pitch(element) {
                                let velocity = element
                                    .attribute("dynamics")
                                    .and_then(|d| d.parse::<f64>().ok())
                                    .map(|d| (d / 100.0 * FORTE_VELOCITY).round().clamp(1.0, 127.0) as u8)
                                    .unwrap_or(DEFAULT_VELOCITY);
                                let ties: Vec<&str> = element
                                    .children()
                                    .filter(|n| n.has_tag_name("tie"))
                                    .filter_map(|n| n.attribute("type"))
                                    .collect();
                                raw_notes.push(RawNote {
                                    span: NoteSpan {
                                        offset: onset,
                                        duration,
                                        pitch,
                                        velocity,
                                    },
                                    tie_start: ties.contains(&"start"),
                                    tie_stop: ties.contains(&"stop"),
                                });
                            }
                        }

                        if !is_chord {
                            last_onset = cursor;
                            cursor += duration;
                        }
                        measure_end = f64::max(measure_end, cursor);
                    }
                    _ => {}
                }
            }
            measure_start = measure_end;
        }

        let spans: Vec<NoteSpan> = merge_ties(raw_notes)
            .into_iter()
            .filter(|s| s.duration > 0.0)
            .collect();
        part.events = group_spans(spans, OFFSET_RESOLUTION);
        part.sort_events();
        score.parts.push(part);
    }

    score.time_signature = time_signature.unwrap_or_default();

    tracing::debug!(
        "parsed MusicXML: {} parts, {} events",
        score.parts.len(),
        score.events().count()
    );
    Ok(score)
}

fn parse_metadata(root: Node) -> Metadata {
    let title = child_text(root, "movement-title")
        .or_else(|| child(root, "work").and_then(|w| child_text(w, "work-title")))
        .map(str::to_string);
    let composer = child(root, "identification")
        .and_then(|id| {
            id.children()
                .filter(|n| n.has_tag_name("creator"))
                .find(|n| n.attribute("type").map_or(true, |t| t == "composer"))
        })
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    Metadata { title, composer }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Minimal indenting XML writer
struct XmlWriter {
    buf: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            buf: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, content: &str) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
        self.buf.push_str(content);
        self.buf.push('\n');
    }

    fn tag(name: &str, attrs: &[(&str, String)]) -> String {
        let mut tag = name.to_string();
        for (key, value) in attrs {
            tag.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
        tag
    }

    fn open(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.line(&format!("<{}>", Self::tag(name, attrs)));
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{}>", name));
    }

    fn leaf(&mut self, name: &str, text: impl std::fmt::Display) {
        self.line(&format!("<{0}>{1}</{0}>", name, escape(&text.to_string())));
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, String)]) {
        self.line(&format!("<{}/>", Self::tag(name, attrs)));
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Note types with their quarter lengths, longest first
const NOTE_TYPES: [(&str, f64); 8] = [
    ("breve", 8.0),
    ("whole", 4.0),
    ("half", 2.0),
    ("quarter", 1.0),
    ("eighth", 0.5),
    ("16th", 0.25),
    ("32nd", 0.125),
    ("64th", 0.0625),
];

/// Graphical notation for a duration
#[derive(Debug, Clone, Copy, PartialEq)]
struct Notation {
    ticks: u32,
    note_type: Option<&'static str>,
    dotted: bool,
    triplet: bool,
}

/// Every representable (plain, dotted, triplet) duration in ticks, longest first
fn notation_table(divisions: u32) -> Vec<Notation> {
    let mut table = Vec::new();
    for (name, quarters) in NOTE_TYPES {
        let base = quarters * divisions as f64;
        for (ticks, dotted, triplet) in [(base * 1.5, true, false), (base, false, false), (base * 2.0 / 3.0, false, true)] {
            if ticks >= 1.0 && (ticks - ticks.round()).abs() < 1e-9 {
                table.push(Notation {
                    ticks: ticks.round() as u32,
                    note_type: Some(name),
                    dotted,
                    triplet,
                });
            }
        }
    }
    table.sort_by(|a, b| b.ticks.cmp(&a.ticks));
    table
}

/// Split `ticks` into representable durations; a remainder too short for any type is
/// absorbed into the last piece
fn split_duration(ticks: u32, table: &[Notation]) -> Vec<Notation> {
    let mut pieces = Vec::new();
    let mut remaining = ticks;
    while remaining > 0 {
        match table.iter().find(|n| n.ticks <= remaining) {
            Some(n) => {
                pieces.push(*n);
                remaining -= n.ticks;
            }
            None => {
                match pieces.last_mut() {
                    Some(last) => {
                        last.ticks += remaining;
                        last.note_type = None;
                        last.dotted = false;
                        last.triplet = false;
                    }
                    None => pieces.push(Notation {
                        ticks: remaining,
                        note_type: None,
                        dotted: false,
                        triplet: false,
                    }),
                }
                remaining = 0;
            }
        }
    }
    pieces
}

/// An event clipped to one measure, in ticks
struct Segment<'a> {
    start: u32,
    end: u32,
    event: &'a Event,
    tied_from_previous: bool,
    tied_to_next: bool,
}

/// Greedily pack events into non-overlapping voices
fn assign_voices(events: &[Event], to_tick: impl Fn(f64) -> u32) -> Vec<Vec<(u32, u32, &Event)>> {
    let mut sorted: Vec<(u32, u32, &Event)> = events
        .iter()
        .map(|e| {
            let start = to_tick(e.offset);
            (start, to_tick(e.end()).max(start + 1), e)
        })
        .collect();
    sorted.sort_by_key(|(start, end, _)| (*start, *end));

    let mut voices: Vec<Vec<(u32, u32, &Event)>> = Vec::new();
    for item in sorted {
        match voices
            .iter_mut()
            .find(|v| v.last().map_or(true, |(_, end, _)| *end <= item.0))
        {
            Some(voice) => voice.push(item),
            None => voices.push(vec![item]),
        }
    }
    voices
}

struct PartWriter<'a> {
    w: &'a mut XmlWriter,
    table: Vec<Notation>,
}

impl PartWriter<'_> {
    fn rest(&mut self, ticks: u32, voice: usize) {
        for piece in split_duration(ticks, &self.table) {
            self.w.open("note", &[]);
            self.w.empty("rest", &[]);
            self.w.leaf("duration", piece.ticks);
            self.w.leaf("voice", voice);
            self.write_type(&piece);
            self.w.close("note");
        }
    }

    fn measure_rest(&mut self, ticks: u32) {
        self.w.open("note", &[]);
        self.w.empty("rest", &[("measure", "yes".to_string())]);
        self.w.leaf("duration", ticks);
        self.w.leaf("voice", 1);
        self.w.close("note");
    }

    fn write_type(&mut self, piece: &Notation) {
        if let Some(note_type) = piece.note_type {
            self.w.leaf("type", note_type);
            if piece.dotted {
                self.w.empty("dot", &[]);
            }
            if piece.triplet {
                self.w.open("time-modification", &[]);
                self.w.leaf("actual-notes", 3);
                self.w.leaf("normal-notes", 2);
                self.w.close("time-modification");
            }
        }
    }

    fn segment(&mut self, segment: &Segment, voice: usize) {
        let pieces = split_duration(segment.end - segment.start, &self.table);
        let last = pieces.len().saturating_sub(1);
        for (i, piece) in pieces.iter().enumerate() {
            let tie_stop = i > 0 || segment.tied_from_previous;
            let tie_start = i < last || segment.tied_to_next;
            for (j, pitch) in segment.event.pitches().iter().enumerate() {
                self.note(pitch, piece, voice, j > 0, tie_stop, tie_start, segment.event.velocity);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn note(
        &mut self,
        pitch: &Pitch,
        piece: &Notation,
        voice: usize,
        chord: bool,
        tie_stop: bool,
        tie_start: bool,
        velocity: u8,
    ) {
        let attrs = if velocity != DEFAULT_VELOCITY {
            vec![(
                "dynamics",
                format!("{:.2}", velocity as f64 / FORTE_VELOCITY * 100.0),
            )]
        } else {
            Vec::new()
        };
        self.w.open("note", &attrs);
        if chord {
            self.w.empty("chord", &[]);
        }
        self.w.open("pitch", &[]);
        self.w.leaf("step", pitch.step);
        if pitch.alter != 0 {
            self.w.leaf("alter", pitch.alter);
        }
        self.w.leaf("octave", pitch.octave);
        self.w.close("pitch");
        self.w.leaf("duration", piece.ticks);
        if tie_stop {
            self.w.empty("tie", &[("type", "stop".to_string())]);
        }
        if tie_start {
            self.w.empty("tie", &[("type", "start".to_string())]);
        }
        self.w.leaf("voice", voice);
        self.write_type(piece);
        if tie_stop || tie_start {
            self.w.open("notations", &[]);
            if tie_stop {
                self.w.empty("tied", &[("type", "stop".to_string())]);
            }
            if tie_start {
                self.w.empty("tied", &[("type", "start".to_string())]);
            }
            self.w.close("notations");
        }
        self.w.close("note");
    }
}

fn clef_for(part: &Part) -> (&'static str, u8) {
    if part
        .instrument
        .as_ref()
        .is_some_and(|i| i.class_name == "UnpitchedPercussion")
    {
        return ("percussion", 2);
    }
    let pitches: Vec<i32> = part
        .events
        .iter()
        .flat_map(|e| e.pitches().iter().map(Pitch::midi))
        .collect();
    if pitches.is_empty() {
        return ("G", 2);
    }
    let mean = pitches.iter().sum::<i32>() as f64 / pitches.len() as f64;
    if mean < 60.0 {
        ("F", 4)
    } else {
        ("G", 2)
    }
}

/// Serialize a score as a MusicXML 4.0 partwise document
pub fn write_musicxml(score: &Score, config: &Config) -> Result<String> {
    let divisions = config.notation.musicxml_divisions;
    if divisions == 0 {
        return Err(ToolkitError::NotationWrite(
            "MusicXML divisions must be positive".to_string(),
        ));
    }
    let to_tick = |q: f64| (q * divisions as f64).round().max(0.0) as u32;

    let measure_ticks = to_tick(score.time_signature.measure_length()).max(1);
    let total_ticks = to_tick(score.duration());
    let n_measures = total_ticks.div_ceil(measure_ticks).max(1);
    let channels = assign_channels(score);

    let mut w = XmlWriter::new();
    w.line("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>");
    w.line(DOCTYPE);
    w.open("score-partwise", &[("version", "4.0".to_string())]);

    if let Some(title) = &score.metadata.title {
        w.open("work", &[]);
        w.leaf("work-title", title);
        w.close("work");
        w.leaf("movement-title", title);
    }
    w.open("identification", &[]);
    if let Some(composer) = &score.metadata.composer {
        w.line(&format!(
            "<creator type=\"composer\">{}</creator>",
            escape(composer)
        ));
    }
    w.open("encoding", &[]);
    w.leaf("software", concat!("music-tools ", env!("CARGO_PKG_VERSION")));
    w.close("encoding");
    w.close("identification");

    w.open("part-list", &[]);
    for (idx, part) in score.parts.iter().enumerate() {
        let id = format!("P{}", idx + 1);
        w.open("score-part", &[("id", id.clone())]);
        let name = part
            .name
            .clone()
            .or_else(|| part.instrument.as_ref().map(|i| i.name.clone()))
            .unwrap_or_default();
        w.leaf("part-name", &name);
        if let Some(instrument) = &part.instrument {
            if !instrument.abbreviation.is_empty() {
                w.leaf("part-abbreviation", &instrument.abbreviation);
            }
            let instrument_id = format!("{}-I1", id);
            w.open("score-instrument", &[("id", instrument_id.clone())]);
            w.leaf("instrument-name", &instrument.name);
            if let Some(sound) = &instrument.sound {
                w.leaf("instrument-sound", sound);
            }
            w.close("score-instrument");
            w.open("midi-instrument", &[("id", instrument_id)]);
            w.leaf("midi-channel", channels[idx] + 1);
            w.leaf("midi-program", instrument.midi_program as u32 + 1);
            if let Some(volume) = instrument.volume {
                w.leaf("volume", format!("{:.1}", volume as f64 / 127.0 * 100.0));
            }
            w.close("midi-instrument");
        }
        w.close("score-part");
    }
    w.close("part-list");

    for (idx, part) in score.parts.iter().enumerate() {
        w.open("part", &[("id", format!("P{}", idx + 1))]);
        let voices = assign_voices(&part.events, to_tick);
        let (clef_sign, clef_line) = clef_for(part);
        let mut writer = PartWriter {
            w: &mut w,
            table: notation_table(divisions),
        };

        for m in 0..n_measures {
            let m_start = m * measure_ticks;
            let m_end = m_start + measure_ticks;
            writer
                .w
                .open("measure", &[("number", (m + 1).to_string())]);

            if m == 0 {
                writer.w.open("attributes", &[]);
                writer.w.leaf("divisions", divisions);
                let key = score.key_signature.unwrap_or(KeySignature {
                    fifths: 0,
                    minor: false,
                });
                writer.w.open("key", &[]);
                writer.w.leaf("fifths", key.fifths);
                writer
                    .w
                    .leaf("mode", if key.minor { "minor" } else { "major" });
                writer.w.close("key");
                writer.w.open("time", &[]);
                writer.w.leaf("beats", score.time_signature.numerator);
                writer.w.leaf("beat-type", score.time_signature.denominator);
                writer.w.close("time");
                writer.w.open("clef", &[]);
                writer.w.leaf("sign", clef_sign);
                writer.w.leaf("line", clef_line);
                writer.w.close("clef");
                writer.w.close("attributes");

                if let (0, Some(bpm)) = (idx, score.tempo_bpm) {
                    writer
                        .w
                        .open("direction", &[("placement", "above".to_string())]);
                    writer.w.open("direction-type", &[]);
                    writer.w.open("metronome", &[]);
                    writer.w.leaf("beat-unit", "quarter");
                    writer.w.leaf("per-minute", format_number(bpm));
                    writer.w.close("metronome");
                    writer.w.close("direction-type");
                    writer
                        .w
                        .empty("sound", &[("tempo", format_number(bpm))]);
                    writer.w.close("direction");
                }
            }

            if voices.is_empty() {
                writer.measure_rest(measure_ticks);
            }
            let mut previous_end: Option<u32> = None;
            for (v, voice) in voices.iter().enumerate() {
                let segments: Vec<Segment> = voice
                    .iter()
                    .filter(|(start, end, _)| *start < m_end && *end > m_start)
                    .map(|&(start, end, event)| Segment {
                        start: start.max(m_start),
                        end: end.min(m_end),
                        event,
                        tied_from_previous: start < m_start,
                        tied_to_next: end > m_end,
                    })
                    .collect();

                if segments.is_empty() {
                    if v == 0 {
                        writer.measure_rest(measure_ticks);
                        previous_end = Some(m_end);
                    }
                    continue;
                }

                if let Some(end) = previous_end {
                    if end > m_start {
                        writer.w.open("backup", &[]);
                        writer.w.leaf("duration", end - m_start);
                        writer.w.close("backup");
                    }
                }

                let voice_number = v + 1;
                let mut cursor = m_start;
                for segment in &segments {
                    if segment.start > cursor {
                        if v == 0 {
                            writer.rest(segment.start - cursor, voice_number);
                        } else {
                            writer.w.open("forward", &[]);
                            writer.w.leaf("duration", segment.start - cursor);
                            writer.w.close("forward");
                        }
                    }
                    writer.segment(segment, voice_number);
                    cursor = segment.end;
                }
                if v == 0 && cursor < m_end {
                    writer.rest(m_end - cursor, voice_number);
                    cursor = m_end;
                }
                previous_end = Some(cursor);
            }

            writer.w.close("measure");
        }
        w.close("part");
    }

    w.close("score-partwise");
    Ok(w.finish())
}

fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.2}", value)
    }
}
