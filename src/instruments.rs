//! Instrument definitions, name resolution and the traditional Chinese instrument set
//!
//! The technique and timbre tables are descriptive metadata only; nothing in the
//! toolkit synthesizes audio from them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Broad instrument family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Keyboard,
    Strings,
    Plucked,
    Woodwind,
    Brass,
    Percussion,
    Voice,
}

impl Family {
    /// Family of a General MIDI program by its group of eight
    pub fn from_program(program: u8) -> Self {
        match program {
            52..=54 => Family::Voice,
            _ => match program / 8 {
                1 | 14 => Family::Percussion,
                3 | 4 | 13 => Family::Plucked,
                5 | 6 => Family::Strings,
                7 => Family::Brass,
                8 | 9 => Family::Woodwind,
                _ => Family::Keyboard,
            },
        }
    }
}

/// Descriptive playing-technique parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Techniques {
    pub playing: BTreeMap<String, f32>,
    pub timbre: BTreeMap<String, f32>,
    pub special: Vec<String>,
    pub lowest_note: Option<String>,
    pub string_pitches: Vec<String>,
}

/// Instrument metadata attached to a score part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Catalog key, e.g. `Violoncello`
    pub class_name: String,
    /// Display name, e.g. `Violoncello`
    pub name: String,
    pub abbreviation: String,
    /// General MIDI program, 0-based
    pub midi_program: u8,
    /// MIDI channel, 0-based
    pub midi_channel: Option<u8>,
    /// MIDI volume 0-127
    pub volume: Option<u8>,
    pub family: Family,
    /// MusicXML `instrument-sound` identifier
    pub sound: Option<String>,
    pub techniques: Option<Techniques>,
}

impl Instrument {
    pub fn is_percussion(&self) -> bool {
        self.family == Family::Percussion
    }

    fn from_def(def: &InstrumentDef) -> Self {
        Self {
            class_name: def.class_name.to_string(),
            name: def.name.to_string(),
            abbreviation: def.abbreviation.to_string(),
            midi_program: def.program,
            midi_channel: None,
            volume: None,
            family: def.family,
            sound: Some(def.sound.to_string()),
            techniques: None,
        }
    }

    /// Instrument for a GM program with no better catalog match
    pub fn generic(program: u8) -> Self {
        let family_name = GM_FAMILIES[(program as usize / 8).min(15)];
        Self {
            class_name: "Instrument".to_string(),
            name: family_name.to_string(),
            abbreviation: family_name.chars().take(3).collect(),
            midi_program: program,
            midi_channel: None,
            volume: None,
            family: Family::from_program(program),
            sound: None,
            techniques: None,
        }
    }

    pub fn piano() -> Self {
        lookup_class("Piano").unwrap_or_else(|| Instrument::generic(0))
    }
}

struct InstrumentDef {
    class_name: &'static str,
    name: &'static str,
    abbreviation: &'static str,
    program: u8,
    family: Family,
    sound: &'static str,
}

macro_rules! def {
    ($class:expr, $name:expr, $abbr:expr, $program:expr, $family:ident, $sound:expr) => {
        InstrumentDef {
            class_name: $class,
            name: $name,
            abbreviation: $abbr,
            program: $program,
            family: Family::$family,
            sound: $sound,
        }
    };
}

const CATALOG: &[InstrumentDef] = &[
    def!("Piano", "Piano", "Pno", 0, Keyboard, "keyboard.piano"),
    def!("ElectricPiano", "Electric Piano", "E.Pno", 2, Keyboard, "keyboard.piano.electric"),
    def!("Harpsichord", "Harpsichord", "Hpschd", 6, Keyboard, "keyboard.harpsichord"),
    def!("Celesta", "Celesta", "Clst", 8, Keyboard, "keyboard.celesta"),
    def!("Glockenspiel", "Glockenspiel", "Gsp", 9, Percussion, "pitched-percussion.glockenspiel"),
    def!("Vibraphone", "Vibraphone", "Vbp", 11, Percussion, "pitched-percussion.vibraphone"),
    def!("Marimba", "Marimba", "Mar", 12, Percussion, "pitched-percussion.marimba"),
    def!("Xylophone", "Xylophone", "Xyl", 13, Percussion, "pitched-percussion.xylophone"),
    def!("ElectricOrgan", "Electric Organ", "Elec Org", 16, Keyboard, "keyboard.organ"),
    def!("PipeOrgan", "Pipe Organ", "P Org", 19, Keyboard, "keyboard.organ.pipe"),
    def!("Organ", "Organ", "Org", 19, Keyboard, "keyboard.organ"),
    def!("Accordion", "Accordion", "Acc", 21, Keyboard, "keyboard.accordion"),
    def!("Harmonica", "Harmonica", "Hmca", 22, Woodwind, "wind.reed.harmonica"),
    def!("Guitar", "Guitar", "Gtr", 24, Plucked, "pluck.guitar"),
    def!("AcousticGuitar", "Acoustic Guitar", "Ac Gtr", 25, Plucked, "pluck.guitar.acoustic"),
    def!("ElectricGuitar", "Electric Guitar", "Elec Gtr", 26, Plucked, "pluck.guitar.electric"),
    def!("AcousticBass", "Acoustic Bass", "Ac B", 32, Plucked, "pluck.bass.acoustic"),
    def!("ElectricBass", "Electric Bass", "Elec B", 33, Plucked, "pluck.bass.electric"),
    def!("Violin", "Violin", "Vln", 40, Strings, "strings.violin"),
    def!("Viola", "Viola", "Vla", 41, Strings, "strings.viola"),
    def!("Violoncello", "Violoncello", "Vc", 42, Strings, "strings.cello"),
    def!("Contrabass", "Contrabass", "Cb", 43, Strings, "strings.contrabass"),
    def!("Harp", "Harp", "Hp", 46, Plucked, "pluck.harp"),
    def!("Timpani", "Timpani", "Timp", 47, Percussion, "drum.timpani"),
    def!("Choir", "Choir", "Ch", 52, Voice, "voice.choir"),
    def!("Vocalist", "Voice", "V", 53, Voice, "voice.vocals"),
    def!("Trumpet", "Trumpet", "Tpt", 56, Brass, "brass.trumpet"),
    def!("Trombone", "Trombone", "Trb", 57, Brass, "brass.trombone"),
    def!("Tuba", "Tuba", "Tba", 58, Brass, "brass.tuba"),
    def!("Horn", "Horn", "Hn", 60, Brass, "brass.french-horn"),
    def!("SopranoSaxophone", "Soprano Saxophone", "S Sax", 64, Woodwind, "wind.reed.saxophone.soprano"),
    def!("Saxophone", "Saxophone", "Sax", 65, Woodwind, "wind.reed.saxophone"),
    def!("AltoSaxophone", "Alto Saxophone", "A Sax", 65, Woodwind, "wind.reed.saxophone.alto"),
    def!("TenorSaxophone", "Tenor Saxophone", "T Sax", 66, Woodwind, "wind.reed.saxophone.tenor"),
    def!("BaritoneSaxophone", "Baritone Saxophone", "Bar Sax", 67, Woodwind, "wind.reed.saxophone.baritone"),
    def!("Oboe", "Oboe", "Ob", 68, Woodwind, "wind.reed.oboe"),
    def!("EnglishHorn", "English Horn", "Eng Hn", 69, Woodwind, "wind.reed.english-horn"),
    def!("Bassoon", "Bassoon", "Bsn", 70, Woodwind, "wind.reed.bassoon"),
    def!("Clarinet", "Clarinet", "Cl", 71, Woodwind, "wind.reed.clarinet"),
    def!("Piccolo", "Piccolo", "Picc", 72, Woodwind, "wind.flutes.flute.piccolo"),
    def!("Flute", "Flute", "Fl", 73, Woodwind, "wind.flutes.flute"),
    def!("Recorder", "Recorder", "Rec", 74, Woodwind, "wind.flutes.recorder"),
    def!("PanFlute", "Pan Flute", "P Fl", 75, Woodwind, "wind.flutes.panpipes"),
    def!("Sitar", "Sitar", "Sit", 104, Plucked, "pluck.sitar"),
    def!("Banjo", "Banjo", "Bjo", 105, Plucked, "pluck.banjo"),
    def!("Shamisen", "Shamisen", "Shmsn", 106, Plucked, "pluck.shamisen"),
    def!("Koto", "Koto", "Koto", 107, Plucked, "pluck.koto"),
    def!("Bagpipes", "Bagpipes", "Bag", 109, Woodwind, "wind.pipes.bagpipes"),
    def!("UnpitchedPercussion", "Percussion", "Perc", 0, Percussion, "drum.group.set"),
];

/// Lowercase synonyms resolved when a name is not a catalog class
const SYNONYMS: &[(&str, &str)] = &[
    ("piano", "Piano"),
    ("violin", "Violin"),
    ("viola", "Viola"),
    ("cello", "Violoncello"),
    ("bass", "ElectricBass"),
    ("guitar", "Guitar"),
    ("flute", "Flute"),
    ("clarinet", "Clarinet"),
    ("oboe", "Oboe"),
    ("trumpet", "Trumpet"),
    ("horn", "Horn"),
    ("trombone", "Trombone"),
    ("drums", "UnpitchedPercussion"),
    ("percussion", "UnpitchedPercussion"),
    ("voice", "Vocalist"),
    ("vocal", "Vocalist"),
    ("organ", "PipeOrgan"),
    ("saxophone", "Saxophone"),
];

const CHINESE: &[&str] = &["Erhu", "Pipa", "Guzheng", "Dizi", "Suona", "Yangqin"];

const GM_FAMILIES: [&str; 16] = [
    "Piano",
    "Chromatic Percussion",
    "Organ",
    "Guitar",
    "Bass",
    "Strings",
    "Ensemble",
    "Brass",
    "Reed",
    "Pipe",
    "Synth Lead",
    "Synth Pad",
    "Synth Effects",
    "Ethnic",
    "Percussive",
    "Sound Effects",
];

/// How an instrument name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Exact catalog class name
    Catalog,
    /// Lowercase synonym table
    Synonym,
    /// Unknown name, fell back to piano
    Fallback,
}

/// Look up an exact (case-sensitive) catalog class name
pub fn lookup_class(class_name: &str) -> Option<Instrument> {
    if let Some(def) = CATALOG.iter().find(|d| d.class_name == class_name) {
        return Some(Instrument::from_def(def));
    }
    chinese_instrument(class_name)
}

/// Resolve a free-text name: catalog class, then synonym, then piano
pub fn resolve(name: &str) -> (Instrument, Resolution) {
    if let Some(instrument) = lookup_class(name) {
        return (instrument, Resolution::Catalog);
    }

    let lowercase = name.to_lowercase();
    if let Some(instrument) = SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowercase)
        .and_then(|(_, class)| lookup_class(class))
    {
        return (instrument, Resolution::Synonym);
    }

    (Instrument::piano(), Resolution::Fallback)
}

/// Best catalog match for a General MIDI program
pub fn from_midi_program(program: u8, percussion: bool) -> Instrument {
    if percussion {
        return lookup_class("UnpitchedPercussion").unwrap_or_else(|| Instrument::generic(program));
    }
    CATALOG
        .iter()
        .find(|d| d.program == program && d.class_name != "UnpitchedPercussion")
        .map(Instrument::from_def)
        .unwrap_or_else(|| Instrument::generic(program))
}

/// Every catalog class name, including the Chinese set
pub fn class_names() -> Vec<&'static str> {
    CATALOG
        .iter()
        .map(|d| d.class_name)
        .chain(CHINESE.iter().copied())
        .collect()
}

/// The synonym table as (synonym, class name) pairs
pub fn synonyms() -> &'static [(&'static str, &'static str)] {
    SYNONYMS
}

fn chinese_instrument(class_name: &str) -> Option<Instrument> {
    match class_name {
        "Erhu" => Some(erhu()),
        "Pipa" => Some(pipa()),
        "Guzheng" => Some(guzheng()),
        "Dizi" => Some(dizi()),
        "Suona" => Some(suona()),
        "Yangqin" => Some(yangqin()),
        _ => None,
    }
}

fn simple(name: &str, abbreviation: &str, program: u8, family: Family) -> Instrument {
    Instrument {
        class_name: name.to_string(),
        name: name.to_string(),
        abbreviation: abbreviation.to_string(),
        midi_program: program,
        midi_channel: None,
        volume: None,
        family,
        sound: None,
        techniques: None,
    }
}

fn table(entries: &[(&str, f32)]) -> BTreeMap<String, f32> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Two-string bowed fiddle, tuned A3/E4
pub fn erhu() -> Instrument {
    let mut erhu = simple("Erhu", "Erhu", 110, Family::Strings);
    erhu.sound = Some("strings.erhu".to_string());
    erhu.midi_channel = Some(1);
    erhu.volume = Some(85);
    erhu.techniques = Some(Techniques {
        playing: table(&[
            ("vibrato", 0.9),
            ("slide_speed", 0.7),
            ("pressure", 0.75),
            ("bow_pressure", 0.6),
        ]),
        timbre: table(&[
            ("brightness", 0.4),
            ("warmth", 0.95),
            ("nasality", 0.5),
            ("harmonics", 0.4),
        ]),
        special: ["glissando", "vibrato", "pizzicato", "harmonics", "portamento", "tremolo"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        lowest_note: Some("A3".to_string()),
        string_pitches: vec!["A3".to_string(), "E4".to_string()],
    });
    erhu
}

/// Pear-shaped lute, mapped to nylon guitar
pub fn pipa() -> Instrument {
    let mut pipa = simple("Pipa", "Pipa", 24, Family::Plucked);
    pipa.midi_channel = Some(1);
    pipa.volume = Some(80);
    pipa
}

/// Zither, mapped to harp
pub fn guzheng() -> Instrument {
    simple("Guzheng", "Gzh", 46, Family::Plucked)
}

/// Transverse bamboo flute, mapped to flute
pub fn dizi() -> Instrument {
    simple("Dizi", "Dizi", 73, Family::Woodwind)
}

/// Double-reed horn, mapped to oboe
pub fn suona() -> Instrument {
    simple("Suona", "Suona", 68, Family::Woodwind)
}

/// Hammered dulcimer, mapped to piano
pub fn yangqin() -> Instrument {
    simple("Yangqin", "Yqin", 0, Family::Strings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_class_name_wins() {
        let (inst, how) = resolve("Violoncello");
        assert_eq!(how, Resolution::Catalog);
        assert_eq!(inst.name, "Violoncello");
        assert_eq!(inst.midi_program, 42);
    }

    #[test]
    fn test_class_lookup_is_case_sensitive() {
        assert!(lookup_class("violin").is_none());
        let (inst, how) = resolve("violin");
        assert_eq!(how, Resolution::Synonym);
        assert_eq!(inst.name, "Violin");
    }

    #[test]
    fn test_every_synonym_resolves() {
        for (synonym, class) in synonyms() {
            let (inst, how) = resolve(synonym);
            assert_eq!(how, Resolution::Synonym, "{}", synonym);
            assert_eq!(inst.class_name, *class);
        }
        assert_eq!(synonyms().len(), 18);
    }

    #[test]
    fn test_unknown_falls_back_to_piano() {
        let (inst, how) = resolve("Kazoo of Doom");
        assert_eq!(how, Resolution::Fallback);
        assert_eq!(inst.name, "Piano");
    }

    #[test]
    fn test_erhu_definition() {
        let (erhu, how) = resolve("Erhu");
        assert_eq!(how, Resolution::Catalog);
        assert_eq!(erhu.midi_program, 110);
        assert_eq!(erhu.midi_channel, Some(1));
        assert_eq!(erhu.volume, Some(85));
        let techniques = erhu.techniques.unwrap();
        assert_eq!(techniques.playing["vibrato"], 0.9);
        assert_eq!(techniques.string_pitches, vec!["A3", "E4"]);
        assert_eq!(techniques.special.len(), 6);
    }

    #[test]
    fn test_chinese_program_mappings() {
        assert_eq!(pipa().midi_program, 24);
        assert_eq!(guzheng().midi_program, 46);
        assert_eq!(dizi().midi_program, 73);
        assert_eq!(suona().midi_program, 68);
        assert_eq!(yangqin().midi_program, 0);
        assert_eq!(guzheng().abbreviation, "Gzh");
    }

    #[test]
    fn test_from_midi_program() {
        assert_eq!(from_midi_program(40, false).name, "Violin");
        assert_eq!(from_midi_program(0, false).name, "Piano");
        assert!(from_midi_program(0, true).is_percussion());
        assert_eq!(from_midi_program(81, false).name, "Synth Lead");
    }

    #[test]
    fn test_generic_family_follows_program_group() {
        assert_eq!(Instrument::generic(1).family, Family::Keyboard);
        assert_eq!(Instrument::generic(14).family, Family::Percussion);
        assert_eq!(Instrument::generic(29).family, Family::Plucked);
        assert_eq!(Instrument::generic(49).family, Family::Strings);
        assert_eq!(Instrument::generic(53).family, Family::Voice);
        assert_eq!(Instrument::generic(61).family, Family::Brass);
        assert_eq!(Instrument::generic(66).family, Family::Woodwind);
        assert_eq!(Instrument::generic(75).family, Family::Woodwind);
        assert_eq!(Instrument::generic(106).family, Family::Plucked);
        assert_eq!(Instrument::generic(117).family, Family::Percussion);
        assert_eq!(Instrument::generic(90).family, Family::Keyboard);
    }
}
