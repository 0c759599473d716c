//! Standard MIDI File reading and writing

use super::{group_spans, KeySignature, NoteSpan, Part, Pitch, Score, TimeSignature, DEFAULT_VELOCITY};
use crate::config::Config;
use crate::error::{Result, ToolkitError};
use crate::instruments::{self, Instrument};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::{BTreeMap, HashMap};

pub(crate) const PERCUSSION_CHANNEL: u8 = 9;

/// A sounding note recovered from note-on/note-off pairs, in ticks
#[derive(Debug, Clone, Copy)]
struct RawNote {
    start: u64,
    end: u64,
    key: u8,
    velocity: u8,
}

/// Notes and program for one (track, channel) pair
#[derive(Debug, Default)]
struct Voice {
    notes: Vec<RawNote>,
    program: Option<u8>,
}

/// Parse MIDI bytes into a score, one part per (track, channel) carrying notes
pub fn parse_midi(bytes: &[u8], config: &Config) -> Result<Score> {
    let smf = Smf::parse(bytes).map_err(|e| ToolkitError::MidiParse(e.to_string()))?;

    let mut score = Score::default();
    let mut first_tempo_uspq: Option<u32> = None;
    let mut time_signature: Option<TimeSignature> = None;

    // (track, channel) -> voice
    let mut voices: BTreeMap<(usize, u8), Voice> = BTreeMap::new();
    let mut track_names: HashMap<usize, String> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut pending: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();
        let mut programs: HashMap<u8, u8> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(uspq)) => {
                    first_tempo_uspq.get_or_insert(uspq.as_int());
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, _, _)) => {
                    time_signature.get_or_insert(TimeSignature {
                        numerator: num.max(1),
                        denominator: 1u8.checked_shl(den_pow as u32).unwrap_or(4),
                    });
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(fifths, minor)) => {
                    score
                        .key_signature
                        .get_or_insert(KeySignature { fifths, minor });
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    let name = String::from_utf8_lossy(name).trim().to_string();
                    if !name.is_empty() {
                        track_names.entry(track_idx).or_insert(name);
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::ProgramChange { program } => {
                            programs.entry(channel).or_insert(program.as_int());
                        }
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending
                                .entry((channel, key.as_int()))
                                .or_default()
                                .push((tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let starts = pending.entry((channel, key.as_int())).or_default();
                            if !starts.is_empty() {
                                let (start, velocity) = starts.remove(0);
                                voices
                                    .entry((track_idx, channel))
                                    .or_default()
                                    .notes
                                    .push(RawNote {
                                        start,
                                        end: tick,
                                        key: key.as_int(),
                                        velocity,
                                    });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Hanging notes end with the track
        for ((channel, key), starts) in pending {
            for (start, velocity) in starts {
                voices.entry((track_idx, channel)).or_default().notes.push(RawNote {
                    start,
                    end: tick.max(start + 1),
                    key,
                    velocity,
                });
            }
        }

        for (channel, program) in programs {
            if let Some(voice) = voices.get_mut(&(track_idx, channel)) {
                voice.program.get_or_insert(program);
            }
        }
    }

    score.time_signature = time_signature.unwrap_or_default();
    let tempo_bpm = first_tempo_uspq.map(|uspq| 60_000_000.0 / uspq as f64);
    score.tempo_bpm = tempo_bpm;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int() as f64,
        Timing::Timecode(fps, subframe) => {
            // Ticks are absolute time; convert through the tempo
            let ticks_per_second = fps.as_f32() as f64 * subframe as f64;
            let bpm = tempo_bpm.unwrap_or(config.notation.default_tempo_bpm);
            ticks_per_second * 60.0 / bpm
        }
    };

    // A single note-less named track in a multi-track file is the conductor; its name is the title
    let voiced_tracks: Vec<usize> = voices.keys().map(|(t, _)| *t).collect();
    if smf.tracks.len() > 1 {
        if let Some(title) = track_names.get(&0) {
            if !voiced_tracks.contains(&0) {
                score.metadata.title = Some(title.clone());
            }
        }
    }

    let grid = config.notation.quantize_divisions as f64;
    let quantize = |ticks: u64| (ticks as f64 / ticks_per_quarter * grid).round() / grid;

    let multi_channel_tracks: Vec<usize> = {
        let mut counts: HashMap<usize, usize> = HashMap::new();
        for (track, _) in voices.keys() {
            *counts.entry(*track).or_default() += 1;
        }
        counts.into_iter().filter(|(_, n)| *n > 1).map(|(t, _)| t).collect()
    };

    for (idx, ((track_idx, channel), voice)) in voices.into_iter().enumerate() {
        let mut part = Part::new(format!("P{}", idx + 1));
        let percussion = channel == PERCUSSION_CHANNEL;

        let instrument = voice
            .program
            .map(|p| instruments::from_midi_program(p, percussion))
            .or_else(|| percussion.then(|| instruments::from_midi_program(0, true)));
        if let Some(mut instrument) = instrument {
            instrument.midi_channel = Some(channel);
            part.instrument = Some(instrument);
        }

        part.name = match track_names.get(&track_idx) {
            Some(name) if multi_channel_tracks.contains(&track_idx) => {
                Some(format!("{} ({})", name, channel + 1))
            }
            Some(name) => Some(name.clone()),
            None => part.instrument.as_ref().map(|i| i.name.clone()),
        };

        let spans = voice
            .notes
            .into_iter()
            .map(|note| {
                let offset = quantize(note.start);
                NoteSpan {
                    offset,
                    duration: (quantize(note.end) - offset).max(1.0 / grid),
                    pitch: Pitch::from_midi(note.key),
                    velocity: note.velocity,
                }
            })
            .collect();
        part.events = group_spans(spans, grid);
        part.sort_events();
        score.parts.push(part);
    }

    tracing::debug!(
        "parsed MIDI: {} parts, {} events",
        score.parts.len(),
        score.events().count()
    );
    Ok(score)
}

/// Assign each part a channel: explicit instrument channel, percussion on 10, others in order
pub(crate) fn assign_channels(score: &Score) -> Vec<u8> {
    let mut melodic = (0..16u8).filter(|c| *c != PERCUSSION_CHANNEL).cycle();
    score
        .parts
        .iter()
        .map(|part| match &part.instrument {
            Some(i) if i.is_percussion() && i.class_name == "UnpitchedPercussion" => {
                PERCUSSION_CHANNEL
            }
            Some(Instrument { midi_channel: Some(c), .. }) if *c < 16 => *c,
            _ => melodic.next().unwrap_or(0),
        })
        .collect()
}

/// Microseconds per quarter for a tempo, within the 24-bit range of a tempo event.
///
/// A non-finite or non-positive tempo falls back to 120 BPM.
pub(crate) fn tempo_to_uspq(bpm: f64) -> u32 {
    const MAX_USPQ: f64 = 0xFF_FFFF as f64;
    let bpm = if bpm.is_finite() && bpm > 0.0 { bpm } else { 120.0 };
    (60_000_000.0 / bpm).round().clamp(1.0, MAX_USPQ) as u32
}

/// Serialize a score as a format-1 Standard MIDI File
pub fn write_midi(score: &Score, config: &Config) -> Result<Vec<u8>> {
    let ppq = config.notation.midi_ppq;
    let tempo_uspq = tempo_to_uspq(score.tempo_bpm.unwrap_or(config.notation.default_tempo_bpm));
    let to_tick = |q: f64| (q * ppq as f64).round().max(0.0) as u64;

    let title = score.metadata.title.clone().unwrap_or_default().into_bytes();
    let names: Vec<Vec<u8>> = score
        .parts
        .iter()
        .map(|p| p.name.clone().unwrap_or_default().into_bytes())
        .collect();

    // Conductor track
    let mut conductor = Vec::new();
    if !title.is_empty() {
        conductor.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(&title)),
        });
    }
    conductor.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(tempo_uspq))),
    });
    let ts = score.time_signature;
    conductor.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            ts.numerator,
            (ts.denominator.max(1) as f32).log2() as u8,
            24, // MIDI clocks per metronome click
            8,  // 32nd notes per quarter note
        )),
    });
    if let Some(key) = score.key_signature {
        conductor.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::KeySignature(key.fifths, key.minor)),
        });
    }
    conductor.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut tracks = vec![conductor];
    let channels = assign_channels(score);

    for ((part, name), &channel) in score.parts.iter().zip(&names).zip(&channels) {
        let mut track = Vec::new();
        if !name.is_empty() {
            track.push(TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name)),
            });
        }
        if let Some(instrument) = &part.instrument {
            if channel != PERCUSSION_CHANNEL {
                track.push(TrackEvent {
                    delta: u28::from(0),
                    kind: TrackEventKind::Midi {
                        channel: u4::from(channel),
                        message: MidiMessage::ProgramChange {
                            program: u7::from(instrument.midi_program),
                        },
                    },
                });
            }
            if let Some(volume) = instrument.volume {
                track.push(TrackEvent {
                    delta: u28::from(0),
                    kind: TrackEventKind::Midi {
                        channel: u4::from(channel),
                        message: MidiMessage::Controller {
                            controller: u7::from(7),
                            value: u7::from(volume.min(127)),
                        },
                    },
                });
            }
        }

        // (tick, is_note_on, key, velocity); note-offs sort before note-ons at the same tick
        let mut timeline: Vec<(u64, bool, u8, u8)> = Vec::new();
        for event in &part.events {
            let start = to_tick(event.offset);
            let end = to_tick(event.end()).max(start + 1);
            let velocity = if event.velocity == 0 {
                DEFAULT_VELOCITY
            } else {
                event.velocity
            };
            for pitch in event.pitches() {
                let key = pitch.midi().clamp(0, 127) as u8;
                timeline.push((start, true, key, velocity.min(127)));
                timeline.push((end, false, key, 0));
            }
        }
        timeline.sort();

        let mut current_tick = 0u64;
        for (tick, is_on, key, velocity) in timeline {
            let delta = (tick - current_tick) as u32;
            current_tick = tick;
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::from(key),
                    vel: u7::from(velocity),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::from(key),
                    vel: u7::from(0),
                }
            };
            track.push(TrackEvent {
                delta: u28::from(delta),
                kind: TrackEventKind::Midi {
                    channel: u4::from(channel),
                    message,
                },
            });
        }

        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        tracks.push(track);
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::from(ppq)),
        },
        tracks,
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| ToolkitError::MidiWrite(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}
