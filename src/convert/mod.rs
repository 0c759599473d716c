//! Conversions between audio formats, audio and MIDI, and notation formats

pub mod audio_to_midi;
pub mod format;
pub mod notation;

pub use audio_to_midi::audio_to_midi;
pub use format::{convert_audio_format, AudioFormat};
pub use notation::{convert_score, midi_to_musicxml, musicxml_to_midi};
