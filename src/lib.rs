//! Music Tools
//!
//! Audio, MIDI and MusicXML utilities: transcription, notation conversion,
//! score analysis, instrument substitution, stem separation, restoration,
//! format conversion and multi-panel audio visualization. Heavy lifting that
//! needs trained models or codecs is delegated to external command-line tools.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod instruments;
pub mod restoration;
pub mod score;
pub mod separation;
pub mod spectral;
pub mod tools;
pub mod visualizer;

pub use analysis::{analyze_score, change_instrument, ScoreReport};
pub use config::{Config, RestorationSettings};
pub use convert::{
    audio_to_midi, convert_audio_format, midi_to_musicxml, musicxml_to_midi, AudioFormat,
};
pub use error::{Result, ToolkitError};
pub use restoration::restore_audio;
pub use separation::{separate_audio, Stems};
pub use visualizer::visualize_audio;
