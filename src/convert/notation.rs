//! MIDI and MusicXML conversion through the shared score model

use crate::config::Config;
use crate::error::{require_input, Result};
use crate::score::{read_score, write_score, ScoreFormat};
use std::path::{Path, PathBuf};

/// Read any supported notation file and write it in `target` format.
///
/// Without `output`, the input's extension is replaced by the target's.
pub fn convert_score(
    input: &Path,
    output: Option<&Path>,
    target: ScoreFormat,
    config: &Config,
) -> Result<PathBuf> {
    require_input(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension(target.extension()));

    let score = read_score(input, config)?;
    tracing::info!(
        "Read {} part(s), {} event(s) from {}",
        score.parts.len(),
        score.events().count(),
        input.display()
    );
    write_score(&score, &output, target, config)?;
    tracing::info!("Created {:?} file: {}", target, output.display());
    Ok(output)
}

/// Convert a MIDI file to MusicXML
pub fn midi_to_musicxml(input: &Path, output: Option<&Path>, config: &Config) -> Result<PathBuf> {
    convert_score(input, output, ScoreFormat::MusicXml, config)
}

/// Convert a MusicXML file to MIDI
pub fn musicxml_to_midi(input: &Path, output: Option<&Path>, config: &Config) -> Result<PathBuf> {
    convert_score(input, output, ScoreFormat::Midi, config)
}
