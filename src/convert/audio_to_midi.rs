//! Audio to MIDI transcription through an external pitch-detection tool

use crate::audio::{ensure_dir, find_files};
use crate::config::Config;
use crate::error::{require_input, Result, ToolkitError};
use crate::tools::run_tool;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Locate the MIDI file the transcriber wrote into `dir`.
///
/// Prefers `<stem><suffix>.mid`, then the first `*.mid` by name.
pub fn find_transcription(dir: &Path, input: &Path, config: &Config) -> Result<Option<PathBuf>> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let expected = dir.join(format!("{}{}.mid", stem, config.tools.transcriber_suffix));
    if expected.is_file() {
        return Ok(Some(expected));
    }
    Ok(find_files(dir, "mid")?.into_iter().next())
}

/// Transcribe `input` to MIDI, writing `<stem>.mid` next to it unless `output` is given
pub fn audio_to_midi(input: &Path, output: Option<&Path>, config: &Config) -> Result<PathBuf> {
    require_input(input)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("mid"));

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&dir)?;

    let transcriber = config.tools.transcriber.as_str();
    tracing::info!("Analyzing audio file: {}", input.display());
    run_tool(
        transcriber,
        [
            OsStr::new("--save-midi"),
            dir.as_os_str(),
            input.as_os_str(),
        ],
    )?;

    let generated = find_transcription(&dir, input, config)?.ok_or_else(|| {
        ToolkitError::tool(transcriber, "could not find generated MIDI file")
    })?;
    if generated != output {
        std::fs::copy(&generated, &output)?;
        tracing::debug!("copied {} -> {}", generated.display(), output.display());
    }

    tracing::info!("Created MIDI file: {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_suffixed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mid"), b"x").unwrap();
        std::fs::write(dir.path().join("song_basic_pitch.mid"), b"x").unwrap();
        let found = find_transcription(dir.path(), Path::new("song.wav"), &Config::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "song_basic_pitch.mid");
    }

    #[test]
    fn test_falls_back_to_first_midi_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeta.mid"), b"x").unwrap();
        std::fs::write(dir.path().join("alpha.mid"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let found = find_transcription(dir.path(), Path::new("song.wav"), &Config::default())
            .unwrap()
            .unwrap();
        assert_eq!(found.file_name().unwrap(), "alpha.mid");
    }

    #[test]
    fn test_empty_dir_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let found = find_transcription(dir.path(), Path::new("song.wav"), &Config::default()).unwrap();
        assert!(found.is_none());
    }
}
