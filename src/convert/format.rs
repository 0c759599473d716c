//! Audio container/codec conversion

use crate::audio::{ensure_parent_dir, extension_of, load_audio_file, write_wav_pcm};
use crate::config::Config;
use crate::error::{require_input, Result, ToolkitError};
use crate::tools::run_tool;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Target audio format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Flac,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
        }
    }

    /// Format implied by a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        extension_of(path).parse().ok()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = ToolkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "ogg" | "oga" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            other => Err(ToolkitError::InvalidArgument(format!(
                "Unsupported audio format '{}' (expected wav, mp3, ogg or flac)",
                other
            ))),
        }
    }
}

/// Pick the target format and output path.
///
/// An explicit format wins; otherwise the output path's extension decides.
/// Without an output path the input's extension is swapped for the format's.
pub fn plan_conversion(
    input: &Path,
    format: Option<AudioFormat>,
    output: Option<&Path>,
) -> Result<(AudioFormat, PathBuf)> {
    let format = match (format, output) {
        (Some(format), _) => format,
        (None, Some(output)) => extension_of(output).parse()?,
        (None, None) => {
            return Err(ToolkitError::InvalidArgument(
                "Must specify either an output format or an output file".to_string(),
            ))
        }
    };
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension(format.extension()));
    Ok((format, output))
}

/// Convert `input` to another audio format.
///
/// WAV is written natively as integer PCM; compressed formats are handed to
/// the configured encoder tool.
pub fn convert_audio_format(
    input: &Path,
    format: Option<AudioFormat>,
    output: Option<&Path>,
    config: &Config,
) -> Result<PathBuf> {
    require_input(input)?;
    let (format, output) = plan_conversion(input, format, output)?;
    ensure_parent_dir(&output)?;
    tracing::info!("Converting {} to {} format", input.display(), format);

    match format {
        AudioFormat::Wav => {
            let buffer = load_audio_file(input)?;
            write_wav_pcm(&output, &buffer, config.audio.wav_bits_per_sample)?;
        }
        AudioFormat::Mp3 | AudioFormat::Ogg | AudioFormat::Flac => {
            let encoder = config.tools.encoder.as_str();
            run_tool(
                encoder,
                [
                    OsStr::new("-y"),
                    OsStr::new("-i"),
                    input.as_os_str(),
                    OsStr::new("-f"),
                    OsStr::new(format.extension()),
                    output.as_os_str(),
                ],
            )?;
            if !output.is_file() {
                return Err(ToolkitError::tool(
                    encoder,
                    format!("no output written to {}", output.display()),
                ));
            }
        }
    }

    tracing::info!("Created audio file: {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("MP3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!(".flac".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert_eq!("aiff".parse::<AudioFormat>().unwrap_err().code(), "E010");
        assert_eq!(AudioFormat::from_path(Path::new("take.OGA")), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::from_path(Path::new("take")), None);
    }

    #[test]
    fn test_plan_defaults() {
        let (format, out) = plan_conversion(Path::new("/a/song.wav"), Some(AudioFormat::Ogg), None).unwrap();
        assert_eq!(format, AudioFormat::Ogg);
        assert_eq!(out, PathBuf::from("/a/song.ogg"));

        let (format, out) =
            plan_conversion(Path::new("/a/song.mp3"), None, Some(Path::new("/b/x.wav"))).unwrap();
        assert_eq!(format, AudioFormat::Wav);
        assert_eq!(out, PathBuf::from("/b/x.wav"));

        assert!(plan_conversion(Path::new("/a/song.mp3"), None, None).is_err());
    }
}
