//! Source separation through an external stem separator

use crate::audio::ensure_dir;
use crate::config::Config;
use crate::error::{require_input, Result, ToolkitError};
use crate::tools::run_tool;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Stem name -> path of the separated WAV file
pub type Stems = BTreeMap<String, PathBuf>;

/// Default output directory: `separated` next to the input
pub fn default_output_dir(input: &Path) -> PathBuf {
    input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("separated")
}

/// Directory the separator writes the stems of `input` into
pub fn stem_dir(output_dir: &Path, input: &Path, config: &Config) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(&config.tools.separator_model).join(stem)
}

/// Collect the configured stems that exist in `dir`
pub fn collect_stems(dir: &Path, config: &Config) -> Stems {
    config
        .tools
        .stems
        .iter()
        .filter_map(|name| {
            let path = dir.join(format!("{}.wav", name));
            path.is_file().then(|| (name.clone(), path))
        })
        .collect()
}

/// Split `input` into stems with the configured separator tool
pub fn separate_audio(input: &Path, output_dir: Option<&Path>, config: &Config) -> Result<Stems> {
    require_input(input)?;
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_dir(input));
    ensure_dir(&output_dir)?;

    let separator = config.tools.separator.as_str();
    tracing::info!("Separating {} with {}", input.display(), separator);
    run_tool(
        separator,
        [
            OsStr::new("--out"),
            output_dir.as_os_str(),
            input.as_os_str(),
        ],
    )?;

    let dir = stem_dir(&output_dir, input, config);
    if !dir.is_dir() {
        return Err(ToolkitError::tool(
            separator,
            format!("expected output directory {} was not created", dir.display()),
        ));
    }

    let stems = collect_stems(&dir, config);
    if stems.is_empty() {
        return Err(ToolkitError::tool(
            separator,
            format!("no stems found in {}", dir.display()),
        ));
    }
    for (name, path) in &stems {
        tracing::debug!("stem {} -> {}", name, path.display());
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_dir_layout() {
        let config = Config::default();
        let dir = stem_dir(Path::new("/out"), Path::new("/music/song.mp3"), &config);
        assert_eq!(dir, PathBuf::from("/out/htdemucs/song"));
        assert_eq!(
            default_output_dir(Path::new("/music/song.mp3")),
            PathBuf::from("/music/separated")
        );
    }

    #[test]
    fn test_missing_input() {
        let err = separate_audio(Path::new("/no/such/file.wav"), None, &Config::default()).unwrap_err();
        assert_eq!(err.code(), "E001");
    }
}
