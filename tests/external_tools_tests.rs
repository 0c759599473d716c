//! Transcription and separation driven through stand-in shell scripts

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `sh` script and return its path
#[cfg(unix)]
fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use music_tools::{audio_to_midi, convert_audio_format, separate_audio, AudioFormat, Config};

    // One test only: exec of a script another thread still holds open fails with ETXTBSY
    #[test]
    fn test_external_tool_workflows() {
        let tools = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let input = work.path().join("song.wav");
        std::fs::write(&input, b"not really audio").unwrap();

        // Separator: `--out <dir> <input>`, writes two of the four stems
        let separator = script(
            tools.path(),
            "separator.sh",
            r#"stem=$(basename "$3"); stem="${stem%.*}"
mkdir -p "$2/htdemucs/$stem"
printf x > "$2/htdemucs/$stem/vocals.wav"
printf x > "$2/htdemucs/$stem/drums.wav""#,
        );
        // Transcriber: `--save-midi <dir> <input>`
        let transcriber = script(
            tools.path(),
            "transcriber.sh",
            r#"stem=$(basename "$3"); stem="${stem%.*}"
printf 'MThd' > "$2/${stem}_basic_pitch.mid""#,
        );
        // Encoder: records its arguments into the output file
        let encoder = script(tools.path(), "encoder.sh", r#"printf '%s\n' "$@" > "$6""#);
        let failing = script(tools.path(), "failing.sh", "echo boom >&2\nexit 3");

        let mut config = Config::default();
        config.tools.separator = separator.to_string_lossy().into_owned();
        config.tools.transcriber = transcriber.to_string_lossy().into_owned();
        config.tools.encoder = encoder.to_string_lossy().into_owned();

        let encoded = convert_audio_format(&input, Some(AudioFormat::Ogg), None, &config).unwrap();
        assert_eq!(encoded, work.path().join("song.ogg"));
        let args = std::fs::read_to_string(&encoded).unwrap();
        let expected = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-f".to_string(),
            "ogg".to_string(),
            encoded.to_string_lossy().into_owned(),
        ];
        assert_eq!(args.lines().map(str::to_string).collect::<Vec<_>>(), expected);

        let stems = separate_audio(&input, None, &config).unwrap();
        let names: Vec<&str> = stems.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["drums", "vocals"]);
        for path in stems.values() {
            assert!(path.is_file());
            assert!(path.starts_with(work.path().join("separated/htdemucs/song")));
        }

        let midi_out = work.path().join("midi/song.mid");
        let path = audio_to_midi(&input, Some(&midi_out), &config).unwrap();
        assert_eq!(path, midi_out);
        assert_eq!(std::fs::read(&midi_out).unwrap(), b"MThd");

        config.tools.separator = failing.to_string_lossy().into_owned();
        let err = separate_audio(&input, Some(&work.path().join("fail")), &config).unwrap_err();
        assert_eq!(err.code(), "E002");
        assert!(err.to_string().contains("boom"));

        config.tools.transcriber = tools.path().join("does-not-exist").to_string_lossy().into_owned();
        let err = audio_to_midi(&input, None, &config).unwrap_err();
        assert_eq!(err.code(), "E002");
    }
}
