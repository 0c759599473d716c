//! Audio format conversion and missing-input handling

use music_tools::audio::{file_info, load_audio_file};
use music_tools::convert::format::plan_conversion;
use music_tools::{
    analyze_score, audio_to_midi, change_instrument, convert_audio_format, midi_to_musicxml,
    musicxml_to_midi, restore_audio, separate_audio, visualize_audio, AudioFormat, Config,
    RestorationSettings,
};
use std::f32::consts::PI;
use std::path::Path;

/// Stereo 32-bit float WAV with a tone on each channel
fn write_float_stereo(path: &Path, sample_rate: u32, frames: usize) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        writer.write_sample(0.5 * (2.0 * PI * 330.0 * t).sin()).unwrap();
        writer.write_sample(0.5 * (2.0 * PI * 550.0 * t).sin()).unwrap();
    }
    writer.finalize().unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_conversion_preserves_duration() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("float.wav");
        write_float_stereo(&input, 44100, 22050);
        let output = dir.path().join("converted/pcm.wav");

        let path = convert_audio_format(&input, Some(AudioFormat::Wav), Some(&output), &Config::default())
            .unwrap();
        assert_eq!(path, output);

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.spec().bits_per_sample, 16);

        let original = load_audio_file(&input).unwrap();
        let converted = load_audio_file(&output).unwrap();
        assert_eq!(converted.n_channels(), 2);
        assert_eq!(converted.sample_rate, original.sample_rate);
        assert!((converted.duration_sec() - original.duration_sec()).abs() < 1e-3);
    }

    #[test]
    fn test_format_from_output_extension() {
        let (format, output) =
            plan_conversion(Path::new("a/song.wav"), None, Some(Path::new("b/song.FLAC"))).unwrap();
        assert_eq!(format, AudioFormat::Flac);
        assert_eq!(output, Path::new("b/song.FLAC"));

        let err = plan_conversion(Path::new("song.wav"), None, None).unwrap_err();
        assert_eq!(err.code(), "E010");
    }

    #[test]
    fn test_file_info_reports_audio_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("info.wav");
        write_float_stereo(&input, 8000, 8000);

        let info = file_info(&input).unwrap();
        assert_eq!(info.name, "info.wav");
        assert_eq!(info.extension, ".wav");
        let audio = info.audio.unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 2);
        assert!((audio.duration_sec - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_input_fails_everywhere_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wav");
        let config = Config::default();

        let results = vec![
            audio_to_midi(&missing, None, &config).map(|_| ()),
            midi_to_musicxml(&missing, None, &config).map(|_| ()),
            musicxml_to_midi(&missing, None, &config).map(|_| ()),
            analyze_score(&missing, &config).map(|_| ()),
            change_instrument(&missing, "violin", None, &config).map(|_| ()),
            separate_audio(&missing, None, &config).map(|_| ()),
            visualize_audio(&missing, None, &config).map(|_| ()),
            restore_audio(&missing, None, &RestorationSettings::default(), &config).map(|_| ()),
            convert_audio_format(&missing, Some(AudioFormat::Mp3), None, &config).map(|_| ()),
            file_info(&missing).map(|_| ()),
        ];
        for result in results {
            let err = result.unwrap_err();
            assert_eq!(err.code(), "E001", "{}", err);
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }
}
