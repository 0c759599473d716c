//! Configuration system for the music toolkit

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub tools: ToolsConfig,
    pub audio: AudioConfig,
    pub restoration: RestorationConfig,
    pub notation: NotationConfig,
    pub analysis: AnalysisConfig,
    pub visualizer: VisualizerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            tools: ToolsConfig::default(),
            audio: AudioConfig::default(),
            restoration: RestorationConfig::default(),
            notation: NotationConfig::default(),
            analysis: AnalysisConfig::default(),
            visualizer: VisualizerConfig::default(),
        }
    }
}

/// External command-line tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Note transcription tool, invoked as `<cmd> --save-midi <dir> <file>`
    pub transcriber: String,
    /// Suffix the transcriber appends to the input stem
    pub transcriber_suffix: String,
    /// Source separation tool, invoked as `<cmd> --out <dir> <file>`
    pub separator: String,
    /// Model directory the separator writes stems under
    pub separator_model: String,
    /// Stem names the separator is expected to produce
    pub stems: Vec<String>,
    /// Encoder for non-WAV containers, invoked as `<cmd> -y -i <in> -f <fmt> <out>`
    pub encoder: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            transcriber: "basic-pitch".to_string(),
            transcriber_suffix: "_basic_pitch".to_string(),
            separator: "demucs".to_string(),
            separator_model: "htdemucs".to_string(),
            stems: ["vocals", "drums", "bass", "other"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            encoder: "ffmpeg".to_string(),
        }
    }
}

/// Audio I/O configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Bit depth used for natively written PCM WAV files
    pub wav_bits_per_sample: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            wav_bits_per_sample: 16,
        }
    }
}

/// User-tunable restoration parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationSettings {
    /// Noise reduction strength, 0.0-1.0
    pub noise_reduction: f32,
    /// Low band gain, 0.0-2.0
    pub eq_low: f32,
    /// Mid band gain, 0.0-2.0
    pub eq_mid: f32,
    /// High band gain, 0.0-2.0
    pub eq_high: f32,
}

impl Default for RestorationSettings {
    fn default() -> Self {
        Self {
            noise_reduction: 0.2,
            eq_low: 1.2,
            eq_mid: 1.0,
            eq_high: 1.1,
        }
    }
}

/// Restoration pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestorationConfig {
    pub defaults: RestorationSettings,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Fraction of leading frames used to estimate the noise spectrum
    pub noise_estimate_fraction: f32,
    pub low_cutoff_hz: f32,
    pub high_cutoff_hz: f32,
    /// Omit bands whose gain is exactly 1.0 from the EQ sum
    pub skip_neutral_bands: bool,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            defaults: RestorationSettings::default(),
            n_fft: 2048,
            hop_length: 512,
            noise_estimate_fraction: 0.1,
            low_cutoff_hz: 300.0,
            high_cutoff_hz: 3000.0,
            skip_neutral_bands: false,
        }
    }
}

/// MIDI / MusicXML conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotationConfig {
    /// Grid (per quarter note) MIDI onsets and durations are snapped to
    pub quantize_divisions: u32,
    /// Ticks per quarter note for written MIDI files
    pub midi_ppq: u16,
    /// `<divisions>` value for written MusicXML files
    pub musicxml_divisions: u32,
    /// Tempo assumed when a file carries none
    pub default_tempo_bpm: f64,
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            quantize_divisions: 12,
            midi_ppq: 960,
            musicxml_divisions: 480,
            default_tempo_bpm: 120.0,
        }
    }
}

/// Score analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of pitches listed in the pitch distribution
    pub top_pitches: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { top_pitches: 10 }
    }
}

/// Visualizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub width: u32,
    pub height: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub n_mfcc: usize,
    /// Heatmaps are downsampled to at most this many time columns
    pub max_columns: usize,
    pub rolloff_percent: f32,
    pub hpss_kernel: usize,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            width: 1800,
            height: 2400,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            n_mfcc: 13,
            max_columns: 400,
            rolloff_percent: 0.85,
            hpss_kernel: 31,
        }
    }
}

/// Validate configuration parameters
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    let r = &config.restoration;
    if r.n_fft < 16 || !r.n_fft.is_power_of_two() {
        anyhow::bail!("restoration.n_fft must be a power of two >= 16");
    }
    if r.hop_length == 0 || r.hop_length > r.n_fft {
        anyhow::bail!("restoration.hop_length must be in 1..=n_fft");
    }
    if !(0.0..=1.0).contains(&r.noise_estimate_fraction) {
        anyhow::bail!("restoration.noise_estimate_fraction must be within 0.0-1.0");
    }
    if r.low_cutoff_hz <= 0.0 || r.low_cutoff_hz >= r.high_cutoff_hz {
        anyhow::bail!("restoration.low_cutoff_hz must be > 0 and < high_cutoff_hz");
    }
    validate_settings(&r.defaults)?;

    let n = &config.notation;
    if n.quantize_divisions == 0 || n.musicxml_divisions == 0 || n.midi_ppq == 0 {
        anyhow::bail!("notation divisions and ppq must be non-zero");
    }
    if n.musicxml_divisions % n.quantize_divisions != 0 {
        anyhow::bail!("notation.musicxml_divisions must be a multiple of quantize_divisions");
    }
    if n.default_tempo_bpm <= 0.0 {
        anyhow::bail!("notation.default_tempo_bpm must be positive");
    }

    let v = &config.visualizer;
    if v.n_fft < 16 || !v.n_fft.is_power_of_two() || v.hop_length == 0 {
        anyhow::bail!("visualizer.n_fft must be a power of two >= 16 and hop_length non-zero");
    }
    if v.n_mfcc == 0 || v.n_mfcc > v.n_mels {
        anyhow::bail!("visualizer.n_mfcc must be in 1..=n_mels");
    }
    if v.hpss_kernel == 0 || v.hpss_kernel % 2 == 0 {
        anyhow::bail!("visualizer.hpss_kernel must be odd");
    }

    if config.tools.stems.is_empty() {
        anyhow::bail!("tools.stems must name at least one stem");
    }
    if ![8, 16, 24, 32].contains(&config.audio.wav_bits_per_sample) {
        anyhow::bail!("audio.wav_bits_per_sample must be 8, 16, 24 or 32");
    }

    Ok(())
}

/// Validate restoration settings ranges
pub fn validate_settings(settings: &RestorationSettings) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&settings.noise_reduction) {
        anyhow::bail!(
            "noise_reduction must be within 0.0-1.0 (got {})",
            settings.noise_reduction
        );
    }
    for (name, gain) in [
        ("eq_low", settings.eq_low),
        ("eq_mid", settings.eq_mid),
        ("eq_high", settings.eq_high),
    ] {
        if !(0.0..=2.0).contains(&gain) {
            anyhow::bail!("{} must be within 0.0-2.0 (got {})", name, gain);
        }
    }
    Ok(())
}

/// Load configuration from JSON file
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save configuration to JSON file
pub fn save_config<P: AsRef<std::path::Path>>(config: &Config, path: P) -> anyhow::Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"tools": {"separator": "my-demucs"}}"#).unwrap();
        assert_eq!(config.tools.separator, "my-demucs");
        assert_eq!(config.tools.transcriber, "basic-pitch");
        assert_eq!(config.restoration.n_fft, 2048);
        assert_eq!(config.restoration.defaults, RestorationSettings::default());
    }

    #[test]
    fn test_rejects_out_of_range_settings() {
        let settings = RestorationSettings {
            noise_reduction: 1.5,
            ..Default::default()
        };
        assert!(validate_settings(&settings).is_err());

        let settings = RestorationSettings {
            eq_high: -0.1,
            ..Default::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_rejects_incompatible_divisions() {
        let mut config = Config::default();
        config.notation.musicxml_divisions = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.tools.encoder = "/opt/ffmpeg/bin/ffmpeg".to_string();
        config.restoration.defaults.eq_low = 1.5;
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.tools.encoder, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(loaded.restoration.defaults.eq_low, 1.5);
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"visualizer": {"hpss_kernel": 4}}"#).unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("hpss_kernel"));
    }
}
