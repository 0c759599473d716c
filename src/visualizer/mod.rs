//! Multi-panel audio analysis image

pub mod features;

use crate::audio::{ensure_parent_dir, load_mono, resolve_output};
use crate::config::{Config, VisualizerConfig};
use crate::error::{require_input, Result, ToolkitError};
use crate::spectral::{
    amplitude_to_db, frame_times, magnitude_spectrogram, mel_spectrogram, power_spectrogram,
    power_to_db, stft,
};
use features::PITCH_CLASSES;
use ndarray::Array2;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const BACKGROUND: RGBColor = RGBColor(18, 18, 24);
const FOREGROUND: RGBColor = RGBColor(220, 220, 220);
const GRID: RGBColor = RGBColor(60, 60, 70);
const ACCENT: RGBColor = RGBColor(80, 170, 255);
const HIGHLIGHT: RGBColor = RGBColor(255, 90, 90);
const HARMONIC: RGBColor = RGBColor(90, 200, 120);
const PERCUSSIVE: RGBColor = RGBColor(240, 160, 60);

const MAX_HEATMAP_ROWS: usize = 128;

/// Every feature drawn on the image, computed up front
pub struct FeatureSet {
    pub sample_rate: u32,
    pub duration: f32,
    pub waveform: Vec<(f32, f32)>,
    pub spectrogram_db: Array2<f32>,
    pub mel_db: Array2<f32>,
    pub chroma: Array2<f32>,
    pub mfcc: Array2<f32>,
    pub times: Vec<f32>,
    pub onset_env: Vec<f32>,
    pub onsets: Vec<usize>,
    pub centroid: Vec<f32>,
    pub chroma_mean: Vec<f32>,
    pub key_index: Option<usize>,
    pub tempo_bpm: Option<f32>,
    pub beats: Vec<usize>,
    pub harmonic: Vec<(f32, f32)>,
    pub percussive: Vec<(f32, f32)>,
    pub bandwidth: Vec<f32>,
    pub contrast: Array2<f32>,
    pub rolloff: Vec<f32>,
    pub zcr: Vec<f32>,
}

impl FeatureSet {
    /// Run every analysis over a mono signal
    pub fn compute(y: &[f32], sample_rate: u32, config: &VisualizerConfig) -> Result<Self> {
        if y.is_empty() {
            return Err(ToolkitError::Visualization(
                "Cannot visualize an empty signal".to_string(),
            ));
        }
        let (n_fft, hop) = (config.n_fft, config.hop_length);
        let spec = stft(y, n_fft, hop, "hann", sample_rate);
        let mag = magnitude_spectrogram(&spec);
        let power = power_spectrogram(&spec);
        let mel = mel_spectrogram(&spec, sample_rate, config.n_mels);
        let mel_db = power_to_db(&mel, 80.0);

        let onset_env = features::onset_strength(&mel_db);
        let onsets = features::onset_detect(&onset_env, 0.07, 10);
        let tempo_bpm = features::estimate_tempo(&onset_env, sample_rate, hop);
        let beats = tempo_bpm
            .map(|t| features::track_beats(&onset_env, t, sample_rate, hop))
            .unwrap_or_default();

        let chroma = features::chroma(&power, &spec.freqs);
        let key_index = features::estimate_key_index(&chroma);
        let chroma_mean = features::row_means(&chroma).to_vec();

        let centroid = features::spectral_centroid(&mag, &spec.freqs);
        let bandwidth = features::spectral_bandwidth(&mag, &spec.freqs, &centroid);
        let rolloff = features::spectral_rolloff(&mag, &spec.freqs, config.rolloff_percent);
        let contrast = features::spectral_contrast(&mag, &spec.freqs, 6, 200.0);
        let zcr = features::zero_crossing_rate(y, n_fft, hop);

        let (harmonic, percussive) = features::hpss(&spec, config.hpss_kernel, y.len());
        let buckets = config.width as usize;

        tracing::debug!(
            "visualizer features: {} frames, tempo {:?}, {} onsets",
            spec.n_frames(),
            tempo_bpm,
            onsets.len()
        );

        Ok(Self {
            sample_rate,
            duration: y.len() as f32 / sample_rate as f32,
            waveform: features::waveform_envelope(y, buckets),
            spectrogram_db: features::downsample(
                &amplitude_to_db(&mag, 80.0),
                MAX_HEATMAP_ROWS,
                config.max_columns,
            ),
            mfcc: features::downsample(
                &features::mfcc(&mel_db, config.n_mfcc),
                MAX_HEATMAP_ROWS,
                config.max_columns,
            ),
            mel_db: features::downsample(&mel_db, MAX_HEATMAP_ROWS, config.max_columns),
            chroma: features::downsample(&chroma, 12, config.max_columns),
            contrast: features::downsample(&contrast, 12, config.max_columns),
            times: frame_times(spec.n_frames(), hop, sample_rate),
            onset_env,
            onsets,
            centroid,
            chroma_mean,
            key_index,
            tempo_bpm,
            beats,
            harmonic: features::waveform_envelope(&harmonic, buckets),
            percussive: features::waveform_envelope(&percussive, buckets),
            bandwidth,
            rolloff,
            zcr,
        })
    }

    /// Estimated key name, e.g. `A`
    pub fn key_name(&self) -> &'static str {
        self.key_index.map_or("?", |i| PITCH_CLASSES[i])
    }
}

fn plot_err<E: std::fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> ToolkitError {
    move |e| ToolkitError::Visualization(format!("Failed to {}: {:?}", what, e))
}

fn caption_style(size: u32) -> TextStyle<'static> {
    ("sans-serif", size).into_font().color(&FOREGROUND)
}

/// Map 0..1 to a dark-to-bright palette
fn heat_color(v: f32) -> RGBColor {
    const STOPS: [(f32, (f32, f32, f32)); 5] = [
        (0.0, (0.0, 0.0, 4.0)),
        (0.25, (80.0, 18.0, 123.0)),
        (0.5, (182.0, 54.0, 121.0)),
        (0.75, (251.0, 136.0, 97.0)),
        (1.0, (252.0, 253.0, 191.0)),
    ];
    let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    for pair in STOPS.windows(2) {
        let (p0, c0) = pair[0];
        let (p1, c1) = pair[1];
        if v <= p1 {
            let t = (v - p0) / (p1 - p0);
            let lerp = |a: f32, b: f32| (a + (b - a) * t).round() as u8;
            return RGBColor(lerp(c0.0, c1.0), lerp(c0.1, c1.1), lerp(c0.2, c1.2));
        }
    }
    RGBColor(252, 253, 191)
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Heatmap of a (rows, cols) array; rows run bottom to top over `y_range`
fn draw_heatmap(
    area: &Area,
    title: &str,
    data: &Array2<f32>,
    duration: f32,
    y_range: (f32, f32),
    y_desc: &str,
) -> Result<()> {
    let (rows, cols) = data.dim();
    let mut chart = ChartBuilder::on(area)
        .caption(title, caption_style(18))
        .margin(8)
        .x_label_area_size(28)
        .y_label_area_size(48)
        .build_cartesian_2d(0f32..duration.max(1e-3), y_range.0..y_range.1)
        .map_err(plot_err("build chart"))?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time (s)")
        .y_desc(y_desc)
        .axis_style(&GRID)
        .label_style(caption_style(11))
        .draw()
        .map_err(plot_err("draw mesh"))?;

    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let (lo, hi) = data
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = (hi - lo).max(1e-9);
    let dx = duration / cols as f32;
    let dy = (y_range.1 - y_range.0) / rows as f32;

    chart
        .draw_series((0..rows).flat_map(|r| {
            (0..cols).map(move |c| {
                let x0 = c as f32 * dx;
                let y0 = y_range.0 + r as f32 * dy;
                Rectangle::new(
                    [(x0, y0), (x0 + dx, y0 + dy)],
                    heat_color((data[[r, c]] - lo) / span).filled(),
                )
            })
        }))
        .map_err(plot_err("draw heatmap"))?;
    Ok(())
}

/// Min/max envelope drawn as vertical bars
fn draw_envelope(
    area: &Area,
    title: &str,
    envelope: &[(f32, f32)],
    duration: f32,
    color: RGBColor,
) -> Result<()> {
    let amp = envelope
        .iter()
        .fold(1e-6f32, |a, &(lo, hi)| a.max(lo.abs()).max(hi.abs()));
    let mut chart = ChartBuilder::on(area)
        .caption(title, caption_style(18))
        .margin(8)
        .x_label_area_size(28)
        .y_label_area_size(48)
        .build_cartesian_2d(0f32..duration.max(1e-3), -amp..amp)
        .map_err(plot_err("build chart"))?;
    chart
        .configure_mesh()
        .light_line_style(&GRID)
        .bold_line_style(&GRID)
        .axis_style(&GRID)
        .label_style(caption_style(11))
        .x_desc("Time (s)")
        .draw()
        .map_err(plot_err("draw mesh"))?;

    let step = duration / envelope.len().max(1) as f32;
    chart
        .draw_series(envelope.iter().enumerate().map(|(i, &(lo, hi))| {
            let x = i as f32 * step;
            PathElement::new(vec![(x, lo), (x, hi)], color.stroke_width(1))
        }))
        .map_err(plot_err("draw waveform"))?;
    Ok(())
}

/// A per-frame curve, optionally with vertical markers at selected frames
#[allow(clippy::too_many_arguments)]
fn draw_curve(
    area: &Area,
    title: &str,
    times: &[f32],
    values: &[f32],
    duration: f32,
    y_desc: &str,
    markers: &[usize],
    log_y: bool,
) -> Result<()> {
    let max = values.iter().fold(1e-6f32, |a, &b| a.max(b)) * 1.05;
    let points = times.iter().copied().zip(values.iter().copied());

    if log_y {
        let min = values
            .iter()
            .copied()
            .filter(|v| *v > 0.0)
            .fold(max, f32::min)
            .max(1.0);
        let mut chart = ChartBuilder::on(area)
            .caption(title, caption_style(18))
            .margin(8)
            .x_label_area_size(28)
            .y_label_area_size(48)
            .build_cartesian_2d(0f32..duration.max(1e-3), (min..max.max(min * 2.0)).log_scale())
            .map_err(plot_err("build chart"))?;
        chart
            .configure_mesh()
            .light_line_style(&GRID)
            .bold_line_style(&GRID)
            .axis_style(&GRID)
            .label_style(caption_style(11))
            .x_desc("Time (s)")
            .y_desc(y_desc)
            .draw()
            .map_err(plot_err("draw mesh"))?;
        chart
            .draw_series(LineSeries::new(points.map(|(t, v)| (t, v.max(min))), &ACCENT))
            .map_err(plot_err("draw curve"))?;
        return Ok(());
    }

    let mut chart = ChartBuilder::on(area)
        .caption(title, caption_style(18))
        .margin(8)
        .x_label_area_size(28)
        .y_label_area_size(48)
        .build_cartesian_2d(0f32..duration.max(1e-3), 0f32..max)
        .map_err(plot_err("build chart"))?;
    chart
        .configure_mesh()
        .light_line_style(&GRID)
        .bold_line_style(&GRID)
        .axis_style(&GRID)
        .label_style(caption_style(11))
        .x_desc("Time (s)")
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err("draw mesh"))?;
    chart
        .draw_series(LineSeries::new(points, &ACCENT))
        .map_err(plot_err("draw curve"))?;
    chart
        .draw_series(markers.iter().filter_map(|&i| times.get(i)).map(|&t| {
            PathElement::new(vec![(t, 0.0), (t, max)], HIGHLIGHT.mix(0.7).stroke_width(1))
        }))
        .map_err(plot_err("draw markers"))?;
    Ok(())
}

fn draw_key_bars(area: &Area, features: &FeatureSet) -> Result<()> {
    let max = features.chroma_mean.iter().fold(1e-6f32, |a, &b| a.max(b)) * 1.1;
    let title = format!("Key Analysis (estimated: {})", features.key_name());
    let mut chart = ChartBuilder::on(area)
        .caption(title, caption_style(18))
        .margin(8)
        .x_label_area_size(28)
        .y_label_area_size(48)
        .build_cartesian_2d((0..12usize).into_segmented(), 0f32..max)
        .map_err(plot_err("build chart"))?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .light_line_style(&GRID)
        .bold_line_style(&GRID)
        .axis_style(&GRID)
        .label_style(caption_style(11))
        .x_labels(12)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                PITCH_CLASSES.get(*i).copied().unwrap_or("").to_string()
            }
            SegmentValue::Last => String::new(),
        })
        .y_desc("Mean chroma")
        .draw()
        .map_err(plot_err("draw mesh"))?;
    chart
        .draw_series(features.chroma_mean.iter().enumerate().map(|(i, &v)| {
            let color = if Some(i) == features.key_index { HIGHLIGHT } else { ACCENT };
            Rectangle::new(
                [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), v)],
                color.filled(),
            )
        }))
        .map_err(plot_err("draw bars"))?;
    Ok(())
}

/// Render the 5x3 analysis grid into a PNG
pub fn render(features: &FeatureSet, path: &Path, config: &VisualizerConfig) -> Result<()> {
    let root = BitMapBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&BACKGROUND).map_err(plot_err("fill background"))?;
    let panels = root.split_evenly((5, 3));

    let d = features.duration;
    let nyquist = features.sample_rate as f32 / 2.0;
    let f = features;

    draw_envelope(&panels[0], "Waveform", &f.waveform, d, ACCENT)?;
    draw_heatmap(&panels[1], "Spectrogram (dB)", &f.spectrogram_db, d, (0.0, nyquist), "Hz")?;
    draw_heatmap(&panels[2], "Mel Spectrogram (dB)", &f.mel_db, d, (0.0, f.mel_db.nrows() as f32), "Mel band")?;
    draw_heatmap(&panels[3], "Chromagram", &f.chroma, d, (0.0, 12.0), "Pitch class")?;
    draw_heatmap(&panels[4], "MFCC", &f.mfcc, d, (0.0, f.mfcc.nrows() as f32), "Coefficient")?;
    draw_curve(&panels[5], "Onset Strength", &f.times, &f.onset_env, d, "Strength", &f.onsets, false)?;
    draw_curve(&panels[6], "Spectral Centroid", &f.times, &f.centroid, d, "Hz", &[], true)?;
    draw_key_bars(&panels[7], f)?;
    let rhythm_title = match f.tempo_bpm {
        Some(bpm) => format!("Rhythm (tempo: {:.1} BPM)", bpm),
        None => "Rhythm (tempo: unknown)".to_string(),
    };
    draw_curve(&panels[8], &rhythm_title, &f.times, &f.onset_env, d, "Strength", &f.beats, false)?;
    draw_envelope(&panels[9], "Harmonic Component", &f.harmonic, d, HARMONIC)?;
    draw_envelope(&panels[10], "Percussive Component", &f.percussive, d, PERCUSSIVE)?;
    draw_curve(&panels[11], "Spectral Bandwidth", &f.times, &f.bandwidth, d, "Hz", &[], false)?;
    draw_heatmap(&panels[12], "Spectral Contrast", &f.contrast, d, (0.0, f.contrast.nrows() as f32), "Band")?;
    draw_curve(&panels[13], "Spectral Rolloff (85%)", &f.times, &f.rolloff, d, "Hz", &[], false)?;
    draw_curve(&panels[14], "Zero Crossing Rate", &f.times, &f.zcr, d, "Rate", &[], false)?;

    root.present().map_err(plot_err("write image"))?;
    Ok(())
}

/// Analyze an audio file and save the panel image to `<stem>_visualization.png` (or `output`)
pub fn visualize_audio(input: &Path, output: Option<&Path>, config: &Config) -> Result<PathBuf> {
    require_input(input)?;
    let output = resolve_output(input, output, "_visualization", "png");
    ensure_parent_dir(&output)?;

    tracing::info!("Loading audio file: {}", input.display());
    let (y, sample_rate) = load_mono(input)?;
    let features = FeatureSet::compute(&y, sample_rate, &config.visualizer)?;
    render(&features, &output, &config.visualizer)?;

    tracing::info!("Visualization saved to {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(0, 0, 4));
        assert_eq!(heat_color(1.0), RGBColor(252, 253, 191));
        assert_eq!(heat_color(f32::NAN), RGBColor(0, 0, 4));
    }

    #[test]
    fn test_feature_set_for_tone() {
        let sr = 22050;
        let y: Vec<f32> = (0..sr as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        let config = VisualizerConfig::default();
        let features = FeatureSet::compute(&y, sr, &config).unwrap();
        assert_eq!(features.key_name(), "A");
        assert_eq!(features.chroma.nrows(), 12);
        assert_eq!(features.contrast.nrows(), 7);
        assert_eq!(features.times.len(), features.centroid.len());
        assert!(features.spectrogram_db.ncols() <= config.max_columns);
        assert!((features.duration - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_signal_is_error() {
        let err = FeatureSet::compute(&[], 22050, &VisualizerConfig::default()).err().unwrap();
        assert_eq!(err.code(), "E012");
    }
}
