//! Audio restoration: spectral-subtraction noise reduction and three-band EQ

use crate::audio::{self, load_mono, peak_normalize, resolve_output, write_wav_float};
use crate::config::{validate_settings, Config, RestorationConfig, RestorationSettings};
use crate::error::{require_input, Result, ToolkitError};
use crate::filter::{Biquad, FilterType};
use crate::spectral::{inverse_stft, stft};
use ndarray::Axis;
use rustfft::num_complex::Complex32;
use std::path::{Path, PathBuf};

/// Reduce stationary noise by subtracting a scaled noise magnitude profile.
///
/// The profile is the per-bin mean magnitude of the leading
/// `noise_estimate_fraction` of frames (at least one). Magnitudes are
/// floored at zero and recombined with the original phase.
pub fn reduce_noise(y: &[f32], sample_rate: u32, strength: f32, config: &RestorationConfig) -> Vec<f32> {
    if strength <= 0.0 || y.is_empty() {
        return y.to_vec();
    }

    let mut spec = stft(y, config.n_fft, config.hop_length, "hann", sample_rate);
    let n_frames = spec.n_frames();
    let noise_frames = ((n_frames as f32 * config.noise_estimate_fraction) as usize).clamp(1, n_frames);

    let magnitude = spec.s.mapv(|c| c.norm());
    let noise_profile = magnitude
        .slice(ndarray::s![.., ..noise_frames])
        .mean_axis(Axis(1))
        .unwrap_or_else(|| ndarray::Array1::zeros(spec.n_bins()));

    let scale = 1.0 - strength;
    for (bin, mut row) in spec.s.axis_iter_mut(Axis(0)).enumerate() {
        let noise = noise_profile[bin] * scale;
        for value in row.iter_mut() {
            let mag = value.norm();
            let reduced = (mag - noise).max(0.0);
            *value = if mag > 0.0 {
                *value * (reduced / mag)
            } else {
                Complex32::new(0.0, 0.0)
            };
        }
    }

    tracing::debug!(
        "noise reduction: {} frames, profile from {} frames, scale {:.2}",
        n_frames,
        noise_frames,
        scale
    );
    inverse_stft(&spec.s, config.n_fft, config.hop_length, "hann", y.len())
}

/// Split into low/mid/high bands with zero-phase Butterworth filters and recombine with gains.
///
/// When every gain is 1.0 the signal is returned untouched. Otherwise the
/// bands are summed and the result is peak-normalized. With
/// `skip_neutral_bands` set, bands whose gain is exactly 1.0 are left out of the sum.
pub fn equalize(
    y: &[f32],
    sample_rate: u32,
    settings: &RestorationSettings,
    config: &RestorationConfig,
) -> Result<Vec<f32>> {
    let gains = [settings.eq_low, settings.eq_mid, settings.eq_high];
    if gains.iter().all(|&g| g == 1.0) {
        tracing::debug!("all EQ gains neutral, skipping equalization");
        return Ok(y.to_vec());
    }

    let lowpass_low = Biquad::butterworth(FilterType::Lowpass, config.low_cutoff_hz, sample_rate)?;
    let highpass_low = Biquad::butterworth(FilterType::Highpass, config.low_cutoff_hz, sample_rate)?;
    let lowpass_high = Biquad::butterworth(FilterType::Lowpass, config.high_cutoff_hz, sample_rate)?;
    let highpass_high = Biquad::butterworth(FilterType::Highpass, config.high_cutoff_hz, sample_rate)?;

    let mut out = vec![0.0f32; y.len()];
    let mut add_band = |band: Vec<f32>, gain: f32| {
        for (o, b) in out.iter_mut().zip(band) {
            *o += b * gain;
        }
    };

    let include = |gain: f32| !(config.skip_neutral_bands && gain == 1.0);

    if include(settings.eq_low) {
        add_band(lowpass_low.filtfilt(y), settings.eq_low);
    }
    if include(settings.eq_mid) {
        let mid = lowpass_high.filtfilt(&highpass_low.filtfilt(y));
        add_band(mid, settings.eq_mid);
    }
    if include(settings.eq_high) {
        add_band(highpass_high.filtfilt(y), settings.eq_high);
    }

    peak_normalize(&mut out);
    Ok(out)
}

/// Restore an audio file and write `<stem>_restored.wav` (or `output`)
pub fn restore_audio(
    input: &Path,
    output: Option<&Path>,
    settings: &RestorationSettings,
    config: &Config,
) -> Result<PathBuf> {
    require_input(input)?;
    validate_settings(settings).map_err(|e| ToolkitError::InvalidArgument(e.to_string()))?;

    let output = resolve_output(input, output, "_restored", "wav");
    tracing::info!(
        "Restoring {} (noise_reduction={}, eq_low={}, eq_mid={}, eq_high={})",
        input.display(),
        settings.noise_reduction,
        settings.eq_low,
        settings.eq_mid,
        settings.eq_high
    );

    let (y, sample_rate) = load_mono(input)?;
    let denoised = reduce_noise(&y, sample_rate, settings.noise_reduction, &config.restoration);
    let restored = equalize(&denoised, sample_rate, settings, &config.restoration)?;

    audio::ensure_parent_dir(&output)?;
    write_wav_float(&output, &restored, sample_rate)?;
    tracing::info!("Restored audio written to {}", output.display());
    Ok(output)
}
