//! Spectral processing utilities (STFT, ISTFT, mel filterbank, dB scaling)

use ndarray::Array2;
use rustfft::{num_complex::Complex32, FftPlanner};

/// STFT data structure
#[derive(Debug, Clone)]
pub struct StftData {
    /// Complex spectrogram, shape (n_fft / 2 + 1, n_frames)
    pub s: Array2<Complex32>,
    pub freqs: Vec<f32>,
    pub times: Vec<f32>,
    pub n_fft: usize,
    pub hop_length: usize,
}

impl StftData {
    pub fn n_bins(&self) -> usize {
        self.s.shape()[0]
    }

    pub fn n_frames(&self) -> usize {
        self.s.shape()[1]
    }
}

/// Compute a centered STFT; the signal is reflect-padded by `n_fft / 2` on both sides
pub fn stft(y: &[f32], n_fft: usize, hop_length: usize, window: &str, sample_rate: u32) -> StftData {
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut padded = pad_center(y, n_fft / 2);
    if padded.len() < n_fft {
        padded.resize(n_fft, 0.0);
    }
    let n_frames = (padded.len() - n_fft) / hop_length + 1;
    let n_bins = n_fft / 2 + 1;
    let mut s = Array2::<Complex32>::zeros((n_bins, n_frames));

    let window_fn = generate_window(window, n_fft);

    for frame_idx in 0..n_frames {
        let start = frame_idx * hop_length;

        let mut frame: Vec<Complex32> = padded[start..start + n_fft]
            .iter()
            .zip(&window_fn)
            .map(|(&sample, &win)| Complex32::new(sample * win, 0.0))
            .collect();

        fft.process(&mut frame);

        for (i, &val) in frame[..n_bins].iter().enumerate() {
            s[[i, frame_idx]] = val;
        }
    }

    StftData {
        s,
        freqs: fft_frequencies(sample_rate, n_fft),
        times: frame_times(n_frames, hop_length, sample_rate),
        n_fft,
        hop_length,
    }
}

/// Inverse of [`stft`]: windowed overlap-add, trimmed or zero-padded to `length`
pub fn inverse_stft(
    s: &Array2<Complex32>,
    n_fft: usize,
    hop_length: usize,
    window: &str,
    length: usize,
) -> Vec<f32> {
    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(n_fft);

    let n_frames = s.shape()[1];
    if n_frames == 0 {
        return vec![0.0; length];
    }
    let expected_length = (n_frames - 1) * hop_length + n_fft;
    let window_fn = generate_window(window, n_fft);

    let mut y = vec![0.0f32; expected_length];
    let mut window_sum = vec![0.0f32; expected_length];

    for frame_idx in 0..n_frames {
        let mut frame: Vec<Complex32> = s.column(frame_idx).iter().cloned().collect();

        // Rebuild the conjugate-symmetric negative frequencies
        for i in 1..(n_fft / 2) {
            frame.push(frame[n_fft / 2 - i].conj());
        }

        ifft.process(&mut frame);

        let start = frame_idx * hop_length;
        for i in 0..n_fft {
            let sample = frame[i].re / n_fft as f32;
            y[start + i] += sample * window_fn[i];
            window_sum[start + i] += window_fn[i] * window_fn[i];
        }
    }

    for (sample, &norm) in y.iter_mut().zip(&window_sum) {
        if norm > 1e-8 {
            *sample /= norm;
        }
    }

    let offset = n_fft / 2;
    let mut out: Vec<f32> = y.into_iter().skip(offset).take(length).collect();
    out.resize(length, 0.0);
    out
}

/// Reflect-pad (falls back to zero padding when the signal is too short to reflect)
fn pad_center(y: &[f32], pad: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(y.len() + 2 * pad);
    if y.len() > pad {
        out.extend((1..=pad).rev().map(|i| y[i]));
        out.extend_from_slice(y);
        out.extend((1..=pad).map(|i| y[y.len() - 1 - i]));
    } else {
        out.resize(pad, 0.0);
        out.extend_from_slice(y);
        out.resize(y.len() + 2 * pad, 0.0);
    }
    out
}

/// Generate window function
pub fn generate_window(window_type: &str, size: usize) -> Vec<f32> {
    match window_type {
        // Periodic Hann, suited to overlap-add
        "hann" => (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
            .collect(),
        _ => vec![1.0; size], // Rectangular window as fallback
    }
}

/// Center frequency of every STFT bin
pub fn fft_frequencies(sample_rate: u32, n_fft: usize) -> Vec<f32> {
    (0..n_fft / 2 + 1)
        .map(|i| i as f32 * sample_rate as f32 / n_fft as f32)
        .collect()
}

/// Start time of every frame in seconds
pub fn frame_times(n_frames: usize, hop_length: usize, sample_rate: u32) -> Vec<f32> {
    (0..n_frames)
        .map(|i| i as f32 * hop_length as f32 / sample_rate as f32)
        .collect()
}

/// Compute magnitude spectrogram
pub fn magnitude_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm())
}

/// Compute power spectrogram
pub fn power_spectrogram(stft_data: &StftData) -> Array2<f32> {
    stft_data.s.map(|c| c.norm_sqr())
}

/// Amplitude to dB relative to the maximum, clipped `top_db` below the peak
pub fn amplitude_to_db(mag: &Array2<f32>, top_db: f32) -> Array2<f32> {
    let power = mag.map(|&m| m * m);
    power_to_db(&power, top_db)
}

/// Power to dB relative to the maximum, clipped `top_db` below the peak
pub fn power_to_db(power: &Array2<f32>, top_db: f32) -> Array2<f32> {
    let amin = 1e-10f32;
    let reference = power.iter().fold(amin, |acc, &p| acc.max(p));
    let db = power.map(|&p| 10.0 * p.max(amin).log10() - 10.0 * reference.log10());
    db.map(|&d| d.max(-top_db))
}

fn hz_to_mel(hz: f32) -> f32 {
    // Slaney: linear below 1 kHz, logarithmic above
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f32).ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular, area-normalized mel filterbank of shape (n_mels, n_fft / 2 + 1)
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let fft_freqs = fft_frequencies(sample_rate, n_fft);
    let max_mel = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, fft_freqs.len()));
    for m in 0..n_mels {
        let (lower, center, upper) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let enorm = 2.0 / (upper - lower);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let rising = (f - lower) / (center - lower);
            let falling = (upper - f) / (upper - center);
            weights[[m, k]] = rising.min(falling).max(0.0) * enorm;
        }
    }
    weights
}

/// Mel power spectrogram of shape (n_mels, n_frames)
pub fn mel_spectrogram(stft_data: &StftData, sample_rate: u32, n_mels: usize) -> Array2<f32> {
    let fb = mel_filterbank(sample_rate, stft_data.n_fft, n_mels);
    fb.dot(&power_spectrogram(stft_data))
}

/// Compute spectral flux (half-wave rectified frame difference)
pub fn spectral_flux(mag_spec: &Array2<f32>) -> Vec<f32> {
    let mut flux = vec![0.0; mag_spec.shape()[1]];

    for t in 1..mag_spec.shape()[1] {
        let mut frame_flux = 0.0;
        for f in 0..mag_spec.shape()[0] {
            let diff = mag_spec[[f, t]] - mag_spec[[f, t - 1]];
            if diff > 0.0 {
                frame_flux += diff;
            }
        }
        flux[t] = frame_flux;
    }

    flux
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_stft_dimensions() {
        let sr = 22050;
        let y = sine(440.0, sr, sr as usize);
        let data = stft(&y, 2048, 512, "hann", sr);
        assert_eq!(data.n_bins(), 1025);
        assert_eq!(data.n_frames(), 1 + y.len() / 512);
        assert_eq!(data.times.len(), data.n_frames());
        assert!((data.freqs.last().unwrap() - sr as f32 / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_stft_peak_at_tone() {
        let sr = 8000;
        let y = sine(1000.0, sr, 8000);
        let data = stft(&y, 1024, 256, "hann", sr);
        let mag = magnitude_spectrogram(&data);
        let mid = data.n_frames() / 2;
        let (peak_bin, _) = (0..data.n_bins())
            .map(|k| (k, mag[[k, mid]]))
            .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
        assert!((data.freqs[peak_bin] - 1000.0).abs() < 10.0);
    }

    #[test]
    fn test_round_trip_reconstruction() {
        let sr = 16000;
        let y: Vec<f32> = sine(330.0, sr, 5000)
            .iter()
            .zip(sine(1250.0, sr, 5000))
            .map(|(a, b)| a + 0.5 * b)
            .collect();
        let data = stft(&y, 512, 128, "hann", sr);
        let rebuilt = inverse_stft(&data.s, 512, 128, "hann", y.len());
        assert_eq!(rebuilt.len(), y.len());
        let max_err = y
            .iter()
            .zip(&rebuilt)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_err < 1e-3, "max reconstruction error {}", max_err);
    }

    #[test]
    fn test_short_signal_does_not_panic() {
        let data = stft(&[0.1, 0.2, 0.3], 256, 64, "hann", 8000);
        assert!(data.n_frames() >= 1);
        let rebuilt = inverse_stft(&data.s, 256, 64, "hann", 3);
        assert_eq!(rebuilt.len(), 3);
    }

    #[test]
    fn test_mel_filterbank_shape_and_coverage() {
        let fb = mel_filterbank(22050, 2048, 128);
        assert_eq!(fb.shape(), &[128, 1025]);
        for m in 0..128 {
            assert!(fb.row(m).iter().any(|&w| w > 0.0), "empty mel band {}", m);
        }
    }

    #[test]
    fn test_power_to_db_reference_is_zero() {
        let power = Array2::from_shape_vec((1, 3), vec![1.0, 0.1, 0.0]).unwrap();
        let db = power_to_db(&power, 80.0);
        assert!((db[[0, 0]] - 0.0).abs() < 1e-4);
        assert!((db[[0, 1]] + 10.0).abs() < 1e-3);
        assert_eq!(db[[0, 2]], -80.0);
    }

    #[test]
    fn test_spectral_flux_rises_on_onset() {
        let mag = Array2::from_shape_vec((2, 3), vec![0.0, 1.0, 1.0, 0.0, 2.0, 0.0]).unwrap();
        assert_eq!(spectral_flux(&mag), vec![0.0, 3.0, 0.0]);
    }
}
