//! Audio features shown by the visualizer
//!
//! Every function is pure: arrays in, arrays out. Spectral inputs are
//! shaped (bins, frames) like [`crate::spectral::StftData::s`].

use crate::spectral::{inverse_stft, spectral_flux, StftData};
use ndarray::{Array1, Array2, Axis};
use rustfft::num_complex::Complex32;

pub const PITCH_CLASSES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Per-bucket (min, max) envelope for drawing long waveforms
pub fn waveform_envelope(y: &[f32], buckets: usize) -> Vec<(f32, f32)> {
    if y.is_empty() || buckets == 0 {
        return Vec::new();
    }
    let size = y.len().div_ceil(buckets.min(y.len()));
    y.chunks(size)
        .map(|chunk| {
            chunk
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
        })
        .collect()
}

/// Block-average a (rows, cols) array down to at most `max_rows` x `max_cols`
pub fn downsample(data: &Array2<f32>, max_rows: usize, max_cols: usize) -> Array2<f32> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return data.clone();
    }
    let row_step = rows.div_ceil(max_rows.max(1));
    let col_step = cols.div_ceil(max_cols.max(1));
    let out_rows = rows.div_ceil(row_step);
    let out_cols = cols.div_ceil(col_step);

    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let r0 = r * row_step;
        let c0 = c * col_step;
        let r1 = (r0 + row_step).min(rows);
        let c1 = (c0 + col_step).min(cols);
        let block = data.slice(ndarray::s![r0..r1, c0..c1]);
        block.sum() / block.len() as f32
    })
}

/// Chromagram from a power spectrogram, each frame scaled so its maximum is 1
pub fn chroma(power: &Array2<f32>, freqs: &[f32]) -> Array2<f32> {
    let n_frames = power.ncols();
    let mut out = Array2::<f32>::zeros((12, n_frames));

    for (bin, &f) in freqs.iter().enumerate().take(power.nrows()) {
        if f < 20.0 {
            continue;
        }
        let midi = 69.0 + 12.0 * (f / 440.0).log2();
        let pc = (midi.round() as i64).rem_euclid(12) as usize;
        for t in 0..n_frames {
            out[[pc, t]] += power[[bin, t]];
        }
    }

    for mut column in out.axis_iter_mut(Axis(1)) {
        let max = column.iter().fold(0.0f32, |a, &b| a.max(b));
        if max > 0.0 {
            column.mapv_inplace(|v| v / max);
        }
    }
    out
}

/// Index of the strongest pitch class in the time-averaged chroma
pub fn estimate_key_index(chroma: &Array2<f32>) -> Option<usize> {
    let mean = chroma.mean_axis(Axis(1))?;
    mean.iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// MFCCs: orthonormal DCT-II over the bands of a dB mel spectrogram
pub fn mfcc(mel_db: &Array2<f32>, n_mfcc: usize) -> Array2<f32> {
    let n_mels = mel_db.nrows();
    let n = n_mfcc.min(n_mels);
    let mut basis = Array2::<f32>::zeros((n, n_mels));
    for k in 0..n {
        let scale = if k == 0 {
            (1.0 / n_mels as f32).sqrt()
        } else {
            (2.0 / n_mels as f32).sqrt()
        };
        for m in 0..n_mels {
            basis[[k, m]] = scale
                * (std::f32::consts::PI * k as f32 * (2 * m + 1) as f32 / (2 * n_mels) as f32).cos();
        }
    }
    basis.dot(mel_db)
}

/// Onset strength: mean positive change across mel bands, per frame
pub fn onset_strength(mel_db: &Array2<f32>) -> Vec<f32> {
    let n_mels = mel_db.nrows().max(1) as f32;
    spectral_flux(mel_db).into_iter().map(|v| v / n_mels).collect()
}

/// Pick onset frames: local maxima above a moving average plus `delta` (on the
/// envelope normalized to 0-1), at least `wait` frames apart
pub fn onset_detect(envelope: &[f32], delta: f32, wait: usize) -> Vec<usize> {
    let max = envelope.iter().fold(0.0f32, |a, &b| a.max(b));
    if max <= 0.0 {
        return Vec::new();
    }
    let env: Vec<f32> = envelope.iter().map(|v| v / max).collect();
    let (pre_max, post_max, pre_avg, post_avg) = (3usize, 3usize, 3usize, 5usize);

    let mut onsets = Vec::new();
    let mut last: Option<usize> = None;
    for t in 0..env.len() {
        let lo = t.saturating_sub(pre_max);
        let hi = (t + post_max + 1).min(env.len());
        let local_max = env[lo..hi].iter().fold(f32::MIN, |a, &b| a.max(b));
        if env[t] < local_max {
            continue;
        }
        let lo = t.saturating_sub(pre_avg);
        let hi = (t + post_avg + 1).min(env.len());
        let mean = env[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
        if env[t] < mean + delta {
            continue;
        }
        if last.map_or(true, |l| t - l > wait) {
            onsets.push(t);
            last = Some(t);
        }
    }
    onsets
}

/// Tempo in BPM from the onset envelope autocorrelation, weighted toward 120 BPM
pub fn estimate_tempo(envelope: &[f32], sample_rate: u32, hop_length: usize) -> Option<f32> {
    let frame_rate = sample_rate as f32 / hop_length as f32;
    let mean = envelope.iter().sum::<f32>() / envelope.len().max(1) as f32;
    let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();

    let min_lag = (frame_rate * 60.0 / 300.0).floor().max(1.0) as usize;
    let max_lag = ((frame_rate * 60.0 / 30.0).ceil() as usize).min(centered.len().saturating_sub(1));
    if min_lag > max_lag {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for lag in min_lag..=max_lag {
        let ac: f32 = centered[..centered.len() - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let bpm = 60.0 * frame_rate / lag as f32;
        // Log-normal prior centered on 120 BPM, one octave wide
        let prior = (-0.5 * ((bpm / 120.0).log2()).powi(2)).exp();
        let score = ac * prior;
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }
    best.filter(|(_, s)| *s > 0.0)
        .map(|(lag, _)| 60.0 * frame_rate / lag as f32)
}

/// Dynamic-programming beat tracker; returns beat frame indices
pub fn track_beats(envelope: &[f32], tempo_bpm: f32, sample_rate: u32, hop_length: usize) -> Vec<usize> {
    let n = envelope.len();
    if n == 0 || tempo_bpm <= 0.0 {
        return Vec::new();
    }
    let period = 60.0 * sample_rate as f32 / hop_length as f32 / tempo_bpm;
    let tightness = 100.0;
    let std = envelope.iter().map(|v| v * v).sum::<f32>().sqrt() / (n as f32).sqrt();
    let local: Vec<f32> = envelope.iter().map(|v| v / std.max(1e-9)).collect();

    let mut score = vec![0.0f32; n];
    let mut backlink: Vec<Option<usize>> = vec![None; n];
    let window_lo = (period / 2.0).round() as usize;
    let window_hi = (period * 2.0).round() as usize;

    for t in 0..n {
        let mut best: Option<(usize, f32)> = None;
        for prev in t.saturating_sub(window_hi)..t.saturating_sub(window_lo.max(1)) {
            let gap = (t - prev) as f32;
            let penalty = -tightness * (gap / period).ln().powi(2);
            let candidate = score[prev] + penalty;
            if best.map_or(true, |(_, s)| candidate > s) {
                best = Some((prev, candidate));
            }
        }
        match best {
            Some((prev, s)) if s > 0.0 => {
                score[t] = local[t] + s;
                backlink[t] = Some(prev);
            }
            _ => score[t] = local[t],
        }
    }

    // Last beat: best-scoring frame among local score maxima near the end
    let tail_start = n.saturating_sub(window_hi.max(1));
    let mut t = (tail_start..n)
        .max_by(|&a, &b| score[a].total_cmp(&score[b]))
        .unwrap_or(n - 1);
    let mut beats = vec![t];
    while let Some(prev) = backlink[t] {
        beats.push(prev);
        t = prev;
    }
    beats.reverse();
    beats
}

/// Spectral centroid in Hz per frame
pub fn spectral_centroid(mag: &Array2<f32>, freqs: &[f32]) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|frame| {
            let total: f32 = frame.sum();
            if total <= 0.0 {
                return 0.0;
            }
            frame.iter().zip(freqs).map(|(m, f)| m * f).sum::<f32>() / total
        })
        .collect()
}

/// Second-order spectral bandwidth around the centroid, in Hz
pub fn spectral_bandwidth(mag: &Array2<f32>, freqs: &[f32], centroid: &[f32]) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .zip(centroid)
        .map(|(frame, &c)| {
            let total: f32 = frame.sum();
            if total <= 0.0 {
                return 0.0;
            }
            (frame
                .iter()
                .zip(freqs)
                .map(|(m, f)| m * (f - c).powi(2))
                .sum::<f32>()
                / total)
                .sqrt()
        })
        .collect()
}

/// Frequency below which `roll_percent` of each frame's energy lies
pub fn spectral_rolloff(mag: &Array2<f32>, freqs: &[f32], roll_percent: f32) -> Vec<f32> {
    mag.axis_iter(Axis(1))
        .map(|frame| {
            let total: f32 = frame.sum();
            if total <= 0.0 {
                return 0.0;
            }
            let threshold = roll_percent * total;
            let mut acc = 0.0;
            for (m, &f) in frame.iter().zip(freqs) {
                acc += m;
                if acc >= threshold {
                    return f;
                }
            }
            freqs.last().copied().unwrap_or(0.0)
        })
        .collect()
}

/// Octave-band spectral contrast (peak minus valley, dB), `n_bands + 1` rows
pub fn spectral_contrast(mag: &Array2<f32>, freqs: &[f32], n_bands: usize, fmin: f32) -> Array2<f32> {
    let quantile = 0.02;
    let n_frames = mag.ncols();
    let nyquist = freqs.last().copied().unwrap_or(0.0);

    // Band edges: 0, fmin, 2 fmin, ... , nyquist
    let mut edges = vec![0.0f32];
    edges.extend((0..n_bands).map(|k| fmin * 2f32.powi(k as i32)));
    edges.push(nyquist);

    let mut out = Array2::<f32>::zeros((n_bands + 1, n_frames));
    for band in 0..=n_bands {
        let (lo, hi) = (edges[band], edges[band + 1]);
        let bins: Vec<usize> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &f)| f >= lo && (f < hi || (band == n_bands && f <= hi)))
            .map(|(i, _)| i)
            .collect();
        if bins.is_empty() {
            continue;
        }
        let k = ((quantile * bins.len() as f32).round() as usize).max(1);
        for t in 0..n_frames {
            let mut values: Vec<f32> = bins.iter().map(|&b| mag[[b, t]]).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            let valley = values[..k].iter().sum::<f32>() / k as f32;
            let peak = values[values.len() - k..].iter().sum::<f32>() / k as f32;
            let to_db = |p: f32| 10.0 * p.max(1e-10).log10();
            out[[band, t]] = to_db(peak) - to_db(valley);
        }
    }
    out
}

/// Zero-crossing rate over centered frames
pub fn zero_crossing_rate(y: &[f32], frame_length: usize, hop_length: usize) -> Vec<f32> {
    if y.is_empty() || frame_length == 0 || hop_length == 0 {
        return Vec::new();
    }
    let half = frame_length / 2;
    let n_frames = 1 + y.len() / hop_length;
    let crossing: Vec<bool> = y
        .windows(2)
        .map(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .collect();

    (0..n_frames)
        .map(|i| {
            let center = i * hop_length;
            let lo = center.saturating_sub(half);
            let hi = (center + half).min(crossing.len());
            if lo >= hi {
                return 0.0;
            }
            crossing[lo..hi].iter().filter(|&&c| c).count() as f32 / frame_length as f32
        })
        .collect()
}

/// Median along one axis over a centered window of `kernel` samples
fn median_filter(data: &Array2<f32>, kernel: usize, axis: Axis) -> Array2<f32> {
    let half = kernel / 2;
    let mut out = Array2::<f32>::zeros(data.dim());
    for (lane_in, mut lane_out) in data.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let values: Vec<f32> = lane_in.to_vec();
        let len = values.len();
        for i in 0..len {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(len);
            let mut window: Vec<f32> = values[lo..hi].to_vec();
            window.sort_by(|a, b| a.total_cmp(b));
            lane_out[i] = window[window.len() / 2];
        }
    }
    out
}

/// Harmonic/percussive separation by median filtering with soft masks.
///
/// Returns the (harmonic, percussive) time signals, each `length` samples.
pub fn hpss(stft_data: &StftData, kernel: usize, length: usize) -> (Vec<f32>, Vec<f32>) {
    let mag = stft_data.s.mapv(|c| c.norm());
    let harmonic_med = median_filter(&mag, kernel, Axis(1));
    let percussive_med = median_filter(&mag, kernel, Axis(0));

    let mut harmonic = stft_data.s.clone();
    let mut percussive = stft_data.s.clone();
    ndarray::Zip::from(&mut harmonic)
        .and(&mut percussive)
        .and(&harmonic_med)
        .and(&percussive_med)
        .for_each(|h, p, &hm, &pm| {
            let (h2, p2) = (hm * hm, pm * pm);
            let total = h2 + p2;
            let (hmask, pmask) = if total > 0.0 {
                (h2 / total, p2 / total)
            } else {
                (0.5, 0.5)
            };
            let original: Complex32 = *h;
            *h = original * hmask;
            *p = original * pmask;
        });

    (
        inverse_stft(&harmonic, stft_data.n_fft, stft_data.hop_length, "hann", length),
        inverse_stft(&percussive, stft_data.n_fft, stft_data.hop_length, "hann", length),
    )
}

/// Mean of each row
pub fn row_means(data: &Array2<f32>) -> Array1<f32> {
    data.mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(data.nrows()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::{fft_frequencies, magnitude_spectrogram, power_spectrogram, stft};
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn click_track(bpm: f32, sr: u32, seconds: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        let period = (60.0 / bpm * sr as f32) as usize;
        let mut y = vec![0.0f32; n];
        let mut start = 0;
        while start < n {
            // Impulse plus a short decaying burst
            y[start] = 1.0;
            for i in 1..400.min(n - start) {
                let decay = (1.0 - i as f32 / 400.0).powi(2);
                y[start + i] = 0.8 * decay * (2.0 * PI * 1500.0 * i as f32 / sr as f32).sin();
            }
            start += period;
        }
        y
    }

    #[test]
    fn test_chroma_finds_a440() {
        let sr = 22050;
        let data = stft(&sine(440.0, sr, sr as usize), 2048, 512, "hann", sr);
        let c = chroma(&power_spectrogram(&data), &data.freqs);
        assert_eq!(c.nrows(), 12);
        assert_eq!(estimate_key_index(&c), Some(9));
    }

    #[test]
    fn test_centroid_and_rolloff_track_tone() {
        let sr = 22050;
        let data = stft(&sine(2000.0, sr, sr as usize), 2048, 512, "hann", sr);
        let mag = magnitude_spectrogram(&data);
        let centroid = spectral_centroid(&mag, &data.freqs);
        let mid = centroid.len() / 2;
        assert!((centroid[mid] - 2000.0).abs() < 100.0);

        let rolloff = spectral_rolloff(&mag, &data.freqs, 0.85);
        assert!((rolloff[mid] - 2000.0).abs() < 50.0);

        let bandwidth = spectral_bandwidth(&mag, &data.freqs, &centroid);
        assert!(bandwidth[mid] < 500.0);
    }

    #[test]
    fn test_zero_crossing_rate_of_sine() {
        let sr = 8000;
        // 1 kHz: two crossings per period -> 2000 per second -> 0.25 per sample
        let zcr = zero_crossing_rate(&sine(1000.0, sr, 8000), 2048, 512);
        let mid = zcr.len() / 2;
        assert!((zcr[mid] - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_mfcc_shape() {
        let mel_db = Array2::<f32>::from_elem((128, 10), -20.0);
        let m = mfcc(&mel_db, 13);
        assert_eq!(m.dim(), (13, 10));
        // Constant spectrum has energy only in the 0th coefficient
        assert!(m[[1, 0]].abs() < 1e-3);
        assert!(m[[0, 0]] < 0.0);
    }

    #[test]
    fn test_onsets_and_tempo_of_click_track() {
        let sr = 22050;
        let hop = 512;
        let y = click_track(120.0, sr, 8.0);
        let data = stft(&y, 2048, hop, "hann", sr);
        let mel = crate::spectral::mel_spectrogram(&data, sr, 64);
        let mel_db = crate::spectral::power_to_db(&mel, 80.0);
        let env = onset_strength(&mel_db);

        let onsets = onset_detect(&env, 0.07, 10);
        assert!(onsets.len() >= 12 && onsets.len() <= 18, "{} onsets", onsets.len());

        let tempo = estimate_tempo(&env, sr, hop).unwrap();
        assert!((tempo - 120.0).abs() < 8.0, "tempo {}", tempo);

        let beats = track_beats(&env, tempo, sr, hop);
        assert!(beats.len() >= 12, "{} beats", beats.len());
        assert!(beats.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_hpss_splits_tone_from_clicks() {
        let sr = 22050;
        let tone = sine(440.0, sr, sr as usize);
        let clicks = click_track(120.0, sr, 1.0);
        let y: Vec<f32> = tone.iter().zip(&clicks).map(|(a, b)| a + b).collect();
        let data = stft(&y, 1024, 256, "hann", sr);
        let (harmonic, percussive) = hpss(&data, 17, y.len());
        assert_eq!(harmonic.len(), y.len());
        assert_eq!(percussive.len(), y.len());

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&harmonic, &tone) > dot(&percussive, &tone));
    }

    #[test]
    fn test_contrast_shape() {
        let sr = 22050;
        let data = stft(&sine(440.0, sr, 4096), 2048, 512, "hann", sr);
        let mag = magnitude_spectrogram(&data);
        let contrast = spectral_contrast(&mag, &fft_frequencies(sr, 2048), 6, 200.0);
        assert_eq!(contrast.dim(), (7, data.n_frames()));
        assert!(contrast.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_downsample_and_envelope() {
        let data = Array2::from_shape_fn((100, 1000), |(r, _)| r as f32);
        let small = downsample(&data, 10, 100);
        assert_eq!(small.dim(), (10, 100));
        assert!((small[[0, 0]] - 4.5).abs() < 1e-4);

        let env = waveform_envelope(&[0.0, 1.0, -1.0, 0.5], 2);
        assert_eq!(env, vec![(0.0, 1.0), (-1.0, 0.5)]);
    }
}
