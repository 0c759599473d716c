//! Second-order Butterworth filters and zero-phase filtering

use crate::error::{Result, ToolkitError};

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
}

/// Biquad coefficients, `a0` normalized to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl Biquad {
    /// 2nd-order Butterworth designed with the prewarped bilinear transform
    pub fn butterworth(kind: FilterType, cutoff_hz: f32, sample_rate: u32) -> Result<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        let wn = cutoff_hz as f64 / nyquist;
        if !(wn > 0.0 && wn < 1.0) {
            return Err(ToolkitError::InvalidArgument(format!(
                "cutoff {} Hz must lie strictly between 0 and Nyquist ({} Hz)",
                cutoff_hz, nyquist
            )));
        }

        let k = (std::f64::consts::PI * wn / 2.0).tan();
        let k2 = k * k;
        let sqrt2 = std::f64::consts::SQRT_2;
        let norm = 1.0 / (1.0 + sqrt2 * k + k2);

        let b = match kind {
            FilterType::Lowpass => [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            FilterType::Highpass => [norm, -2.0 * norm, norm],
        };
        let a = [1.0, 2.0 * (k2 - 1.0) * norm, (1.0 - sqrt2 * k + k2) * norm];
        Ok(Self { b, a })
    }

    /// Run the filter once over `x` (transposed direct form II) from state `zi`
    pub fn lfilter(&self, x: &[f64], zi: [f64; 2]) -> Vec<f64> {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let (mut z1, mut z2) = (zi[0], zi[1]);

        x.iter()
            .map(|&x0| {
                let y0 = b0 * x0 + z1;
                z1 = b1 * x0 - a1 * y0 + z2;
                z2 = b2 * x0 - a2 * y0;
                y0
            })
            .collect()
    }

    /// Steady-state initial conditions for a unit step input
    pub fn lfilter_zi(&self) -> [f64; 2] {
        let y_ss = self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>();
        [y_ss - self.b[0], self.b[2] - self.a[2] * y_ss]
    }

    /// Zero-phase forward-backward filtering with odd-extension padding
    pub fn filtfilt(&self, x: &[f32]) -> Vec<f32> {
        if x.is_empty() {
            return Vec::new();
        }
        let padlen = 9.min(x.len() - 1);

        // Odd extension at both ends
        let first = x[0] as f64;
        let last = x[x.len() - 1] as f64;
        let mut ext: Vec<f64> = Vec::with_capacity(x.len() + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * first - x[i] as f64));
        ext.extend(x.iter().map(|&v| v as f64));
        ext.extend((1..=padlen).map(|i| 2.0 * last - x[x.len() - 1 - i] as f64));

        let zi = self.lfilter_zi();
        let x0 = ext[0];
        let mut y = self.lfilter(&ext, [zi[0] * x0, zi[1] * x0]);

        y.reverse();
        let y0 = y[0];
        let mut y = self.lfilter(&y, [zi[0] * y0, zi[1] * y0]);
        y.reverse();

        y[padlen..padlen + x.len()].iter().map(|&v| v as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(freq: f32, sr: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_lowpass_coefficients_match_reference() {
        // butter(2, 0.5) reference values
        let f = Biquad::butterworth(FilterType::Lowpass, 1000.0, 4000).unwrap();
        let expected_b = [0.29289322, 0.58578644, 0.29289322];
        let expected_a = [1.0, 0.0, 0.17157288];
        for i in 0..3 {
            assert!((f.b[i] - expected_b[i]).abs() < 1e-6);
            assert!((f.a[i] - expected_a[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_unity_dc_gain_lowpass() {
        let f = Biquad::butterworth(FilterType::Lowpass, 300.0, 44100).unwrap();
        let dc = vec![0.5f32; 2000];
        let out = f.filtfilt(&dc);
        assert!(out.iter().all(|&v| (v - 0.5).abs() < 1e-4));
    }

    #[test]
    fn test_lowpass_attenuates_high_tone() {
        let sr = 44100;
        let f = Biquad::butterworth(FilterType::Lowpass, 300.0, sr).unwrap();
        let high = tone(5000.0, sr, 8820);
        let low = tone(50.0, sr, 8820);
        assert!(rms(&f.filtfilt(&high)) < 0.05);
        assert!(rms(&f.filtfilt(&low)) > 0.6);
    }

    #[test]
    fn test_highpass_attenuates_low_tone() {
        let sr = 44100;
        let f = Biquad::butterworth(FilterType::Highpass, 3000.0, sr).unwrap();
        let low = tone(100.0, sr, 8820);
        assert!(rms(&f.filtfilt(&low)) < 0.05);
    }

    #[test]
    fn test_filtfilt_is_zero_phase() {
        let sr = 8000;
        let f = Biquad::butterworth(FilterType::Lowpass, 1000.0, sr).unwrap();
        let x = tone(100.0, sr, 4000);
        let y = f.filtfilt(&x);
        // Passband tone comes back aligned with the input
        let mid = 2000;
        for i in mid..mid + 80 {
            assert!((x[i] - y[i]).abs() < 0.02);
        }
    }

    #[test]
    fn test_rejects_cutoff_above_nyquist() {
        assert!(Biquad::butterworth(FilterType::Lowpass, 5000.0, 8000).is_err());
        assert!(Biquad::butterworth(FilterType::Highpass, 0.0, 8000).is_err());
    }

    #[test]
    fn test_short_input() {
        let f = Biquad::butterworth(FilterType::Lowpass, 300.0, 44100).unwrap();
        assert_eq!(f.filtfilt(&[0.3]).len(), 1);
        assert!(f.filtfilt(&[]).is_empty());
    }
}
