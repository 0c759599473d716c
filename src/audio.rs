//! Audio I/O, path helpers and basic sample utilities

use crate::error::{Result, ToolkitError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded audio, stored as one sample vector per channel
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Planar samples normalized to [-1, 1]
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap a mono signal
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    pub fn n_frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    /// Get audio duration in seconds
    pub fn duration_sec(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.n_frames() as f32 / self.sample_rate as f32
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.n_frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Lowercased file extension, empty when absent
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Load an audio file in any supported container
pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    crate::error::require_input(path)?;

    match extension_of(path).as_str() {
        "wav" | "wave" => match load_wav_file(path) {
            Ok(buffer) => Ok(buffer),
            Err(err) => {
                // WAVE_FORMAT_EXTENSIBLE variants hound rejects are still readable by symphonia
                tracing::debug!("hound could not read {}: {}", path.display(), err);
                decode_with_symphonia(path)
            }
        },
        _ => decode_with_symphonia(path),
    }
}

/// Load an audio file and mix it down to mono
pub fn load_mono<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let buffer = load_audio_file(path)?;
    if buffer.n_frames() == 0 {
        return Err(ToolkitError::AudioDecode(
            "Audio file contains no samples".to_string(),
        ));
    }
    Ok((buffer.to_mono(), buffer.sample_rate))
}

/// Load WAV file
fn load_wav_file(path: &Path) -> Result<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.bits_per_sample > 32 {
        return Err(ToolkitError::AudioDecode(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let n_channels = spec.channels.max(1) as usize;
    let mut interleaved: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                interleaved.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                interleaved.push(sample?);
            }
        }
    }

    Ok(AudioBuffer {
        channels: deinterleave(&interleaved, n_channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode any container/codec symphonia knows about
fn decode_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    let ext = extension_of(path);
    if !ext.is_empty() {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ToolkitError::AudioDecode(format!("{}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ToolkitError::AudioDecode("No supported audio tracks found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut n_channels = track.codec_params.channels.map_or(0, |c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ToolkitError::AudioDecode(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(ToolkitError::AudioDecode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                n_channels = spec.channels.count();
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!("skipping undecodable packet: {}", msg);
            }
            Err(e) => return Err(ToolkitError::AudioDecode(e.to_string())),
        }
    }

    if sample_rate == 0 || n_channels == 0 {
        return Err(ToolkitError::AudioDecode(format!(
            "Could not determine stream layout of {}",
            path.display()
        )));
    }

    Ok(AudioBuffer {
        channels: deinterleave(&interleaved, n_channels),
        sample_rate,
    })
}

fn deinterleave(interleaved: &[f32], n_channels: usize) -> Vec<Vec<f32>> {
    let mut channels = vec![Vec::with_capacity(interleaved.len() / n_channels); n_channels];
    for frame in interleaved.chunks_exact(n_channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            channels[ch].push(sample);
        }
    }
    channels
}

/// Write a buffer as integer PCM WAV
pub fn write_wav_pcm(path: &Path, buffer: &AudioBuffer, bits_per_sample: u16) -> Result<()> {
    let spec = WavSpec {
        channels: buffer.n_channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(path, spec).map_err(|e| ToolkitError::AudioEncode(e.to_string()))?;
    let max_value = ((1i64 << (bits_per_sample - 1)) - 1) as f32;

    for i in 0..buffer.n_frames() {
        for channel in &buffer.channels {
            let sample = (channel[i].clamp(-1.0, 1.0) * max_value).round() as i32;
            writer
                .write_sample(sample)
                .map_err(|e| ToolkitError::AudioEncode(e.to_string()))?;
        }
    }
    writer
        .finalize()
        .map_err(|e| ToolkitError::AudioEncode(e.to_string()))
}

/// Write a mono signal as 32-bit float WAV, values are not clipped
pub fn write_wav_float(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer =
        WavWriter::create(path, spec).map_err(|e| ToolkitError::AudioEncode(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| ToolkitError::AudioEncode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| ToolkitError::AudioEncode(e.to_string()))
}

/// Create `dir` (and parents) when missing
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir)?;
        tracing::info!("Created directory: {}", dir.display());
    }
    Ok(())
}

/// Make sure the parent directory of an output path exists
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// `<dir>/<stem><suffix>.<ext>` next to `input`
pub fn sibling_path(input: &Path, suffix: &str, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = if ext.is_empty() {
        format!("{}{}", stem, suffix)
    } else {
        format!("{}{}.{}", stem, suffix, ext)
    };
    input.with_file_name(name)
}

/// Use the explicit output or derive one from the input
pub fn resolve_output(input: &Path, output: Option<&Path>, suffix: &str, ext: &str) -> PathBuf {
    output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| sibling_path(input, suffix, ext))
}

/// List files in `dir` with the given extension, sorted by path
pub fn find_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && extension_of(p) == ext)
        .collect();
    files.sort();
    Ok(files)
}

/// Peak absolute amplitude
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

/// Root mean square level
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Scale so the peak is exactly 1.0, silence is left alone
pub fn peak_normalize(samples: &mut [f32]) {
    let max = peak(samples);
    if max > 0.0 {
        for sample in samples.iter_mut() {
            *sample /= max;
        }
    }
}

/// Filesystem and stream details of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub size_human: String,
    pub modified_unix: Option<u64>,
    pub audio: Option<AudioInfo>,
}

/// Stream details when the file decodes as audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: usize,
    pub frames: usize,
    pub duration_sec: f32,
}

/// Collect file details; audio fields are filled when the file decodes
pub fn file_info(path: &Path) -> Result<FileInfo> {
    crate::error::require_input(path)?;
    let meta = std::fs::metadata(path)?;
    let modified_unix = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs());

    let ext = extension_of(path);
    let audio = if matches!(ext.as_str(), "wav" | "wave" | "mp3" | "ogg" | "flac" | "aiff" | "aif") {
        load_audio_file(path).ok().map(|b| AudioInfo {
            sample_rate: b.sample_rate,
            channels: b.n_channels(),
            frames: b.n_frames(),
            duration_sec: b.duration_sec(),
        })
    } else {
        None
    };

    Ok(FileInfo {
        path: path.to_path_buf(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: if ext.is_empty() { ext } else { format!(".{}", ext) },
        size: meta.len(),
        size_human: format_file_size(meta.len()),
        modified_unix,
        audio,
    })
}

/// Human readable size, e.g. `1.50 KB`
pub fn format_file_size(size_bytes: u64) -> String {
    let mut size = size_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.2} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.2} PB", size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_sibling_path() {
        let p = sibling_path(Path::new("/a/b/song.wav"), "_restored", "wav");
        assert_eq!(p, PathBuf::from("/a/b/song_restored.wav"));
        let p = sibling_path(Path::new("song.mid"), "", "musicxml");
        assert_eq!(p, PathBuf::from("song.musicxml"));
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let buffer = AudioBuffer {
            channels: vec![vec![1.0, 0.0, -1.0], vec![0.0, 0.0, 1.0]],
            sample_rate: 8000,
        };
        assert_eq!(buffer.to_mono(), vec![0.5, 0.0, 0.0]);
        assert_eq!(buffer.n_frames(), 3);
    }

    #[test]
    fn test_peak_normalize() {
        let mut samples = vec![0.25, -0.5, 0.1];
        peak_normalize(&mut samples);
        assert!((peak(&samples) - 1.0).abs() < 1e-6);
        assert!((samples[0] - 0.5).abs() < 1e-6);

        let mut silence = vec![0.0; 4];
        peak_normalize(&mut silence);
        assert!(silence.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_deinterleave() {
        let planar = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
    }
}
