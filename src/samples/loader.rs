// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Decoding of drum samples into memory.
//!
//! Samples are decoded entirely up front so triggering one never touches the disk.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::error::LoadError;

/// A decoded sample that can be scheduled on an output.
/// The sample data is stored in an Arc so that scheduling a sample is cheap.
#[derive(Clone)]
pub struct LoadedSample {
    /// The name of the sample, usually the track's sound identifier.
    name: Arc<str>,
    /// The sample data as interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// Number of channels in the sample.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
    /// Linear gain applied when the sample is mixed.
    gain: f32,
}

impl LoadedSample {
    /// Creates a sample from already decoded, interleaved data.
    pub fn from_interleaved(
        name: &str,
        data: Vec<f32>,
        channel_count: u16,
        sample_rate: u32,
    ) -> LoadedSample {
        LoadedSample {
            name: Arc::from(name),
            data: Arc::new(data),
            channel_count: channel_count.max(1),
            sample_rate,
            gain: 1.0,
        }
    }

    /// Returns the same sample played at the given linear gain. The data is
    /// shared, not copied.
    pub fn with_gain(mut self, gain: f32) -> LoadedSample {
        self.gain = gain.max(0.0);
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The interleaved sample data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.channel_count as usize
    }

    /// Returns the playing time of the sample.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for LoadedSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSample")
            .field("name", &self.name)
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frames())
            .field("gain", &self.gain)
            .finish()
    }
}

/// Decodes audio files into memory at the output's sample rate.
#[derive(Clone, Copy, Debug)]
pub struct SampleLoader {
    /// Target sample rate for transcoding (matches audio output).
    target_sample_rate: u32,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    /// Loads a sample from a file into memory, resampling it if needed.
    pub fn load(&self, name: &str, path: &Path) -> Result<LoadedSample, LoadError> {
        info!(path = ?path, "Loading sample into memory");

        let (samples, channel_count, source_sample_rate) = decode_file(path)?;

        let (final_samples, final_sample_rate) = if source_sample_rate != self.target_sample_rate
        {
            info!(
                source_rate = source_sample_rate,
                target_rate = self.target_sample_rate,
                "Transcoding sample"
            );
            let transcoded = transcode_samples(
                &samples,
                channel_count,
                source_sample_rate,
                self.target_sample_rate,
            );
            (transcoded, self.target_sample_rate)
        } else {
            (samples, source_sample_rate)
        };

        let loaded =
            LoadedSample::from_interleaved(name, final_samples, channel_count, final_sample_rate);

        info!(
            path = ?path,
            channels = channel_count,
            sample_rate = final_sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(loaded)
    }
}

fn decode_error(path: &Path, message: impl ToString) -> LoadError {
    LoadError::Decode {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Decodes the first audio track of a file into interleaved f32 samples.
/// Returns the samples, the channel count and the sample rate.
fn decode_file(path: &Path) -> Result<(Vec<f32>, u16, u32), LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_error(path, e))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "no audio track found"))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| decode_error(path, "sample rate not specified"))?;
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(decode_error(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if channels == 0 {
                    channels = spec.channels.count() as u16;
                }
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // A corrupt packet only costs us that packet.
                warn!(path = ?path, err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(decode_error(path, e)),
        }
    }

    if channels == 0 {
        return Err(decode_error(path, "unable to determine channel count"));
    }

    debug!(
        path = ?path,
        channels,
        sample_rate,
        samples = samples.len(),
        "Decoded sample"
    );
    Ok((samples, channels, sample_rate))
}

/// Transcodes samples from one sample rate to another using linear interpolation,
/// which is plenty for drum hits and one-shots.
pub(crate) fn transcode_samples(
    samples: &[f32],
    channel_count: u16,
    source_rate: u32,
    target_rate: u32,
) -> Vec<f32> {
    let channels = channel_count.max(1) as usize;
    if source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);

    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);

            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio::write_wav;

    #[test]
    fn test_transcode_samples() {
        // Simple mono sine wave at 44100Hz
        let source_rate = 44100;
        let target_rate = 48000;
        let source_samples: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / source_rate as f32).sin())
            .collect();

        let result = transcode_samples(&source_samples, 1, source_rate, target_rate);

        // Should have more samples at higher rate
        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.len(), expected_len);
    }

    #[test]
    fn test_transcode_stereo() {
        // Stereo: L=1.0, R=-1.0 alternating
        let source_samples = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];

        let result = transcode_samples(&source_samples, 2, 44100, 48000);

        // Check that channels are preserved
        assert!(result.len() >= 8);
        assert!((result[0] - 1.0).abs() < 0.1);
        assert!((result[1] - (-1.0)).abs() < 0.1);
    }

    #[test]
    fn test_load_wav() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kick.wav");
        write_wav(path.clone(), vec![vec![0.5f32, -0.5, 0.25, 0.0]], 44100)?;

        let sample = SampleLoader::new(44100).load("kick", &path)?;
        assert_eq!("kick", sample.name());
        assert_eq!(1, sample.channel_count());
        assert_eq!(44100, sample.sample_rate());
        assert_eq!(vec![0.5f32, -0.5, 0.25, 0.0], sample.data().to_vec());
        Ok(())
    }

    #[test]
    fn test_load_resamples() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("snare.wav");
        write_wav(path.clone(), vec![vec![0.1f32; 100], vec![0.2f32; 100]], 22050)?;

        let sample = SampleLoader::new(44100).load("snare", &path)?;
        assert_eq!(2, sample.channel_count());
        assert_eq!(44100, sample.sample_rate());
        assert_eq!(200, sample.frames());
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = SampleLoader::new(44100).load("clap", Path::new("/nonexistent/clap.wav"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_load_garbage() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hihat-open.wav");
        std::fs::write(&path, b"this is not a wav file")?;

        let result = SampleLoader::new(44100).load("hihat-open", &path);
        assert!(matches!(result, Err(LoadError::Decode { .. })));
        Ok(())
    }
}
