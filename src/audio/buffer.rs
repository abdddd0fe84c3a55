//! Captured audio: raw device chunks and the mono buffer handed to transcription.

use crate::defaults;
use crate::error::{AssistantError, Result};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

/// One block of interleaved samples as delivered by the input stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl AudioChunk {
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: 1,
        }
    }

    /// Number of frames (samples per channel) in this chunk.
    pub fn frames(&self) -> usize {
        match self.channels {
            0 | 1 => self.samples.len(),
            n => self.samples.len() / n as usize,
        }
    }
}

/// Mono f32 samples at a fixed sample rate.
///
/// An empty buffer is the "nothing recorded" result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Concatenate chunks in arrival order, averaging multi-channel frames down to mono.
    pub fn from_chunks(chunks: &[AudioChunk], sample_rate: u32) -> Self {
        let total: usize = chunks.iter().map(AudioChunk::frames).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend(downmix(&chunk.samples, chunk.channels));
        }
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// RMS level of the buffer, 0.0 for silence.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }

    /// Encode as a 16-bit PCM mono WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())
                .map_err(|e| wav_error("create WAV writer", e))?;
            for &sample in &self.samples {
                writer
                    .write_sample(to_i16(sample))
                    .map_err(|e| wav_error("write WAV sample", e))?;
            }
            writer
                .finalize()
                .map_err(|e| wav_error("finalize WAV", e))?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the buffer to disk as a 16-bit PCM mono WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec())
            .map_err(|e| wav_error("create WAV file", e))?;
        for &sample in &self.samples {
            writer
                .write_sample(to_i16(sample))
                .map_err(|e| wav_error("write WAV sample", e))?;
        }
        writer.finalize().map_err(|e| wav_error("finalize WAV", e))
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::empty(defaults::SAMPLE_RATE)
    }
}

/// Average interleaved frames down to one channel.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Linear-interpolation resampler for mono audio.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() || source_rate == 0 {
        return samples.to_vec();
    }
    let ratio = source_rate as f64 / target_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn wav_error(action: &str, e: hound::Error) -> AssistantError {
    AssistantError::AudioCapture {
        message: format!("Failed to {}: {}", action, e),
    }
}
