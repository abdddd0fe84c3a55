use crate::audio::buffer::AudioChunk;
use crate::defaults;
use crate::error::{AssistantError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

/// Trait for audio input devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// `start` opens the physical device and `stop` releases it; a source is
/// started at most once between stops.
pub trait AudioSource: Send {
    /// Open the device and start delivering chunks.
    fn start(&mut self) -> Result<()>;

    /// Stop the stream and release the device. Stopping a stopped source is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Drain the chunks delivered since the last call, in arrival order.
    fn read_chunks(&mut self) -> Result<Vec<AudioChunk>>;

    /// Sample rate of the delivered chunks.
    fn sample_rate(&self) -> u32;
}

impl AudioSource for Box<dyn AudioSource> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn read_chunks(&mut self) -> Result<Vec<AudioChunk>> {
        (**self).read_chunks()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
}

/// Shared counters for observing a [`MockAudioSource`] after it has been moved.
#[derive(Debug, Clone, Default)]
pub struct DeviceProbe {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    open: Arc<AtomicBool>,
}

impl DeviceProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Mock audio source for testing.
///
/// Simulates a real-time stream: every `read_chunks` returns the whole
/// chunks of `chunk_frames` frames that would have been delivered since
/// `start`, so recorded length tracks wall-clock time like a device does.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    sample_rate: u32,
    channels: u16,
    chunk_frames: usize,
    level: f32,
    started_at: Option<Instant>,
    frames_delivered: usize,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
    probe: DeviceProbe,
}

impl MockAudioSource {
    /// Create a new mock audio source: 16kHz mono, 10ms chunks.
    pub fn new() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: 1,
            chunk_frames: 160,
            level: 0.1,
            started_at: None,
            frames_delivered: 0,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            probe: DeviceProbe::default(),
        }
    }

    /// Deliver interleaved frames with this many channels.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Frames per delivered chunk.
    pub fn with_chunk_frames(mut self, frames: usize) -> Self {
        self.chunk_frames = frames.max(1);
        self
    }

    /// Constant sample value written to every channel.
    pub fn with_level(mut self, level: f32) -> Self {
        self.level = level;
        self
    }

    /// Configure the mock to fail when the device is opened.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Counters that stay valid after the source is moved into a capture.
    pub fn probe(&self) -> DeviceProbe {
        self.probe.clone()
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(AssistantError::AudioDeviceUnavailable {
                message: self.error_message.clone(),
            });
        }
        if self.started_at.is_none() {
            self.probe.opens.fetch_add(1, Ordering::SeqCst);
            self.probe.open.store(true, Ordering::SeqCst);
            self.started_at = Some(Instant::now());
            self.frames_delivered = 0;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.started_at.take().is_some() {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
            self.probe.open.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn read_chunks(&mut self) -> Result<Vec<AudioChunk>> {
        if self.should_fail_read {
            return Err(AssistantError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        let Some(started_at) = self.started_at else {
            return Ok(Vec::new());
        };

        let due = (started_at.elapsed().as_secs_f64() * self.sample_rate as f64) as usize;
        let mut chunks = Vec::new();
        while self.frames_delivered + self.chunk_frames <= due {
            let len = self.chunk_frames * self.channels as usize;
            chunks.push(AudioChunk {
                samples: vec![self.level; len],
                channels: self.channels,
            });
            self.frames_delivered += self.chunk_frames;
        }
        Ok(chunks)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_mock_reads_nothing_before_start() {
        let mut source = MockAudioSource::new();
        assert!(source.read_chunks().unwrap().is_empty());
    }

    #[test]
    fn test_mock_delivers_chunks_in_real_time() {
        let mut source = MockAudioSource::new();
        source.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        let chunks = source.read_chunks().unwrap();

        let frames: usize = chunks.iter().map(AudioChunk::frames).sum();
        assert!(frames >= 160 * 4, "expected ~50ms of audio, got {frames} frames");
        assert!(chunks.iter().all(|c| c.frames() == 160));
    }

    #[test]
    fn test_mock_multi_channel_chunks() {
        let mut source = MockAudioSource::new().with_channels(2).with_level(0.3);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        let chunks = source.read_chunks().unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].channels, 2);
        assert_eq!(chunks[0].samples.len(), 320);
    }

    #[test]
    fn test_probe_counts_open_and_close() {
        let mut source = MockAudioSource::new();
        let probe = source.probe();

        source.start().unwrap();
        source.start().unwrap();
        assert_eq!(probe.opens(), 1);
        assert!(probe.is_open());

        source.stop().unwrap();
        source.stop().unwrap();
        assert_eq!(probe.closes(), 1);
        assert!(!probe.is_open());
    }

    #[test]
    fn test_start_failure_is_device_unavailable() {
        let mut source = MockAudioSource::new()
            .with_start_failure()
            .with_error_message("device busy");
        match source.start() {
            Err(AssistantError::AudioDeviceUnavailable { message }) => {
                assert_eq!(message, "device busy");
            }
            other => panic!("Expected AudioDeviceUnavailable, got {:?}", other),
        }
        assert_eq!(source.probe().opens(), 0);
    }

    #[test]
    fn test_read_failure() {
        let mut source = MockAudioSource::new().with_read_failure();
        source.start().unwrap();
        assert!(matches!(
            source.read_chunks(),
            Err(AssistantError::AudioCapture { .. })
        ));
    }

    #[test]
    fn test_can_be_used_as_trait_object() {
        let mut source: Box<dyn AudioSource> = Box::new(MockAudioSource::new());
        assert!(source.start().is_ok());
        assert!(source.read_chunks().is_ok());
        assert!(source.stop().is_ok());
        assert_eq!(source.sample_rate(), 16000);
    }
}
