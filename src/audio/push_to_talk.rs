//! Push-to-talk capture.
//!
//! Records from an [`AudioSource`] while the trigger key is held. Recording
//! stops on the first of: trigger released, quit pressed, max duration
//! reached, or the interrupt token cancelled.

use crate::audio::buffer::{AudioBuffer, AudioChunk};
use crate::audio::keys::{Key, KeyEvent, KeySource};
use crate::audio::recorder::AudioSource;
use crate::defaults;
use crate::error::{AssistantError, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Keys and bounds for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub trigger: Key,
    pub quit: Key,
    pub max_duration: Duration,
    /// Upper bound on how late a deadline or interrupt is noticed.
    pub poll_interval: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            trigger: Key::ControlRight,
            quit: Key::Escape,
            max_duration: Duration::from_secs(defaults::MAX_RECORD_SECS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
        }
    }
}

/// Result of a capture that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Mono audio, possibly empty.
    Audio(AudioBuffer),
    /// The quit key was pressed. Any partial audio was discarded.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Released,
    MaxDuration,
    Quit,
    Interrupted,
}

/// Stops the source when dropped, whichever way the capture ends.
struct OpenDevice<'a> {
    source: &'a mut dyn AudioSource,
}

impl<'a> OpenDevice<'a> {
    fn open(source: &'a mut dyn AudioSource) -> Result<Self> {
        source.start()?;
        Ok(Self { source })
    }
}

impl Drop for OpenDevice<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.source.stop() {
            tracing::warn!("failed to release audio device: {}", e);
        }
    }
}

struct CaptureSession {
    started_at: Instant,
    chunks: Vec<AudioChunk>,
}

/// Push-to-talk recorder over an audio source and a key event source.
///
/// One capture at a time: `capture` takes `&mut self`, and the audio device
/// is opened and closed within each call.
pub struct PushToTalk {
    source: Box<dyn AudioSource>,
    keys: Arc<dyn KeySource>,
    settings: CaptureSettings,
}

impl PushToTalk {
    pub fn new(
        source: Box<dyn AudioSource>,
        keys: Arc<dyn KeySource>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            source,
            keys,
            settings,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    /// Wait for the trigger key, then record until it is released.
    ///
    /// Blocks the calling thread. Returns [`CaptureOutcome::Cancelled`] if the
    /// quit key is pressed before or during recording; the device is never
    /// opened when quit comes first.
    ///
    /// # Errors
    /// `Interrupted` when `cancel` fires, `KeyListener` when the key stream
    /// closes, and any error from opening or reading the device. The device
    /// is released on all of them.
    pub fn capture(&mut self, cancel: &CancellationToken) -> Result<CaptureOutcome> {
        let subscription = self.keys.subscribe()?;
        let events = subscription.events();

        if !self.wait_for_trigger(events, cancel)? {
            tracing::debug!("capture cancelled before recording");
            return Ok(CaptureOutcome::Cancelled);
        }

        let sample_rate = self.source.sample_rate();
        let settings = self.settings.clone();
        let device = OpenDevice::open(self.source.as_mut())?;
        let mut session = CaptureSession {
            started_at: Instant::now(),
            chunks: Vec::new(),
        };
        let deadline = session.started_at + settings.max_duration;

        let reason = loop {
            session.chunks.extend(device.source.read_chunks()?);

            if cancel.is_cancelled() {
                break StopReason::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                break StopReason::MaxDuration;
            }

            match events.recv_timeout(settings.poll_interval.min(deadline - now)) {
                Ok(KeyEvent::Pressed(key)) if key == settings.quit => break StopReason::Quit,
                Ok(KeyEvent::Released(key)) if key == settings.trigger => {
                    break StopReason::Released;
                }
                // Auto-repeat presses of the trigger and unrelated keys.
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(listener_closed()),
            }
        };

        tracing::debug!(
            "recording stopped ({:?}) after {:?}",
            reason,
            session.started_at.elapsed()
        );

        match reason {
            StopReason::Quit => Ok(CaptureOutcome::Cancelled),
            StopReason::Interrupted => Err(AssistantError::Interrupted),
            StopReason::Released | StopReason::MaxDuration => {
                session.chunks.extend(device.source.read_chunks()?);
                drop(device);
                Ok(CaptureOutcome::Audio(AudioBuffer::from_chunks(
                    &session.chunks,
                    sample_rate,
                )))
            }
        }
    }

    /// Returns `true` once the trigger is pressed, `false` if quit came first.
    fn wait_for_trigger(
        &self,
        events: &Receiver<KeyEvent>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        loop {
            if cancel.is_cancelled() {
                return Err(AssistantError::Interrupted);
            }
            match events.recv_timeout(self.settings.poll_interval) {
                Ok(KeyEvent::Pressed(key)) if key == self.settings.quit => return Ok(false),
                Ok(KeyEvent::Pressed(key)) if key == self.settings.trigger => return Ok(true),
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(listener_closed()),
            }
        }
    }
}

fn listener_closed() -> AssistantError {
    AssistantError::KeyListener {
        message: "key event stream closed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::keys::ScriptedKeySource;
    use crate::audio::recorder::MockAudioSource;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ptt(source: MockAudioSource, keys: ScriptedKeySource) -> PushToTalk {
        PushToTalk::new(Box::new(source), Arc::new(keys), CaptureSettings::default())
    }

    #[test]
    fn quit_before_trigger_never_opens_device() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let keys = ScriptedKeySource::new().press(ms(5), Key::Escape);

        let outcome = ptt(source, keys)
            .capture(&CancellationToken::new())
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Cancelled);
        assert_eq!(probe.opens(), 0);
    }

    #[test]
    fn release_returns_recorded_audio() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .release(ms(100), Key::ControlRight);

        let outcome = ptt(source, keys)
            .capture(&CancellationToken::new())
            .unwrap();

        let CaptureOutcome::Audio(buffer) = outcome else {
            panic!("expected audio, got {:?}", outcome);
        };
        assert!(!buffer.is_empty());
        assert_eq!(buffer.sample_rate(), 16000);
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 1);
        assert!(!probe.is_open());
    }

    #[test]
    fn quit_while_recording_discards_audio_and_closes_device() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .press(ms(50), Key::Escape);

        let outcome = ptt(source, keys)
            .capture(&CancellationToken::new())
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Cancelled);
        assert_eq!(probe.opens(), 1);
        assert!(!probe.is_open());
    }

    #[test]
    fn repeated_trigger_presses_do_not_stop_recording() {
        let source = MockAudioSource::new();
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .press(ms(20), Key::ControlRight)
            .press(ms(20), Key::ControlRight)
            .release(ms(60), Key::ControlRight);

        let started = Instant::now();
        let outcome = ptt(source, keys)
            .capture(&CancellationToken::new())
            .unwrap();

        assert!(matches!(outcome, CaptureOutcome::Audio(_)));
        assert!(started.elapsed() >= ms(100));
    }

    #[test]
    fn stereo_source_is_downmixed() {
        let source = MockAudioSource::new().with_channels(2).with_level(0.4);
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .release(ms(60), Key::ControlRight);

        let CaptureOutcome::Audio(buffer) = ptt(source, keys)
            .capture(&CancellationToken::new())
            .unwrap()
        else {
            panic!("expected audio");
        };

        assert!(!buffer.is_empty());
        assert!(buffer.samples().iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn interrupt_while_recording_releases_device() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let keys = ScriptedKeySource::new().press(ms(5), Key::ControlRight);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(ms(60));
            trigger.cancel();
        });

        let result = ptt(source, keys).capture(&cancel);

        assert!(matches!(result, Err(AssistantError::Interrupted)));
        assert_eq!(probe.opens(), 1);
        assert!(!probe.is_open());
    }

    #[test]
    fn interrupt_before_trigger_is_reported() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ptt(source, ScriptedKeySource::new()).capture(&cancel);

        assert!(matches!(result, Err(AssistantError::Interrupted)));
        assert_eq!(probe.opens(), 0);
    }

    #[test]
    fn read_failure_still_releases_device() {
        let source = MockAudioSource::new().with_read_failure();
        let probe = source.probe();
        let keys = ScriptedKeySource::new().press(ms(5), Key::ControlRight);

        let result = ptt(source, keys).capture(&CancellationToken::new());

        assert!(matches!(result, Err(AssistantError::AudioCapture { .. })));
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 1);
    }

    #[test]
    fn device_open_failure_propagates() {
        let source = MockAudioSource::new().with_start_failure();
        let keys = ScriptedKeySource::new().press(ms(5), Key::ControlRight);

        let result = ptt(source, keys).capture(&CancellationToken::new());

        let err = result.unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn closed_key_stream_is_listener_error() {
        let source = MockAudioSource::new();
        let probe = source.probe();
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .disconnect_after_script();

        let result = ptt(source, keys).capture(&CancellationToken::new());

        assert!(matches!(result, Err(AssistantError::KeyListener { .. })));
        assert!(!probe.is_open());
    }

    #[test]
    fn custom_keys_are_honoured() {
        let source = MockAudioSource::new();
        let keys = ScriptedKeySource::new()
            .press(ms(5), Key::ControlRight)
            .press(ms(5), Key::Space)
            .release(ms(50), Key::Space);
        let settings = CaptureSettings {
            trigger: Key::Space,
            quit: Key::Letter('q'),
            ..CaptureSettings::default()
        };

        let outcome = PushToTalk::new(Box::new(source), Arc::new(keys), settings)
            .capture(&CancellationToken::new())
            .unwrap();

        assert!(matches!(outcome, CaptureOutcome::Audio(_)));
    }
}
