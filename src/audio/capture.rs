//! Real audio capture using CPAL (Cross-Platform Audio Library).

use crate::audio::buffer::{AudioChunk, downmix, resample};
use crate::audio::recorder::AudioSource;
use crate::error::{AssistantError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probing makes ALSA/JACK/PipeWire print harmless but confusing messages.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Suppress noisy JACK/ALSA messages that occur during audio backend probing.
///
/// # Safety
/// Modifies environment variables; call at startup before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns that are never useful for a microphone.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List usable audio input devices, marking PipeWire/Pulse ones as recommended.
///
/// # Errors
/// Returns `AssistantError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| AssistantError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AssistantError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

        if let Some(name) = device_name {
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }
            return Err(AssistantError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        for dev in devices {
            if let Ok(dev_name) = dev.name()
                && is_preferred_device(&dev_name)
            {
                return Ok(dev);
            }
        }

        host.default_input_device()
            .ok_or_else(|| AssistantError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only created, played and dropped by the thread that
/// owns the `CpalAudioSource`, which is never shared.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture through CPAL.
///
/// The device is resolved when the source is built, but the stream (and with
/// it the physical device) only exists between `start` and `stop`. Chunks
/// are handed from the CPAL callback thread over a channel.
pub struct CpalAudioSource {
    device_name: Option<String>,
    stream: Option<SendableStream>,
    chunk_tx: Sender<AudioChunk>,
    chunk_rx: Receiver<AudioChunk>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Create a new CPAL audio source.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, prefers PipeWire/Pulse, then the system default.
    /// * `sample_rate` - Rate of the delivered chunks
    ///
    /// # Errors
    /// Returns `AudioDeviceNotFound` if the device does not exist.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        // Fail early on a misspelled device instead of at the first key press.
        find_device(device_name)?;
        let (chunk_tx, chunk_rx) = unbounded();
        Ok(Self {
            device_name: device_name.map(str::to_string),
            stream: None,
            chunk_tx,
            chunk_rx,
            sample_rate,
        })
    }

    /// Build the input stream.
    ///
    /// Tries in order:
    /// 1. f32 at the target rate with the device's channel count
    /// 2. i16 at the target rate with the device's channel count
    /// 3. Device default config, down-mixed and resampled in the callback
    fn build_stream(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        let channels = device
            .default_input_config()
            .map(|c| c.channels())
            .unwrap_or(1);
        let preferred_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let tx = self.chunk_tx.clone();
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    channels,
                });
            },
            stream_error,
            None,
        ) {
            return Ok(stream);
        }

        let tx = self.chunk_tx.clone();
        if let Ok(stream) = device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.iter().map(|&s| s as f32 / 32768.0).collect(),
                    channels,
                });
            },
            stream_error,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native(device)
    }

    /// Build a stream using the device's native config, converting in software.
    fn build_stream_native(&self, device: &cpal::Device) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            device
                .default_input_config()
                .map_err(|e| AssistantError::AudioDeviceUnavailable {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels();
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        tracing::info!(
            channels = native_channels,
            rate = native_rate,
            format = ?default_config.sample_format(),
            "using native audio format, converting in software"
        );

        let tx = self.chunk_tx.clone();
        match default_config.sample_format() {
            SampleFormat::F32 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = downmix(data, native_channels);
                        let _ = tx.send(AudioChunk::mono(resample(&mono, native_rate, target_rate)));
                    },
                    stream_error,
                    None,
                )
                .map_err(|e| AssistantError::AudioDeviceUnavailable {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            SampleFormat::I16 => device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let as_f32: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let mono = downmix(&as_f32, native_channels);
                        let _ = tx.send(AudioChunk::mono(resample(&mono, native_rate, target_rate)));
                    },
                    stream_error,
                    None,
                )
                .map_err(|e| AssistantError::AudioDeviceUnavailable {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            fmt => Err(AssistantError::AudioDeviceUnavailable {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device with --device.",
                    fmt
                ),
            }),
        }
    }
}

fn stream_error(err: cpal::StreamError) {
    tracing::warn!("audio stream error: {}", err);
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        // Drop anything a previous stream left behind.
        while self.chunk_rx.try_recv().is_ok() {}

        let device = find_device(self.device_name.as_deref())?;
        let stream = with_suppressed_stderr(|| self.build_stream(&device))?;
        stream
            .play()
            .map_err(|e| AssistantError::AudioDeviceUnavailable {
                message: format!("Failed to start audio stream: {}", e),
            })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(sendable_stream) = self.stream.take() {
            // Dropping the stream closes the device even if pause fails.
            let paused = sendable_stream.0.pause();
            drop(sendable_stream);
            paused.map_err(|e| AssistantError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_chunks(&mut self) -> Result<Vec<AudioChunk>> {
        Ok(self.chunk_rx.try_iter().collect())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("failed to release audio device: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_devices_filters_outputs() {
        let devices = list_devices().expect("Failed to list devices");
        for device in &devices {
            assert!(!device.to_lowercase().contains("hdmi"), "{}", device);
        }
    }

    #[test]
    fn test_create_with_invalid_device_name() {
        match CpalAudioSource::new(Some("NonExistentDevice12345"), 16000) {
            Err(AssistantError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            Err(AssistantError::AudioCapture { .. }) => {
                // No audio backend at all on this machine
            }
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("Expected AudioDeviceNotFound error"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_start_read_stop_cycle() {
        let mut source = CpalAudioSource::new(None, 16000).expect("Failed to create audio source");
        for _ in 0..2 {
            source.start().expect("start");
            std::thread::sleep(std::time::Duration::from_millis(100));
            assert!(source.read_chunks().is_ok());
            source.stop().expect("stop");
        }
    }
}
