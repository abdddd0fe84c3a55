//! Microphone capture driven by a push-to-talk key.

pub mod buffer;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod keys;
pub mod push_to_talk;
pub mod recorder;

pub use buffer::{AudioBuffer, AudioChunk};
pub use keys::{Key, KeyEvent, KeySource, KeySubscription, ScriptedKeySource};
pub use push_to_talk::{CaptureOutcome, CaptureSettings, PushToTalk};
pub use recorder::{AudioSource, DeviceProbe, MockAudioSource};
