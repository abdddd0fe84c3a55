//! Speech-to-text backends.

pub mod openai;
pub mod transcriber;
pub mod whisper;

pub use openai::{OpenAiTranscriber, OpenAiTranscriberConfig};
pub use transcriber::{MockTranscriber, Transcriber};
pub use whisper::{WhisperConfig, WhisperTranscriber};
