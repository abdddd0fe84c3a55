//! Error types for coursevox.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio device unavailable: {message}")]
    AudioDeviceUnavailable { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Key listener failed: {message}")]
    KeyListener { message: String },

    // Stage errors
    #[error("Transcription model not found at {path}")]
    TranscriptionModelNotFound { path: String },

    #[error("Transcription error: {message}")]
    Transcription { message: String },

    #[error("Intent classification failed: {message}")]
    Classification { message: String },

    #[error("Task execution failed: {message}")]
    TaskExecution { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Input error: {message}")]
    Input { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl AssistantError {
    /// Whether this error must end the conversation loop instead of just the turn.
    ///
    /// Device and key listener failures cannot be fixed by retrying a turn,
    /// and an interrupt always unwinds to the top level.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AssistantError::AudioDeviceNotFound { .. }
                | AssistantError::AudioDeviceUnavailable { .. }
                | AssistantError::KeyListener { .. }
                | AssistantError::Interrupted
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AssistantError>;
