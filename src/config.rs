use crate::agent::chat::ChatTaskConfig;
use crate::agent::client::ChatClientConfig;
use crate::audio::keys::Key;
use crate::audio::push_to_talk::CaptureSettings;
use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::intent::router::RouterConfig;
use crate::intent::types::Track;
use crate::stt::openai::OpenAiTranscriberConfig;
use crate::stt::whisper::WhisperConfig;
use crate::tts::speaker::{OpenAiSpeakerConfig, SpeakerConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub agent: AgentConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub max_record_secs: u64,
    pub trigger_key: String,
    pub quit_key: String,
    pub poll_interval_ms: u64,
}

/// Which speech-to-text backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SttEngine {
    /// whisper.cpp on this machine
    #[default]
    Local,
    /// OpenAI-compatible transcription endpoint
    Api,
}

impl fmt::Display for SttEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SttEngine::Local => write!(f, "local"),
            SttEngine::Api => write!(f, "api"),
        }
    }
}

impl FromStr for SttEngine {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "whisper" => Ok(SttEngine::Local),
            "api" | "openai" => Ok(SttEngine::Api),
            other => Err(AssistantError::ConfigInvalidValue {
                key: "stt.engine".to_string(),
                message: format!("unknown engine '{}', expected 'local' or 'api'", other),
            }),
        }
    }
}

/// Which text-to-speech backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    /// espeak-compatible command on this machine
    #[default]
    Local,
    /// OpenAI-compatible speech endpoint played through `tts.player`
    Api,
}

impl fmt::Display for TtsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TtsEngine::Local => write!(f, "local"),
            TtsEngine::Api => write!(f, "api"),
        }
    }
}

impl FromStr for TtsEngine {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "espeak" => Ok(TtsEngine::Local),
            "api" | "openai" => Ok(TtsEngine::Api),
            other => Err(AssistantError::ConfigInvalidValue {
                key: "tts.engine".to_string(),
                message: format!("unknown engine '{}', expected 'local' or 'api'", other),
            }),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub engine: SttEngine,
    pub model_path: PathBuf,
    pub language: String,
    pub api_model: String,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: TtsEngine,
    pub command: String,
    pub rate: u32,
    pub volume: f32,
    pub api_model: String,
    pub voice: String,
    pub player: String,
}

/// Classifier and task agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub api_base: String,
    pub model: String,
    pub classifier_model: String,
    pub default_track: String,
    pub min_confidence: f32,
    pub schedule_path: PathBuf,
    pub preferences_path: PathBuf,
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            max_record_secs: defaults::MAX_RECORD_SECS,
            trigger_key: defaults::TRIGGER_KEY.to_string(),
            quit_key: defaults::QUIT_KEY.to_string(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            engine: SttEngine::Local,
            model_path: PathBuf::from(defaults::WHISPER_MODEL_PATH),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            api_model: defaults::API_STT_MODEL.to_string(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::Local,
            command: defaults::TTS_COMMAND.to_string(),
            rate: defaults::TTS_RATE,
            volume: defaults::TTS_VOLUME,
            api_model: defaults::API_TTS_MODEL.to_string(),
            voice: defaults::API_TTS_VOICE.to_string(),
            player: defaults::TTS_PLAYER.to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::API_BASE.to_string(),
            model: defaults::CHAT_MODEL.to_string(),
            classifier_model: defaults::CHAT_MODEL.to_string(),
            default_track: defaults::DEFAULT_TRACK.to_string(),
            min_confidence: defaults::MIN_CONFIDENCE,
            schedule_path: PathBuf::from(defaults::SCHEDULE_PATH),
            preferences_path: PathBuf::from(defaults::PREFERENCES_PATH),
            timeout_secs: defaults::AGENT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    ///
    /// # Errors
    ///
    /// `ConfigFileNotFound` if the file does not exist, `ConfigParse` for
    /// invalid TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AssistantError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                AssistantError::Io(e)
            }
        })?;
        toml::from_str(&contents).map_err(|e| AssistantError::ConfigParse {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(AssistantError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - COURSEVOX_AUDIO_DEVICE → audio.device
    /// - COURSEVOX_STT_ENGINE → stt.engine
    /// - COURSEVOX_TTS_ENGINE → tts.engine
    /// - COURSEVOX_TTS_VOICE → tts.voice
    /// - COURSEVOX_MODEL_PATH → stt.model_path
    /// - COURSEVOX_AGENT_MODEL → agent.model
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("COURSEVOX_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(engine) = std::env::var("COURSEVOX_STT_ENGINE")
            && !engine.is_empty()
        {
            match engine.parse() {
                Ok(engine) => self.stt.engine = engine,
                Err(e) => tracing::warn!("ignoring COURSEVOX_STT_ENGINE: {}", e),
            }
        }

        if let Ok(engine) = std::env::var("COURSEVOX_TTS_ENGINE")
            && !engine.is_empty()
        {
            match engine.parse() {
                Ok(engine) => self.tts.engine = engine,
                Err(e) => tracing::warn!("ignoring COURSEVOX_TTS_ENGINE: {}", e),
            }
        }

        if let Ok(voice) = std::env::var("COURSEVOX_TTS_VOICE")
            && !voice.is_empty()
        {
            self.tts.voice = voice;
        }

        if let Ok(path) = std::env::var("COURSEVOX_MODEL_PATH")
            && !path.is_empty()
        {
            self.stt.model_path = PathBuf::from(path);
        }

        if let Ok(model) = std::env::var("COURSEVOX_AGENT_MODEL")
            && !model.is_empty()
        {
            self.agent.model = model;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/coursevox/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("coursevox")
            .join("config.toml")
    }

    /// Check values that deserialize fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: &str) -> AssistantError {
            AssistantError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.max_record_secs == 0 {
            return Err(invalid("audio.max_record_secs", "must be positive"));
        }
        if self.audio.poll_interval_ms == 0 {
            return Err(invalid("audio.poll_interval_ms", "must be positive"));
        }
        let settings = self.capture_settings()?;
        if settings.trigger == settings.quit {
            return Err(invalid(
                "audio.quit_key",
                "must differ from audio.trigger_key",
            ));
        }
        if !(0.0..=1.0).contains(&self.tts.volume) {
            return Err(invalid("tts.volume", "must be between 0.0 and 1.0"));
        }
        if self.tts.engine == TtsEngine::Api && self.tts.player.trim().is_empty() {
            return Err(invalid("tts.player", "required for the api engine"));
        }
        if !(0.0..=1.0).contains(&self.agent.min_confidence) {
            return Err(invalid(
                "agent.min_confidence",
                "must be between 0.0 and 1.0",
            ));
        }
        if self.agent.timeout_secs == 0 {
            return Err(invalid("agent.timeout_secs", "must be positive"));
        }
        Ok(())
    }

    /// The effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AssistantError::Other(e.to_string()))
    }

    pub fn capture_settings(&self) -> Result<CaptureSettings> {
        let trigger: Key = self.audio.trigger_key.parse().map_err(|e: AssistantError| {
            AssistantError::ConfigInvalidValue {
                key: "audio.trigger_key".to_string(),
                message: e.to_string(),
            }
        })?;
        let quit: Key = self.audio.quit_key.parse().map_err(|e: AssistantError| {
            AssistantError::ConfigInvalidValue {
                key: "audio.quit_key".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(CaptureSettings {
            trigger,
            quit,
            max_duration: Duration::from_secs(self.audio.max_record_secs),
            poll_interval: Duration::from_millis(self.audio.poll_interval_ms),
        })
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            default_track: Track::coerce(&self.agent.default_track),
            min_confidence: self.agent.min_confidence,
        }
    }

    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            model_path: self.stt.model_path.clone(),
            language: self.stt.language.clone(),
            threads: None,
        }
    }

    pub fn transcription_api_config(&self, api_key: &str) -> OpenAiTranscriberConfig {
        OpenAiTranscriberConfig {
            api_base: self.agent.api_base.clone(),
            api_key: api_key.to_string(),
            model: self.stt.api_model.clone(),
            language: self.stt.language.clone(),
            timeout: Duration::from_secs(self.agent.timeout_secs),
        }
    }

    pub fn chat_client_config(&self, api_key: &str) -> ChatClientConfig {
        ChatClientConfig {
            api_base: self.agent.api_base.clone(),
            api_key: api_key.to_string(),
            model: self.agent.model.clone(),
            timeout: Duration::from_secs(self.agent.timeout_secs),
        }
    }

    pub fn chat_task_config(&self) -> ChatTaskConfig {
        ChatTaskConfig {
            schedule_path: self.agent.schedule_path.clone(),
            preferences_path: self.agent.preferences_path.clone(),
        }
    }

    pub fn speaker_config(&self) -> SpeakerConfig {
        SpeakerConfig {
            command: self.tts.command.clone(),
            rate: self.tts.rate,
            volume: self.tts.volume,
        }
    }

    pub fn openai_speaker_config(&self) -> OpenAiSpeakerConfig {
        OpenAiSpeakerConfig {
            model: self.tts.api_model.clone(),
            voice: self.tts.voice.clone(),
            player: self.tts.player.clone(),
        }
    }

    /// API key from the environment. Never read from or written to the file.
    pub fn api_key() -> Option<String> {
        std::env::var(defaults::API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}
