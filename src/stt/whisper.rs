//! Local speech-to-text with whisper.cpp.
//!
//! # Feature Gate
//!
//! The real implementation needs the `whisper` feature (and cmake). Without
//! it, [`WhisperTranscriber`] still validates the model path but refuses to
//! transcribe.

use crate::audio::buffer::{AudioBuffer, resample};
use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::stt::transcriber::Transcriber;
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for Whisper transcriber.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Language code (e.g., "en", "es") or "auto"
    pub language: String,
    /// Number of threads for inference (None = whisper.cpp default)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(defaults::WHISPER_MODEL_PATH),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

/// Whisper-based transcriber.
///
/// The context is loaded once at startup and shared across turns behind a
/// mutex; each call creates a fresh decoding state.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .finish()
    }
}

#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

fn check_model(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(AssistantError::TranscriptionModelNotFound {
            path: path.to_string_lossy().to_string(),
        });
    }
    Ok(path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string())
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load the model.
    ///
    /// # Errors
    /// `TranscriptionModelNotFound` if the file is missing, `Transcription`
    /// if whisper.cpp cannot load it.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        let model_name = check_model(&config.model_path)?;

        let model_path = config
            .model_path
            .to_str()
            .ok_or_else(|| AssistantError::Transcription {
                message: "Invalid UTF-8 in model path".to_string(),
            })?;
        let context =
            WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
                .map_err(|e| AssistantError::Transcription {
                    message: format!("Failed to load Whisper model: {}", e),
                })?;

        tracing::info!("loaded whisper model {}", model_name);
        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Stub constructor: checks the model file exists.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        let model_name = check_model(&config.model_path)?;
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

/// Samples at the 16kHz rate whisper.cpp expects.
#[cfg_attr(not(feature = "whisper"), allow(dead_code))]
fn whisper_input(audio: &AudioBuffer) -> Vec<f32> {
    resample(audio.samples(), audio.sample_rate(), defaults::SAMPLE_RATE)
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }
        let samples = whisper_input(audio);

        let context = self
            .context
            .lock()
            .map_err(|e| AssistantError::Transcription {
                message: format!("Failed to acquire context lock: {}", e),
            })?;

        let mut state = context
            .create_state()
            .map_err(|e| AssistantError::Transcription {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.config.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &samples)
            .map_err(|e| AssistantError::Transcription {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }

        Ok(transcription.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }
        Err(AssistantError::Transcription {
            message: concat!(
                "Whisper feature not enabled. This binary was built without local speech recognition.\n",
                "Set [stt] engine = \"api\" or rebuild with --features whisper"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}
