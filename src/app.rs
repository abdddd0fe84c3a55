//! Assistant entry point.
//!
//! Builds every collaborator from the configuration, then hands them to the
//! turn engine. Nothing here runs inside the async runtime except the engine
//! itself: the blocking HTTP client used for API transcription must be
//! created and dropped outside it.

use crate::agent::chat::ChatTaskExecutor;
use crate::agent::client::ChatClient;
use crate::audio::capture::CpalAudioSource;
use crate::audio::keys::RdevKeySource;
use crate::audio::push_to_talk::{CaptureOutcome, PushToTalk};
use crate::config::{Config, SttEngine, TtsEngine};
use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::intent::classifier::OpenAiClassifier;
use crate::intent::router::IntentRouter;
use crate::output::{TerminalView, format_level_bar};
use crate::stt::openai::OpenAiTranscriber;
use crate::stt::transcriber::Transcriber;
use crate::stt::whisper::WhisperTranscriber;
use crate::tts::speaker::{CommandSpeaker, OpenAiSpeaker, Speaker};
use crate::turn::engine::{Collaborators, TurnEngine};
use crate::turn::input::TerminalPrompt;
use crate::turn::metrics::TurnMetricsState;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<String>,
    pub max_duration_secs: Option<u64>,
    pub stt_engine: Option<SttEngine>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(secs) = self.max_duration_secs {
            config.audio.max_record_secs = secs;
        }
        if let Some(engine) = self.stt_engine {
            config.stt.engine = engine;
        }
    }
}

fn require_api_key() -> Result<String> {
    Config::api_key().ok_or_else(|| AssistantError::ConfigInvalidValue {
        key: defaults::API_KEY_ENV.to_string(),
        message: "not set; the classifier and task agent need it".to_string(),
    })
}

/// Build the configured speech-to-text backend.
///
/// # Errors
/// `TranscriptionModelNotFound` when the local model file is missing, or a
/// configuration error when the API backend has no key.
pub fn build_transcriber(config: &Config, api_key: &str) -> Result<Arc<dyn Transcriber>> {
    match config.stt.engine {
        SttEngine::Local => {
            let transcriber = WhisperTranscriber::new(config.whisper_config()).map_err(|e| {
                if let AssistantError::TranscriptionModelNotFound { path } = &e {
                    tracing::error!(
                        "no whisper model at {}; set stt.model_path or use --stt-engine api",
                        path
                    );
                }
                e
            })?;
            Ok(Arc::new(transcriber))
        }
        SttEngine::Api => Ok(Arc::new(OpenAiTranscriber::new(
            config.transcription_api_config(api_key),
        )?)),
    }
}

/// Build the configured text-to-speech backend.
pub fn build_speaker(config: &Config, chat: &ChatClient) -> Arc<dyn Speaker> {
    match config.tts.engine {
        TtsEngine::Local => Arc::new(CommandSpeaker::new(config.speaker_config())),
        TtsEngine::Api => Arc::new(OpenAiSpeaker::new(
            chat.clone(),
            config.openai_speaker_config(),
        )),
    }
}

/// Build all turn collaborators. The classifier, executor and API speaker
/// share one chat client.
pub fn build_collaborators(config: &Config, api_key: &str) -> Result<Collaborators> {
    let chat = ChatClient::new(config.chat_client_config(api_key))?;
    Ok(Collaborators {
        transcriber: build_transcriber(config, api_key)?,
        classifier: Arc::new(OpenAiClassifier::new(
            chat.clone(),
            &config.agent.classifier_model,
        )),
        speaker: build_speaker(config, &chat),
        executor: Arc::new(ChatTaskExecutor::new(chat, config.chat_task_config())),
    })
}

/// Microphone plus global keyboard, wired into a push-to-talk recorder.
fn open_capture(config: &Config) -> Result<PushToTalk> {
    let source = CpalAudioSource::new(config.audio.device.as_deref(), config.audio.sample_rate)?;
    Ok(PushToTalk::new(
        Box::new(source),
        Arc::new(RdevKeySource::new()),
        config.capture_settings()?,
    ))
}

/// The program that has to be installed for the configured speech engine.
fn tts_program(config: &Config) -> Option<&str> {
    match config.tts.engine {
        TtsEngine::Local => Some(config.tts.command.as_str()),
        TtsEngine::Api => config.tts.player.split_whitespace().next(),
    }
}

/// Warn early when the speech command is not installed.
fn check_tts_command(command: &str) {
    if command.contains('/') {
        if !Path::new(command).exists() {
            tracing::warn!("TTS command {} not found; answers will not be spoken", command);
        }
        return;
    }
    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false);
    if !found {
        tracing::warn!(
            "{} not found on PATH; install it or change the [tts] settings",
            command
        );
    }
}

/// Run the conversation loop until the user exits.
///
/// `cancel` is the top-level interrupt. Returns the final session metrics.
pub fn run_assistant(
    config: &Config,
    runtime: &Runtime,
    cancel: CancellationToken,
    color: bool,
) -> Result<TurnMetricsState> {
    config.validate()?;
    let api_key = require_api_key()?;
    let collaborators = build_collaborators(config, &api_key)?;
    if let Some(program) = tts_program(config) {
        check_tts_command(program);
    }
    let capture = open_capture(config)?;

    let settings = capture.settings().clone();
    let view = Arc::new(TerminalView::stdout(
        color,
        &settings.trigger.to_string(),
        &settings.quit.to_string(),
    ));
    view.banner(&crate::version_string());

    let mut engine = TurnEngine::new(
        capture,
        collaborators,
        IntentRouter::new(config.router_config()),
        Arc::new(TerminalPrompt::stdio()),
        view,
        cancel,
    );
    let result = runtime.block_on(engine.run());
    drop(engine);
    result
}

/// One push-to-talk capture, reported and optionally saved as WAV.
pub fn run_record_test(
    config: &Config,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    config.validate()?;
    let mut capture = open_capture(config)?;
    let settings = capture.settings().clone();
    println!(
        "Hold {} to record (max {}s), press {} to cancel.",
        settings.trigger,
        settings.max_duration.as_secs(),
        settings.quit
    );

    let audio = match capture.capture(cancel)? {
        CaptureOutcome::Cancelled => {
            println!("Cancelled.");
            return Ok(());
        }
        CaptureOutcome::Audio(audio) => audio,
    };

    println!("Samples:  {}", audio.len());
    println!("Duration: {:.2}s", audio.duration().as_secs_f32());
    println!("Level:    {}", format_level_bar(audio.rms()));
    if audio.is_empty() {
        println!("No audio recorded. Check the device with `coursevox devices`.");
        return Ok(());
    }

    if let Some(path) = output {
        audio.write_wav(&path)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let mut config = Config::default();
        Overrides {
            device: Some("pulse".to_string()),
            max_duration_secs: Some(30),
            stt_engine: Some(SttEngine::Api),
        }
        .apply(&mut config);

        assert_eq!(config.audio.device.as_deref(), Some("pulse"));
        assert_eq!(config.audio.max_record_secs, 30);
        assert_eq!(config.stt.engine, SttEngine::Api);
    }

    #[test]
    fn empty_overrides_keep_config() {
        let mut config = Config::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_local_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.stt.model_path = dir.path().join("ggml-missing.bin");

        match build_transcriber(&config, "key") {
            Err(AssistantError::TranscriptionModelNotFound { path }) => {
                assert!(path.contains("ggml-missing.bin"));
            }
            Err(other) => panic!("Expected TranscriptionModelNotFound, got {:?}", other),
            Ok(_) => panic!("Expected TranscriptionModelNotFound"),
        }
    }

    #[test]
    fn api_engine_builds_without_model_file() {
        let mut config = Config::default();
        config.stt.engine = SttEngine::Api;
        let transcriber = build_transcriber(&config, "test-key").unwrap();
        assert_eq!(transcriber.model_name(), defaults::API_STT_MODEL);
        drop(transcriber);
    }

    #[test]
    fn tts_program_follows_engine() {
        let mut config = Config::default();
        assert_eq!(tts_program(&config), Some("espeak-ng"));
        config.tts.engine = TtsEngine::Api;
        assert_eq!(tts_program(&config), Some("aplay"));
        config.tts.player = String::new();
        assert_eq!(tts_program(&config), None);
    }

    #[test]
    fn api_speech_builds_offline() {
        let mut config = Config::default();
        config.stt.engine = SttEngine::Api;
        config.tts.engine = TtsEngine::Api;
        assert!(build_collaborators(&config, "test-key").is_ok());
    }

    #[test]
    fn collaborators_build_offline() {
        let mut config = Config::default();
        config.stt.engine = SttEngine::Api;
        assert!(build_collaborators(&config, "test-key").is_ok());
    }
}
