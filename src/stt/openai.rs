//! Remote speech-to-text over the OpenAI-compatible transcription endpoint.

use crate::audio::buffer::AudioBuffer;
use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::stt::transcriber::Transcriber;
use reqwest::blocking::{Client, multipart};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OpenAiTranscriberConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Language hint; "auto" sends none.
    pub language: String,
    pub timeout: Duration,
}

impl Default for OpenAiTranscriberConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::API_BASE.to_string(),
            api_key: String::new(),
            model: defaults::API_STT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            timeout: Duration::from_secs(defaults::AGENT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Uploads the captured buffer as a 16-bit WAV file and returns the text.
pub struct OpenAiTranscriber {
    config: OpenAiTranscriberConfig,
    client: Client,
}

impl OpenAiTranscriber {
    pub fn new(config: OpenAiTranscriberConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AssistantError::ConfigInvalidValue {
                key: defaults::API_KEY_ENV.to_string(),
                message: "API transcription requires an API key".to_string(),
            });
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.config.api_base.trim_end_matches('/')
        )
    }
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<String> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        let part = multipart::Part::bytes(audio.to_wav_bytes()?)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let mut form = multipart::Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());
        if self.config.language != defaults::AUTO_LANGUAGE {
            form = form.text("language", self.config.language.clone());
        }

        tracing::debug!(
            "uploading {:.1}s of audio to {}",
            audio.duration().as_secs_f32(),
            self.endpoint()
        );
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(AssistantError::Transcription {
                message: format!("API returned {}: {}", status, body),
            });
        }

        let parsed: TranscriptionResponse = response.json()?;
        Ok(parsed.text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OpenAiTranscriberConfig {
        OpenAiTranscriberConfig {
            api_base: "http://127.0.0.1:9/v1/".to_string(),
            api_key: "test-key".to_string(),
            ..OpenAiTranscriberConfig::default()
        }
    }

    #[test]
    fn requires_api_key() {
        let result = OpenAiTranscriber::new(OpenAiTranscriberConfig::default());
        assert!(matches!(
            result,
            Err(AssistantError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let transcriber = OpenAiTranscriber::new(config()).unwrap();
        assert_eq!(
            transcriber.endpoint(),
            "http://127.0.0.1:9/v1/audio/transcriptions"
        );
        assert_eq!(transcriber.model_name(), "whisper-1");
    }

    #[test]
    fn empty_audio_skips_the_request() {
        let transcriber = OpenAiTranscriber::new(config()).unwrap();
        let text = transcriber.transcribe(&AudioBuffer::empty(16000)).unwrap();
        assert!(text.is_empty());
    }

    #[test]
    fn unreachable_server_is_an_error() {
        let transcriber = OpenAiTranscriber::new(config()).unwrap();
        let audio = AudioBuffer::new(vec![0.1; 1600], 16000);
        assert!(transcriber.transcribe(&audio).is_err());
    }

    #[test]
    fn response_text_defaults_to_empty() {
        let parsed: TranscriptionResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.text.is_empty());
    }
}
