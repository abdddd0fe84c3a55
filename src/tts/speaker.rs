//! Text-to-speech.
//!
//! The [`Speaker`] trait enables testing the engine without audio output.

use crate::agent::client::ChatClient;
use crate::defaults;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Speaks text aloud and returns once playback has finished.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerConfig {
    pub command: String,
    /// Words per minute.
    pub rate: u32,
    /// 0.0 to 1.0.
    pub volume: f32,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            command: defaults::TTS_COMMAND.to_string(),
            rate: defaults::TTS_RATE,
            volume: defaults::TTS_VOLUME,
        }
    }
}

/// Speaks through an espeak-compatible command line tool.
///
/// The child is killed if the future is dropped, so an interrupt stops speech.
#[derive(Debug, Clone, Default)]
pub struct CommandSpeaker {
    config: SpeakerConfig,
}

impl CommandSpeaker {
    pub fn new(config: SpeakerConfig) -> Self {
        Self { config }
    }

    /// Arguments for one utterance. Amplitude is espeak's 0-200 scale.
    pub fn args(&self, text: &str) -> Vec<String> {
        let amplitude = (self.config.volume.clamp(0.0, 1.0) * 200.0).round() as u32;
        vec![
            "-s".to_string(),
            self.config.rate.to_string(),
            "-a".to_string(),
            amplitude.to_string(),
            "--".to_string(),
            text.to_string(),
        ]
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let output = Command::new(&self.config.command)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AssistantError::Synthesis {
                        message: format!(
                            "{} not found. Install it:\n\
                             Ubuntu/Debian: sudo apt install espeak-ng\n\
                             Arch: sudo pacman -S espeak-ng",
                            self.config.command
                        ),
                    }
                } else {
                    AssistantError::Synthesis {
                        message: format!("Failed to run {}: {}", self.config.command, e),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssistantError::Synthesis {
                message: format!(
                    "{} failed with status {:?}: {}",
                    self.config.command,
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSpeakerConfig {
    pub model: String,
    pub voice: String,
    /// Command line that plays WAV audio read from stdin.
    pub player: String,
}

impl Default for OpenAiSpeakerConfig {
    fn default() -> Self {
        Self {
            model: defaults::API_TTS_MODEL.to_string(),
            voice: defaults::API_TTS_VOICE.to_string(),
            player: defaults::TTS_PLAYER.to_string(),
        }
    }
}

/// Speaks through an OpenAI-compatible speech endpoint and a local player.
#[derive(Debug, Clone)]
pub struct OpenAiSpeaker {
    client: ChatClient,
    config: OpenAiSpeakerConfig,
}

impl OpenAiSpeaker {
    pub fn new(client: ChatClient, config: OpenAiSpeakerConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Speaker for OpenAiSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let audio = self
            .client
            .speech(&self.config.model, &self.config.voice, text)
            .await
            .map_err(|e| match e {
                AssistantError::Synthesis { .. } => e,
                other => AssistantError::Synthesis {
                    message: format!("speech request failed: {}", other),
                },
            })?;
        tracing::debug!("received {} bytes of speech", audio.len());
        play_audio(&self.config.player, &audio).await
    }
}

/// Pipe `audio` into the player command and wait for playback to finish.
///
/// The player line is split on whitespace; the first word is the program.
pub async fn play_audio(player: &str, audio: &[u8]) -> Result<()> {
    let mut words = player.split_whitespace();
    let program = words.next().ok_or_else(|| AssistantError::Synthesis {
        message: "no audio player configured".to_string(),
    })?;

    let mut child = Command::new(program)
        .args(words)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AssistantError::Synthesis {
            message: format!("Failed to run {}: {}", program, e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // A player that exits early closes the pipe; its status reports why.
        if let Err(e) = stdin.write_all(audio).await {
            tracing::debug!("player stdin closed early: {}", e);
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| AssistantError::Synthesis {
            message: format!("Failed to wait for {}: {}", program, e),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AssistantError::Synthesis {
            message: format!(
                "{} failed with status {:?}: {}",
                program,
                output.status.code(),
                stderr.trim()
            ),
        });
    }
    Ok(())
}

/// Mock speaker for testing
#[derive(Debug, Clone, Default)]
pub struct MockSpeaker {
    should_fail: bool,
    spoken: Arc<Mutex<Vec<String>>>,
}

impl MockSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Texts spoken so far, shared between clones.
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Speaker for MockSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(text.to_string());
        }
        if self.should_fail {
            return Err(AssistantError::Synthesis {
                message: "mock synthesis failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_scale_volume_to_amplitude() {
        let speaker = CommandSpeaker::default();
        assert_eq!(
            speaker.args("-hello"),
            vec!["-s", "175", "-a", "180", "--", "-hello"]
        );

        let loud = CommandSpeaker::new(SpeakerConfig {
            volume: 3.0,
            rate: 120,
            ..SpeakerConfig::default()
        });
        assert_eq!(loud.args("x")[1], "120");
        assert_eq!(loud.args("x")[3], "200");
    }

    #[tokio::test]
    async fn blank_text_is_a_no_op() {
        let speaker = CommandSpeaker::new(SpeakerConfig {
            command: "/nonexistent/tts".to_string(),
            ..SpeakerConfig::default()
        });
        assert!(speaker.speak("   ").await.is_ok());
    }

    #[tokio::test]
    async fn missing_command_is_synthesis_error() {
        let speaker = CommandSpeaker::new(SpeakerConfig {
            command: "/nonexistent/tts".to_string(),
            ..SpeakerConfig::default()
        });
        match speaker.speak("hello").await {
            Err(AssistantError::Synthesis { message }) => {
                assert!(message.contains("/nonexistent/tts"));
            }
            other => panic!("Expected Synthesis error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn failing_command_reports_status() {
        let speaker = CommandSpeaker::new(SpeakerConfig {
            command: "false".to_string(),
            ..SpeakerConfig::default()
        });
        assert!(matches!(
            speaker.speak("hello").await,
            Err(AssistantError::Synthesis { .. })
        ));
    }

    #[tokio::test]
    async fn player_receives_audio_on_stdin() {
        assert!(play_audio("cat", b"RIFF").await.is_ok());
    }

    #[tokio::test]
    async fn player_problems_are_synthesis_errors() {
        assert!(matches!(
            play_audio("   ", b"RIFF").await,
            Err(AssistantError::Synthesis { .. })
        ));
        assert!(matches!(
            play_audio("/nonexistent/player -q", b"RIFF").await,
            Err(AssistantError::Synthesis { .. })
        ));
        assert!(matches!(
            play_audio("false", b"RIFF").await,
            Err(AssistantError::Synthesis { .. })
        ));
    }

    fn api_speaker(api_base: &str) -> OpenAiSpeaker {
        let client = ChatClient::new(crate::agent::client::ChatClientConfig {
            api_base: api_base.to_string(),
            api_key: "k".to_string(),
            timeout: std::time::Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        OpenAiSpeaker::new(client, OpenAiSpeakerConfig::default())
    }

    #[tokio::test]
    async fn api_speaker_skips_blank_text() {
        let speaker = api_speaker("http://127.0.0.1:9/v1");
        assert!(speaker.speak("  ").await.is_ok());
    }

    #[tokio::test]
    async fn api_speaker_unreachable_is_synthesis_error() {
        let speaker = api_speaker("http://127.0.0.1:9/v1");
        match speaker.speak("hello").await {
            Err(AssistantError::Synthesis { message }) => {
                assert!(message.contains("speech request failed"));
            }
            other => panic!("Expected Synthesis error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn mock_records_and_fails() {
        let speaker = MockSpeaker::new().with_failure();
        assert!(speaker.speak("hi").await.is_err());
        assert_eq!(speaker.spoken(), vec!["hi"]);
    }
}
