//! Default configuration constants for coursevox.
//!
//! Shared by the config layer, the capture primitive and the router so the
//! same values are used everywhere.

/// Default audio sample rate in Hz.
///
/// 16kHz is what both local Whisper and the transcription API expect.
pub const SAMPLE_RATE: u32 = 16000;

/// Upper bound on a single push-to-talk recording, in seconds.
pub const MAX_RECORD_SECS: u64 = 10;

/// How often the capture loop re-checks the deadline and drains audio, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 10;

/// Key held to record.
pub const TRIGGER_KEY: &str = "ControlRight";

/// Key that cancels a capture and leaves the assistant.
pub const QUIT_KEY: &str = "Escape";

/// Track used by the assignments task when none was spoken.
pub const DEFAULT_TRACK: &str = "Tech";

/// Classifications below this confidence are routed to the next-class task.
pub const MIN_CONFIDENCE: f32 = 0.3;

/// Default language code for transcription.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Default local Whisper model file.
pub const WHISPER_MODEL_PATH: &str = "models/ggml-base.bin";

/// Model used by the transcription API.
pub const API_STT_MODEL: &str = "whisper-1";

/// OpenAI-compatible API base URL.
pub const API_BASE: &str = "https://api.openai.com/v1";

/// Chat model for both classification and task execution.
pub const CHAT_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Request timeout for agent calls, in seconds.
pub const AGENT_TIMEOUT_SECS: u64 = 60;

/// Course schedule read by the agent tasks.
pub const SCHEDULE_PATH: &str = "./data/schedule.csv";

/// Free-form user preferences read by the agent tasks.
pub const PREFERENCES_PATH: &str = "./knowledge/user_preference.txt";

/// Local text-to-speech command.
pub const TTS_COMMAND: &str = "espeak-ng";

/// Speech rate in words per minute.
pub const TTS_RATE: u32 = 175;

/// Speech volume (0.0 to 1.0).
pub const TTS_VOLUME: f32 = 0.9;

/// Speech model for the API text-to-speech engine.
pub const API_TTS_MODEL: &str = "tts-1";

/// Voice for the API text-to-speech engine.
pub const API_TTS_VOICE: &str = "alloy";

/// Player fed WAV audio on stdin by the API text-to-speech engine.
pub const TTS_PLAYER: &str = "aplay -q -";

/// Raw inputs that count as an explicit request for the capabilities menu.
pub const HELP_WORDS: &[&str] = &["help", "/help", "menu"];

/// Typed input that leaves the assistant.
pub const EXIT_COMMAND: &str = "/exit";
