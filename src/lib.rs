//! coursevox - Push-to-talk course assistant
//!
//! Voice or text questions about classes, research topics, weekly plans and
//! assignments, answered by an LLM agent and spoken back.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod agent;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod intent;
pub mod logging;
#[cfg(feature = "cli")]
pub mod output;
pub mod stt;
pub mod tts;
pub mod turn;

// Composition root - needs microphone, keyboard and terminal
#[cfg(all(feature = "cpal-audio", feature = "keyboard", feature = "cli"))]
pub mod app;

// Collaborator seams
pub use agent::executor::TaskExecutor;
pub use audio::keys::KeySource;
pub use audio::recorder::AudioSource;
pub use intent::classifier::Classifier;
pub use stt::transcriber::Transcriber;
pub use tts::speaker::Speaker;

// Core components
pub use audio::push_to_talk::{CaptureOutcome, CaptureSettings, PushToTalk};
pub use intent::router::{IntentRouter, RoutingDecision};
pub use turn::engine::{Collaborators, TurnEngine};
pub use turn::metrics::{TurnMetrics, TurnMetricsState};

// Error handling
pub use error::{AssistantError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
