//! Command-line interface for coursevox
//!
//! Provides argument parsing using clap derive macros.

use crate::config::SttEngine;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Push-to-talk course assistant
#[derive(Parser, Debug)]
#[command(
    name = "coursevox",
    version,
    about = "Push-to-talk course assistant for the terminal"
)]
pub struct Cli {
    /// Subcommand to execute (default: start the assistant)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device name (see `coursevox devices`)
    #[arg(long, global = true, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Longest single recording. Examples: 10s, 30s, 1m
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub max_duration: Option<u64>,

    /// Speech-to-text backend: local or api
    #[arg(long, global = true, value_name = "ENGINE", value_parser = parse_engine)]
    pub stt_engine: Option<SttEngine>,
}

/// Parse a duration string into whole seconds.
///
/// Accepts bare numbers (seconds) and anything `humantime` understands
/// (`30s`, `1m`, `1m30s`). Zero is rejected.
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let secs = match s.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs())
            .map_err(|e| e.to_string())?,
    };
    if secs == 0 {
        return Err("duration must be at least one second".to_string());
    }
    Ok(secs)
}

fn parse_engine(s: &str) -> Result<SttEngine, String> {
    s.parse().map_err(|e: crate::error::AssistantError| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Record one push-to-talk clip and report its level
    RecordTest {
        /// Save the clip as a WAV file
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Print the configuration file path
    Path,
}
