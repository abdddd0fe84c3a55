use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use coursevox::app::{Overrides, run_assistant, run_record_test};
use coursevox::audio::capture::{list_devices, suppress_audio_warnings};
use coursevox::cli::{Cli, Commands, ConfigAction};
use coursevox::config::Config;
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for blocking threads (a pending stdin read, a
/// transcription) before leaving them behind.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();
    coursevox::logging::init(cli.quiet, cli.verbose);
    // before any runtime or audio thread exists
    suppress_audio_warnings();

    let overrides = Overrides {
        device: cli.device.clone(),
        max_duration_secs: cli.max_duration,
        stt_engine: cli.stt_engine,
    };

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            let runtime = build_runtime()?;
            let cancel = cancel_on_ctrl_c(&runtime);
            let color = std::io::stdout().is_terminal();

            let result = run_assistant(&config, &runtime, cancel, color);
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            if let Err(e) = result {
                eprintln!("{}", format!("Error: {}", e).red());
                std::process::exit(1);
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::RecordTest { output }) => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            let runtime = build_runtime()?;
            let cancel = cancel_on_ctrl_c(&runtime);
            let result = run_record_test(&config, output, &cancel);
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
            result?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref(), &overrides)?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "coursevox",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Token cancelled by the first Ctrl+C.
fn cancel_on_ctrl_c(runtime: &tokio::runtime::Runtime) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            token.cancel();
        }
    });
    cancel
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Command-line flags
/// 2. Environment variables
/// 3. Custom config path from CLI (--config), which must exist
/// 4. Default config path (~/.config/coursevox/config.toml)
/// 5. Built-in defaults
fn load_config(custom_path: Option<&std::path::Path>, overrides: &Overrides) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    let mut config = config.with_env_overrides();
    overrides.apply(&mut config);
    Ok(config)
}

/// List available audio input devices.
fn list_audio_devices() -> Result<()> {
    let devices = list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

/// Handle configuration commands.
fn handle_config_command(
    action: ConfigAction,
    custom_path: Option<&std::path::Path>,
    overrides: &Overrides,
) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = custom_path
                .map(std::path::PathBuf::from)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Dump => {
            let config = load_config(custom_path, overrides)?;
            print!("{}", config.to_toml()?);
        }
    }
    Ok(())
}
