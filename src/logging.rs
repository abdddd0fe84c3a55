//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

/// Filter level for the `-q`/`-v` flags.
///
/// Quiet wins over verbose.
pub fn level_for(quiet: bool, verbose: u8) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the flags.
///
/// Calling it twice is harmless; the second call keeps the first subscriber.
pub fn init(quiet: bool, verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("coursevox={}", level_for(quiet, verbose))));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("tracing subscriber already installed");
    }
}
