//! Utilities for logging.

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggingMode {
    #[default]
    Text,
    Json,
}

/// Map a `-v` style occurrence count onto a level.
pub fn level_for_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn env_filter(default: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default).into())
        .from_env_lossy()
}

/// Install a global subscriber.
///
/// `RUST_LOG` directives take precedence over the verbosity derived level.
pub fn init(verbosity: u8, mode: LoggingMode) -> Result<(), SetGlobalDefaultError> {
    let level = level_for_verbosity(verbosity);
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(level))
        .with_file(verbosity > 2)
        .with_line_number(verbosity > 2);

    match mode {
        LoggingMode::Text => tracing::subscriber::set_global_default(builder.finish()),
        LoggingMode::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
}

/// Install a subscriber that writes through the test harness.
///
/// Safe to call from every test, only the first call installs anything.
pub fn init_test() {
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
