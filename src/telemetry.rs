//! Tracing subscriber setup for binaries embedding the engine
use super::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Parse a level or directive list such as `approval_line=debug,sled=warn`.
/// Falls back to `info` when the directives do not parse.
pub fn level_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a global fmt subscriber. Returns an error if one is already set.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(level_filter(&config.level));

    let installed = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
