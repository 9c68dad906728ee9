//! Tracing infrastructure.
//!
//! Structured, async-aware logging built on the `tracing` and
//! `tracing-subscriber` crates: environment-based filtering plus a choice of
//! pretty (development) or compact (production) output.
//!
//! # Example
//! ```no_run
//! use protoboard::logging::{self, OutputFormat};
//!
//! logging::init("info", OutputFormat::Pretty).expect("tracing init");
//! tracing::info!("emulator starting");
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact format without colors (for production)
    Compact,
}

/// Initialize the global tracing subscriber.
///
/// `directives` is an `EnvFilter` directive string such as `"info"` or
/// `"protoboard=debug"`. The `RUST_LOG` environment variable, when set,
/// takes precedence over the passed directives.
///
/// # Errors
/// Returns an error if a subscriber is already installed or the directives
/// fail to parse.
pub fn init(directives: &str, format: OutputFormat) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives))
        .map_err(|e| format!("invalid log filter {directives:?}: {e}"))?;

    match format {
        OutputFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_ansi(true))
            .try_init(),
        OutputFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(true).with_ansi(false))
            .try_init(),
    }
    .map_err(|e| format!("failed to install tracing subscriber: {e}"))
}

/// Map a `-v` occurrence count to filter directives.
pub fn directives_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
