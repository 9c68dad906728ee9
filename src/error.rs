//! Custom error types for the crate.
//!
//! This module defines the primary error type, `ProtoboardError`, using the
//! `thiserror` crate. It consolidates the error taxonomy the emulator and
//! parsers work with:
//!
//! - **`Configuration`**: semantic errors in loaded settings, caught during
//!   validation rather than at runtime (e.g. a zero buffer size).
//! - **`InvalidPattern`** / **`NoResponsesConfigured`**: mapping-level
//!   configuration errors, surfaced when the response engine is built so a
//!   broken mapping can never reach the request path.
//! - **`Io`** / **`Sys`**: transport failures from the virtual channel
//!   (pseudo-terminal allocation, symlink publication, reads and writes).
//! - **`PartialWrite`**: a delivery error for a single response attempt; it
//!   is reported and the engine keeps servicing requests.
//!
//! Read timeouts and client disconnects are deliberately *not* errors; the
//! emulator treats them as normal idle states.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ProtoboardError>;

/// Errors produced by the emulator, channel, and configuration layers.
#[derive(Error, Debug)]
pub enum ProtoboardError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No responses configured for request pattern {0:?}")]
    NoResponsesConfigured(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Virtual channel error: {0}")]
    Channel(String),

    #[error("Partial write: wrote {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("Emulator already running")]
    AlreadyRunning,

    #[error("Emulator not running")]
    NotRunning,

    #[cfg(unix)]
    #[error("System error: {0}")]
    Sys(#[from] nix::Error),
}
