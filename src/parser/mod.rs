//! Device Output Parsers
//!
//! Stateless, I/O-free functions that turn the device's quirky text output
//! into structured records. The device streams an interactive prompt back to
//! the caller, so its replies are decorated with ANSI escapes, tab-aligned
//! columns, and the occasional backspace; these parsers recover the
//! structured data underneath.
//!
//! All parsers are deterministic given their input and share no mutable
//! state, so they may be called from any number of threads without
//! synchronization.
//!
//! Parse failures are collected per line and returned as an
//! [`AggregateError`] alongside whatever records *did* parse; partial
//! success is expected and preserved, and callers decide whether partial
//! data is usable.

pub mod ansi;
pub mod config_dump;
pub mod nets;
pub mod reply;

pub use config_dump::{parse_config_dump, ConfigEntry, ConfigSection};
pub use nets::{parse_nets, Net};
pub use reply::{parse_command_reply, parse_dac_reply, ReplyError};

use thiserror::Error;

/// A single unparsable line, kept with enough context to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to parse line {line:?}: {reason}")]
pub struct LineError {
    /// The offending line, trimmed.
    pub line: String,
    /// Why it could not be parsed.
    pub reason: String,
}

impl LineError {
    pub(crate) fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// All line errors from one parse, aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", joined(.errors))]
pub struct AggregateError {
    /// The individual line errors, in input order.
    pub errors: Vec<LineError>,
}

fn joined(errors: &[LineError]) -> String {
    let details = errors
        .iter()
        .map(LineError::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("{} line(s) failed to parse: {details}", errors.len())
}

/// Wrap accumulated line errors, or `None` when the parse was clean.
pub(crate) fn aggregate(errors: Vec<LineError>) -> Option<AggregateError> {
    if errors.is_empty() {
        None
    } else {
        Some(AggregateError { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_nothing_is_none() {
        assert!(aggregate(Vec::new()).is_none());
    }

    #[test]
    fn aggregate_message_counts_errors() {
        let err = aggregate(vec![
            LineError::new("a", "bad"),
            LineError::new("b", "worse"),
        ])
        .expect("non-empty");
        let msg = err.to_string();
        assert!(msg.starts_with("2 line(s) failed to parse"));
        assert!(msg.contains("bad"));
        assert!(msg.contains("worse"));
    }
}
