//! Config-dump parser.
//!
//! The device's `~` query replies with its settings as copy-pasteable menu
//! lines, interleaved with banner text:
//!
//! ```text
//! `[config] firmware_version = 5.2.2.0;
//! `[hardware] generation = 5;
//! `[dacs] top_rail = 3.50;
//! ```
//!
//! Only lines whose trimmed form starts with a backtick-bracket prefix are
//! config lines; everything else is ignored. Values keep the exact quirk of
//! the device tooling: the raw value is whitespace-trimmed first and then
//! exactly one trailing `;` is stripped, so whitespace between the value
//! and the semicolon survives in the stored value. Callers must not depend
//! on section or entry ordering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{aggregate, AggregateError, LineError};

/// One `key = value` entry within a config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// A named section of the device config dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSection {
    pub name: String,
    pub entries: Vec<ConfigEntry>,
}

/// Parse a `~` config dump into sections.
///
/// Malformed config lines (missing `]`, missing `=`) are collected as
/// errors; a line missing its `=` still creates the named section, possibly
/// with zero entries. Duplicate keys within a section keep the last-seen
/// value.
pub fn parse_config_dump(text: &str) -> (Vec<ConfigSection>, Option<AggregateError>) {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut errors = Vec::new();

    for line in text.split('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(stripped) = trimmed.strip_prefix("`[") else {
            continue;
        };

        let Some((section, entry)) = stripped.split_once(']') else {
            errors.push(LineError::new(trimmed, "missing closing bracket"));
            continue;
        };

        let entries = sections.entry(section.to_string()).or_default();

        let Some((key, value)) = entry.split_once('=') else {
            errors.push(LineError::new(trimmed, "missing '=' in entry"));
            continue;
        };

        // Trim whitespace around the raw value, then strip exactly one
        // trailing semicolon; the result is intentionally not re-trimmed.
        let value = value.trim();
        let value = value.strip_suffix(';').unwrap_or(value);

        entries.insert(key.trim().to_string(), value.to_string());
    }

    let sections = sections
        .into_iter()
        .map(|(name, entries)| ConfigSection {
            name,
            entries: entries
                .into_iter()
                .map(|(key, value)| ConfigEntry { key, value })
                .collect(),
        })
        .collect();

    (sections, aggregate(errors))
}
