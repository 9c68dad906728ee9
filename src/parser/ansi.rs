//! ANSI escape-sequence stripping.
//!
//! The device renders its interactive prompt with cursor-movement and color
//! escape sequences interleaved into every reply. Everything downstream of
//! the transport wants plain text, so this strips CSI sequences, OSC
//! sequences, and lone Fe escapes in one pass.

use once_cell::sync::Lazy;
use regex::Regex;

static ANSI_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    // CSI (ESC [ params intermediates final), OSC (ESC ] ... BEL or ST),
    // then any remaining single Fe escape.
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)?|[\x40-\x5A\x5C-\x5F])")
        .expect("ANSI pattern must compile")
});

/// Remove ANSI escape sequences from `text`.
pub fn strip(text: &str) -> String {
    ANSI_SEQUENCE.replace_all(text, "").into_owned()
}
