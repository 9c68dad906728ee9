//! Prompt-envelope reply parser.
//!
//! Scripted commands are sent as `>` + expression and answered inside the
//! device's interactive prompt: the command is echoed (possibly several
//! times, since the device streams the prompt back with cursor-movement
//! escapes), the printed result follows, and a trailing blank line closes
//! the envelope:
//!
//! ```text
//! Python> >dac_get(0)\r\n3.30V\r\n
//! ```
//!
//! Recovering the payload means stripping ANSI sequences, splitting on the
//! device's CR+LF line ending, and discarding blank lines and prompt
//! echoes. Fewer than three raw lines means the device did not reply in its
//! expected envelope at all.

use thiserror::Error;

use super::ansi;

/// Prefix of prompt/echo lines discarded from replies.
pub const PROMPT_MARKER: &str = "Python>";

/// Line ending the device uses on the wire.
const LINE_ENDING: &str = "\r\n";

/// Errors from envelope parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("unexpected command output format: expected at least 3 lines, got {0}")]
    TooFewLines(usize),

    #[error("unexpected command output format: no output lines after filtering")]
    NoContent,
}

/// Extract the payload from a scripted-command reply.
///
/// Returns the single content line when one remains after filtering, or all
/// remaining lines joined with `\n` when the command produced multi-line
/// auxiliary output (callers decide whether that is expected).
pub fn parse_command_reply(raw: &str) -> Result<String, ReplyError> {
    let stripped = ansi::strip(raw);
    let lines: Vec<&str> = stripped.split(LINE_ENDING).collect();

    if lines.len() < 3 {
        return Err(ReplyError::TooFewLines(lines.len()));
    }

    let content: Vec<&str> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with(PROMPT_MARKER))
        .collect();

    match content.len() {
        0 => Err(ReplyError::NoContent),
        1 => Ok(content[0].to_string()),
        _ => Ok(content.join("\n")),
    }
}

/// Extract a DAC voltage from a `dac_get(<channel>)` reply.
///
/// A single-line payload is suffixed with `V` if the device omitted it;
/// multi-line payloads are returned as-is for the caller to interpret.
pub fn parse_dac_reply(raw: &str) -> Result<String, ReplyError> {
    let payload = parse_command_reply(raw)?;
    if !payload.contains('\n') && !payload.ends_with('V') {
        return Ok(format!("{payload}V"));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_payload_line() {
        let raw = "Python> >dac_get(0)\r\n3.30V\r\n";
        assert_eq!(parse_command_reply(raw).expect("reply"), "3.30V");
    }

    #[test]
    fn strips_ansi_before_filtering() {
        let raw = "\x1b[0mPython> \x1b[38;5;88m>dac_get(0)\x1b[0m\r\n\x1b[1m3.30V\x1b[0m\r\n";
        assert_eq!(parse_command_reply(raw).expect("reply"), "3.30V");
    }

    #[test]
    fn discards_repeated_prompt_echoes() {
        let raw = "Python> >print_nets()\r\nPython> >print_nets()\r\nIndex\tName\r\n1\tGND\r\n\r\n";
        let payload = parse_command_reply(raw).expect("reply");
        assert_eq!(payload, "Index\tName\n1\tGND");
    }

    #[test]
    fn too_few_lines_is_a_format_error() {
        assert_eq!(
            parse_command_reply("3.30V"),
            Err(ReplyError::TooFewLines(1))
        );
        assert_eq!(
            parse_command_reply("Python> x\r\n3.30V"),
            Err(ReplyError::TooFewLines(2))
        );
    }

    #[test]
    fn all_lines_filtered_is_an_error() {
        let raw = "Python> >foo()\r\nPython> again\r\n\r\n";
        assert_eq!(parse_command_reply(raw), Err(ReplyError::NoContent));
    }

    #[test]
    fn dac_reply_gains_voltage_suffix() {
        let raw = "Python> >dac_get(0)\r\n3.30\r\n";
        assert_eq!(parse_dac_reply(raw).expect("reply"), "3.30V");
    }

    #[test]
    fn dac_reply_keeps_existing_suffix() {
        let raw = "Python> >dac_get(0)\r\n3.30V\r\n";
        assert_eq!(parse_dac_reply(raw).expect("reply"), "3.30V");
    }

    #[test]
    fn multi_line_payload_is_joined() {
        let raw = "Python> >adc_read_all()\r\n0.00V\r\n1.25V\r\n\r\n";
        assert_eq!(parse_command_reply(raw).expect("reply"), "0.00V\n1.25V");
    }
}
