//! Unquoting of recorded response literals.
//!
//! Session recorders store response chunks as double-quoted, backslash-
//! escaped literals so control bytes (CR, LF, ESC) survive the trip
//! through configuration text. This reverses that encoding: standard
//! single-character escapes plus `\xHH`, `\uXXXX`, and `\UXXXXXXXX`.

use thiserror::Error;

/// Why a quoted literal could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnquoteError {
    #[error("literal is not wrapped in double quotes")]
    NotQuoted,

    #[error("unterminated escape sequence")]
    UnterminatedEscape,

    #[error("invalid escape sequence \\{0}")]
    InvalidEscape(char),

    #[error("invalid hex digits in escape sequence")]
    InvalidHex,

    #[error("escape does not encode a valid character")]
    InvalidChar,

    #[error("unescaped quote inside literal")]
    StrayQuote,
}

/// Whether `data` looks like a quoted literal worth decoding.
pub fn looks_quoted(data: &str) -> bool {
    data.len() >= 2 && data.starts_with('"') && data.ends_with('"')
}

/// Decode a double-quoted, backslash-escaped literal.
pub fn unquote(data: &str) -> Result<String, UnquoteError> {
    if !looks_quoted(data) {
        return Err(UnquoteError::NotQuoted);
    }

    let inner = &data[1..data.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => return Err(UnquoteError::StrayQuote),
            '\\' => {
                let esc = chars.next().ok_or(UnquoteError::UnterminatedEscape)?;
                match esc {
                    'a' => out.push('\u{7}'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'v' => out.push('\u{b}'),
                    '\\' => out.push('\\'),
                    '\'' => out.push('\''),
                    '"' => out.push('"'),
                    'x' => out.push(hex_escape(&mut chars, 2)?),
                    'u' => out.push(hex_escape(&mut chars, 4)?),
                    'U' => out.push(hex_escape(&mut chars, 8)?),
                    other => return Err(UnquoteError::InvalidEscape(other)),
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: u32) -> Result<char, UnquoteError> {
    let mut value: u32 = 0;
    for _ in 0..digits {
        let digit = chars
            .next()
            .ok_or(UnquoteError::UnterminatedEscape)?
            .to_digit(16)
            .ok_or(UnquoteError::InvalidHex)?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or(UnquoteError::InvalidChar)
}
