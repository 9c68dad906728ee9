//! Request/response mapping schema.
//!
//! Two schema generations exist in the wild. The canonical one describes
//! each response option as an ordered list of individually-timed chunks
//! (this is what session recorders emit); the older one carries a single
//! response string per option plus mapping-level timing. Both are accepted:
//! a single-string option becomes one implicit chunk.
//!
//! Patterns are literal substrings by default or regular expressions when
//! `isRegex` is set. Regexes are compiled once when the engine is built; an
//! uncompilable pattern is a configuration error at construction time,
//! never at match time.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ProtoboardError};

/// How a response option is picked from a mapping with several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Cycle through options in order (the default).
    #[default]
    Sequential,
    /// Uniformly random.
    Random,
    /// Random, biased by per-option weights.
    Weighted,
}

/// Mapping-level delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseTiming {
    /// Delay before the first chunk of the response.
    #[serde(with = "flexible_duration")]
    pub delay: Duration,
    /// Upper bound of uniform random jitter added to `delay`.
    #[serde(with = "flexible_duration")]
    pub jitter_max: Duration,
    /// Whether rendered chunks are further split into fixed-size writes.
    pub chunked: bool,
    /// Size of each write when `chunked` is set.
    pub chunk_size: usize,
    /// Delay between fixed-size writes.
    #[serde(with = "flexible_duration")]
    pub chunk_delay: Duration,
    /// Response option selection mode.
    pub selection_mode: SelectionMode,
}

/// One timed piece of a response option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseChunk {
    /// Payload; may be a double-quoted escaped literal (see
    /// [`super::unescape`]).
    pub data: String,
    /// Delay before sending this chunk.
    #[serde(default, with = "flexible_duration")]
    pub delay: Duration,
    /// Upper bound of uniform random jitter added to `delay`.
    #[serde(default, with = "flexible_duration")]
    pub jitter_max: Duration,
}

impl ResponseChunk {
    /// An untimed chunk wrapping `data` as-is.
    pub fn immediate(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            delay: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }
}

/// One candidate response for a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseOption {
    /// Canonical form: an ordered list of timed chunks.
    Chunked {
        chunks: Vec<ResponseChunk>,
        #[serde(default)]
        weight: i64,
    },
    /// Convenience form: a single string, one implicit chunk.
    Single {
        response: String,
        #[serde(default)]
        weight: i64,
    },
}

impl ResponseOption {
    /// Single-string option with default weight.
    pub fn text(response: impl Into<String>) -> Self {
        Self::Single {
            response: response.into(),
            weight: 0,
        }
    }
}

/// A configured request pattern with its candidate responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MappingSpec {
    /// Literal substring or regex, per `is_regex`.
    pub request: String,
    pub is_regex: bool,
    /// Legacy single response; takes precedence over `responses` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub responses: Vec<ResponseOption>,
    pub response_config: ResponseTiming,
}

impl MappingSpec {
    /// Literal mapping with one response.
    pub fn literal(request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            responses: vec![ResponseOption::text(response)],
            ..Default::default()
        }
    }

    /// Regex mapping with one response.
    pub fn regex(request: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            is_regex: true,
            ..Self::literal(request, response)
        }
    }
}

/// A response option normalized to chunk form with its coerced weight.
#[derive(Debug, Clone)]
pub struct CompiledOption {
    pub chunks: Vec<ResponseChunk>,
    /// Weight for weighted selection; non-positive configured weights are
    /// coerced to 1.
    pub weight: u64,
}

/// A mapping validated and prepared for the request path.
#[derive(Debug, Clone)]
pub struct CompiledMapping {
    pub pattern: String,
    pub regex: Option<Regex>,
    pub options: Vec<CompiledOption>,
    pub timing: ResponseTiming,
}

impl CompiledMapping {
    /// Validate `spec` and prepare it for matching.
    ///
    /// # Errors
    /// Returns a configuration error if a regex pattern does not compile or
    /// the mapping has no usable responses.
    pub fn compile(spec: &MappingSpec) -> AppResult<Self> {
        let regex = if spec.is_regex {
            Some(
                Regex::new(&spec.request).map_err(|source| ProtoboardError::InvalidPattern {
                    pattern: spec.request.clone(),
                    source,
                })?,
            )
        } else {
            None
        };

        let legacy = spec.response.as_deref().filter(|r| !r.is_empty());
        let options: Vec<CompiledOption> = if let Some(response) = legacy {
            vec![CompiledOption {
                chunks: vec![ResponseChunk::immediate(response)],
                weight: 1,
            }]
        } else {
            spec.responses
                .iter()
                .map(|option| match option {
                    ResponseOption::Chunked { chunks, weight } => CompiledOption {
                        chunks: chunks.clone(),
                        weight: coerce_weight(*weight),
                    },
                    ResponseOption::Single { response, weight } => CompiledOption {
                        chunks: vec![ResponseChunk::immediate(response.clone())],
                        weight: coerce_weight(*weight),
                    },
                })
                .collect()
        };

        if options.is_empty() {
            return Err(ProtoboardError::NoResponsesConfigured(spec.request.clone()));
        }

        Ok(Self {
            pattern: spec.request.clone(),
            regex,
            options,
            timing: spec.response_config.clone(),
        })
    }

    /// Whether this mapping matches `request`.
    ///
    /// Literal patterns match by substring containment so a request framed
    /// with surrounding whitespace or echo still matches; regex patterns
    /// match anywhere in the request.
    pub fn matches(&self, request: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(request),
            None => request.contains(&self.pattern),
        }
    }
}

fn coerce_weight(weight: i64) -> u64 {
    if weight <= 0 {
        1
    } else {
        weight as u64
    }
}

/// Duration field codec accepting both humane strings and raw nanoseconds.
///
/// Hand-written configs say `delay = "10ms"`; recorded sessions carry the
/// recorder's integer nanosecond values. Serializes as a humane string.
mod flexible_duration {
    use std::time::Duration;

    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        humantime_serde::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct FlexibleDuration;

        impl Visitor<'_> for FlexibleDuration {
            type Value = Duration;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a duration string like \"10ms\" or integer nanoseconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                humantime::parse_duration(v).map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_nanos(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_nanos)
                    .map_err(|_| de::Error::custom("negative duration"))
            }
        }

        deserializer.deserialize_any(FlexibleDuration)
    }
}
