//! Response Matching & Delivery Engine.
//!
//! Given a request string, the engine finds the first configured mapping
//! that matches, applies any state-changing command grammars to the
//! [`HardwareState`], selects one of the mapping's response options, and
//! renders it into a [`Delivery`]: the exact bytes to transmit and the
//! delays to honor before each write. Executing the delivery (and detecting
//! partial writes) is the channel's job; the engine itself performs no I/O.
//!
//! Protocol leniency is deliberate and mirrors the device firmware:
//! unmatched requests produce no response and no error, unknown placeholder
//! ids resolve to documented defaults, and malformed or out-of-range values
//! in state-changing commands are silently ignored.

use std::time::Duration;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use super::mapping::{CompiledMapping, MappingSpec, SelectionMode};
use super::unescape;
use crate::error::{AppResult, ProtoboardError};
use crate::hardware::HardwareState;

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("builtin pattern must compile")
}

// State-changing command grammars, applied in this fixed order. More than
// one can match a single request: `disconnect(A, B)` also contains
// `connect(A, B)`, so the connect grammar fires first and the disconnect
// grammar then removes the pair again.
static SET_DAC: Lazy<Regex> = Lazy::new(|| pattern(r"set_dac\((\w+),\s*([+-]?\d*\.?\d+)\)"));
static GPIO_SET: Lazy<Regex> = Lazy::new(|| pattern(r"gpio_set\((\w+),\s*([01])\)"));
static CONNECT: Lazy<Regex> = Lazy::new(|| pattern(r"connect\(([^,]+),\s*([^)]+)\)"));
static DISCONNECT: Lazy<Regex> = Lazy::new(|| pattern(r"disconnect\(([^,]+),\s*([^)]+)\)"));
static CLEAR: Lazy<Regex> = Lazy::new(|| pattern(r"clear\(\)"));

// Live-state placeholders resolved while rendering responses.
static PH_DAC_VALUE: Lazy<Regex> = Lazy::new(|| pattern(r"\{\{dac_value:(\w+)\}\}"));
static PH_DAC_VOLTAGE: Lazy<Regex> = Lazy::new(|| pattern(r"\{\{dac_voltage:(\w+)\}\}"));
static PH_ADC_VOLTAGE: Lazy<Regex> = Lazy::new(|| pattern(r"\{\{adc_voltage:(\w+)\}\}"));
static PH_GPIO_VALUE: Lazy<Regex> = Lazy::new(|| pattern(r"\{\{gpio_value:(\w+)\}\}"));
static PH_IS_CONNECTED: Lazy<Regex> = Lazy::new(|| pattern(r"\{\{is_connected:([^:}]+):([^}]+)\}\}"));

/// One scheduled write: wait `delay`, then transmit `data` in a single
/// write call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedWrite {
    pub delay: Duration,
    pub data: Vec<u8>,
}

/// The rendered response for one request: bytes plus delivery schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub writes: Vec<TimedWrite>,
}

impl Delivery {
    /// All scheduled bytes, concatenated.
    pub fn payload(&self) -> Vec<u8> {
        self.writes
            .iter()
            .flat_map(|write| write.data.iter().copied())
            .collect()
    }
}

/// The request-handling core of the emulator.
///
/// Owns the mappings (compiled at construction, so configuration errors
/// surface before the first request), the per-mapping selection counters,
/// and the hardware state. All access happens on the single request path;
/// the engine is `Send` but deliberately not shared.
pub struct ResponseEngine {
    mappings: Vec<CompiledMapping>,
    counters: Vec<u64>,
    state: HardwareState,
    rng: StdRng,
}

impl ResponseEngine {
    /// Build an engine from mapping specs and initial hardware state.
    ///
    /// # Errors
    /// Fails fast on an uncompilable regex pattern or a mapping with no
    /// usable responses.
    pub fn new(specs: &[MappingSpec], state: HardwareState) -> AppResult<Self> {
        Self::with_rng(specs, state, StdRng::from_entropy())
    }

    /// Like [`ResponseEngine::new`] but with a deterministic RNG seed, for
    /// reproducible jitter and selection in tests.
    pub fn with_seed(specs: &[MappingSpec], state: HardwareState, seed: u64) -> AppResult<Self> {
        Self::with_rng(specs, state, StdRng::seed_from_u64(seed))
    }

    fn with_rng(specs: &[MappingSpec], state: HardwareState, rng: StdRng) -> AppResult<Self> {
        let mappings = specs
            .iter()
            .map(CompiledMapping::compile)
            .collect::<AppResult<Vec<_>>>()?;
        let counters = vec![0; mappings.len()];

        Ok(Self {
            mappings,
            counters,
            state,
            rng,
        })
    }

    /// Current hardware state.
    pub fn state(&self) -> &HardwareState {
        &self.state
    }

    /// Handle one framed request.
    ///
    /// Returns `Ok(None)` when no mapping matches; the caller should
    /// surface this as a miss, not an error, and transmit nothing.
    pub fn handle_request(&mut self, request: &str) -> AppResult<Option<Delivery>> {
        let Some(index) = self.mappings.iter().position(|m| m.matches(request)) else {
            debug!(request, "no response configured for request");
            return Ok(None);
        };

        self.apply_state_commands(request);

        let option_index = self.select_option(index)?;
        Ok(Some(self.render(index, option_index, request)))
    }

    /// Recognize and apply state-changing command grammars, in fixed order,
    /// against the raw request.
    fn apply_state_commands(&mut self, request: &str) {
        if let Some(caps) = SET_DAC.captures(request) {
            let channel = &caps[1];
            if let Ok(voltage) = caps[2].parse::<f64>() {
                if self.state.set_dac(channel, voltage) {
                    debug!(channel, voltage, "updated DAC channel");
                } else {
                    debug!(channel, voltage, "ignoring out-of-range DAC write");
                }
            }
        }

        if let Some(caps) = GPIO_SET.captures(request) {
            let pin = &caps[1];
            if let Ok(value) = caps[2].parse::<u8>() {
                self.state.set_gpio_value(pin, value);
                debug!(pin, value, "updated GPIO pin");
            }
        }

        if let Some(caps) = CONNECT.captures(request) {
            let (a, b) = (caps[1].trim(), caps[2].trim());
            self.state.connect(a, b);
            debug!(node_a = a, node_b = b, "connected nodes");
        }

        if let Some(caps) = DISCONNECT.captures(request) {
            let (a, b) = (caps[1].trim(), caps[2].trim());
            self.state.disconnect(a, b);
            debug!(node_a = a, node_b = b, "disconnected nodes");
        }

        if CLEAR.is_match(request) {
            self.state.clear_connections();
            debug!("cleared all connections");
        }
    }

    /// Pick a response option for the mapping at `mapping_index`.
    ///
    /// The per-mapping counter is read before the increment and bumped once
    /// per matched request, regardless of selection mode.
    fn select_option(&mut self, mapping_index: usize) -> AppResult<usize> {
        let mapping = &self.mappings[mapping_index];
        let count = mapping.options.len();
        if count == 0 {
            return Err(ProtoboardError::NoResponsesConfigured(
                mapping.pattern.clone(),
            ));
        }

        let counter = self.counters[mapping_index];
        self.counters[mapping_index] += 1;

        if count == 1 {
            return Ok(0);
        }

        let index = match mapping.timing.selection_mode {
            SelectionMode::Sequential => (counter % count as u64) as usize,
            SelectionMode::Random => self.rng.gen_range(0..count),
            SelectionMode::Weighted => {
                let total: u64 = mapping.options.iter().map(|o| o.weight).sum();
                let draw = self.rng.gen_range(0..total);
                let mut cumulative = 0;
                let mut selected = count - 1;
                for (i, option) in mapping.options.iter().enumerate() {
                    cumulative += option.weight;
                    if cumulative > draw {
                        selected = i;
                        break;
                    }
                }
                selected
            }
        };

        Ok(index)
    }

    /// Render the selected option into scheduled writes.
    fn render(&mut self, mapping_index: usize, option_index: usize, request: &str) -> Delivery {
        let Self {
            mappings,
            state,
            rng,
            ..
        } = self;
        let mapping = &mappings[mapping_index];
        let option = &mapping.options[option_index];
        let timing = &mapping.timing;

        // The mapping-level delay waits once, before the first chunk.
        let mut lead_in = timing.delay + jitter(rng, timing.jitter_max);
        let mut writes = Vec::new();

        for chunk in &option.chunks {
            let delay = lead_in + chunk.delay + jitter(rng, chunk.jitter_max);
            lead_in = Duration::ZERO;

            let text = if unescape::looks_quoted(&chunk.data) {
                match unescape::unquote(&chunk.data) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%err, data = %chunk.data, "failed to unescape response chunk, sending raw");
                        chunk.data.clone()
                    }
                }
            } else {
                chunk.data.clone()
            };

            let text = match &mapping.regex {
                Some(regex) => expand_captures(regex, request, &text),
                None => text,
            };

            let data = resolve_placeholders(state, &text).into_bytes();

            if timing.chunked && timing.chunk_size > 0 && !data.is_empty() {
                for (i, piece) in data.chunks(timing.chunk_size).enumerate() {
                    writes.push(TimedWrite {
                        delay: if i == 0 { delay } else { timing.chunk_delay },
                        data: piece.to_vec(),
                    });
                }
            } else {
                writes.push(TimedWrite { delay, data });
            }
        }

        Delivery { writes }
    }
}

fn jitter(rng: &mut StdRng, max: Duration) -> Duration {
    if max.is_zero() {
        Duration::ZERO
    } else {
        Duration::from_nanos(rng.gen_range(0..max.as_nanos() as u64))
    }
}

/// Substitute `$1`, `$2`, ... in `template` with capture groups from the
/// request match.
fn expand_captures(regex: &Regex, request: &str, template: &str) -> String {
    match regex.captures(request) {
        Some(caps) => {
            let mut out = String::new();
            caps.expand(template, &mut out);
            out
        }
        None => template.to_string(),
    }
}

/// Resolve `{{...}}` placeholders against live hardware state.
///
/// Unknown ids degrade to documented defaults (`0.00V` for voltages, `0`
/// for GPIO, `false` for connection checks) rather than erroring.
fn resolve_placeholders(state: &HardwareState, text: &str) -> String {
    let text = PH_DAC_VALUE.replace_all(text, |caps: &Captures<'_>| {
        state
            .dac_voltage(&caps[1])
            .map_or_else(|| "0.00".to_string(), |v| format!("{v:.2}"))
    });
    let text = PH_DAC_VOLTAGE.replace_all(&text, |caps: &Captures<'_>| {
        state
            .dac_voltage(&caps[1])
            .map_or_else(|| "0.00V".to_string(), |v| format!("{v:.2}V"))
    });
    let text = PH_ADC_VOLTAGE.replace_all(&text, |caps: &Captures<'_>| {
        state
            .adc_voltage(&caps[1])
            .map_or_else(|| "0.00V".to_string(), |v| format!("{v:.2}V"))
    });
    let text = PH_GPIO_VALUE.replace_all(&text, |caps: &Captures<'_>| {
        state
            .gpio_value(&caps[1])
            .map_or_else(|| "0".to_string(), |v| v.to_string())
    });
    let text = PH_IS_CONNECTED.replace_all(&text, |caps: &Captures<'_>| {
        state.is_connected(&caps[1], &caps[2]).to_string()
    });
    text.into_owned()
}
