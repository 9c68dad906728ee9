//! # Protoboard
//!
//! Virtual breadboard-device emulator and device-output parsers.
//!
//! This crate lets software that expects to talk to a physical
//! breadboard-prototyping device talk to a synthetic stand-in instead, and
//! turns recorded real-device sessions back into structured data. The two
//! halves agree byte-for-byte on the wire format: whatever the emulator
//! produces, the parsers consume.
//!
//! ## Crate Structure
//!
//! - **`config`**: typed settings for the emulator (serial pass-through
//!   parameters, the initial hardware profile, request/response mappings)
//!   with TOML/YAML loading and fail-fast validation.
//! - **`device`**: serial client for a physical device (identity probe,
//!   command execution); behind the `device-serial` feature.
//! - **`emulator`**: the virtual device — pseudo-terminal channel
//!   lifecycle, request framing, and the response matching & delivery
//!   engine with its mutable hardware state.
//! - **`error`**: the crate-wide `ProtoboardError` enum.
//! - **`hardware`**: the in-memory hardware state model (DAC/ADC channels,
//!   GPIO pins, node connections).
//! - **`logging`**: tracing subscriber setup.
//! - **`parser`**: pure functions recovering structured records (nets,
//!   config sections, DAC voltages) from the device's ANSI-decorated text
//!   output.

pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod parser;

pub use error::{AppResult, ProtoboardError};
