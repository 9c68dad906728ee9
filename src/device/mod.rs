//! Real-Device Client
//!
//! Serial-port client for a physical device speaking the same wire grammar
//! the emulator produces. Compiled behind the `device-serial` feature.

#[cfg(feature = "device-serial")]
pub mod port;

#[cfg(feature = "device-serial")]
pub use port::DevicePort;

/// Substring identifying a device identity reply; the dotted firmware
/// version follows it.
pub const FIRMWARE_VERSION_MARKER: &str = "firmware version:";
