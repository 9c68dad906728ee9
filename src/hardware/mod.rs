//! Hardware State Model
//!
//! In-memory representation of the emulated device's mutable hardware:
//! DAC and ADC channels, current sensors, GPIO pins, and node-to-node
//! connections. Pure data plus mutators, no I/O.

pub mod state;

pub use state::{
    AdcChannel, Connection, DacChannel, Direction, GpioPin, HardwareInfo, HardwareState,
    InaSensor, Node, Pull, DAC_VOLTAGE_MAX, DAC_VOLTAGE_MIN,
};
