//! Mutable device hardware state.
//!
//! One [`HardwareState`] value is owned by a single response engine and is
//! only ever touched from its request-handling path: the engine mutates it
//! when it recognizes a state-changing command, and placeholder
//! substitution reads it while rendering responses. There is deliberately
//! no interior locking here.
//!
//! The mutators mirror the permissiveness of the device firmware:
//! out-of-range DAC writes are silently ignored, GPIO writes create the
//! pin if it does not exist yet, and connection changes are idempotent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lowest voltage a DAC channel accepts.
pub const DAC_VOLTAGE_MIN: f64 = -8.0;
/// Highest voltage a DAC channel accepts.
pub const DAC_VOLTAGE_MAX: f64 = 8.0;

/// A writable DAC channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DacChannel {
    /// Output voltage in volts, valid range −8.0..+8.0.
    pub voltage: f64,
}

/// A read-only ADC channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdcChannel {
    /// Last sampled voltage in volts.
    pub voltage: f64,
    /// Maximum voltage the channel can sample.
    pub max_value: f64,
}

/// An INA-style current/voltage sensor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InaSensor {
    /// Amperes.
    pub current: f64,
    /// Volts.
    pub voltage: f64,
    /// Volts on the bus side.
    pub bus_voltage: f64,
    /// Watts.
    pub power: f64,
}

/// GPIO pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Input,
    Output,
}

/// GPIO pull configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// A GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpioPin {
    /// Logic level, 0 or 1.
    pub value: u8,
    pub direction: Direction,
    pub pull: Pull,
}

/// An unordered connection between two nodes.
///
/// `(A, B)` and `(B, A)` denote the same connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub node_a: String,
    pub node_b: String,
}

impl Connection {
    /// Order-insensitive equality against a node pair.
    fn links(&self, a: &str, b: &str) -> bool {
        (self.node_a == a && self.node_b == b) || (self.node_a == b && self.node_b == a)
    }
}

/// Static reference data for one addressable node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Numeric node id.
    pub number: i32,
    /// Stable constant name, e.g. `DAC_0`.
    pub constant: String,
    /// Alternative names, e.g. `TOP_RAIL` for `TOP_R`.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Node kind: `power`, `dac`, `adc`, `gpio`, ...
    #[serde(rename = "type")]
    pub kind: String,
}

/// Device identity carried alongside the hardware state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareInfo {
    pub generation: i32,
    pub revision: i32,
    pub probe_revision: i32,
}

/// The emulated device's mutable hardware state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareState {
    /// Reported firmware version, e.g. `5.2.2.0`.
    pub firmware_version: String,
    /// Hardware identity block.
    pub hardware: HardwareInfo,
    /// DAC channels, keyed by number or rail name (e.g. `TOP_RAIL`).
    pub dac_channels: HashMap<String, DacChannel>,
    /// ADC channels, read-only from the protocol's perspective.
    pub adc_channels: HashMap<String, AdcChannel>,
    /// Current/voltage sensors; configuration data only.
    pub ina_sensors: HashMap<String, InaSensor>,
    /// GPIO pins.
    pub gpio_pins: HashMap<String, GpioPin>,
    /// Unordered node-to-node connections, no duplicates.
    pub connections: Vec<Connection>,
    /// Static node reference data, never mutated at runtime.
    pub nodes: HashMap<String, Node>,
}

impl HardwareState {
    /// Write a DAC channel if the voltage is within range.
    ///
    /// Out-of-range values are silently ignored, mirroring the permissive
    /// device firmware; returns whether the write was applied.
    pub fn set_dac(&mut self, channel: &str, voltage: f64) -> bool {
        if !(DAC_VOLTAGE_MIN..=DAC_VOLTAGE_MAX).contains(&voltage) {
            return false;
        }
        self.dac_channels
            .insert(channel.to_string(), DacChannel { voltage });
        true
    }

    /// Current voltage of a DAC channel, if configured.
    pub fn dac_voltage(&self, channel: &str) -> Option<f64> {
        self.dac_channels.get(channel).map(|dac| dac.voltage)
    }

    /// Current voltage of an ADC channel, if configured.
    pub fn adc_voltage(&self, channel: &str) -> Option<f64> {
        self.adc_channels.get(channel).map(|adc| adc.voltage)
    }

    /// Set a GPIO pin's logic level, preserving direction and pull.
    ///
    /// An unknown pin is created with default direction/pull first.
    pub fn set_gpio_value(&mut self, pin: &str, value: u8) {
        self.gpio_pins.entry(pin.to_string()).or_default().value = value;
    }

    /// Logic level of a GPIO pin, if configured.
    pub fn gpio_value(&self, pin: &str) -> Option<u8> {
        self.gpio_pins.get(pin).map(|gpio| gpio.value)
    }

    /// Add an unordered connection; a no-op if the pair already exists
    /// in either order.
    pub fn connect(&mut self, node_a: &str, node_b: &str) {
        if self.is_connected(node_a, node_b) {
            return;
        }
        self.connections.push(Connection {
            node_a: node_a.to_string(),
            node_b: node_b.to_string(),
        });
    }

    /// Remove a connection in either order; a no-op if absent.
    pub fn disconnect(&mut self, node_a: &str, node_b: &str) {
        if let Some(pos) = self
            .connections
            .iter()
            .position(|conn| conn.links(node_a, node_b))
        {
            self.connections.remove(pos);
        }
    }

    /// Remove every connection.
    pub fn clear_connections(&mut self) {
        self.connections.clear();
    }

    /// Whether the two nodes are connected, in either order.
    pub fn is_connected(&self, node_a: &str, node_b: &str) -> bool {
        self.connections
            .iter()
            .any(|conn| conn.links(node_a, node_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_dac_applies_in_range_values() {
        let mut state = HardwareState::default();
        assert!(state.set_dac("0", 3.3));
        assert_eq!(state.dac_voltage("0"), Some(3.3));

        assert!(state.set_dac("TOP_RAIL", -8.0));
        assert_eq!(state.dac_voltage("TOP_RAIL"), Some(-8.0));
        assert!(state.set_dac("TOP_RAIL", 8.0));
        assert_eq!(state.dac_voltage("TOP_RAIL"), Some(8.0));
    }

    #[test]
    fn set_dac_ignores_out_of_range_values() {
        let mut state = HardwareState::default();
        state.set_dac("0", 3.3);
        assert!(!state.set_dac("0", 8.5));
        assert!(!state.set_dac("0", -100.0));
        assert_eq!(state.dac_voltage("0"), Some(3.3));
    }

    #[test]
    fn gpio_write_preserves_pin_configuration() {
        let mut state = HardwareState::default();
        state.gpio_pins.insert(
            "3".to_string(),
            GpioPin {
                value: 0,
                direction: Direction::Output,
                pull: Pull::Up,
            },
        );

        state.set_gpio_value("3", 1);
        let pin = state.gpio_pins["3"];
        assert_eq!(pin.value, 1);
        assert_eq!(pin.direction, Direction::Output);
        assert_eq!(pin.pull, Pull::Up);
    }

    #[test]
    fn gpio_write_creates_unknown_pin() {
        let mut state = HardwareState::default();
        state.set_gpio_value("7", 1);
        assert_eq!(state.gpio_value("7"), Some(1));
        assert_eq!(state.gpio_pins["7"].direction, Direction::Input);
    }

    #[test]
    fn connect_is_idempotent() {
        let mut state = HardwareState::default();
        state.connect("A", "B");
        state.connect("A", "B");
        assert_eq!(state.connections.len(), 1);
    }

    #[test]
    fn connect_is_order_insensitive() {
        let mut state = HardwareState::default();
        state.connect("A", "B");
        state.connect("B", "A");
        assert_eq!(state.connections.len(), 1);
        assert!(state.is_connected("A", "B"));
        assert!(state.is_connected("B", "A"));
    }

    #[test]
    fn disconnect_removes_either_order() {
        let mut state = HardwareState::default();
        state.connect("A", "B");
        state.disconnect("B", "A");
        assert!(!state.is_connected("A", "B"));
        assert!(state.connections.is_empty());

        // no-op when absent
        state.disconnect("A", "B");
        assert!(state.connections.is_empty());
    }

    #[test]
    fn clear_connections_empties_everything() {
        let mut state = HardwareState::default();
        state.connect("A", "B");
        state.connect("C", "D");
        state.clear_connections();
        assert!(state.connections.is_empty());
        assert!(!state.is_connected("A", "B"));
    }

    #[test]
    fn state_roundtrips_through_serde() {
        let mut state = HardwareState {
            firmware_version: "5.2.2.0".to_string(),
            ..Default::default()
        };
        state.set_dac("0", 1.5);
        state.connect("GND", "DAC_0");

        let yaml = serde_yaml::to_string(&state).expect("serialize");
        let back: HardwareState = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back.firmware_version, "5.2.2.0");
        assert_eq!(back.dac_voltage("0"), Some(1.5));
        assert!(back.is_connected("DAC_0", "GND"));
    }
}
