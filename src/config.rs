//! Emulator configuration.
//!
//! Strongly-typed settings for the virtual device: serial pass-through
//! parameters, the initial hardware profile, and the request/response
//! mappings. Files load from TOML or YAML (session recorders emit YAML
//! mapping files that are accepted verbatim), switched on file extension.
//!
//! Validation is fail-fast: regex patterns must compile and every mapping
//! must carry at least one usable response before the emulator starts.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::emulator::mapping::{CompiledMapping, MappingSpec, ResponseTiming};
use crate::error::{AppResult, ProtoboardError};
use crate::hardware::{
    AdcChannel, DacChannel, GpioPin, HardwareInfo, HardwareState, InaSensor, Node,
};

/// Serial-port parameters.
///
/// Baud rate, stop bits, and parity are pass-through configuration: they
/// are carried for clients that want to mirror a physical port setup but
/// are never interpreted by the emulator itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerialSettings {
    /// Stable name to publish the virtual port under; empty means the
    /// transient pts name is used as-is.
    pub virtual_port: String,
    pub baud_rate: u32,
    /// Read buffer size for the request loop.
    pub buffer_size: usize,
    pub stop_bits: u8,
    pub parity: String,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            virtual_port: "/tmp/protoboard".to_string(),
            baud_rate: 115_200,
            buffer_size: 1024,
            stop_bits: 1,
            parity: "none".to_string(),
        }
    }
}

/// Complete emulator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmulatorSettings {
    pub serial: SerialSettings,
    /// Initial hardware state of the emulated device.
    pub device: HardwareState,
    /// Request/response mappings, in match order.
    pub mappings: Vec<MappingSpec>,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        let device = default_device();
        let mappings = default_mappings(&device);
        Self {
            serial: SerialSettings::default(),
            device,
            mappings,
        }
    }
}

impl EmulatorSettings {
    /// Load settings from `path`, or return the defaults when no path is
    /// given or the file does not exist.
    ///
    /// The encoding is chosen by extension: `.yaml`/`.yml`, `.json`, or
    /// TOML for anything else.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let settings: Self = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| {
                ProtoboardError::Configuration(format!("{}: {e}", path.display()))
            })?,
            "json" => serde_json::from_str(&raw).map_err(|e| {
                ProtoboardError::Configuration(format!("{}: {e}", path.display()))
            })?,
            _ => toml::from_str(&raw).map_err(|e| {
                ProtoboardError::Configuration(format!("{}: {e}", path.display()))
            })?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a configuration error for a zero buffer size, an
    /// uncompilable regex pattern, or a mapping with no usable responses.
    pub fn validate(&self) -> AppResult<()> {
        if self.serial.buffer_size == 0 {
            return Err(ProtoboardError::Configuration(
                "serial.bufferSize must be greater than 0".to_string(),
            ));
        }
        for spec in &self.mappings {
            CompiledMapping::compile(spec)?;
        }
        Ok(())
    }
}

/// The stock hardware profile: one of each numbered DAC plus both rails,
/// five ADC channels, two current sensors, ten GPIO pins, and the
/// canonical node table.
fn default_device() -> HardwareState {
    let dac_channels = HashMap::from([
        ("0".to_string(), DacChannel { voltage: 3.3 }),
        ("1".to_string(), DacChannel { voltage: 0.0 }),
        ("TOP_RAIL".to_string(), DacChannel { voltage: 3.5 }),
        ("BOTTOM_RAIL".to_string(), DacChannel { voltage: 3.5 }),
    ]);

    let mut adc_channels = HashMap::new();
    for channel in 0..4 {
        adc_channels.insert(
            channel.to_string(),
            AdcChannel {
                voltage: 0.0,
                max_value: 8.0,
            },
        );
    }
    adc_channels.insert(
        "4".to_string(),
        AdcChannel {
            voltage: 0.0,
            max_value: 5.0,
        },
    );

    let ina_sensors = HashMap::from([
        (
            "0".to_string(),
            InaSensor {
                current: 0.1,
                voltage: 3.3,
                bus_voltage: 3.3,
                power: 0.33,
            },
        ),
        (
            "1".to_string(),
            InaSensor {
                current: 0.05,
                voltage: 5.0,
                bus_voltage: 5.0,
                power: 0.25,
            },
        ),
    ]);

    let mut gpio_pins = HashMap::new();
    for pin in 0..10 {
        gpio_pins.insert(pin.to_string(), GpioPin::default());
    }

    let mut nodes = HashMap::new();
    nodes.insert(
        "GND".to_string(),
        Node {
            number: 1,
            constant: "GND".to_string(),
            kind: "power".to_string(),
            ..Default::default()
        },
    );
    nodes.insert(
        "TOP_R".to_string(),
        Node {
            number: 2,
            constant: "TOP_R".to_string(),
            aliases: vec!["TOP_RAIL".to_string()],
            kind: "power".to_string(),
        },
    );
    nodes.insert(
        "BOT_R".to_string(),
        Node {
            number: 3,
            constant: "BOT_R".to_string(),
            aliases: vec!["BOTTOM_RAIL".to_string()],
            kind: "power".to_string(),
        },
    );
    nodes.insert(
        "DAC_0".to_string(),
        Node {
            number: 4,
            constant: "DAC_0".to_string(),
            kind: "dac".to_string(),
            ..Default::default()
        },
    );
    nodes.insert(
        "DAC_1".to_string(),
        Node {
            number: 5,
            constant: "DAC_1".to_string(),
            kind: "dac".to_string(),
            ..Default::default()
        },
    );
    for pin in 0..10 {
        let constant = format!("GPIO_{pin}");
        nodes.insert(
            constant.clone(),
            Node {
                number: 10 + pin,
                constant,
                kind: "gpio".to_string(),
                ..Default::default()
            },
        );
    }

    HardwareState {
        firmware_version: "5.2.2.0".to_string(),
        hardware: HardwareInfo {
            generation: 5,
            revision: 5,
            probe_revision: 5,
        },
        dac_channels,
        adc_channels,
        ina_sensors,
        gpio_pins,
        connections: Vec::new(),
        nodes,
    }
}

/// The stock wire grammar: identity query, config dump, DAC read, nets
/// listing, and the echo envelope for state-changing scripted calls.
fn default_mappings(device: &HardwareState) -> Vec<MappingSpec> {
    let firmware = &device.firmware_version;
    let hardware = &device.hardware;

    let identity = MappingSpec {
        response_config: timing(10, 5),
        ..MappingSpec::literal("?", format!("Protoboard firmware version: {firmware}\r\n"))
    };

    let config_dump_text = format!(
        "\r\n\r\ncopy / edit / paste any of these lines\r\n\
         into the main menu to change a setting\r\n\r\n\
         Protoboard Config:\r\n\r\n\r\n\
         `[config] firmware_version = {firmware};\r\n\r\n\
         `[hardware] generation = {generation};\r\n\
         `[hardware] revision = {revision};\r\n\
         `[hardware] probe_revision = {probe_revision};\r\n\r\n",
        generation = hardware.generation,
        revision = hardware.revision,
        probe_revision = hardware.probe_revision,
    ) + "`[dacs] dac0_voltage = {{dac_voltage:0}};\r\n\
         `[dacs] dac1_voltage = {{dac_voltage:1}};\r\n\
         `[dacs] top_rail_voltage = {{dac_voltage:TOP_RAIL}};\r\n\
         `[dacs] bottom_rail_voltage = {{dac_voltage:BOTTOM_RAIL}};\r\n\r\n";

    let config_dump = MappingSpec {
        response_config: timing(15, 5),
        ..MappingSpec::literal("~", config_dump_text)
    };

    let dac_get = MappingSpec {
        response_config: timing(5, 2),
        ..MappingSpec::regex(
            r">dac_get\((\w+)\)",
            "Python> >dac_get($1)\r\n{{dac_voltage:$1}}\r\n",
        )
    };

    let print_nets = MappingSpec {
        response_config: timing(20, 10),
        ..MappingSpec::literal(
            ">print_nets()",
            "Python> >print_nets()\r\n\
             Index\tName\t\tVoltage\t\tNodes\r\n\
             1\tGND\t\t 0 V         GND\r\n\
             2\tTop Rail\t {{dac_value:TOP_RAIL}} V      TOP_R\r\n\
             3\tBottom Rail\t {{dac_value:BOTTOM_RAIL}} V      BOT_R\r\n\
             4\tDAC 0\t\t {{dac_value:0}} V      DAC_0\r\n\
             5\tDAC 1\t\t {{dac_value:1}} V      DAC_1\r\n\
             \r\n",
        )
    };

    // Echo envelope for state-changing scripted calls; the state update
    // itself is recognized from the raw request, not from this mapping.
    let state_commands = MappingSpec {
        response_config: timing(5, 2),
        ..MappingSpec::regex(
            r">((?:set_dac|gpio_set|connect|disconnect|clear)\([^)]*\))",
            "Python> >$1\r\n\r\n",
        )
    };

    vec![identity, config_dump, dac_get, print_nets, state_commands]
}

fn timing(delay_ms: u64, jitter_ms: u64) -> ResponseTiming {
    ResponseTiming {
        delay: Duration::from_millis(delay_ms),
        jitter_max: Duration::from_millis(jitter_ms),
        ..Default::default()
    }
}
