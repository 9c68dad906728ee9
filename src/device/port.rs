//! Serial-port wrapper for a physical device.
//!
//! Protocol overview:
//! - ASCII command/response over a duplex byte stream, default 115200 baud.
//! - `"?"` answers with an identity line containing `firmware version:`.
//! - `"~"` dumps the device configuration as backtick-bracket lines.
//! - `">"` + expression runs a scripted command; the reply is wrapped in a
//!   prompt echo plus ANSI styling (see [`crate::parser::reply`]).
//!
//! The device streams replies without a length header, so reads drain the
//! port until it goes quiet: write, flush, wait a command-specific
//! interval, then read until a timeout. Serial I/O is synchronous and runs
//! on the blocking thread pool to keep the async runtime free.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serialport::{ClearBuffer, SerialPort};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::FIRMWARE_VERSION_MARKER;
use crate::parser::{
    parse_command_reply, parse_config_dump, parse_dac_reply, parse_nets, AggregateError,
    ConfigSection, Net,
};

/// Internal read timeout while draining a reply.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A connection to a physical device.
pub struct DevicePort {
    port_name: String,
    baud_rate: u32,
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl DevicePort {
    /// Create a client for `port_name`; a zero `baud_rate` selects the
    /// device default of 115200.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: if baud_rate == 0 { 115_200 } else { baud_rate },
            port: None,
        }
    }

    /// Open the serial port.
    pub fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(anyhow!("serial port already open"));
        }

        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(DRAIN_READ_TIMEOUT)
            .open()
            .with_context(|| {
                format!(
                    "failed to open serial port '{}' at {} baud",
                    self.port_name, self.baud_rate
                )
            })?;

        self.port = Some(Arc::new(Mutex::new(port)));
        debug!(port = %self.port_name, baud = self.baud_rate, "serial port opened");
        Ok(())
    }

    /// Close the serial port; a no-op when not open.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "serial port closed");
        }
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// The configured port name.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Send a raw command and drain the reply.
    ///
    /// Buffers are reset first so a stale reply cannot leak into this
    /// exchange; `wait_for_read` gives the device time to start answering
    /// before the drain begins.
    pub async fn exec_raw(&self, command: &str, wait_for_read: Duration) -> Result<String> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| anyhow!("serial port not open"))?
            .clone();
        let command = command.to_string();
        let port_name = self.port_name.clone();

        tokio::task::spawn_blocking(move || {
            use std::io::{Read, Write};

            let mut port = port.blocking_lock();

            port.clear(ClearBuffer::All)
                .with_context(|| format!("unable to reset buffers on {port_name}"))?;

            trace!(command = %command.escape_default(), "sending command");
            port.write_all(command.as_bytes())
                .with_context(|| format!("unable to write to serial port {port_name}"))?;
            port.flush()
                .with_context(|| format!("failed to drain serial port {port_name}"))?;

            std::thread::sleep(wait_for_read);

            let mut result = String::new();
            let mut buf = [0u8; 128];
            loop {
                match port.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => result.push_str(&String::from_utf8_lossy(&buf[..n])),
                    Err(err) if err.kind() == std::io::ErrorKind::TimedOut => break,
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("unable to read from serial port {port_name}"))
                    }
                }
            }

            trace!(reply = %result.escape_default(), "received reply");
            Ok(result)
        })
        .await
        .context("serial I/O task panicked")?
    }

    /// Run a scripted command (`">"` + expression) and unwrap the prompt
    /// envelope from the reply.
    pub async fn exec_scripted(&self, expression: &str, wait_for_read: Duration) -> Result<String> {
        let raw = self
            .exec_raw(&format!(">{expression}"), wait_for_read)
            .await
            .context("failed to execute command")?;
        parse_command_reply(&raw).map_err(Into::into)
    }

    /// Identity probe: send `"?"` and extract the firmware version.
    ///
    /// Returns an error when the reply does not look like this device
    /// family at all.
    pub async fn probe(&self) -> Result<String> {
        let reply = self.exec_raw("?", Duration::from_millis(10)).await?;

        match reply.find(FIRMWARE_VERSION_MARKER) {
            Some(at) => Ok(reply[at + FIRMWARE_VERSION_MARKER.len()..].trim().to_string()),
            None => Err(anyhow!(
                "port {} did not identify as a known device",
                self.port_name
            )),
        }
    }

    /// Fetch and parse the nets listing.
    pub async fn nets(&self) -> Result<(Vec<Net>, Option<AggregateError>)> {
        let payload = self
            .exec_scripted("print_nets()", Duration::from_millis(10))
            .await
            .context("unable to print nets")?;
        Ok(parse_nets(&payload))
    }

    /// Fetch and parse the configuration dump.
    pub async fn config_dump(&self) -> Result<(Vec<ConfigSection>, Option<AggregateError>)> {
        let raw = self
            .exec_raw("~", Duration::from_millis(500))
            .await
            .context("unable to get current config")?;
        Ok(parse_config_dump(&raw))
    }

    /// Read a DAC channel voltage, `V`-suffixed.
    pub async fn dac(&self, channel: u8) -> Result<String> {
        let raw = self
            .exec_raw(&format!(">dac_get({channel})"), Duration::from_millis(10))
            .await
            .with_context(|| format!("unable to get DAC voltage for channel {channel}"))?;
        parse_dac_reply(&raw).map_err(Into::into)
    }
}

impl std::fmt::Debug for DevicePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePort")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}
