//! CLI entry point.
//!
//! Subcommands:
//! - `emulate` — run the virtual device until interrupted.
//! - `probe` — detect a physical device on a serial port (requires the
//!   `device-serial` feature).
//! - `parse` — turn captured device output into structured JSON.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use protoboard::logging::{self, OutputFormat};
use protoboard::parser;

#[derive(Parser)]
#[command(name = "protoboard")]
#[command(about = "Virtual breadboard-device emulator and output parsers", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Compact, colorless log output
    #[arg(long, global = true)]
    compact_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the virtual device until interrupted
    #[cfg(unix)]
    Emulate {
        /// Settings file (TOML, YAML, or JSON); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the published virtual port name
        #[arg(long)]
        virtual_port: Option<String>,
    },

    /// Probe a serial port for a device and report its firmware version
    #[cfg(feature = "device-serial")]
    Probe {
        /// Serial port path, e.g. /dev/ttyACM0
        #[arg(long)]
        port: String,

        /// Baud rate
        #[arg(long, default_value_t = 115_200)]
        baud: u32,
    },

    /// Parse captured device output into structured JSON
    Parse {
        #[command(subcommand)]
        target: ParseTarget,
    },
}

#[derive(Subcommand)]
enum ParseTarget {
    /// Parse a nets listing
    Nets { file: PathBuf },
    /// Parse a config dump
    Config { file: PathBuf },
    /// Unwrap a scripted-command reply envelope
    Reply { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.compact_logs {
        OutputFormat::Compact
    } else {
        OutputFormat::Pretty
    };
    logging::init(logging::directives_for_verbosity(cli.verbose), format)
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        #[cfg(unix)]
        Commands::Emulate {
            config,
            virtual_port,
        } => emulate(config, virtual_port).await,
        #[cfg(feature = "device-serial")]
        Commands::Probe { port, baud } => probe(&port, baud).await,
        Commands::Parse { target } => parse(&target),
    }
}

#[cfg(unix)]
async fn emulate(config: Option<PathBuf>, virtual_port: Option<String>) -> Result<()> {
    use protoboard::config::EmulatorSettings;
    use protoboard::emulator::Emulator;

    let mut settings = EmulatorSettings::load(config.as_deref())?;
    if let Some(port) = virtual_port {
        settings.serial.virtual_port = port;
    }

    let mut emulator = Emulator::new(settings)?;
    emulator.start().await?;
    if let Some(port) = emulator.port_name() {
        println!("{}", port.display());
    }

    tokio::signal::ctrl_c().await?;
    emulator.stop().await?;
    Ok(())
}

#[cfg(feature = "device-serial")]
async fn probe(port: &str, baud: u32) -> Result<()> {
    use protoboard::device::DevicePort;

    let mut device = DevicePort::new(port, baud);
    device.open()?;
    let version = device.probe().await?;
    device.close();
    println!("{port}: firmware version {version}");
    Ok(())
}

fn parse(target: &ParseTarget) -> Result<()> {
    match target {
        ParseTarget::Nets { file } => {
            let text = std::fs::read_to_string(file)?;
            let (nets, errors) = parser::parse_nets(&text);
            println!("{}", serde_json::to_string_pretty(&nets)?);
            report_partial(errors);
        }
        ParseTarget::Config { file } => {
            let text = std::fs::read_to_string(file)?;
            let (sections, errors) = parser::parse_config_dump(&text);
            println!("{}", serde_json::to_string_pretty(&sections)?);
            report_partial(errors);
        }
        ParseTarget::Reply { file } => {
            let text = std::fs::read_to_string(file)?;
            let payload = parser::parse_command_reply(&text)?;
            println!("{payload}");
        }
    }
    Ok(())
}

/// Partial results are still printed; the errors go to stderr and the
/// caller decides whether partial data is usable.
fn report_partial(errors: Option<parser::AggregateError>) {
    if let Some(err) = errors {
        eprintln!("warning: {err}");
    }
}
