//! End-to-end exercise of the virtual device over its pseudo-terminal.
//!
//! Each test starts its own emulator published under a unique temp-dir
//! alias, connects the way a serial client would (open, write, drain the
//! reply until the port goes quiet), and drives the wire grammar.

#![cfg(unix)]

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tempfile::TempDir;

use protoboard::config::EmulatorSettings;
use protoboard::emulator::{
    Emulator, LifecycleState, MappingSpec, ResponseChunk, ResponseOption,
};
use protoboard::parser;

/// Overall wait for the first reply byte.
const REPLY_DEADLINE: Duration = Duration::from_secs(2);
/// A reply is complete once the port stays quiet this long.
const QUIET_WINDOW: Duration = Duration::from_millis(300);

struct TestEmulator {
    emulator: Emulator,
    port: PathBuf,
    _dir: TempDir,
}

async fn start(mut settings: EmulatorSettings) -> TestEmulator {
    let dir = tempfile::tempdir().expect("tempdir");
    let alias = dir.path().join("port");
    settings.serial.virtual_port = alias.to_string_lossy().into_owned();

    let mut emulator = Emulator::new(settings).expect("emulator");
    emulator.start().await.expect("start");
    let port = emulator.port_name().expect("port name").to_path_buf();

    TestEmulator {
        emulator,
        port,
        _dir: dir,
    }
}

async fn start_default() -> TestEmulator {
    start(EmulatorSettings::default()).await
}

/// Send one command and drain the reply, serial-client style.
async fn exchange(port: &Path, command: &str) -> String {
    let port = port.to_path_buf();
    let command = command.to_string();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&port)
            .expect("open virtual port");
        file.write_all(command.as_bytes()).expect("write command");
        read_until_quiet(&mut file)
    })
    .await
    .expect("client I/O task")
}

fn read_until_quiet(file: &mut File) -> String {
    let start = Instant::now();
    let mut out = Vec::new();

    loop {
        let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(QUIET_WINDOW.as_millis() as i32)
            .unwrap_or(PollTimeout::MAX);
        let ready = poll(&mut fds, timeout).expect("poll");

        if ready == 0 {
            if out.is_empty() && start.elapsed() < REPLY_DEADLINE {
                continue;
            }
            break;
        }

        let mut buf = [0u8; 1024];
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[tokio::test(flavor = "multi_thread")]
async fn identity_query_reports_firmware_version() {
    let mut t = start_default().await;

    let reply = exchange(&t.port, "?").await;
    assert!(
        reply.contains("firmware version: 5.2.2.0"),
        "unexpected identity reply: {reply:?}"
    );

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn config_dump_parses_back_into_sections() {
    let mut t = start_default().await;

    let reply = exchange(&t.port, "~").await;
    assert!(reply.contains("`[config]"), "unexpected dump: {reply:?}");

    let (sections, errors) = parser::parse_config_dump(&reply);
    assert!(errors.is_none(), "dump must parse cleanly: {errors:?}");

    let config = sections
        .iter()
        .find(|s| s.name == "config")
        .expect("config section");
    assert_eq!(config.entries[0].key, "firmware_version");
    assert_eq!(config.entries[0].value, "5.2.2.0");

    let dacs = sections
        .iter()
        .find(|s| s.name == "dacs")
        .expect("dacs section");
    let dac0 = dacs
        .entries
        .iter()
        .find(|e| e.key == "dac0_voltage")
        .expect("dac0 entry");
    assert_eq!(dac0.value, "3.30V");

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn dac_write_is_visible_in_subsequent_reads() {
    let mut t = start_default().await;

    let reply = exchange(&t.port, ">set_dac(1, 2.50)").await;
    assert!(
        reply.contains(">set_dac(1, 2.50)"),
        "expected echo envelope, got {reply:?}"
    );

    let reply = exchange(&t.port, ">dac_get(1)").await;
    assert!(reply.contains("2.50V"), "unexpected DAC reply: {reply:?}");
    assert_eq!(parser::parse_dac_reply(&reply).expect("reply"), "2.50V");

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn nets_listing_roundtrips_through_the_parser() {
    let mut t = start_default().await;

    let raw = exchange(&t.port, ">print_nets()").await;
    let payload = parser::parse_command_reply(&raw).expect("envelope");
    let (nets, errors) = parser::parse_nets(&payload);

    assert!(errors.is_none(), "nets must parse cleanly: {errors:?}");
    assert_eq!(nets.len(), 5);
    assert_eq!(nets[0].name, "GND");
    assert_eq!(nets[0].nodes, vec!["GND"]);

    let dac0 = nets.iter().find(|n| n.name == "DAC 0").expect("DAC 0 net");
    assert_eq!(dac0.voltage.as_deref(), Some("3.30V"));

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_request_transmits_nothing() {
    let mut t = start_default().await;

    let reply = exchange(&t.port, "bogus_command_xyz").await;
    assert!(reply.is_empty(), "expected silence, got {reply:?}");

    // The emulator keeps servicing requests afterwards.
    let reply = exchange(&t.port, "?").await;
    assert!(reply.contains("firmware version:"));

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn chunked_response_arrives_complete_and_in_order() {
    let chunk = |data: &str| ResponseChunk {
        data: data.to_string(),
        delay: Duration::from_millis(50),
        jitter_max: Duration::ZERO,
    };
    let mut settings = EmulatorSettings::default();
    settings.mappings = vec![MappingSpec {
        request: "stream".to_string(),
        responses: vec![ResponseOption::Chunked {
            chunks: vec![chunk("first "), chunk("second "), chunk("third\r\n")],
            weight: 0,
        }],
        ..Default::default()
    }];

    let mut t = start(settings).await;

    let reply = exchange(&t.port, "stream").await;
    assert_eq!(reply, "first second third\r\n");

    t.emulator.stop().await.expect("stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_publishes_and_removes_the_alias() {
    let dir = tempfile::tempdir().expect("tempdir");
    let alias = dir.path().join("port");

    let mut settings = EmulatorSettings::default();
    settings.serial.virtual_port = alias.to_string_lossy().into_owned();

    let mut emulator = Emulator::new(settings).expect("emulator");
    assert_eq!(emulator.state(), LifecycleState::Stopped);

    emulator.start().await.expect("start");
    assert_eq!(emulator.state(), LifecycleState::Running);
    assert!(alias.exists(), "alias must be published while running");
    assert!(emulator.start().await.is_err(), "double start must fail");

    emulator.stop().await.expect("stop");
    assert_eq!(emulator.state(), LifecycleState::Stopped);
    assert!(!alias.exists(), "alias must be removed after stop");
    assert!(emulator.stop().await.is_err(), "double stop must fail");

    // The emulator can be started again after a clean stop.
    emulator.start().await.expect("restart");
    assert!(alias.exists());
    emulator.stop().await.expect("stop again");
}
