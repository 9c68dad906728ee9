//! Virtual-Device Emulator
//!
//! Lets software that expects to talk to a physical breadboard-prototyping
//! device talk to a synthetic stand-in instead. The emulator publishes a
//! pseudo-terminal under a stable name, frames inbound bytes into requests,
//! and answers them from configured request/response mappings with timed,
//! possibly chunked, possibly randomized output that reflects a small piece
//! of mutable hardware state.
//!
//! ```no_run
//! use protoboard::config::EmulatorSettings;
//! use protoboard::emulator::Emulator;
//!
//! # async fn run() -> protoboard::error::AppResult<()> {
//! let mut emulator = Emulator::new(EmulatorSettings::default())?;
//! emulator.start().await?;
//! println!("virtual port: {:?}", emulator.port_name());
//! // ... clients connect and exchange requests ...
//! emulator.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod mapping;
pub mod unescape;

#[cfg(unix)]
pub mod channel;

pub use engine::{Delivery, ResponseEngine, TimedWrite};
pub use mapping::{MappingSpec, ResponseChunk, ResponseOption, ResponseTiming, SelectionMode};

#[cfg(unix)]
pub use channel::{ReadOutcome, VirtualChannel};

#[cfg(unix)]
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(unix)]
use std::sync::Arc;
#[cfg(unix)]
use std::time::Duration;

#[cfg(unix)]
use tracing::{debug, error, info, trace, warn};

#[cfg(unix)]
use crate::config::EmulatorSettings;
#[cfg(unix)]
use crate::error::{AppResult, ProtoboardError};
#[cfg(unix)]
use engine::ResponseEngine as Engine;

/// How long one blocking read waits before re-checking for shutdown.
#[cfg(unix)]
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity at which delivery waits notice a shutdown request.
#[cfg(unix)]
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Lifecycle states of the emulator.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Opening,
    Running,
    Draining,
}

/// The virtual device: channel lifecycle plus the request-handling loop.
///
/// Exactly one reader task owns the channel and, through the engine, the
/// hardware state. Requests are dispatched synchronously on that task, so
/// two requests are never processed concurrently against the same state.
///
/// # Framing
///
/// The reader treats the entire trimmed buffer after any non-empty read as
/// one complete request. A request whose bytes arrive split across two
/// reads, or whose payload legitimately spans multiple lines, will be
/// mis-framed. This matches the short single-line command traffic the
/// protocol carries; delimiter-based framing would also change the timing
/// behavior clients observe, so the simplification is kept deliberately.
#[cfg(unix)]
pub struct Emulator {
    settings: EmulatorSettings,
    state: LifecycleState,
    shutdown: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    port_name: Option<PathBuf>,
}

#[cfg(unix)]
impl Emulator {
    /// Validate `settings` and create a stopped emulator.
    ///
    /// # Errors
    /// Fails fast on configuration errors (bad regex, zero-response
    /// mapping, zero buffer size).
    pub fn new(settings: EmulatorSettings) -> AppResult<Self> {
        settings.validate()?;

        Ok(Self {
            settings,
            state: LifecycleState::Stopped,
            shutdown: Arc::new(AtomicBool::new(false)),
            task: None,
            port_name: None,
        })
    }

    /// Allocate the channel, publish it, and start the request loop.
    pub async fn start(&mut self) -> AppResult<()> {
        if self.task.is_some() {
            return Err(ProtoboardError::AlreadyRunning);
        }

        self.state = LifecycleState::Opening;

        let alias = match self.settings.serial.virtual_port.as_str() {
            "" => None,
            name => Some(PathBuf::from(name)),
        };

        let channel = match VirtualChannel::open(alias.as_deref()) {
            Ok(channel) => channel,
            Err(err) => {
                self.state = LifecycleState::Stopped;
                return Err(err);
            }
        };
        self.port_name = Some(channel.port_name().to_path_buf());

        // A fresh engine per start: restart resets hardware state to the
        // configured defaults.
        let engine = match Engine::new(&self.settings.mappings, self.settings.device.clone()) {
            Ok(engine) => engine,
            Err(err) => {
                self.state = LifecycleState::Stopped;
                self.port_name = None;
                return Err(err);
            }
        };

        self.shutdown.store(false, Ordering::SeqCst);
        let shutdown = Arc::clone(&self.shutdown);
        let buffer_size = self.settings.serial.buffer_size;

        self.task = Some(tokio::task::spawn_blocking(move || {
            run_loop(channel, engine, &shutdown, buffer_size);
        }));

        self.state = LifecycleState::Running;
        info!(port = ?self.port_name, "emulator running");
        Ok(())
    }

    /// Drain and stop: in-flight deliveries finish or abandon their
    /// current chunk, then the channel is closed and the published alias
    /// removed.
    pub async fn stop(&mut self) -> AppResult<()> {
        let Some(task) = self.task.take() else {
            return Err(ProtoboardError::NotRunning);
        };

        self.state = LifecycleState::Draining;
        self.shutdown.store(true, Ordering::SeqCst);

        if let Err(err) = task.await {
            warn!(%err, "reader task terminated abnormally");
        }

        self.state = LifecycleState::Stopped;
        self.port_name = None;
        info!("emulator stopped");
        Ok(())
    }

    /// The name clients should open, once running.
    pub fn port_name(&self) -> Option<&Path> {
        self.port_name.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }
}

/// The single reader loop: frame requests, dispatch to the engine, execute
/// deliveries. Read timeouts are routine; end-of-stream means the client
/// went away and the loop keeps waiting for the next one.
#[cfg(unix)]
fn run_loop(
    mut channel: VirtualChannel,
    mut engine: Engine,
    shutdown: &AtomicBool,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut pending = String::new();

    while !shutdown.load(Ordering::SeqCst) {
        match channel.read_timeout(&mut buf, READ_POLL_INTERVAL) {
            Ok(ReadOutcome::TimedOut) => continue,
            Ok(ReadOutcome::Disconnected) => {
                debug!("client disconnected");
                std::thread::sleep(READ_POLL_INTERVAL);
                continue;
            }
            Ok(ReadOutcome::Data(n)) => {
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));

                // One non-empty read is one complete request; see the
                // framing note on [`Emulator`].
                let request = pending.trim().to_string();
                if request.is_empty() {
                    continue;
                }

                debug!(request = %request, "received request");
                match engine.handle_request(&request) {
                    Ok(Some(delivery)) => {
                        if let Err(err) = deliver(&mut channel, shutdown, &delivery) {
                            error!(%err, "error sending response");
                        }
                    }
                    Ok(None) => {}
                    Err(err) => error!(%err, "error handling request"),
                }

                pending.clear();
            }
            Err(err) => {
                error!(%err, "error reading from channel");
                std::thread::sleep(READ_POLL_INTERVAL);
            }
        }
    }

    debug!("reader loop drained");
}

/// Execute a delivery schedule, honoring delays and aborting between
/// chunks when shutdown is requested.
#[cfg(unix)]
fn deliver(
    channel: &mut VirtualChannel,
    shutdown: &AtomicBool,
    delivery: &Delivery,
) -> AppResult<()> {
    for write in &delivery.writes {
        let mut remaining = write.delay;
        while !remaining.is_zero() {
            if shutdown.load(Ordering::SeqCst) {
                debug!("shutdown requested, abandoning in-flight delivery");
                return Ok(());
            }
            let slice = remaining.min(SHUTDOWN_CHECK_INTERVAL);
            std::thread::sleep(slice);
            remaining -= slice;
        }

        if shutdown.load(Ordering::SeqCst) {
            debug!("shutdown requested, abandoning in-flight delivery");
            return Ok(());
        }

        channel.write_response(&write.data)?;
        trace!(bytes = write.data.len(), "sent response chunk");
    }
    Ok(())
}
