//! Virtual channel: a pseudo-terminal pair published under a stable name.
//!
//! The engine side holds the primary end of a pty; clients open the
//! secondary end exactly as they would a serial port. When a stable name is
//! configured, the secondary device is published as a filesystem symlink
//! (e.g. `/tmp/protoboard -> /dev/pts/3`) so callers do not need to
//! discover the transient pts path.
//!
//! The terminal is switched to raw mode at open: without it the kernel
//! line discipline echoes engine output back into the request stream and
//! rewrites line endings, and the wire bytes must be exactly the
//! configured ones.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg};
use tracing::{debug, warn};

use crate::error::{AppResult, ProtoboardError};

/// Result of one timed read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// Nothing arrived within the timeout; not an error.
    TimedOut,
    /// The peer end closed; the channel stays usable for the next client.
    Disconnected,
}

/// One half of a duplex byte channel, engine side.
pub struct VirtualChannel {
    primary: File,
    /// Kept open so the primary does not see HUP between clients.
    _secondary: OwnedFd,
    secondary_path: PathBuf,
    published: Option<PathBuf>,
}

impl VirtualChannel {
    /// Allocate a pty pair and optionally publish the secondary end as
    /// `alias`.
    ///
    /// A failure while publishing releases the allocated pair before
    /// returning the error.
    pub fn open(alias: Option<&Path>) -> AppResult<Self> {
        let pty = nix::pty::openpty(None, None)?;
        let secondary_path = nix::unistd::ttyname(&pty.slave)?;

        let mut termios = tcgetattr(&pty.master)?;
        cfmakeraw(&mut termios);
        tcsetattr(&pty.master, SetArg::TCSANOW, &termios)?;

        let mut channel = Self {
            primary: pty.master.into(),
            _secondary: pty.slave,
            secondary_path,
            published: None,
        };

        if let Some(alias) = alias {
            if alias != channel.secondary_path {
                if let Err(err) = std::fs::remove_file(alias) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return Err(ProtoboardError::Channel(format!(
                            "failed to remove existing virtual port {}: {err}",
                            alias.display()
                        )));
                    }
                }
                std::os::unix::fs::symlink(&channel.secondary_path, alias).map_err(|err| {
                    ProtoboardError::Channel(format!(
                        "failed to create symlink {} -> {}: {err}",
                        alias.display(),
                        channel.secondary_path.display()
                    ))
                })?;
                channel.published = Some(alias.to_path_buf());
                debug!(
                    alias = %alias.display(),
                    device = %channel.secondary_path.display(),
                    "created virtual serial port"
                );
            }
        } else {
            debug!(device = %channel.secondary_path.display(), "created virtual serial port");
        }

        Ok(channel)
    }

    /// The name clients should open: the published alias when one was
    /// configured, otherwise the underlying pts device.
    pub fn port_name(&self) -> &Path {
        self.published.as_deref().unwrap_or(&self.secondary_path)
    }

    /// Wait up to `timeout` for inbound bytes and read what is available.
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> AppResult<ReadOutcome> {
        let poll_timeout = PollTimeout::try_from(timeout.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(PollTimeout::MAX);

        let ready = {
            let mut fds = [PollFd::new(self.primary.as_fd(), PollFlags::POLLIN)];
            poll(&mut fds, poll_timeout)?
        };
        if ready == 0 {
            return Ok(ReadOutcome::TimedOut);
        }

        match self.primary.read(buf) {
            Ok(0) => Ok(ReadOutcome::Disconnected),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(err) if err.raw_os_error() == Some(nix::errno::Errno::EIO as i32) => {
                // EIO from a pty primary means the peer side hung up.
                Ok(ReadOutcome::Disconnected)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Transmit one scheduled write; a short write is a delivery error.
    pub fn write_response(&mut self, data: &[u8]) -> AppResult<()> {
        let written = self.primary.write(data)?;
        self.primary.flush()?;
        if written != data.len() {
            return Err(ProtoboardError::PartialWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }
}

impl Drop for VirtualChannel {
    fn drop(&mut self) {
        if let Some(alias) = &self.published {
            match std::fs::remove_file(alias) {
                Ok(()) => debug!(alias = %alias.display(), "removed virtual port symlink"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(alias = %alias.display(), %err, "failed to remove virtual port symlink");
                }
            }
        }
    }
}
