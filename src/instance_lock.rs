//! Per-device instance lock using a Unix socket.
//!
//! Two bridges reading the same serial port would split its byte stream
//! between them, so each device path gets its own lock. A Unix socket is
//! released by the OS when the process dies, so a crash never leaves a stale
//! lock behind.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another bridge already owns the device.
    #[error("another bridge is already using {0}")]
    AlreadyRunning(String),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Lock on one serial device, held for as long as this value lives.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for `device` in the runtime directory.
    pub fn acquire(device: &Path) -> Result<Self, InstanceLockError> {
        Self::acquire_in(&runtime_dir(), device)
    }

    /// Acquire the lock for `device` with its socket under `dir`.
    pub fn acquire_in(dir: &Path, device: &Path) -> Result<Self, InstanceLockError> {
        let path = dir.join(socket_name(device));
        let busy = || InstanceLockError::AlreadyRunning(device.display().to_string());

        // A socket file nobody listens on is left over from a SIGKILL
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(busy());
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            // Lost the race against another instance
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(busy()),
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// XDG_RUNTIME_DIR if set (cleaned on logout), else /tmp.
fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// `/dev/ttyUSB0` becomes `presence-matter-bridge-ttyUSB0.sock`.
fn socket_name(device: &Path) -> String {
    let stem: String = device
        .to_string_lossy()
        .trim_start_matches("/dev/")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("presence-matter-bridge-{}.sock", stem)
}
