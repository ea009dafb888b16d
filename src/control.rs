//! Controlling a running daemon from another process
//!
//! The daemon writes its PID to `$XDG_RUNTIME_DIR/clickpaste/pid`.
//! `clickpaste trigger` sends SIGUSR1 (start a paste), `clickpaste cancel`
//! sends SIGUSR2 (cancel the running paste).

use crate::error::ClickPasteError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::Path;

/// Requests a client can send to the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Trigger,
    Cancel,
}

impl ControlRequest {
    pub fn signal(&self) -> Signal {
        match self {
            ControlRequest::Trigger => Signal::SIGUSR1,
            ControlRequest::Cancel => Signal::SIGUSR2,
        }
    }
}

/// Read the daemon PID from `pid_file`
pub fn read_pid(pid_file: &Path) -> Result<i32, ClickPasteError> {
    let contents = std::fs::read_to_string(pid_file).map_err(|_| {
        ClickPasteError::Config(format!(
            "No running daemon found ({} missing).\n  Start it with: clickpaste daemon",
            pid_file.display()
        ))
    })?;

    contents
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| {
            ClickPasteError::Config(format!("Corrupt PID file {}", pid_file.display()))
        })
}

/// Send `request` to the daemon whose PID is in `pid_file`
///
/// Returns the daemon's PID.
pub fn send(pid_file: &Path, request: ControlRequest) -> Result<i32, ClickPasteError> {
    let pid = read_pid(pid_file)?;

    kill(Pid::from_raw(pid), request.signal()).map_err(|e| {
        ClickPasteError::Config(format!(
            "Cannot signal daemon (pid {}): {}. Is it still running?",
            pid, e
        ))
    })?;

    tracing::debug!("Sent {:?} to daemon (pid {})", request.signal(), pid);
    Ok(pid)
}
