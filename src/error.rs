//! Error types for clickpaste
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the clickpaste application
#[derive(Error, Debug)]
pub enum ClickPasteError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("evdev error: {0}")]
    Evdev(String),
}

/// Errors from the clipboard source
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard is empty. Copy some text first.")]
    Empty,

    #[error("Clipboard could not be read: {0}\n  Install wl-clipboard (Wayland) or xclip (X11).")]
    Unreadable(String),
}

/// Errors raised while acquiring or holding the capture grab
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot open X display: {0}\n  Is DISPLAY set? Target capture needs an X11 or XWayland session.")]
    Display(String),

    #[error("Could not grab the {device}: {reason}\n  Another application may hold a grab; try again.")]
    GrabRefused {
        device: &'static str,
        reason: String,
    },

    #[error("Lost connection while capturing: {0}")]
    Connection(String),

    #[error("Cannot read input devices for capture: {0}\n  Without an X display, capture listens on /dev/input.\n  Add yourself to the 'input' group: sudo usermod -aG input $USER")]
    Devices(String),
}

/// Errors from an injection backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("ydotoold is not reachable at {}.\n  Start with: systemctl --user start ydotool\n  Enable at boot: systemctl --user enable ydotool", .0.display())]
    DaemonUnavailable(PathBuf),

    #[error("{0} not found in PATH. Install it via your package manager.")]
    ToolNotFound(&'static str),

    #[error("Cannot open X display for XTest: {0}\n  Is DISPLAY set? Try backend = \"daemon\" on Wayland.")]
    DisplayUnavailable(String),

    #[error("Connection to the injection backend was lost: {0}")]
    Disconnected(String),

    #[error("Injection rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// True when the backend could not be reached at all, so nothing was typed
    /// and the user needs to fix their setup rather than retry.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BackendError::DaemonUnavailable(_)
                | BackendError::ToolNotFound(_)
                | BackendError::DisplayUnavailable(_)
        )
    }
}

/// Errors surfaced by the dispatch orchestrator
///
/// Every component error reaches the user through one of these variants.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("A paste is already in progress")]
    SessionBusy,

    #[error(transparent)]
    Clipboard(#[from] ClipboardError),

    #[error("Target capture failed (nothing was typed, safe to retry): {0}")]
    GrabFailed(#[from] CaptureError),

    #[error("Injection backend unavailable: {0}")]
    BackendUnavailable(BackendError),

    #[error("Typing aborted: {0}")]
    Backend(BackendError),

    #[error("Paste session crashed: {0}\n  This is a bug; please report it with the log (run with -v).")]
    Internal(String),
}

impl From<BackendError> for DispatchError {
    fn from(e: BackendError) -> Self {
        if e.is_unavailable() {
            DispatchError::BackendUnavailable(e)
        } else {
            DispatchError::Backend(e)
        }
    }
}

/// Non-fatal warning attached to a completed paste when some code points
/// could not be typed with the active backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} character(s) could not be typed: {}", .codepoints.len(), preview(.codepoints))]
pub struct EncodingLossy {
    pub codepoints: Vec<char>,
}

fn preview(codepoints: &[char]) -> String {
    let mut s: String = codepoints
        .iter()
        .take(8)
        .map(|c| format!("U+{:04X}", *c as u32))
        .collect::<Vec<_>>()
        .join(" ");
    if codepoints.len() > 8 {
        s.push_str(" ...");
    }
    s
}

/// Result type alias using ClickPasteError
pub type Result<T> = std::result::Result<T, ClickPasteError>;

impl From<evdev::Error> for HotkeyError {
    fn from(e: evdev::Error) -> Self {
        HotkeyError::Evdev(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_classification() {
        let err: DispatchError = BackendError::DaemonUnavailable("/tmp/.ydotool_socket".into()).into();
        assert!(matches!(err, DispatchError::BackendUnavailable(_)));

        let err: DispatchError = BackendError::ToolNotFound("xdotool").into();
        assert!(matches!(err, DispatchError::BackendUnavailable(_)));

        let err: DispatchError = BackendError::Rejected("BadWindow".into()).into();
        assert!(matches!(err, DispatchError::Backend(_)));

        let err: DispatchError = BackendError::Disconnected("broken pipe".into()).into();
        assert!(matches!(err, DispatchError::Backend(_)));
    }

    #[test]
    fn test_daemon_unavailable_has_hint() {
        let msg = BackendError::DaemonUnavailable("/run/user/1000/.ydotool_socket".into()).to_string();
        assert!(msg.contains("/run/user/1000/.ydotool_socket"));
        assert!(msg.contains("systemctl --user start ydotool"));
    }

    #[test]
    fn test_encoding_lossy_display() {
        let warning = EncodingLossy {
            codepoints: vec!['😀'],
        };
        assert_eq!(
            warning.to_string(),
            "1 character(s) could not be typed: U+1F600"
        );
    }
}
