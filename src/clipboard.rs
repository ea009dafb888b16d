//! Clipboard source
//!
//! Reads the clipboard as text through wl-paste (Wayland) or xclip (X11).
//! The session's native tool is tried first, the other one second, so an
//! XWayland session still works with only one of them installed.

use crate::error::ClipboardError;
use std::process::Stdio;
use tokio::process::Command;

/// A clipboard reader command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTool {
    WlPaste,
    Xclip,
}

impl ClipboardTool {
    fn program(&self) -> &'static str {
        match self {
            ClipboardTool::WlPaste => "wl-paste",
            ClipboardTool::Xclip => "xclip",
        }
    }

    fn args(&self) -> &'static [&'static str] {
        match self {
            ClipboardTool::WlPaste => &["--no-newline", "--type", "text/plain"],
            ClipboardTool::Xclip => &["-selection", "clipboard", "-o"],
        }
    }

    async fn read(&self) -> Result<String, ClipboardError> {
        let output = Command::new(self.program())
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ClipboardError::Unreadable(format!("{}: {}", self.program(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Both tools fail rather than print nothing when there is no text
            if stderr.contains("Nothing is copied")
                || stderr.contains("No suitable type")
                || stderr.contains("not available")
            {
                return Err(ClipboardError::Empty);
            }
            return Err(ClipboardError::Unreadable(format!(
                "{} failed: {}",
                self.program(),
                stderr.trim()
            )));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|_| ClipboardError::Unreadable("clipboard does not hold UTF-8 text".into()))?;
        if text.is_empty() {
            return Err(ClipboardError::Empty);
        }
        Ok(text)
    }
}

/// Tools to try, most appropriate for the session first
pub fn tool_order(wayland: bool) -> [ClipboardTool; 2] {
    if wayland {
        [ClipboardTool::WlPaste, ClipboardTool::Xclip]
    } else {
        [ClipboardTool::Xclip, ClipboardTool::WlPaste]
    }
}

/// Read the clipboard as text
pub async fn read_clipboard_text() -> Result<String, ClipboardError> {
    let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    let mut last_error = None;

    for tool in tool_order(wayland) {
        match tool.read().await {
            Ok(text) => {
                tracing::debug!("Read {} characters via {}", text.chars().count(), tool.program());
                return Ok(text);
            }
            // The tool worked and the clipboard really is empty
            Err(ClipboardError::Empty) => return Err(ClipboardError::Empty),
            Err(e) => {
                tracing::debug!("{}", e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ClipboardError::Unreadable("no clipboard tool".into())))
}
