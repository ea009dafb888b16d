//! Daemon status for bar integrations (Waybar, polybar)
//!
//! The daemon mirrors its state name into the state file; this module reads
//! it back once or follows it with a file watcher. A missing file means the
//! daemon is not running ("stopped").

use crate::error::ClickPasteError;
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::time::Duration;

/// State reported when the state file is absent
pub const STOPPED: &str = "stopped";

/// Output format of `clickpaste status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for StatusFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(StatusFormat::Text),
            "json" => Ok(StatusFormat::Json),
            other => Err(format!("unknown status format '{}' (expected text or json)", other)),
        }
    }
}

/// Read the current state name, "stopped" if the daemon is not running
pub fn read_state(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| STOPPED.to_string())
}

/// Format state as JSON for Waybar consumption
pub fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "idle" => ("📋", "idle", "ClickPaste ready"),
        "capturing" => ("🎯", "capturing", "Click the target window (ESC cancels)"),
        "confirming" => ("❓", "confirming", "Waiting for confirmation"),
        "typing" => ("⌨️", "typing", "Typing clipboard..."),
        STOPPED => ("", "stopped", "ClickPaste not running"),
        _ => ("?", "unknown", "Unknown state"),
    };

    serde_json::json!({
        "text": text,
        "alt": class,
        "class": class,
        "tooltip": tooltip,
    })
    .to_string()
}

/// Render one status line
pub fn render(state: &str, format: StatusFormat) -> String {
    match format {
        StatusFormat::Text => state.to_string(),
        StatusFormat::Json => format_state_json(state),
    }
}

/// Print the state now and after every change until the watcher dies
pub fn follow(state_path: &Path, format: StatusFormat) -> Result<(), ClickPasteError> {
    let mut last_state = read_state(state_path);
    println!("{}", render(&last_state, format));

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        NotifyConfig::default().with_poll_interval(Duration::from_millis(100)),
    )
    .map_err(watch_error)?;

    // Watch the parent directory; the file comes and goes with the daemon
    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent)?;
        watcher
            .watch(parent, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;
    }

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(Ok(_event)) => {
                let new_state = read_state(state_path);
                // Daemon is mid-write; the next event carries the content
                if new_state.is_empty() {
                    continue;
                }
                if new_state != last_state {
                    println!("{}", render(&new_state, format));
                    last_state = new_state;
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {:?}", e);
            }
            Err(RecvTimeoutError::Timeout) => {
                // File deleted without an event reaching us
                if !state_path.exists() && last_state != STOPPED {
                    println!("{}", render(STOPPED, format));
                    last_state = STOPPED.to_string();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

fn watch_error(e: notify::Error) -> ClickPasteError {
    ClickPasteError::Config(format!("Cannot watch state file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_file_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_state(&dir.path().join("state")), STOPPED);

        std::fs::write(dir.path().join("state"), "typing\n").unwrap();
        assert_eq!(read_state(&dir.path().join("state")), "typing");
    }

    #[test]
    fn test_json_is_valid() {
        for state in ["idle", "capturing", "confirming", "typing", "stopped", "bogus"] {
            let json: serde_json::Value = serde_json::from_str(&format_state_json(state)).unwrap();
            assert!(json["text"].is_string());
            assert!(json["tooltip"].is_string());
        }

        let json: serde_json::Value = serde_json::from_str(&format_state_json("typing")).unwrap();
        assert_eq!(json["class"], "typing");
        let json: serde_json::Value = serde_json::from_str(&format_state_json("bogus")).unwrap();
        assert_eq!(json["class"], "unknown");
    }

    #[test]
    fn test_render_text() {
        assert_eq!(render("idle", StatusFormat::Text), "idle");
        assert_eq!("json".parse::<StatusFormat>(), Ok(StatusFormat::Json));
        assert!("yaml".parse::<StatusFormat>().is_err());
    }
}
