//! Desktop notifications for paste outcomes
//!
//! Uses notify-send (libnotify). Notifications are best-effort: failures
//! are logged, never propagated.

use crate::dispatch::PasteOutcome;
use std::process::Stdio;
use tokio::process::Command;

/// Notification urgency, passed through to notify-send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    fn as_arg(&self) -> &'static str {
        match self {
            Urgency::Normal => "--urgency=normal",
            Urgency::Critical => "--urgency=critical",
        }
    }
}

/// Send a desktop notification with the given title and body.
pub async fn send(title: &str, body: &str, urgency: Urgency) {
    let result = Command::new("notify-send")
        .args([
            "--app-name=ClickPaste",
            "--expire-time=3000",
            urgency.as_arg(),
            title,
            body,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

/// Title, body and urgency describing how a paste ended
pub fn describe_outcome(outcome: &PasteOutcome) -> (String, String, Urgency) {
    match outcome {
        PasteOutcome::Completed { total, lossy, .. } => {
            let mut body = format!("Typed {} keystrokes", total);
            if let Some(lossy) = lossy {
                body.push('\n');
                body.push_str(&lossy.to_string());
            }
            ("Paste complete".to_string(), body, Urgency::Normal)
        }
        PasteOutcome::Cancelled { phase, sent, total } => {
            let body = if *total > 0 {
                format!("Stopped during {} after {}/{} keystrokes", phase, sent, total)
            } else {
                format!("Stopped during {}, nothing was typed", phase)
            };
            ("Paste cancelled".to_string(), body, Urgency::Normal)
        }
        PasteOutcome::Failed { error, sent } => {
            let mut body = error.to_string();
            if *sent > 0 {
                body.push_str(&format!("\n{} keystrokes were already typed", sent));
            }
            ("Paste failed".to_string(), body, Urgency::Critical)
        }
    }
}
