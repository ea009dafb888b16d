//! Confirmation prompt for long pastes
//!
//! Asks with `zenity --question`. Anything other than an explicit "yes"
//! (closing the dialog, timeout, zenity missing) declines. The dialog is
//! killed as soon as nobody is waiting for the answer any more.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// How long the dialog stays up before it counts as declined
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

fn prompt_text(chars: usize) -> String {
    format!(
        "Type {} characters into the selected window?\n\nPress ESC during typing to stop.",
        chars
    )
}

fn dialog(chars: usize) -> Command {
    let mut cmd = Command::new("zenity");
    cmd.args([
        "--question",
        "--title=ClickPaste",
        "--ok-label=Type it",
        "--cancel-label=Cancel",
        &format!("--timeout={}", PROMPT_TIMEOUT.as_secs()),
        &format!("--text={}", prompt_text(chars)),
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .kill_on_drop(true);
    cmd
}

/// Ask the user whether to type `chars` characters
///
/// Returns `None` without an answer once `closed` resolves, for example
/// because the session was cancelled while the dialog was up.
pub async fn ask<F>(chars: usize, closed: F) -> Option<bool>
where
    F: Future<Output = ()>,
{
    answer_until(dialog(chars), closed).await
}

async fn answer_until<F>(cmd: Command, closed: F) -> Option<bool>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        _ = closed => {
            tracing::debug!("Confirmation no longer needed, closing dialog");
            None
        }
        accept = answer(cmd) => Some(accept),
    }
}

async fn answer(mut cmd: Command) -> bool {
    match cmd.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            tracing::warn!(
                "Cannot show confirmation dialog ({}). Install zenity or raise paste.confirm_threshold.",
                e
            );
            false
        }
    }
}
