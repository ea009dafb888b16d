//! Paced delivery of chords to a backend
//!
//! The pacer sends one chord at a time, waits the configured inter-chord
//! delay, and checks the cancel token at every chord boundary. A chord is
//! never split: cancellation takes effect between chords, so no key or
//! modifier is ever left pressed on the target.

use crate::backend::Backend;
use crate::encoder::Chord;
use crate::error::BackendError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// One-shot cancellation flag shared between a session and its callers
///
/// Once cancelled it stays cancelled; cancelling twice is a no-op.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for cannot observe a closed channel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How a paced run ended
#[derive(Debug)]
pub enum PaceOutcome {
    /// Every chord was delivered
    Completed { sent: usize },
    /// Stopped at a chord boundary after `sent` chords
    Cancelled { sent: usize },
    /// The backend failed while delivering chord `sent + 1`
    Failed { sent: usize, error: BackendError },
}

impl PaceOutcome {
    /// Chords fully delivered before the run ended
    pub fn sent(&self) -> usize {
        match self {
            PaceOutcome::Completed { sent }
            | PaceOutcome::Cancelled { sent }
            | PaceOutcome::Failed { sent, .. } => *sent,
        }
    }
}

/// Delivers chords with a fixed delay between them
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    delay: Duration,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Send `chords` in order
    ///
    /// `on_progress(sent, total)` runs after each delivered chord. The delay
    /// is applied between chords, not after the last one, and is cut short
    /// by cancellation.
    pub async fn emit<F>(
        &self,
        backend: &mut dyn Backend,
        chords: &[Chord],
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> PaceOutcome
    where
        F: FnMut(usize, usize) + Send,
    {
        let total = chords.len();

        for (i, chord) in chords.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!("Cancelled before chord {}/{}", i + 1, total);
                return PaceOutcome::Cancelled { sent: i };
            }

            if let Err(error) = backend.inject_chord(chord).await {
                tracing::warn!("{} failed on chord {}/{}: {}", backend.name(), i + 1, total, error);
                return PaceOutcome::Failed { sent: i, error };
            }

            let sent = i + 1;
            on_progress(sent, total);

            if sent < total && !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {
                        tracing::debug!("Cancelled during delay after chord {}/{}", sent, total);
                        return PaceOutcome::Cancelled { sent };
                    }
                }
            }
        }

        PaceOutcome::Completed { sent: total }
    }
}
