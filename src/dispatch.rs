//! Dispatch orchestrator
//!
//! Ties capture, encoding, pacing and the backend together into one paste
//! session. At most one session is live at a time; the slot that holds it
//! is the single-session lock.
//!
//! ```text
//! start_paste ──► Capturing ──click──► Confirming? ──yes──► Typing ──► Idle
//!                     │ESC/cancel          │no/cancel          │cancel/error
//!                     ▼                    ▼                   ▼
//!                    Idle                 Idle                Idle
//! ```
//!
//! Callers observe a session through an unbounded event channel and a
//! watch channel carrying the current [`DispatchState`].

use crate::backend::Backend;
use crate::capture::{CaptureController, CaptureOutcome, TargetPoint};
use crate::encoder::Encoder;
use crate::error::{ClipboardError, DispatchError, EncodingLossy};
use crate::pacer::{CancelToken, PaceOutcome, Pacer};
use crate::state::DispatchState;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Per-paste settings, fixed when the session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteOptions {
    /// Delay between chords
    pub delay: Duration,
    /// Texts longer than this many characters need confirmation
    pub confirm_threshold: usize,
    /// Click the target before typing so it has focus
    pub click_target: bool,
    /// Wait after the focus click
    pub focus_settle: Duration,
}

impl Default for PasteOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(10),
            confirm_threshold: 1000,
            click_target: true,
            focus_settle: Duration::from_millis(100),
        }
    }
}

/// Session phase, reported with cancellations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capturing,
    Confirming,
    Typing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Capturing => write!(f, "capture"),
            Phase::Confirming => write!(f, "confirmation"),
            Phase::Typing => write!(f, "typing"),
        }
    }
}

/// How a paste session ended
#[derive(Debug, Clone)]
pub enum PasteOutcome {
    /// All chords delivered; `lossy` lists code points that were skipped
    Completed {
        sent: usize,
        total: usize,
        lossy: Option<EncodingLossy>,
    },
    /// Stopped by ESC, `cancel()`, or a declined confirmation
    Cancelled {
        phase: Phase,
        sent: usize,
        total: usize,
    },
    /// Aborted by an error; `sent` chords had already been delivered
    Failed {
        error: Arc<DispatchError>,
        sent: usize,
    },
}

impl PasteOutcome {
    fn failed(error: impl Into<DispatchError>, sent: usize) -> Self {
        PasteOutcome::Failed {
            error: Arc::new(error.into()),
            sent,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PasteOutcome::Completed { .. })
    }
}

/// Notifications published while a session runs
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A session was accepted and capture began
    Started,
    /// Waiting for `confirm()`
    ConfirmationRequired { chars: usize },
    /// A chord was delivered
    Progress { sent: usize, total: usize },
    Completed {
        sent: usize,
        total: usize,
        lossy: Option<EncodingLossy>,
    },
    Cancelled {
        phase: Phase,
        sent: usize,
        total: usize,
    },
    Failed {
        error: Arc<DispatchError>,
        sent: usize,
    },
}

impl From<PasteOutcome> for DispatchEvent {
    fn from(outcome: PasteOutcome) -> Self {
        match outcome {
            PasteOutcome::Completed { sent, total, lossy } => {
                DispatchEvent::Completed { sent, total, lossy }
            }
            PasteOutcome::Cancelled { phase, sent, total } => {
                DispatchEvent::Cancelled { phase, sent, total }
            }
            PasteOutcome::Failed { error, sent } => DispatchEvent::Failed { error, sent },
        }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    cancel: CancelToken,
    task: JoinHandle<PasteOutcome>,
}

impl SessionHandle {
    /// Cancel this session
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to end
    pub async fn wait(self) -> PasteOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Paste session task failed: {}", e);
                PasteOutcome::Failed {
                    error: Arc::new(DispatchError::Internal(e.to_string())),
                    sent: 0,
                }
            }
        }
    }
}

struct ActiveSession {
    cancel: CancelToken,
    confirm: Option<oneshot::Sender<bool>>,
}

struct Inner {
    backend: tokio::sync::Mutex<Box<dyn Backend>>,
    capture: CaptureController,
    options: PasteOptions,
    slot: Mutex<Option<ActiveSession>>,
    events: mpsc::UnboundedSender<DispatchEvent>,
    state: watch::Sender<DispatchState>,
}

/// The paste orchestrator
///
/// Cheap to clone; all clones share the same session slot and backend.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiving end of its event channel
    pub fn new(
        backend: Box<dyn Backend>,
        capture: CaptureController,
        options: PasteOptions,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(DispatchState::Idle);

        let inner = Inner {
            backend: tokio::sync::Mutex::new(backend),
            capture,
            options,
            slot: Mutex::new(None),
            events,
            state,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            events_rx,
        )
    }

    /// Start a paste of `text`
    ///
    /// Fails with `ClipboardEmpty` for empty text and `SessionBusy` while
    /// another session is live; the live session is not affected.
    pub fn start_paste(&self, text: String) -> Result<SessionHandle, DispatchError> {
        if text.is_empty() {
            return Err(ClipboardError::Empty.into());
        }

        let cancel = CancelToken::new();
        {
            let mut slot = self.inner.slot();
            if slot.is_some() {
                tracing::debug!("Paste requested while a session is live");
                return Err(DispatchError::SessionBusy);
            }
            *slot = Some(ActiveSession {
                cancel: cancel.clone(),
                confirm: None,
            });
        }

        tracing::info!("Paste started ({} characters)", text.chars().count());
        self.inner.set_state(DispatchState::Capturing);
        self.inner.emit(DispatchEvent::Started);

        let inner = self.inner.clone();
        let session_cancel = cancel.clone();
        let task = tokio::spawn(async move { inner.run_session(text, session_cancel).await });

        Ok(SessionHandle { cancel, task })
    }

    /// Cancel the live session, if any
    ///
    /// Returns whether there was a session to cancel.
    pub fn cancel(&self) -> bool {
        match self.inner.slot().as_ref() {
            Some(active) => {
                tracing::debug!("Cancel requested");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Answer a pending confirmation
    ///
    /// Returns false when no session is waiting for one.
    pub fn confirm(&self, accept: bool) -> bool {
        let pending = self
            .inner
            .slot()
            .as_mut()
            .and_then(|active| active.confirm.take());
        match pending {
            Some(tx) => tx.send(accept).is_ok(),
            None => false,
        }
    }

    /// Current state
    pub fn state(&self) -> DispatchState {
        *self.inner.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<DispatchState> {
        self.inner.state.subscribe()
    }

    /// Resolves once no confirmation is pending: it was answered, the
    /// session was cancelled, or the session ended
    pub fn confirmation_closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut state = self.subscribe_state();
        async move {
            let _ = state
                .wait_for(|s| !matches!(s, DispatchState::Confirming { .. }))
                .await;
        }
    }

    pub fn options(&self) -> &PasteOptions {
        &self.inner.options
    }

    /// Probe the backend without starting a session
    pub async fn check_backend(&self) -> Result<&'static str, DispatchError> {
        let mut backend = self.inner.backend.lock().await;
        backend.prepare().await?;
        Ok(backend.name())
    }
}

/// Clears the session slot and returns to Idle when the session ends,
/// including when its task unwinds
struct SlotGuard {
    inner: Arc<Inner>,
    finished: bool,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.slot().take();
        self.inner.set_state(DispatchState::Idle);
        if !self.finished {
            // Unwinding: the session never reached its final event
            self.inner.emit(DispatchEvent::Failed {
                error: Arc::new(DispatchError::Internal(
                    "session task panicked".into(),
                )),
                sent: 0,
            });
        }
    }
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DispatchState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: DispatchEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    async fn run_session(self: Arc<Self>, text: String, cancel: CancelToken) -> PasteOutcome {
        let mut guard = SlotGuard {
            inner: self.clone(),
            finished: false,
        };
        let outcome = self.session(&text, &cancel).await;
        guard.finished = true;
        drop(guard);

        match &outcome {
            PasteOutcome::Completed { sent, total, lossy } => {
                tracing::info!("Paste completed ({}/{} keystrokes)", sent, total);
                if let Some(lossy) = lossy {
                    tracing::warn!("{}", lossy);
                }
            }
            PasteOutcome::Cancelled { phase, sent, total } => {
                tracing::info!("Paste cancelled during {} ({}/{})", phase, sent, total);
            }
            PasteOutcome::Failed { error, sent } => {
                tracing::error!("Paste failed after {} keystrokes: {}", sent, error);
            }
        }

        self.emit(outcome.clone().into());
        outcome
    }

    async fn session(&self, text: &str, cancel: &CancelToken) -> PasteOutcome {
        let target = match self.capture.begin_capture(cancel).await {
            Ok(CaptureOutcome::Target(target)) => target,
            Ok(CaptureOutcome::Cancelled) => return cancelled(Phase::Capturing, 0, 0),
            Err(e) => return PasteOutcome::failed(e, 0),
        };

        let chars = text.chars().count();
        if chars > self.options.confirm_threshold && !self.await_confirmation(chars, cancel).await {
            return cancelled(Phase::Confirming, 0, 0);
        }

        self.type_text(text, &target, cancel).await
    }

    /// Park in Confirming until `confirm()` or cancellation
    async fn await_confirmation(&self, chars: usize, cancel: &CancelToken) -> bool {
        let (tx, rx) = oneshot::channel();
        if let Some(active) = self.slot().as_mut() {
            active.confirm = Some(tx);
        }

        tracing::debug!("{} characters exceeds threshold {}, asking", chars, self.options.confirm_threshold);
        self.set_state(DispatchState::Confirming { chars });
        self.emit(DispatchEvent::ConfirmationRequired { chars });

        tokio::select! {
            answer = rx => answer.unwrap_or(false),
            _ = cancel.cancelled() => false,
        }
    }

    async fn type_text(&self, text: &str, target: &TargetPoint, cancel: &CancelToken) -> PasteOutcome {
        let mut backend = self.backend.lock().await;

        if let Err(e) = backend.prepare().await {
            return PasteOutcome::failed(e, 0);
        }

        let plan = Encoder::new(backend.supports_unicode()).plan(text);
        let total = plan.chords.len();
        tracing::debug!(
            "Typing {} chords ({} events) via {} with {:?} delay",
            total,
            plan.event_count(),
            backend.name(),
            self.options.delay
        );
        self.set_state(DispatchState::Typing { sent: 0, total });

        if cancel.is_cancelled() {
            return cancelled(Phase::Typing, 0, total);
        }

        if self.options.click_target {
            if target.located {
                if let Err(e) = backend.focus(target).await {
                    return PasteOutcome::failed(e, 0);
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.options.focus_settle) => {}
                    _ = cancel.cancelled() => return cancelled(Phase::Typing, 0, total),
                }
            } else {
                tracing::debug!("Target has no coordinates, relying on the user's click for focus");
            }
        }

        let pacer = Pacer::new(self.options.delay);
        let outcome = pacer
            .emit(&mut **backend, &plan.chords, cancel, |sent, total| {
                self.set_state(DispatchState::Typing { sent, total });
                self.emit(DispatchEvent::Progress { sent, total });
            })
            .await;

        match outcome {
            PaceOutcome::Completed { sent } => PasteOutcome::Completed {
                sent,
                total,
                lossy: plan.lossy(),
            },
            PaceOutcome::Cancelled { sent } => cancelled(Phase::Typing, sent, total),
            PaceOutcome::Failed { sent, error } => PasteOutcome::failed(error, sent),
        }
    }
}

fn cancelled(phase: Phase, sent: usize, total: usize) -> PasteOutcome {
    PasteOutcome::Cancelled { phase, sent, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::RecordingBackend;
    use crate::capture::{Grab, GrabEvent, Grabber};
    use crate::error::CaptureError;

    /// Clicks immediately on every grab
    struct ClickGrabber;

    struct ClickGrab(bool);

    impl Grab for ClickGrab {
        fn poll(&mut self) -> Result<Option<GrabEvent>, CaptureError> {
            if std::mem::replace(&mut self.0, true) {
                return Ok(None);
            }
            Ok(Some(GrabEvent::Click(TargetPoint::at(40, 60, None))))
        }
    }

    impl Grabber for ClickGrabber {
        fn grab(&self) -> Result<Box<dyn Grab>, CaptureError> {
            Ok(Box::new(ClickGrab(false)))
        }
    }

    fn dispatcher(
        backend: RecordingBackend,
        options: PasteOptions,
    ) -> (Dispatcher, mpsc::UnboundedReceiver<DispatchEvent>) {
        Dispatcher::new(
            Box::new(backend),
            CaptureController::new(Arc::new(ClickGrabber)),
            options,
        )
    }

    fn fast() -> PasteOptions {
        PasteOptions {
            delay: Duration::ZERO,
            focus_settle: Duration::ZERO,
            ..PasteOptions::default()
        }
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let (d, _rx) = dispatcher(RecordingBackend::new(), fast());
        assert!(matches!(
            d.start_paste(String::new()),
            Err(DispatchError::Clipboard(ClipboardError::Empty))
        ));
        assert!(d.state().is_idle());
    }

    #[tokio::test]
    async fn test_completed_paste_returns_to_idle() {
        let (d, mut rx) = dispatcher(RecordingBackend::new(), fast());
        let outcome = d.start_paste("hi".into()).unwrap().wait().await;

        assert!(matches!(
            outcome,
            PasteOutcome::Completed {
                sent: 2,
                total: 2,
                lossy: None
            }
        ));
        assert!(d.state().is_idle());
        assert!(matches!(rx.recv().await, Some(DispatchEvent::Started)));
    }

    #[tokio::test]
    async fn test_unicode_is_lossy_without_support() {
        let (d, _rx) = dispatcher(RecordingBackend::new(), fast());
        let outcome = d.start_paste("😀".into()).unwrap().wait().await;

        match outcome {
            PasteOutcome::Completed { sent, total, lossy } => {
                assert_eq!((sent, total), (0, 0));
                assert_eq!(lossy.map(|l| l.codepoints), Some(vec!['😀']));
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_before_typing() {
        let (d, _rx) = dispatcher(RecordingBackend::new().unavailable(), fast());
        let outcome = d.start_paste("abc".into()).unwrap().wait().await;

        match outcome {
            PasteOutcome::Failed { error, sent } => {
                assert_eq!(sent, 0);
                assert!(matches!(*error, DispatchError::BackendUnavailable(_)));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_confirm_without_pending_question() {
        let (d, _rx) = dispatcher(RecordingBackend::new(), fast());
        assert!(!d.confirm(true));
        assert!(!d.cancel());
    }

    #[tokio::test]
    async fn test_cancel_closes_pending_confirmation() {
        let options = PasteOptions {
            confirm_threshold: 2,
            ..fast()
        };
        let (d, mut rx) = dispatcher(RecordingBackend::new(), options);
        let handle = d.start_paste("hello".into()).unwrap();

        while !matches!(rx.recv().await, Some(DispatchEvent::ConfirmationRequired { chars: 5 })) {}
        let closed = d.confirmation_closed();

        d.cancel();
        tokio::time::timeout(Duration::from_secs(1), closed)
            .await
            .expect("confirmation should close on cancel");
        assert!(matches!(
            handle.wait().await,
            PasteOutcome::Cancelled {
                phase: Phase::Confirming,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_confirmation_closed_is_immediate_when_idle() {
        let (d, _rx) = dispatcher(RecordingBackend::new(), fast());
        tokio::time::timeout(Duration::from_secs(1), d.confirmation_closed())
            .await
            .expect("nothing is pending");
    }
}
