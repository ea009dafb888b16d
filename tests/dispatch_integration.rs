//! End-to-end dispatch tests with scripted capture and a recording backend
//!
//! These run the real dispatcher, encoder and pacer against fakes for the
//! two pieces that need a live desktop: the capture grab and the injection
//! backend. Time is paused, so delays are exact and nothing actually sleeps.

use clickpaste::backend::ydotoold::YdotoolDaemonBackend;
use clickpaste::backend::Backend;
use clickpaste::capture::{CaptureController, Grab, GrabEvent, Grabber, TargetPoint, WindowHandle};
use clickpaste::dispatch::{DispatchEvent, Dispatcher, PasteOptions, PasteOutcome, Phase};
use clickpaste::encoder::{Chord, KeyAction, KeyEvent, Symbol};
use clickpaste::error::{BackendError, CaptureError, DispatchError};
use clickpaste::keys::{Keysym, Modifier};
use clickpaste::state::DispatchState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct Log {
    prepared: usize,
    chords: Vec<(Instant, Chord)>,
    focused: Vec<TargetPoint>,
    held: Vec<Symbol>,
}

/// Backend that records everything it is asked to inject
struct FakeBackend {
    log: Arc<Mutex<Log>>,
    unicode: bool,
    fail_at: Option<usize>,
    panic_on_prepare: bool,
}

impl FakeBackend {
    fn new() -> (Self, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        (
            Self {
                log: log.clone(),
                unicode: false,
                fail_at: None,
                panic_on_prepare: false,
            },
            log,
        )
    }
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports_unicode(&self) -> bool {
        self.unicode
    }

    async fn prepare(&mut self) -> Result<(), BackendError> {
        self.log.lock().unwrap().prepared += 1;
        if self.panic_on_prepare {
            panic!("backend bug");
        }
        Ok(())
    }

    async fn focus(&mut self, target: &TargetPoint) -> Result<(), BackendError> {
        self.log.lock().unwrap().focused.push(target.clone());
        Ok(())
    }

    async fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError> {
        let mut log = self.log.lock().unwrap();
        match event.kind {
            KeyAction::Press => log.held.push(event.symbol),
            KeyAction::Release => log.held.retain(|s| *s != event.symbol),
        }
        Ok(())
    }

    async fn inject_chord(&mut self, chord: &Chord) -> Result<(), BackendError> {
        if self.fail_at == Some(self.log.lock().unwrap().chords.len()) {
            return Err(BackendError::Rejected("BadWindow (target window closed)".into()));
        }
        for event in chord.events() {
            self.inject(event).await?;
        }
        self.log
            .lock()
            .unwrap()
            .chords
            .push((Instant::now(), chord.clone()));
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Script {
    /// Click at once
    Click,
    /// Click seen on a raw input device, without coordinates
    DeviceClick,
    /// Press ESC at once
    Escape,
    /// Never produce an event
    Wait,
    /// Refuse the grab
    Refuse,
}

#[derive(Default)]
struct GrabCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

struct ScriptedGrabber {
    script: Script,
    counters: Arc<GrabCounters>,
}

struct ScriptedGrab {
    script: Script,
    fired: bool,
    counters: Arc<GrabCounters>,
}

impl Grab for ScriptedGrab {
    fn poll(&mut self) -> Result<Option<GrabEvent>, CaptureError> {
        if std::mem::replace(&mut self.fired, true) {
            return Ok(None);
        }
        Ok(match self.script {
            Script::Click => Some(GrabEvent::Click(TargetPoint::at(
                320,
                240,
                Some(WindowHandle(0x3a00007)),
            ))),
            Script::DeviceClick => Some(GrabEvent::Click(TargetPoint::unlocated())),
            Script::Escape => Some(GrabEvent::Escape),
            Script::Wait | Script::Refuse => None,
        })
    }
}

impl Drop for ScriptedGrab {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl Grabber for ScriptedGrabber {
    fn grab(&self) -> Result<Box<dyn Grab>, CaptureError> {
        if let Script::Refuse = self.script {
            return Err(CaptureError::GrabRefused {
                device: "pointer",
                reason: "AlreadyGrabbed".into(),
            });
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedGrab {
            script: self.script,
            fired: false,
            counters: self.counters.clone(),
        }))
    }
}

fn capture(script: Script) -> (CaptureController, Arc<GrabCounters>) {
    let counters = Arc::new(GrabCounters::default());
    let grabber = ScriptedGrabber {
        script,
        counters: counters.clone(),
    };
    (CaptureController::new(Arc::new(grabber)), counters)
}

fn options(delay_ms: u64, threshold: usize) -> PasteOptions {
    PasteOptions {
        delay: Duration::from_millis(delay_ms),
        confirm_threshold: threshold,
        click_target: true,
        focus_settle: Duration::ZERO,
    }
}

fn assert_released_once(counters: &GrabCounters) {
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

/// Receive events until one matches
async fn next_matching<F>(rx: &mut UnboundedReceiver<DispatchEvent>, f: F) -> DispatchEvent
where
    F: Fn(&DispatchEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("event channel closed");
        if f(&event) {
            return event;
        }
    }
}

// ============================================================================
// Typing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn types_mixed_case_with_newline_at_configured_pace() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 100));

    let outcome = dispatcher.start_paste("abc\nXYZ".into()).unwrap().wait().await;

    match outcome {
        PasteOutcome::Completed { sent, total, lossy } => {
            assert_eq!((sent, total), (7, 7));
            assert!(lossy.is_none());
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let log = log.lock().unwrap();
    assert_eq!(log.chords.len(), 7);
    assert_eq!(log.focused.len(), 1);
    assert_eq!((log.focused[0].x, log.focused[0].y), (320, 240));
    assert!(log.held.is_empty(), "keys left pressed: {:?}", log.held);

    for (_, chord) in &log.chords[..3] {
        assert!(chord.modifiers().is_empty());
    }
    assert_eq!(log.chords[3].1.symbol(), Symbol::Key(Keysym::RETURN));
    for (_, chord) in &log.chords[4..] {
        assert!(chord.modifiers().contains(Modifier::Shift));
    }

    for pair in log.chords.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(10));
    }

    assert_released_once(&counters);
    assert_eq!(dispatcher.state(), DispatchState::Idle);
}

#[tokio::test(start_paused = true)]
async fn device_click_types_without_clicking_again() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::DeviceClick);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 100));

    let outcome = dispatcher.start_paste("hello".into()).unwrap().wait().await;

    assert!(outcome.is_completed());
    let log = log.lock().unwrap();
    assert!(log.focused.is_empty(), "focus click replayed at {:?}", log.focused);
    assert_eq!(log.chords.len(), 5);
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn unicode_without_backend_support_is_reported_lossy() {
    let (backend, log) = FakeBackend::new();
    let (capture, _) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 100));

    let outcome = dispatcher.start_paste("ok 😀".into()).unwrap().wait().await;

    match outcome {
        PasteOutcome::Completed { sent, total, lossy } => {
            assert_eq!((sent, total), (3, 3));
            assert_eq!(lossy.unwrap().codepoints, vec!['😀']);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(log.lock().unwrap().chords.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn unicode_backend_types_every_code_point() {
    let (mut backend, log) = FakeBackend::new();
    backend.unicode = true;
    let (capture, _) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(0, 100));

    let outcome = dispatcher.start_paste("é😀".into()).unwrap().wait().await;

    assert!(matches!(
        outcome,
        PasteOutcome::Completed {
            sent: 2,
            total: 2,
            lossy: None
        }
    ));
    let log = log.lock().unwrap();
    assert_eq!(log.chords[1].1.symbol(), Symbol::Unicode('😀'));
}

// ============================================================================
// Confirmation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn declined_confirmation_types_nothing() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(10, 200));

    let handle = dispatcher.start_paste("a".repeat(500)).unwrap();

    let event = next_matching(&mut events, |e| {
        matches!(e, DispatchEvent::ConfirmationRequired { .. })
    })
    .await;
    assert!(matches!(event, DispatchEvent::ConfirmationRequired { chars: 500 }));
    assert_eq!(dispatcher.state(), DispatchState::Confirming { chars: 500 });

    assert!(dispatcher.confirm(false));
    let outcome = handle.wait().await;

    assert!(matches!(
        outcome,
        PasteOutcome::Cancelled {
            phase: Phase::Confirming,
            sent: 0,
            ..
        }
    ));
    let log = log.lock().unwrap();
    assert_eq!(log.prepared, 0);
    assert!(log.chords.is_empty());
    assert!(log.focused.is_empty());
    assert_released_once(&counters);
    assert!(dispatcher.state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn accepted_confirmation_types_everything() {
    let (backend, log) = FakeBackend::new();
    let (capture, _) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(0, 5));

    let handle = dispatcher.start_paste("confirmed".into()).unwrap();
    next_matching(&mut events, |e| {
        matches!(e, DispatchEvent::ConfirmationRequired { .. })
    })
    .await;
    assert!(dispatcher.confirm(true));

    assert!(handle.wait().await.is_completed());
    assert_eq!(log.lock().unwrap().chords.len(), 9);
}

#[tokio::test(start_paused = true)]
async fn text_at_threshold_needs_no_confirmation() {
    let (backend, _log) = FakeBackend::new();
    let (capture, _) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(0, 5));

    assert!(dispatcher.start_paste("12345".into()).unwrap().wait().await.is_completed());

    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, DispatchEvent::ConfirmationRequired { .. }));
    }
}

// ============================================================================
// Cancellation and failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancel_mid_typing_stops_at_chord_boundary() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    let handle = dispatcher.start_paste("Hello, World!".into()).unwrap();

    next_matching(&mut events, |e| {
        matches!(e, DispatchEvent::Progress { sent: 3, .. })
    })
    .await;
    assert!(dispatcher.cancel());

    match handle.wait().await {
        PasteOutcome::Cancelled { phase, sent, total } => {
            assert_eq!(phase, Phase::Typing);
            assert_eq!(sent, 3);
            assert_eq!(total, 13);
        }
        other => panic!("expected cancellation, got {:?}", other),
    }

    let log = log.lock().unwrap();
    assert_eq!(log.chords.len(), 3);
    assert!(log.held.is_empty(), "keys left pressed: {:?}", log.held);
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn escape_during_capture_cancels_before_typing() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Escape);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    let outcome = dispatcher.start_paste("secret".into()).unwrap().wait().await;

    assert!(matches!(
        outcome,
        PasteOutcome::Cancelled {
            phase: Phase::Capturing,
            sent: 0,
            total: 0
        }
    ));
    assert_eq!(log.lock().unwrap().prepared, 0);
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn refused_grab_fails_without_typing() {
    let (backend, log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Refuse);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    match dispatcher.start_paste("text".into()).unwrap().wait().await {
        PasteOutcome::Failed { error, sent } => {
            assert_eq!(sent, 0);
            assert!(matches!(*error, DispatchError::GrabFailed(_)));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(log.lock().unwrap().prepared, 0);
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 0);
    assert!(dispatcher.state().is_idle());
}

#[tokio::test(start_paused = true)]
async fn backend_error_mid_typing_reports_progress() {
    let (mut backend, log) = FakeBackend::new();
    backend.fail_at = Some(2);
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    match dispatcher.start_paste("abcdef".into()).unwrap().wait().await {
        PasteOutcome::Failed { error, sent } => {
            assert_eq!(sent, 2);
            assert!(matches!(*error, DispatchError::Backend(_)));
            assert!(error.to_string().contains("BadWindow"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(log.lock().unwrap().held.is_empty());
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn unreachable_ydotoold_fails_as_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let backend = YdotoolDaemonBackend::new(Some(dir.path().join("no-such-socket")));
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    match dispatcher.start_paste("hello".into()).unwrap().wait().await {
        PasteOutcome::Failed { error, sent } => {
            assert_eq!(sent, 0);
            assert!(matches!(
                *error,
                DispatchError::BackendUnavailable(BackendError::DaemonUnavailable(_))
            ));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn crashed_session_fails_as_internal_error() {
    let (mut backend, log) = FakeBackend::new();
    backend.panic_on_prepare = true;
    let (capture, counters) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    match dispatcher.start_paste("hello".into()).unwrap().wait().await {
        PasteOutcome::Failed { error, sent } => {
            assert_eq!(sent, 0);
            assert!(matches!(*error, DispatchError::Internal(_)));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let last = next_matching(&mut events, |e| matches!(e, DispatchEvent::Failed { .. })).await;
    match last {
        DispatchEvent::Failed { error, .. } => {
            assert!(matches!(*error, DispatchError::Internal(_)))
        }
        other => panic!("expected failure event, got {:?}", other),
    }
    assert!(log.lock().unwrap().chords.is_empty());
    assert_released_once(&counters);
    assert!(dispatcher.state().is_idle());
    assert!(dispatcher.start_paste("again".into()).is_ok());
}

// ============================================================================
// Single-session discipline
// ============================================================================

#[tokio::test(start_paused = true)]
async fn second_paste_is_busy_and_leaves_first_alone() {
    let (backend, _log) = FakeBackend::new();
    let (capture, counters) = capture(Script::Wait);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));

    let first = dispatcher.start_paste("first".into()).unwrap();
    assert!(matches!(
        dispatcher.start_paste("second".into()),
        Err(DispatchError::SessionBusy)
    ));
    assert_eq!(dispatcher.state(), DispatchState::Capturing);

    // Let the capture loop run a few polls
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dispatcher.state(), DispatchState::Capturing);

    first.cancel();
    assert!(matches!(
        first.wait().await,
        PasteOutcome::Cancelled {
            phase: Phase::Capturing,
            ..
        }
    ));
    assert_released_once(&counters);
}

#[tokio::test(start_paused = true)]
async fn slot_is_free_when_final_event_arrives() {
    let (backend, _log) = FakeBackend::new();
    let (capture, _) = capture(Script::Click);
    let (dispatcher, mut events) = Dispatcher::new(Box::new(backend), capture, options(0, 1000));

    let _first = dispatcher.start_paste("one".into()).unwrap();
    next_matching(&mut events, |e| matches!(e, DispatchEvent::Completed { .. })).await;

    assert!(dispatcher.state().is_idle());
    let second = dispatcher.start_paste("two".into()).expect("slot should be free");
    assert!(second.wait().await.is_completed());
}

#[tokio::test(start_paused = true)]
async fn state_walks_through_the_session() {
    let (backend, _log) = FakeBackend::new();
    let (capture, _) = capture(Script::Click);
    let (dispatcher, _events) = Dispatcher::new(Box::new(backend), capture, options(10, 1000));
    let mut state = dispatcher.subscribe_state();

    let handle = dispatcher.start_paste("ab".into()).unwrap();
    assert_eq!(*state.borrow_and_update(), DispatchState::Capturing);

    state.wait_for(|s| s.is_typing()).await.unwrap();
    state.wait_for(|s| s.is_idle()).await.unwrap();

    assert!(handle.wait().await.is_completed());
}
