//! Interactive target capture
//!
//! Grabs pointer and keyboard with a crosshair cursor and waits for the
//! user to click the window that should receive the text. ESC or the
//! session's cancel token ends the capture without a target.
//!
//! Without a reachable X display, capture falls back to listening on the
//! raw input devices. That mode knows no coordinates; the user's click
//! focuses the target on its own.
//!
//! The grab is a guard object: dropping it releases pointer and keyboard,
//! so every exit path (click, cancel, error) releases exactly once.

pub mod input;
pub mod x11;

use crate::error::CaptureError;
use crate::pacer::CancelToken;
use std::sync::Arc;
use std::time::Duration;

/// An X window id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u32);

/// Where the user clicked, in root-window coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPoint {
    pub x: i32,
    pub y: i32,
    /// Child window under the pointer, if any
    pub window: Option<WindowHandle>,
    /// Whether `x` and `y` are real; a click seen on a raw input device
    /// has already focused the target and cannot be replayed
    pub located: bool,
}

impl TargetPoint {
    pub fn at(x: i32, y: i32, window: Option<WindowHandle>) -> Self {
        Self {
            x,
            y,
            window,
            located: true,
        }
    }

    /// A target known only to have been clicked
    pub fn unlocated() -> Self {
        Self {
            x: 0,
            y: 0,
            window: None,
            located: false,
        }
    }
}

/// Input seen while the grab is held
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabEvent {
    /// Left click
    Click(TargetPoint),
    /// ESC pressed
    Escape,
}

/// A held pointer + keyboard grab, released on drop
pub trait Grab: Send {
    /// Next pending grab event, without blocking
    fn poll(&mut self) -> Result<Option<GrabEvent>, CaptureError>;
}

/// Source of grabs
pub trait Grabber: Send + Sync {
    fn grab(&self) -> Result<Box<dyn Grab>, CaptureError>;
}

/// Uses `fallback` when `primary` cannot reach its display
pub struct FallbackGrabber {
    primary: Arc<dyn Grabber>,
    fallback: Arc<dyn Grabber>,
}

impl FallbackGrabber {
    pub fn new(primary: Arc<dyn Grabber>, fallback: Arc<dyn Grabber>) -> Self {
        Self { primary, fallback }
    }
}

impl Grabber for FallbackGrabber {
    fn grab(&self) -> Result<Box<dyn Grab>, CaptureError> {
        match self.primary.grab() {
            Err(CaptureError::Display(reason)) => {
                tracing::warn!(
                    "No X display ({}), capturing from input devices. No crosshair, and your click focuses the target.",
                    reason.lines().next().unwrap_or_default()
                );
                self.fallback.grab()
            }
            other => other,
        }
    }
}

/// How a capture ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Target(TargetPoint),
    Cancelled,
}

/// Runs the click-to-choose-target protocol
#[derive(Clone)]
pub struct CaptureController {
    grabber: Arc<dyn Grabber>,
    poll_interval: Duration,
}

impl CaptureController {
    pub fn new(grabber: Arc<dyn Grabber>) -> Self {
        Self {
            grabber,
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Controller using the X server named by `$DISPLAY`, or the raw input
    /// devices when no X server is reachable
    pub fn desktop() -> Self {
        Self::new(Arc::new(FallbackGrabber::new(
            Arc::new(x11::X11Grabber::new(None)),
            Arc::new(input::EvdevGrabber::new()),
        )))
    }

    /// Wait for a click, ESC, or cancellation
    pub async fn begin_capture(&self, cancel: &CancelToken) -> Result<CaptureOutcome, CaptureError> {
        if cancel.is_cancelled() {
            return Ok(CaptureOutcome::Cancelled);
        }

        let mut grab = self.grabber.grab()?;
        tracing::debug!("Capture grab acquired, waiting for click");

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Capture cancelled");
                return Ok(CaptureOutcome::Cancelled);
            }

            match grab.poll()? {
                Some(GrabEvent::Click(target)) => {
                    tracing::debug!(
                        "Target captured at ({}, {}) window {:?}",
                        target.x,
                        target.y,
                        target.window
                    );
                    return Ok(CaptureOutcome::Target(target));
                }
                Some(GrabEvent::Escape) => {
                    tracing::debug!("Capture cancelled with ESC");
                    return Ok(CaptureOutcome::Cancelled);
                }
                None => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {
                    tracing::debug!("Capture cancelled");
                    return Ok(CaptureOutcome::Cancelled);
                }
            }
        }
    }
}
