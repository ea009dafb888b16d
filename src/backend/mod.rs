//! Input injection backends
//!
//! Each backend turns atomic key events into real input on the target:
//!
//! - `native`: XTest requests on the X server (x11rb), supports Unicode via
//!   a temporarily remapped spare keycode
//! - `cli`: shells out to xdotool (X11) or wtype (Wayland) once per chord
//! - `daemon`: raw `input_event` records to ydotoold's datagram socket,
//!   works everywhere uinput does but cannot type arbitrary Unicode
//!
//! The backend is selected once from configuration and lives for the whole
//! process; the dispatcher locks it for the duration of a session.

pub mod cli;
pub mod xtest;
pub mod ydotoold;

use crate::capture::TargetPoint;
use crate::config::{BackendKind, Config};
use crate::encoder::{Chord, KeyAction, KeyEvent, Symbol};
use crate::error::BackendError;
use crate::keys::Modifiers;

/// Trait for input injection implementations
#[async_trait::async_trait]
pub trait Backend: Send {
    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Whether `Symbol::Unicode` events can be injected
    fn supports_unicode(&self) -> bool;

    /// Connect or probe the underlying mechanism
    ///
    /// Called at the start of every typing phase. Failing here means nothing
    /// was typed.
    async fn prepare(&mut self) -> Result<(), BackendError>;

    /// Click the target so it has keyboard focus
    async fn focus(&mut self, target: &TargetPoint) -> Result<(), BackendError>;

    /// Deliver one key event
    async fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError>;

    /// Deliver a whole chord back to back
    ///
    /// If an event fails, whatever the chord already pressed is released in
    /// reverse before the error is returned.
    async fn inject_chord(&mut self, chord: &Chord) -> Result<(), BackendError> {
        let mut pressed: Vec<Symbol> = Vec::new();
        for event in chord.events() {
            if let Err(e) = self.inject(event).await {
                while let Some(symbol) = pressed.pop() {
                    let release = KeyEvent {
                        kind: KeyAction::Release,
                        symbol,
                        modifiers: held_modifiers(&pressed),
                    };
                    if let Err(release_err) = self.inject(&release).await {
                        tracing::debug!("Failed to release {:?}: {}", symbol, release_err);
                    }
                }
                return Err(e);
            }
            match event.kind {
                KeyAction::Press => pressed.push(event.symbol),
                KeyAction::Release => pressed.retain(|s| *s != event.symbol),
            }
        }
        Ok(())
    }
}

/// Modifiers among the still-pressed symbols
fn held_modifiers(pressed: &[Symbol]) -> Modifiers {
    pressed
        .iter()
        .filter_map(|s| match s {
            Symbol::Modifier(m) => Some(*m),
            _ => None,
        })
        .collect()
}

/// Build the backend selected in the configuration
pub fn create_backend(config: &Config) -> Box<dyn Backend> {
    match config.paste.backend {
        BackendKind::Native => Box::new(xtest::XTestBackend::new(None)),
        BackendKind::Cli => Box::new(cli::CliBackend::new(config.cli.tool)),
        BackendKind::Daemon => Box::new(ydotoold::YdotoolDaemonBackend::new(
            config.resolve_daemon_socket(),
        )),
    }
}
