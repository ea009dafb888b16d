//! Hotkey detection module
//!
//! Provides kernel-level key event detection using evdev. This works on
//! X11 and on every Wayland compositor because it operates at the Linux
//! input subsystem level, and it keeps working while the capture grab
//! holds the X keyboard.
//!
//! Requires the user to be in the 'input' group. Users who prefer
//! compositor keybindings leave it disabled and bind `clickpaste trigger`.

pub mod evdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Events emitted by the hotkey listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The paste chord was pressed
    Pressed,
    /// The cancel key was pressed (abort a running paste)
    Cancel,
}

/// Trait for hotkey detection implementations
#[async_trait::async_trait]
pub trait HotkeyListener: Send + Sync {
    /// Start listening for hotkey events
    /// Returns a channel receiver for events
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Factory function to create the hotkey listener
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(evdev_listener::EvdevListener::new(config)?))
}
