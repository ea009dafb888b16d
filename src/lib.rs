//! ClickPaste: click a window, type your clipboard into it
//!
//! This library provides the core functionality for:
//! - Capturing a target window with a one-shot pointer/keyboard grab (X11),
//!   or from the raw input devices when no X display is reachable
//! - Encoding text into US-layout key chords, with Unicode fallback
//! - Pacing keystrokes with a configurable delay and prompt cancellation
//! - Injecting keystrokes via XTest, xdotool/wtype, or ydotoold
//! - Running as a daemon driven by an evdev hotkey or Unix signals
//!
//! # Architecture
//!
//! ```text
//!                  ┌─────────────────────────────────────┐
//!                  │               Daemon                │
//!                  │  hotkey · SIGUSR1/2 · state file    │
//!                  └─────────────────────────────────────┘
//!                                    │ clipboard text
//!                                    ▼
//!                  ┌─────────────────────────────────────┐
//!                  │             Dispatcher              │
//!                  │   one session at a time, events,    │
//!                  │        state watch channel          │
//!                  └─────────────────────────────────────┘
//!                                    │
//!        ┌───────────────────┬───────┴──────────┬───────────────────┐
//!        ▼                   ▼                  ▼                   ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Capture    │   │   Confirm    │   │   Encoder    │   │    Pacer     │
//! │ X11 / evdev  │   │  (zenity)    │   │ text→chords  │   │ delay/cancel │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!                                                                  │
//!                                                                  ▼
//!                                                         ┌──────────────┐
//!                                                         │   Backend    │
//!                                                         │ xtest/cli/   │
//!                                                         │  ydotoold    │
//!                                                         └──────────────┘
//! ```

pub mod backend;
pub mod capture;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod confirm;
pub mod control;
pub mod daemon;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod hotkey;
pub mod keys;
pub mod notification;
pub mod pacer;
pub mod state;
pub mod status;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use daemon::Daemon;
pub use dispatch::{DispatchEvent, Dispatcher, PasteOptions, PasteOutcome};
pub use error::{ClickPasteError, Result};
pub use state::DispatchState;
