//! Daemon module - main event loop orchestration
//!
//! Coordinates the hotkey listener, control signals, the clipboard, and the
//! paste dispatcher.

use crate::backend;
use crate::capture::CaptureController;
use crate::clipboard;
use crate::config::Config;
use crate::confirm;
use crate::dispatch::{DispatchEvent, Dispatcher, PasteOutcome, Phase};
use crate::error::{ClickPasteError, DispatchError, Result};
use crate::hotkey::{self, HotkeyEvent};
use crate::notification::{self, Urgency};
use crate::state::DispatchState;
use pidlock::Pidlock;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

/// How long shutdown waits for a cancelled paste to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Write state to file for external integrations (e.g., Waybar)
fn write_state_file(path: &PathBuf, state: &str) {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Write PID file for `clickpaste trigger` and `clickpaste cancel`
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::pid_file();

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Remove PID file on shutdown
fn cleanup_pid_file(path: &PathBuf) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Whether an outcome deserves a desktop notification
///
/// ESC during capture is the user changing their mind and stays quiet.
fn should_notify(outcome: &PasteOutcome) -> bool {
    !matches!(
        outcome,
        PasteOutcome::Cancelled {
            phase: Phase::Capturing,
            ..
        }
    )
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            state_file_path,
            pid_file_path: None,
        }
    }

    /// Update the state file if configured
    fn update_state(&self, state_name: &str) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, state_name);
        }
    }

    fn notify(&self, title: &str, body: &str, urgency: Urgency) {
        if !self.config.notification.enabled {
            return;
        }
        let (title, body) = (title.to_string(), body.to_string());
        tokio::spawn(async move { notification::send(&title, &body, urgency).await });
    }

    /// Read the clipboard and hand it to the dispatcher
    async fn start_paste(&self, dispatcher: &Dispatcher) {
        if !dispatcher.state().is_idle() {
            tracing::debug!("Trigger ignored, paste already in progress ({})", dispatcher.state());
            return;
        }

        let result = match clipboard::read_clipboard_text().await {
            Ok(text) => dispatcher.start_paste(text).map(|_| ()),
            Err(e) => Err(DispatchError::from(e)),
        };

        match result {
            Ok(()) => {}
            // Two triggers racing; the first one wins
            Err(DispatchError::SessionBusy) => tracing::debug!("Trigger ignored, session busy"),
            Err(e) => {
                tracing::warn!("Cannot start paste: {}", e);
                self.notify("Paste not started", &e.to_string(), Urgency::Normal);
            }
        }
    }

    fn handle_event(&self, dispatcher: &Dispatcher, event: DispatchEvent) {
        match event {
            DispatchEvent::Started => {
                tracing::info!("Click the target window (ESC to cancel)");
            }
            DispatchEvent::ConfirmationRequired { chars } => {
                let dispatcher = dispatcher.clone();
                let closed = dispatcher.confirmation_closed();
                tokio::spawn(async move {
                    if let Some(accept) = confirm::ask(chars, closed).await {
                        tracing::debug!("Confirmation answered: {}", accept);
                        dispatcher.confirm(accept);
                    }
                });
            }
            DispatchEvent::Progress { sent, total } => {
                tracing::trace!("Typed {}/{}", sent, total);
            }
            DispatchEvent::Completed { sent, total, lossy } => {
                self.report(PasteOutcome::Completed { sent, total, lossy });
            }
            DispatchEvent::Cancelled { phase, sent, total } => {
                self.report(PasteOutcome::Cancelled { phase, sent, total });
            }
            DispatchEvent::Failed { error, sent } => {
                self.report(PasteOutcome::Failed { error, sent });
            }
        }
    }

    fn report(&self, outcome: PasteOutcome) {
        if should_notify(&outcome) {
            let (title, body, urgency) = notification::describe_outcome(&outcome);
            self.notify(&title, &body, urgency);
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting clickpaste daemon");

        // Single instance check
        let lock_path = Config::runtime_dir().join("daemon.lock");
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lock_path_str = lock_path.to_string_lossy().to_string();
        let mut pidlock = Pidlock::new(&lock_path_str);
        if pidlock.acquire().is_err() {
            return Err(ClickPasteError::Config(format!(
                "Another clickpaste daemon is already running (lock: {})",
                lock_path.display()
            )));
        }

        // Write PID file for external control via signals
        self.pid_file_path = write_pid_file();

        // Set up signal handlers for external control
        let mut sigusr1 = signal(SignalKind::user_defined1())
            .map_err(|e| ClickPasteError::Config(format!("Failed to set up SIGUSR1 handler: {}", e)))?;
        let mut sigusr2 = signal(SignalKind::user_defined2())
            .map_err(|e| ClickPasteError::Config(format!("Failed to set up SIGUSR2 handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| ClickPasteError::Config(format!("Failed to set up SIGTERM handler: {}", e)))?;

        let options = self.config.paste_options()?;
        tracing::info!(
            "Backend: {}, delay: {:?}, confirm above {} characters",
            self.config.paste.backend,
            options.delay,
            options.confirm_threshold
        );

        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        let (dispatcher, mut events) = Dispatcher::new(
            backend::create_backend(&self.config),
            CaptureController::desktop(),
            options,
        );

        // Probe the backend up front so setup problems show at startup
        match dispatcher.check_backend().await {
            Ok(name) => tracing::info!("Injection backend ready: {}", name),
            Err(e) => {
                tracing::warn!("{}", e);
                self.notify("ClickPaste backend unavailable", &e.to_string(), Urgency::Critical);
            }
        }

        // Initialize hotkey listener (if enabled)
        let mut hotkey_listener = if self.config.hotkey.enabled {
            Some(hotkey::create_listener(&self.config.hotkey)?)
        } else {
            tracing::info!("Built-in hotkey disabled, use 'clickpaste trigger' or compositor keybindings");
            None
        };

        let mut hotkey_rx = if let Some(ref mut listener) = hotkey_listener {
            Some(listener.start().await?)
        } else {
            None
        };

        if self.config.hotkey.enabled {
            tracing::info!(
                "Listening for hotkey: {}+{} (cancel: {})",
                self.config.hotkey.modifiers.join("+"),
                self.config.hotkey.key,
                if self.config.hotkey.cancel_key.is_empty() {
                    "none"
                } else {
                    self.config.hotkey.cancel_key.as_str()
                }
            );
        }

        let mut state_rx = dispatcher.subscribe_state();
        let mut last_state = DispatchState::Idle.as_str();
        self.update_state(last_state);

        // Main event loop
        loop {
            tokio::select! {
                // Handle hotkey events (only if hotkey listener is enabled)
                Some(hotkey_event) = async {
                    match &mut hotkey_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match hotkey_event {
                        HotkeyEvent::Pressed => {
                            tracing::debug!("Hotkey pressed");
                            self.start_paste(&dispatcher).await;
                        }
                        HotkeyEvent::Cancel => {
                            if dispatcher.cancel() {
                                tracing::info!("Paste cancelled via cancel key");
                            }
                        }
                    }
                }

                // SIGUSR1 from `clickpaste trigger`
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1 (trigger)");
                    self.start_paste(&dispatcher).await;
                }

                // SIGUSR2 from `clickpaste cancel`
                _ = sigusr2.recv() => {
                    tracing::debug!("Received SIGUSR2 (cancel)");
                    if !dispatcher.cancel() {
                        tracing::debug!("Nothing to cancel");
                    }
                }

                Some(event) = events.recv() => {
                    self.handle_event(&dispatcher, event);
                }

                Ok(()) = state_rx.changed() => {
                    let name = state_rx.borrow_and_update().as_str();
                    if name != last_state {
                        self.update_state(name);
                        last_state = name;
                    }
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Stop a paste in flight and give it a moment to release grabs
        if dispatcher.cancel() {
            let idle = state_rx.wait_for(|s| s.is_idle());
            if tokio::time::timeout(SHUTDOWN_GRACE, idle).await.is_err() {
                tracing::warn!("Paste did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }

        // Cleanup
        if let Some(mut listener) = hotkey_listener {
            listener.stop().await?;
        }

        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }

        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }

        if let Err(e) = pidlock.release() {
            tracing::debug!("Failed to release daemon lock: {:?}", e);
        }

        tracing::info!("Daemon stopped");

        Ok(())
    }
}
