//! ydotoold socket injection
//!
//! Talks to the ydotool daemon directly over its Unix datagram socket. Each
//! datagram is one raw `struct input_event`, which ydotoold writes to its
//! uinput device unchanged. This works on every compositor and on the
//! console because it happens below the display server.
//!
//! Requires:
//! - ydotoold running (systemctl --user start ydotool)
//! - Access to its socket
//!
//! uinput only knows physical key codes, so only US-layout keys can be
//! typed; Unicode injection is not available.

use super::Backend;
use crate::capture::TargetPoint;
use crate::encoder::{KeyAction, KeyEvent, Symbol};
use crate::error::BackendError;
use crate::keys::{self, Keysym};
use std::path::{Path, PathBuf};
use tokio::net::UnixDatagram;

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;
const SYN_REPORT: u16 = 0;
const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const BTN_LEFT: u16 = 0x110;

/// Default socket location, following ydotool's own lookup order
pub fn default_socket_path() -> PathBuf {
    if let Some(path) = std::env::var_os("YDOTOOL_SOCKET").filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|p| !p.is_empty()) {
        return PathBuf::from(dir).join(".ydotool_socket");
    }
    PathBuf::from("/tmp/.ydotool_socket")
}

/// Encode one `struct input_event` with a zero timestamp
///
/// ydotoold forwards the record to uinput, which fills in the time.
pub fn input_event_bytes(kind: u16, code: u16, value: i32) -> Vec<u8> {
    let mut buf = vec![0u8; std::mem::size_of::<libc::timeval>()];
    buf.extend_from_slice(&kind.to_ne_bytes());
    buf.extend_from_slice(&code.to_ne_bytes());
    buf.extend_from_slice(&value.to_ne_bytes());
    buf
}

/// ydotoold-backed injection
pub struct YdotoolDaemonBackend {
    path: PathBuf,
    socket: Option<UnixDatagram>,
}

impl YdotoolDaemonBackend {
    /// Create a backend for the socket at `path` (None resolves the default)
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(default_socket_path),
            socket: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<UnixDatagram, BackendError> {
        let unavailable = |e: std::io::Error| {
            tracing::debug!("ydotoold socket {:?}: {}", self.path, e);
            BackendError::DaemonUnavailable(self.path.clone())
        };
        let socket = UnixDatagram::unbound().map_err(unavailable)?;
        socket.connect(&self.path).map_err(unavailable)?;
        Ok(socket)
    }

    async fn send(&mut self, records: &[(u16, u16, i32)]) -> Result<(), BackendError> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| BackendError::Disconnected("ydotoold socket not open".into()))?;

        for &(kind, code, value) in records {
            let bytes = input_event_bytes(kind, code, value);
            if let Err(e) = socket.send(&bytes).await {
                tracing::warn!("ydotoold send failed, dropping socket: {}", e);
                self.socket = None;
                return Err(BackendError::Disconnected(e.to_string()));
            }
        }
        Ok(())
    }

    async fn key(&mut self, code: u16, value: i32) -> Result<(), BackendError> {
        self.send(&[(EV_KEY, code, value), (EV_SYN, SYN_REPORT, 0)])
            .await
    }
}

fn code_for(symbol: Symbol) -> Result<u16, BackendError> {
    let sym = match symbol {
        Symbol::Key(sym) => sym,
        Symbol::Modifier(m) => m.keysym(),
        Symbol::Unicode(c) => {
            return Err(BackendError::Rejected(format!(
                "ydotoold cannot type U+{:04X}",
                c as u32
            )))
        }
    };
    keys::evdev_code(sym).ok_or_else(|| no_code(sym))
}

fn no_code(sym: Keysym) -> BackendError {
    BackendError::Rejected(format!("no uinput key code for {}", sym))
}

#[async_trait::async_trait]
impl Backend for YdotoolDaemonBackend {
    fn name(&self) -> &'static str {
        "ydotoold"
    }

    fn supports_unicode(&self) -> bool {
        false
    }

    async fn prepare(&mut self) -> Result<(), BackendError> {
        if self.socket.is_none() {
            self.socket = Some(self.connect()?);
            tracing::debug!("Connected to ydotoold at {:?}", self.path);
        }
        Ok(())
    }

    async fn focus(&mut self, target: &TargetPoint) -> Result<(), BackendError> {
        // Relative motion only: slam into the top-left corner, then move out
        self.send(&[
            (EV_REL, REL_X, i32::MIN),
            (EV_REL, REL_Y, i32::MIN),
            (EV_SYN, SYN_REPORT, 0),
            (EV_REL, REL_X, target.x),
            (EV_REL, REL_Y, target.y),
            (EV_SYN, SYN_REPORT, 0),
        ])
        .await?;
        self.key(BTN_LEFT, 1).await?;
        self.key(BTN_LEFT, 0).await
    }

    async fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError> {
        let code = code_for(event.symbol)?;
        let value = match event.kind {
            KeyAction::Press => 1,
            KeyAction::Release => 0,
        };
        tracing::trace!("ydotoold key {} = {}", code, value);
        self.key(code, value).await
    }
}
