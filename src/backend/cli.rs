//! External CLI injection (xdotool, wtype)
//!
//! Spawns the tool once per chord. Typed characters are passed as a single
//! keysym tap; hand-built chords pass their key events as arguments, so
//! modifiers are always released by the same process that pressed them.
//!
//! Requires:
//! - xdotool (X11/XWayland) or wtype (Wayland, virtual-keyboard protocol)

use super::Backend;
use crate::capture::TargetPoint;
use crate::config::CliTool;
use crate::encoder::{Chord, KeyAction, KeyEvent, Symbol};
use crate::error::BackendError;
use crate::keys::Keysym;
use std::process::Stdio;
use tokio::process::Command;

/// CLI-tool-driven injection
pub struct CliBackend {
    tool: CliTool,
}

impl CliBackend {
    pub fn new(tool: CliTool) -> Self {
        Self { tool }
    }

    async fn run(&self, args: &[String]) -> Result<(), BackendError> {
        let program = self.tool.program();
        tracing::trace!("{} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::ToolNotFound(program)
                } else {
                    BackendError::Rejected(format!("{} failed to start: {}", program, e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Rejected(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Key name for the tool's command line
fn key_name(symbol: Symbol) -> String {
    match symbol {
        Symbol::Key(sym) => sym.name(),
        Symbol::Modifier(m) => m.keysym().name(),
        Symbol::Unicode(c) => Keysym::from_char(c).name(),
    }
}

/// Arguments delivering `events` in order
pub fn event_args(tool: CliTool, events: &[KeyEvent]) -> Vec<String> {
    let mut args = Vec::with_capacity(events.len() * 2);
    for event in events {
        let flag = match (tool, event.kind, event.symbol) {
            (CliTool::Xdotool, KeyAction::Press, _) => "keydown",
            (CliTool::Xdotool, KeyAction::Release, _) => "keyup",
            (CliTool::Wtype, KeyAction::Press, Symbol::Modifier(_)) => "-M",
            (CliTool::Wtype, KeyAction::Release, Symbol::Modifier(_)) => "-m",
            (CliTool::Wtype, KeyAction::Press, _) => "-P",
            (CliTool::Wtype, KeyAction::Release, _) => "-p",
        };
        let name = match (tool, event.symbol) {
            (CliTool::Wtype, Symbol::Modifier(m)) => m.wtype_name().to_string(),
            (_, symbol) => key_name(symbol),
        };
        args.push(flag.to_string());
        args.push(name);
    }
    args
}

/// Arguments delivering a whole chord
///
/// An encoded chord is sent as one tap of the keysym it produces. Both tools
/// then pick the key and shift level from the active layout themselves:
/// wtype uploads a keymap with one level per key, so replaying Shift plus
/// the US base key would type the unshifted character. Hand-built chords
/// without a produced keysym replay their events one by one.
pub fn chord_args(tool: CliTool, chord: &Chord) -> Vec<String> {
    let tap = match tool {
        CliTool::Xdotool => "key",
        CliTool::Wtype => "-k",
    };
    if let Some(sym) = chord.produced() {
        return vec![tap.to_string(), sym.name()];
    }
    if chord.modifiers().is_empty() {
        return vec![tap.to_string(), key_name(chord.symbol())];
    }
    event_args(tool, chord.events())
}

#[async_trait::async_trait]
impl Backend for CliBackend {
    fn name(&self) -> &'static str {
        self.tool.program()
    }

    fn supports_unicode(&self) -> bool {
        true
    }

    async fn prepare(&mut self) -> Result<(), BackendError> {
        let program = self.tool.program();
        which::which(program).map_err(|_| BackendError::ToolNotFound(program))?;
        Ok(())
    }

    async fn focus(&mut self, target: &TargetPoint) -> Result<(), BackendError> {
        match self.tool {
            CliTool::Xdotool => {
                let args = [
                    "mousemove".to_string(),
                    target.x.to_string(),
                    target.y.to_string(),
                    "click".to_string(),
                    "1".to_string(),
                ];
                self.run(&args).await
            }
            CliTool::Wtype => {
                tracing::debug!("wtype cannot click by coordinates, skipping focus");
                Ok(())
            }
        }
    }

    async fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError> {
        let args = event_args(self.tool, std::slice::from_ref(event));
        self.run(&args).await
    }

    async fn inject_chord(&mut self, chord: &Chord) -> Result<(), BackendError> {
        let args = chord_args(self.tool, chord);
        self.run(&args).await
    }
}
