//! State machine for the paste workflow
//!
//! Idle → Capturing → (Confirming) → Typing → Idle
//!
//! Cancel from any non-idle state returns to Idle.

/// Dispatcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    /// No paste in progress
    #[default]
    Idle,

    /// Crosshair shown, waiting for the user to click a target
    Capturing,

    /// Target chosen, text is long enough to need an explicit go-ahead
    Confirming {
        /// Number of characters that would be typed
        chars: usize,
    },

    /// Keystrokes are being delivered
    Typing {
        /// Chords delivered so far
        sent: usize,
        /// Chords in this paste
        total: usize,
    },
}

impl DispatchState {
    /// Create a new idle state
    pub fn new() -> Self {
        DispatchState::Idle
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, DispatchState::Idle)
    }

    pub fn is_typing(&self) -> bool {
        matches!(self, DispatchState::Typing { .. })
    }

    /// Short machine-readable name, written to the state file
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Idle => "idle",
            DispatchState::Capturing => "capturing",
            DispatchState::Confirming { .. } => "confirming",
            DispatchState::Typing { .. } => "typing",
        }
    }

    /// Typing progress as (sent, total)
    pub fn progress(&self) -> Option<(usize, usize)> {
        match self {
            DispatchState::Typing { sent, total } => Some((*sent, *total)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchState::Idle => write!(f, "Idle"),
            DispatchState::Capturing => write!(f, "Capturing (click a window, ESC to cancel)"),
            DispatchState::Confirming { chars } => {
                write!(f, "Confirming ({} characters)", chars)
            }
            DispatchState::Typing { sent, total } => write!(f, "Typing ({}/{})", sent, total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = DispatchState::new();
        assert!(state.is_idle());
        assert_eq!(state, DispatchState::default());
    }

    #[test]
    fn test_typing_progress() {
        let state = DispatchState::Typing { sent: 3, total: 7 };
        assert!(state.is_typing());
        assert!(!state.is_idle());
        assert_eq!(state.progress(), Some((3, 7)));
        assert_eq!(DispatchState::Capturing.progress(), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(format!("{}", DispatchState::Idle), "Idle");
        assert_eq!(
            format!("{}", DispatchState::Typing { sent: 3, total: 7 }),
            "Typing (3/7)"
        );
        assert!(format!("{}", DispatchState::Confirming { chars: 500 }).contains("500"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(DispatchState::Capturing.as_str(), "capturing");
        assert_eq!(DispatchState::Confirming { chars: 1 }.as_str(), "confirming");
        assert_eq!(DispatchState::Typing { sent: 0, total: 1 }.as_str(), "typing");
    }
}
