//! XTest injection through x11rb
//!
//! Fakes key and button events directly on the X server. Works on X11 and on
//! XWayland for X clients (VNC viewers, remote consoles).
//!
//! Chords are resolved by the character they produce against the server's
//! keyboard mapping, so the key and Shift level come from the live layout
//! rather than the US table. A keysym the layout has no key for is bound to
//! a spare keycode for the duration of one chord, then unbound again.

use super::Backend;
use crate::capture::TargetPoint;
use crate::encoder::{Chord, KeyAction, KeyEvent, Symbol};
use crate::error::BackendError;
use crate::keys::{Keysym, Modifier};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::{self, ConnectionExt as _, Keycode, Window};
use x11rb::protocol::xtest::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

/// XTest-based injection
pub struct XTestBackend {
    display: Option<String>,
    session: Option<XSession>,
}

impl XTestBackend {
    /// Create a backend for `display` (None uses `$DISPLAY`)
    pub fn new(display: Option<String>) -> Self {
        Self {
            display,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut XSession, BackendError> {
        self.session
            .as_mut()
            .ok_or_else(|| BackendError::Disconnected("X connection not prepared".into()))
    }

    /// Drop the connection after a transport failure so the next session
    /// reconnects
    fn check<T>(&mut self, result: Result<T, BackendError>) -> Result<T, BackendError> {
        if let Err(BackendError::Disconnected(_)) = &result {
            self.session = None;
        }
        result
    }
}

#[async_trait::async_trait]
impl Backend for XTestBackend {
    fn name(&self) -> &'static str {
        "xtest"
    }

    fn supports_unicode(&self) -> bool {
        true
    }

    async fn prepare(&mut self) -> Result<(), BackendError> {
        match self.session.as_mut() {
            // The layout may have changed since the last paste
            Some(session) => {
                let result = session.refresh_mapping();
                self.check(result)
            }
            None => {
                let session = XSession::connect(self.display.as_deref())?;
                tracing::debug!(
                    "XTest ready (keycodes {}..={}, spare {:?})",
                    session.min_keycode(),
                    session.max_keycode(),
                    session.map.spare
                );
                self.session = Some(session);
                Ok(())
            }
        }
    }

    async fn focus(&mut self, target: &TargetPoint) -> Result<(), BackendError> {
        let result = self.session()?.click_at(target.x, target.y);
        self.check(result)
    }

    async fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError> {
        let result = self.session()?.inject(event);
        self.check(result)
    }

    async fn inject_chord(&mut self, chord: &Chord) -> Result<(), BackendError> {
        let result = self.session()?.type_chord(chord);
        self.check(result)
    }
}

/// First-group view of the server's keyboard mapping
#[derive(Debug, Clone)]
struct KeyMap {
    min_keycode: Keycode,
    per: usize,
    keysyms: Vec<u32>,
    /// Keycode with no symbols, used for temporary bindings
    spare: Option<Keycode>,
}

/// Where a keysym sits on the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyLocation {
    keycode: Keycode,
    /// Reached at the Shift level rather than the base level
    shifted: bool,
}

/// Keys to hold for one chord, outermost first
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolved {
    keys: Vec<Keycode>,
    /// Keysym with no key on the layout; bound to the spare keycode and
    /// pressed innermost
    spare: Option<Keysym>,
}

impl KeyMap {
    fn new(min_keycode: Keycode, per: usize, keysyms: Vec<u32>) -> Self {
        let per = per.max(1);
        // Highest keycode without any symbol; keycodes near the top of the
        // range are the least likely to be touched by the user
        let spare = keysyms
            .chunks(per)
            .enumerate()
            .rev()
            .find(|(_, syms)| syms.iter().all(|s| *s == 0))
            .map(|(i, _)| min_keycode + i as u8);
        Self {
            min_keycode,
            per,
            keysyms,
            spare,
        }
    }

    /// Key producing `sym`, preferring the base level
    fn find(&self, sym: Keysym) -> Option<KeyLocation> {
        let rows = || self.keysyms.chunks(self.per);
        let keycode = |i: usize| self.min_keycode + i as u8;

        if let Some(i) = rows().position(|syms| syms.first() == Some(&sym.0)) {
            return Some(KeyLocation {
                keycode: keycode(i),
                shifted: false,
            });
        }
        rows()
            .position(|syms| shift_level(syms) == Some(sym.0))
            .map(|i| KeyLocation {
                keycode: keycode(i),
                shifted: true,
            })
    }

    fn modifier_keycode(&self, m: Modifier) -> Result<Keycode, BackendError> {
        self.find(m.keysym())
            .filter(|loc| !loc.shifted)
            .map(|loc| loc.keycode)
            .ok_or_else(|| BackendError::Rejected(format!("no keycode for {}", m.keysym())))
    }

    /// Keys that type `chord` on this layout
    ///
    /// An encoded chord is resolved by the character it produces, which may
    /// sit on a different key or level than on a US keyboard. Hand-built
    /// chords keep their own modifiers and only use base-level keys.
    fn resolve(&self, chord: &Chord) -> Result<Resolved, BackendError> {
        let (target, modifiers, location) = match chord.produced() {
            Some(sym) => (
                sym,
                chord.modifiers().without(Modifier::Shift),
                self.find(sym),
            ),
            None => {
                let sym = symbol_keysym(chord.symbol());
                let location = match chord.symbol() {
                    Symbol::Unicode(_) => None,
                    _ => self.find(sym).filter(|loc| !loc.shifted),
                };
                (sym, chord.modifiers(), location)
            }
        };

        let mut keys = modifiers
            .iter()
            .map(|m| self.modifier_keycode(m))
            .collect::<Result<Vec<_>, _>>()?;

        match location {
            Some(loc) => {
                if loc.shifted {
                    keys.push(self.modifier_keycode(Modifier::Shift)?);
                }
                keys.push(loc.keycode);
                Ok(Resolved { keys, spare: None })
            }
            None => Ok(Resolved {
                keys,
                spare: Some(target),
            }),
        }
    }
}

/// Keysym at the Shift level of a first-group row
///
/// A missing second entry repeats the first, except that a lowercase
/// letter implies its uppercase form.
fn shift_level(syms: &[u32]) -> Option<u32> {
    let base = *syms.first()?;
    match syms.get(1) {
        Some(&shifted) if shifted != 0 => Some(shifted),
        _ if base == 0 => None,
        _ if (0x61..=0x7a).contains(&base) => Some(base - 0x20),
        _ => Some(base),
    }
}

fn symbol_keysym(symbol: Symbol) -> Keysym {
    match symbol {
        Symbol::Key(sym) => sym,
        Symbol::Modifier(m) => m.keysym(),
        Symbol::Unicode(c) => Keysym::from_char(c),
    }
}

struct XSession {
    conn: RustConnection,
    root: Window,
    map: KeyMap,
    /// Keysym currently bound to the spare keycode
    bound: Option<Keysym>,
}

impl XSession {
    fn connect(display: Option<&str>) -> Result<Self, BackendError> {
        let (conn, screen_num) =
            x11rb::connect(display).map_err(|e| BackendError::DisplayUnavailable(e.to_string()))?;

        let has_xtest = conn
            .extension_information(xtest::X11_EXTENSION_NAME)
            .map_err(disconnected)?
            .is_some();
        if !has_xtest {
            return Err(BackendError::DisplayUnavailable(
                "the X server does not offer the XTEST extension".into(),
            ));
        }

        let root = conn.setup().roots[screen_num].root;

        let mut session = Self {
            conn,
            root,
            map: KeyMap::new(0, 1, Vec::new()),
            bound: None,
        };
        session.refresh_mapping()?;
        Ok(session)
    }

    fn min_keycode(&self) -> Keycode {
        self.conn.setup().min_keycode
    }

    fn max_keycode(&self) -> Keycode {
        self.conn.setup().max_keycode
    }

    fn refresh_mapping(&mut self) -> Result<(), BackendError> {
        let min_keycode = self.min_keycode();
        let count = self.max_keycode() - min_keycode + 1;
        let reply = self
            .conn
            .get_keyboard_mapping(min_keycode, count)
            .map_err(disconnected)?
            .reply()
            .map_err(reply_error)?;

        self.map = KeyMap::new(
            min_keycode,
            reply.keysyms_per_keycode as usize,
            reply.keysyms,
        );
        Ok(())
    }

    fn type_chord(&mut self, chord: &Chord) -> Result<(), BackendError> {
        let Resolved { mut keys, spare } = self.map.resolve(chord)?;
        if let Some(sym) = spare {
            keys.push(self.bind_spare(sym)?);
        }
        tracing::trace!("XTest chord {:?} via keycodes {:?}", chord.produced(), keys);

        let result = self.tap(&keys);
        if spare.is_some() {
            let unbound = self.unbind_spare();
            return result.and(unbound);
        }
        result
    }

    /// Press `keys` in order and release them in reverse
    ///
    /// Whatever was pressed is released even when a later press fails.
    fn tap(&mut self, keys: &[Keycode]) -> Result<(), BackendError> {
        let mut pressed = 0;
        let mut result = Ok(());
        for &code in keys {
            match self.fake(xproto::KEY_PRESS_EVENT, code) {
                Ok(()) => pressed += 1,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        for &code in keys[..pressed].iter().rev() {
            if let Err(e) = self.fake(xproto::KEY_RELEASE_EVENT, code) {
                tracing::debug!("Failed to release keycode {}: {}", code, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Deliver a single event; keys are only used at their base level
    fn inject(&mut self, event: &KeyEvent) -> Result<(), BackendError> {
        let sym = symbol_keysym(event.symbol);
        let direct = match event.symbol {
            Symbol::Unicode(_) => None,
            _ => self.map.find(sym).filter(|loc| !loc.shifted),
        };

        let (keycode, temporary) = match direct {
            Some(loc) => (loc.keycode, false),
            None => (self.bind_spare(sym)?, true),
        };

        let kind = match event.kind {
            KeyAction::Press => xproto::KEY_PRESS_EVENT,
            KeyAction::Release => xproto::KEY_RELEASE_EVENT,
        };
        tracing::trace!("XTest {:?} {} (keycode {})", event.kind, sym, keycode);
        self.fake(kind, keycode)?;

        if temporary && event.kind == KeyAction::Release {
            self.unbind_spare()?;
        }
        Ok(())
    }

    fn bind_spare(&mut self, sym: Keysym) -> Result<Keycode, BackendError> {
        let spare = self.map.spare.ok_or_else(|| {
            BackendError::Rejected(format!("no spare keycode to bind {}", sym))
        })?;
        if self.bound == Some(sym) {
            return Ok(spare);
        }

        let per = self.map.per as u8;
        let syms = vec![sym.0; self.map.per];
        self.conn
            .change_keyboard_mapping(1, spare, per, &syms)
            .map_err(disconnected)?
            .check()
            .map_err(reply_error)?;
        self.bound = Some(sym);
        Ok(spare)
    }

    fn unbind_spare(&mut self) -> Result<(), BackendError> {
        let Some(spare) = self.map.spare else {
            return Ok(());
        };
        let per = self.map.per as u8;
        let syms = vec![0u32; self.map.per];
        self.conn
            .change_keyboard_mapping(1, spare, per, &syms)
            .map_err(disconnected)?
            .check()
            .map_err(reply_error)?;
        self.bound = None;
        Ok(())
    }

    fn click_at(&mut self, x: i32, y: i32) -> Result<(), BackendError> {
        let (x, y) = (clamp_coord(x), clamp_coord(y));
        self.conn
            .warp_pointer(x11rb::NONE, self.root, 0, 0, 0, 0, x, y)
            .map_err(disconnected)?
            .check()
            .map_err(reply_error)?;
        self.fake(xproto::BUTTON_PRESS_EVENT, 1)?;
        self.fake(xproto::BUTTON_RELEASE_EVENT, 1)
    }

    fn fake(&self, kind: u8, detail: u8) -> Result<(), BackendError> {
        self.conn
            .xtest_fake_input(kind, detail, x11rb::CURRENT_TIME, x11rb::NONE, 0, 0, 0)
            .map_err(disconnected)?
            .check()
            .map_err(reply_error)
    }
}

impl Drop for XSession {
    fn drop(&mut self) {
        if self.bound.is_some() {
            if let Err(e) = self.unbind_spare() {
                tracing::debug!("Failed to restore spare keycode: {}", e);
            }
        }
    }
}

fn clamp_coord(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn disconnected(e: ConnectionError) -> BackendError {
    BackendError::Disconnected(e.to_string())
}

fn reply_error(e: ReplyError) -> BackendError {
    match e {
        ReplyError::ConnectionError(e) => disconnected(e),
        ReplyError::X11Error(e) => BackendError::Rejected(format!("{:?}", e.error_kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::keys::Modifiers;

    const SHIFT_L: u32 = 0xffe1;
    const CONTROL_L: u32 = 0xffe3;

    /// French AZERTY excerpt, two columns per keycode starting at 10
    fn azerty() -> KeyMap {
        let rows: [[u32; 2]; 8] = [
            [0x26, 0x31],   // 10: ampersand / 1
            [0xe9, 0x32],   // 11: eacute / 2
            [0x61, 0x41],   // 12: a / A
            [0x21, 0xa7],   // 13: exclam / section
            [0x62, 0],      // 14: b, shift level implied
            [SHIFT_L, 0],   // 15
            [CONTROL_L, 0], // 16
            [0, 0],         // 17: unused
        ];
        KeyMap::new(10, 2, rows.concat())
    }

    fn chord(text: &str) -> Chord {
        Encoder::new(true).plan(text).chords.remove(0)
    }

    #[test]
    fn test_find_prefers_base_level() {
        let map = azerty();
        assert_eq!(
            map.find(Keysym(0x26)),
            Some(KeyLocation { keycode: 10, shifted: false })
        );
        assert_eq!(
            map.find(Keysym(b'1' as u32)),
            Some(KeyLocation { keycode: 10, shifted: true })
        );
        assert_eq!(
            map.find(Keysym(b'B' as u32)),
            Some(KeyLocation { keycode: 14, shifted: true })
        );
        assert_eq!(map.find(Keysym(b'z' as u32)), None);
        assert_eq!(map.spare, Some(17));
    }

    #[test]
    fn test_azerty_types_produced_characters() {
        let map = azerty();

        // US "!" is Shift+1, but AZERTY has "!" unshifted on its own key
        let exclam = map.resolve(&chord("!")).unwrap();
        assert_eq!(exclam, Resolved { keys: vec![13], spare: None });

        // US "1" is unshifted, AZERTY needs Shift on the "&" key
        let one = map.resolve(&chord("1")).unwrap();
        assert_eq!(one, Resolved { keys: vec![15, 10], spare: None });

        let upper = map.resolve(&chord("A")).unwrap();
        assert_eq!(upper, Resolved { keys: vec![15, 12], spare: None });

        let accent = map.resolve(&chord("é")).unwrap();
        assert_eq!(accent, Resolved { keys: vec![11], spare: None });
    }

    #[test]
    fn test_missing_character_uses_spare_binding() {
        let map = azerty();
        let tilde = map.resolve(&chord("~")).unwrap();
        assert_eq!(
            tilde,
            Resolved { keys: vec![], spare: Some(Keysym(b'~' as u32)) }
        );
    }

    #[test]
    fn test_hand_built_chord_uses_base_level_only() {
        let map = azerty();
        let mods: Modifiers = [Modifier::Ctrl].into_iter().collect();

        let ctrl_a = Chord::new(Symbol::Key(Keysym(b'a' as u32)), mods);
        assert_eq!(map.resolve(&ctrl_a).unwrap(), Resolved { keys: vec![16, 12], spare: None });

        // "1" is only on the Shift level here, so it is not pressed bare
        let ctrl_1 = Chord::new(Symbol::Key(Keysym(b'1' as u32)), mods);
        assert_eq!(
            map.resolve(&ctrl_1).unwrap(),
            Resolved { keys: vec![16], spare: Some(Keysym(b'1' as u32)) }
        );
    }

    #[test]
    fn test_missing_modifier_key_is_rejected() {
        let map = KeyMap::new(10, 2, vec![0x61, 0x41, 0, 0]);
        assert!(matches!(map.resolve(&chord("A")), Err(BackendError::Rejected(_))));
    }

    #[test]
    fn test_qwertz_slash_is_shifted_seven() {
        let map = KeyMap::new(16, 2, vec![0x37, 0x2f, SHIFT_L, 0]);
        assert_eq!(
            map.resolve(&chord("/")).unwrap(),
            Resolved { keys: vec![17, 16], spare: None }
        );
    }

    #[test]
    fn test_clamp_coord() {
        assert_eq!(clamp_coord(100), 100);
        assert_eq!(clamp_coord(-5), -5);
        assert_eq!(clamp_coord(70_000), i16::MAX);
    }

    #[test]
    fn test_reply_error_classification() {
        let err = reply_error(ReplyError::ConnectionError(ConnectionError::UnknownError));
        assert!(matches!(err, BackendError::Disconnected(_)));
    }

    #[tokio::test]
    async fn test_unprepared_backend_reports_disconnected() {
        let mut backend = XTestBackend::new(Some(":does-not-exist".into()));
        let target = TargetPoint::at(10, 10, None);
        assert!(matches!(
            backend.focus(&target).await,
            Err(BackendError::Disconnected(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_display_is_unavailable() {
        let mut backend = XTestBackend::new(Some(":does-not-exist".into()));
        let err = backend.prepare().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
