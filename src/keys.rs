//! Key vocabulary shared by the encoder and the backends
//!
//! Symbols are X11 keysym values. Printable Latin-1 keysyms equal their code
//! point, everything else beyond Latin-1 uses the `0x0100_0000 + code point`
//! Unicode keysym range, which xdotool, wtype and XTest all understand.
//!
//! The US layout table here is the only layout knowledge in the crate: a
//! character is "directly reachable" when it sits on a US key, optionally
//! with Shift. Everything else goes through Unicode injection.

use std::fmt;

/// An X11 keysym value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keysym(pub u32);

impl Keysym {
    pub const BACKSPACE: Keysym = Keysym(0xff08);
    pub const TAB: Keysym = Keysym(0xff09);
    pub const RETURN: Keysym = Keysym(0xff0d);
    pub const ESCAPE: Keysym = Keysym(0xff1b);
    pub const SHIFT_L: Keysym = Keysym(0xffe1);
    pub const CONTROL_L: Keysym = Keysym(0xffe3);
    pub const ALT_L: Keysym = Keysym(0xffe9);
    pub const SUPER_L: Keysym = Keysym(0xffeb);

    /// Keysym for an arbitrary character, as used for Unicode injection
    pub fn from_char(c: char) -> Keysym {
        let cp = c as u32;
        if (0x20..=0x7e).contains(&cp) || (0xa0..=0xff).contains(&cp) {
            Keysym(cp)
        } else {
            Keysym(0x0100_0000 | cp)
        }
    }

    /// Keysym name understood by `XStringToKeysym` and `xkb_keysym_from_name`
    ///
    /// Used by the CLI backends, which take key names on the command line.
    pub fn name(&self) -> String {
        let named = match *self {
            Keysym::BACKSPACE => "BackSpace",
            Keysym::TAB => "Tab",
            Keysym::RETURN => "Return",
            Keysym::ESCAPE => "Escape",
            Keysym::SHIFT_L => "Shift_L",
            Keysym::CONTROL_L => "Control_L",
            Keysym::ALT_L => "Alt_L",
            Keysym::SUPER_L => "Super_L",
            Keysym(0x20) => "space",
            Keysym(0x21) => "exclam",
            Keysym(0x22) => "quotedbl",
            Keysym(0x23) => "numbersign",
            Keysym(0x24) => "dollar",
            Keysym(0x25) => "percent",
            Keysym(0x26) => "ampersand",
            Keysym(0x27) => "apostrophe",
            Keysym(0x28) => "parenleft",
            Keysym(0x29) => "parenright",
            Keysym(0x2a) => "asterisk",
            Keysym(0x2b) => "plus",
            Keysym(0x2c) => "comma",
            Keysym(0x2d) => "minus",
            Keysym(0x2e) => "period",
            Keysym(0x2f) => "slash",
            Keysym(0x3a) => "colon",
            Keysym(0x3b) => "semicolon",
            Keysym(0x3c) => "less",
            Keysym(0x3d) => "equal",
            Keysym(0x3e) => "greater",
            Keysym(0x3f) => "question",
            Keysym(0x40) => "at",
            Keysym(0x5b) => "bracketleft",
            Keysym(0x5c) => "backslash",
            Keysym(0x5d) => "bracketright",
            Keysym(0x5e) => "asciicircum",
            Keysym(0x5f) => "underscore",
            Keysym(0x60) => "grave",
            Keysym(0x7b) => "braceleft",
            Keysym(0x7c) => "bar",
            Keysym(0x7d) => "braceright",
            Keysym(0x7e) => "asciitilde",
            _ => "",
        };
        if !named.is_empty() {
            return named.to_string();
        }

        match self.0 {
            // Letters and digits are their own names
            cp @ (0x30..=0x39 | 0x41..=0x5a | 0x61..=0x7a) => {
                char::from_u32(cp).map(String::from).unwrap_or_default()
            }
            cp if cp & 0xff00_0000 == 0x0100_0000 => format!("U{:04X}", cp & 0x00ff_ffff),
            cp if cp <= 0xff => format!("U{:04X}", cp),
            cp => format!("0x{:x}", cp),
        }
    }
}

impl fmt::Display for Keysym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A modifier key
///
/// Declaration order is the fixed chord nesting order, outermost first:
/// Ctrl is pressed first and released last, Shift sits closest to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Alt,
    Super,
    Shift,
}

impl Modifier {
    /// All modifiers, outermost first
    pub const ORDER: [Modifier; 4] = [Modifier::Ctrl, Modifier::Alt, Modifier::Super, Modifier::Shift];

    fn bit(self) -> u8 {
        match self {
            Modifier::Ctrl => 0b0001,
            Modifier::Alt => 0b0010,
            Modifier::Super => 0b0100,
            Modifier::Shift => 0b1000,
        }
    }

    /// Left-hand keysym for this modifier
    pub fn keysym(self) -> Keysym {
        match self {
            Modifier::Ctrl => Keysym::CONTROL_L,
            Modifier::Alt => Keysym::ALT_L,
            Modifier::Super => Keysym::SUPER_L,
            Modifier::Shift => Keysym::SHIFT_L,
        }
    }

    /// Modifier name for `wtype -M/-m`
    pub fn wtype_name(self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Alt => "alt",
            Modifier::Super => "logo",
            Modifier::Shift => "shift",
        }
    }
}

/// A set of modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(0b1000);

    pub fn with(self, m: Modifier) -> Self {
        Modifiers(self.0 | m.bit())
    }

    pub fn without(self, m: Modifier) -> Self {
        Modifiers(self.0 & !m.bit())
    }

    pub fn contains(self, m: Modifier) -> bool {
        self.0 & m.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in press order (outermost first)
    pub fn iter(self) -> impl DoubleEndedIterator<Item = Modifier> {
        Modifier::ORDER.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Modifier> for Modifiers {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        iter.into_iter().fold(Modifiers::NONE, Modifiers::with)
    }
}

/// Look up a character on the US layout
///
/// Returns the keysym of the physical key's unshifted symbol and the
/// modifiers needed to produce `c` from it, or `None` when `c` has no key.
pub fn us_key(c: char) -> Option<(Keysym, Modifiers)> {
    let plain = |b: u8| Some((Keysym(b as u32), Modifiers::NONE));
    let shifted = |b: u8| Some((Keysym(b as u32), Modifiers::SHIFT));

    match c {
        'a'..='z' | '0'..='9' => plain(c as u8),
        'A'..='Z' => shifted(c.to_ascii_lowercase() as u8),
        ' ' | '-' | '=' | '[' | ']' | '\\' | ';' | '\'' | ',' | '.' | '/' | '`' => plain(c as u8),
        '\t' => Some((Keysym::TAB, Modifiers::NONE)),
        '!' => shifted(b'1'),
        '@' => shifted(b'2'),
        '#' => shifted(b'3'),
        '$' => shifted(b'4'),
        '%' => shifted(b'5'),
        '^' => shifted(b'6'),
        '&' => shifted(b'7'),
        '*' => shifted(b'8'),
        '(' => shifted(b'9'),
        ')' => shifted(b'0'),
        '_' => shifted(b'-'),
        '+' => shifted(b'='),
        '{' => shifted(b'['),
        '}' => shifted(b']'),
        '|' => shifted(b'\\'),
        ':' => shifted(b';'),
        '"' => shifted(b'\''),
        '<' => shifted(b','),
        '>' => shifted(b'.'),
        '?' => shifted(b'/'),
        '~' => shifted(b'`'),
        _ => None,
    }
}

/// Linux input key code (`KEY_*`) for a keysym on a US layout
///
/// Only covers the keys `us_key` can produce plus the named keys the
/// encoder emits; uinput has no notion of keysyms beyond that.
pub fn evdev_code(sym: Keysym) -> Option<u16> {
    use evdev::Key;

    let key = match sym {
        Keysym::BACKSPACE => Key::KEY_BACKSPACE,
        Keysym::TAB => Key::KEY_TAB,
        Keysym::RETURN => Key::KEY_ENTER,
        Keysym::ESCAPE => Key::KEY_ESC,
        Keysym::SHIFT_L => Key::KEY_LEFTSHIFT,
        Keysym::CONTROL_L => Key::KEY_LEFTCTRL,
        Keysym::ALT_L => Key::KEY_LEFTALT,
        Keysym::SUPER_L => Key::KEY_LEFTMETA,
        Keysym(cp) => match char::from_u32(cp)? {
            'a' => Key::KEY_A,
            'b' => Key::KEY_B,
            'c' => Key::KEY_C,
            'd' => Key::KEY_D,
            'e' => Key::KEY_E,
            'f' => Key::KEY_F,
            'g' => Key::KEY_G,
            'h' => Key::KEY_H,
            'i' => Key::KEY_I,
            'j' => Key::KEY_J,
            'k' => Key::KEY_K,
            'l' => Key::KEY_L,
            'm' => Key::KEY_M,
            'n' => Key::KEY_N,
            'o' => Key::KEY_O,
            'p' => Key::KEY_P,
            'q' => Key::KEY_Q,
            'r' => Key::KEY_R,
            's' => Key::KEY_S,
            't' => Key::KEY_T,
            'u' => Key::KEY_U,
            'v' => Key::KEY_V,
            'w' => Key::KEY_W,
            'x' => Key::KEY_X,
            'y' => Key::KEY_Y,
            'z' => Key::KEY_Z,
            '1' => Key::KEY_1,
            '2' => Key::KEY_2,
            '3' => Key::KEY_3,
            '4' => Key::KEY_4,
            '5' => Key::KEY_5,
            '6' => Key::KEY_6,
            '7' => Key::KEY_7,
            '8' => Key::KEY_8,
            '9' => Key::KEY_9,
            '0' => Key::KEY_0,
            ' ' => Key::KEY_SPACE,
            '-' => Key::KEY_MINUS,
            '=' => Key::KEY_EQUAL,
            '[' => Key::KEY_LEFTBRACE,
            ']' => Key::KEY_RIGHTBRACE,
            '\\' => Key::KEY_BACKSLASH,
            ';' => Key::KEY_SEMICOLON,
            '\'' => Key::KEY_APOSTROPHE,
            ',' => Key::KEY_COMMA,
            '.' => Key::KEY_DOT,
            '/' => Key::KEY_SLASH,
            '`' => Key::KEY_GRAVE,
            _ => return None,
        },
    };

    Some(key.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_key_letters() {
        assert_eq!(us_key('a'), Some((Keysym(0x61), Modifiers::NONE)));
        assert_eq!(us_key('Z'), Some((Keysym(0x7a), Modifiers::SHIFT)));
        assert_eq!(us_key('7'), Some((Keysym(0x37), Modifiers::NONE)));
    }

    #[test]
    fn test_us_key_shifted_punctuation_uses_base_key() {
        assert_eq!(us_key('!'), Some((Keysym(b'1' as u32), Modifiers::SHIFT)));
        assert_eq!(us_key('"'), Some((Keysym(b'\'' as u32), Modifiers::SHIFT)));
        assert_eq!(us_key('~'), Some((Keysym(b'`' as u32), Modifiers::SHIFT)));
    }

    #[test]
    fn test_us_key_unreachable() {
        assert_eq!(us_key('é'), None);
        assert_eq!(us_key('😀'), None);
        assert_eq!(us_key('\n'), None);
    }

    #[test]
    fn test_every_ascii_printable_is_reachable() {
        for b in 0x20u8..=0x7e {
            assert!(us_key(b as char).is_some(), "{:?} has no key", b as char);
        }
    }

    #[test]
    fn test_keysym_names() {
        assert_eq!(Keysym(b'a' as u32).name(), "a");
        assert_eq!(Keysym(b'-' as u32).name(), "minus");
        assert_eq!(Keysym::RETURN.name(), "Return");
        assert_eq!(Keysym::from_char('😀').name(), "U1F600");
        assert_eq!(Keysym::from_char('é').name(), "U00E9");
        assert_eq!(Keysym(b'!' as u32).name(), "exclam");
        assert_eq!(Keysym(b'~' as u32).name(), "asciitilde");
        assert_eq!(Keysym(b'X' as u32).name(), "X");
    }

    #[test]
    fn test_keysym_from_char() {
        assert_eq!(Keysym::from_char('a'), Keysym(0x61));
        assert_eq!(Keysym::from_char('é'), Keysym(0xe9));
        assert_eq!(Keysym::from_char('€'), Keysym(0x0100_20ac));
    }

    #[test]
    fn test_modifier_order() {
        let mods: Modifiers = [Modifier::Shift, Modifier::Ctrl].into_iter().collect();
        let order: Vec<_> = mods.iter().collect();
        assert_eq!(order, vec![Modifier::Ctrl, Modifier::Shift]);
        let reversed: Vec<_> = mods.iter().rev().collect();
        assert_eq!(reversed, vec![Modifier::Shift, Modifier::Ctrl]);
        assert_eq!(mods.len(), 2);
        assert!(mods.without(Modifier::Ctrl).contains(Modifier::Shift));
    }

    #[test]
    fn test_evdev_codes_cover_us_layout() {
        for b in 0x20u8..=0x7e {
            let (sym, _) = us_key(b as char).unwrap();
            assert!(evdev_code(sym).is_some(), "{:?} has no evdev code", b as char);
        }
        assert_eq!(evdev_code(Keysym::RETURN), Some(28));
        assert_eq!(evdev_code(Keysym(b'a' as u32)), Some(30));
        assert_eq!(evdev_code(Keysym::from_char('😀')), None);
    }
}
