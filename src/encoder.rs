//! Key encoder: text to chords
//!
//! Turns text into a lazy sequence of self-contained chords, one per code
//! point. A chord presses its modifiers (outermost first), presses and
//! releases the key, then releases the modifiers in reverse. Nothing is held
//! across chords, so each chord can be delivered and cancelled on its own.
//!
//! Code points with no US key become Unicode-injection chords when the
//! backend can inject arbitrary code points, and are skipped otherwise.

use crate::error::EncodingLossy;
use crate::keys::{us_key, Keysym, Modifier, Modifiers};
use std::iter::Peekable;
use std::str::Chars;

/// Press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
}

/// What a key event acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// A key identified by its keysym
    Key(Keysym),
    /// A modifier key
    Modifier(Modifier),
    /// A code point for backends that can inject Unicode directly
    Unicode(char),
}

/// One atomic key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub kind: KeyAction,
    pub symbol: Symbol,
    /// Modifiers held while this event is delivered
    pub modifiers: Modifiers,
}

/// The closed press/release group for one code point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    events: Vec<KeyEvent>,
    /// Keysym of the character the chord types on a US layout
    produced: Option<Keysym>,
}

impl Chord {
    /// Build a chord for `symbol` under `modifiers`
    pub fn new(symbol: Symbol, modifiers: Modifiers) -> Self {
        let mut events = Vec::with_capacity(2 + 2 * modifiers.len());
        let mut held = Modifiers::NONE;

        for m in modifiers.iter() {
            events.push(KeyEvent {
                kind: KeyAction::Press,
                symbol: Symbol::Modifier(m),
                modifiers: held,
            });
            held = held.with(m);
        }

        events.push(KeyEvent {
            kind: KeyAction::Press,
            symbol,
            modifiers: held,
        });
        events.push(KeyEvent {
            kind: KeyAction::Release,
            symbol,
            modifiers: held,
        });

        for m in modifiers.iter().rev() {
            held = held.without(m);
            events.push(KeyEvent {
                kind: KeyAction::Release,
                symbol: Symbol::Modifier(m),
                modifiers: held,
            });
        }

        Self {
            events,
            produced: None,
        }
    }

    /// Tag the chord with the keysym of the character it types
    pub fn producing(mut self, sym: Keysym) -> Self {
        self.produced = Some(sym);
        self
    }

    /// Enter key chord
    pub fn enter() -> Self {
        Self::new(Symbol::Key(Keysym::RETURN), Modifiers::NONE).producing(Keysym::RETURN)
    }

    /// Keysym of the typed character, independent of the key and modifiers
    /// used to reach it
    ///
    /// Layout-aware backends resolve this against the live keymap instead of
    /// replaying the US key. `None` for chords built by hand.
    pub fn produced(&self) -> Option<Keysym> {
        self.produced
    }

    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    /// The non-modifier symbol this chord types
    pub fn symbol(&self) -> Symbol {
        self.events
            .iter()
            .map(|e| e.symbol)
            .find(|s| !matches!(s, Symbol::Modifier(_)))
            .unwrap_or(Symbol::Key(Keysym::RETURN))
    }

    /// Modifiers wrapped around the key
    pub fn modifiers(&self) -> Modifiers {
        self.events
            .iter()
            .filter_map(|e| match e.symbol {
                Symbol::Modifier(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// One step of an encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    Chord(Chord),
    /// A code point the active backend cannot type
    Skipped(char),
}

/// Maps text to chords for a backend with the given capabilities
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    unicode: bool,
}

impl Encoder {
    /// Create an encoder; `unicode` says whether the backend accepts
    /// `Symbol::Unicode` events
    pub fn new(unicode: bool) -> Self {
        Self { unicode }
    }

    /// Lazily encode `text`
    ///
    /// Calling this again on the same text yields the same sequence.
    pub fn encode<'a>(&self, text: &'a str) -> Encode<'a> {
        Encode {
            chars: text.chars().peekable(),
            unicode: self.unicode,
        }
    }

    /// Encode `text` eagerly, splitting chords from skipped code points
    pub fn plan(&self, text: &str) -> Plan {
        let mut chords = Vec::new();
        let mut skipped = Vec::new();
        for step in self.encode(text) {
            match step {
                Encoded::Chord(chord) => chords.push(chord),
                Encoded::Skipped(c) => skipped.push(c),
            }
        }
        Plan { chords, skipped }
    }
}

/// A fully encoded text
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub chords: Vec<Chord>,
    pub skipped: Vec<char>,
}

impl Plan {
    /// Total atomic events across all chords
    pub fn event_count(&self) -> usize {
        self.chords.iter().map(Chord::len).sum()
    }

    /// The lossy-substitution warning, if anything was skipped
    pub fn lossy(&self) -> Option<EncodingLossy> {
        if self.skipped.is_empty() {
            None
        } else {
            Some(EncodingLossy {
                codepoints: self.skipped.clone(),
            })
        }
    }
}

/// Iterator returned by [`Encoder::encode`]
#[derive(Debug, Clone)]
pub struct Encode<'a> {
    chars: Peekable<Chars<'a>>,
    unicode: bool,
}

impl Iterator for Encode<'_> {
    type Item = Encoded;

    fn next(&mut self) -> Option<Encoded> {
        let c = self.chars.next()?;

        let step = match c {
            '\n' => Encoded::Chord(Chord::enter()),
            '\r' => {
                // CRLF is one line break
                let _ = self.chars.next_if_eq(&'\n');
                Encoded::Chord(Chord::enter())
            }
            '\t' => Encoded::Chord(
                Chord::new(Symbol::Key(Keysym::TAB), Modifiers::NONE).producing(Keysym::TAB),
            ),
            c => match us_key(c) {
                Some((sym, mods)) => Encoded::Chord(
                    Chord::new(Symbol::Key(sym), mods).producing(Keysym::from_char(c)),
                ),
                None if c.is_control() => Encoded::Skipped(c),
                None if self.unicode => Encoded::Chord(
                    Chord::new(Symbol::Unicode(c), Modifiers::NONE).producing(Keysym::from_char(c)),
                ),
                None => Encoded::Skipped(c),
            },
        };

        Some(step)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.chars.size_hint();
        // CRLF pairs collapse, so at least half the remaining chars survive
        (lo.div_ceil(2), hi)
    }
}
