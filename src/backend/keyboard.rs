//! Keyboard event source contract, plus a desktop-hook implementation
//! built on `crossterm`'s terminal event stream. A raw `evdev` reader for
//! single-board hardware would implement the same trait.
use std::time::Duration;

/// Opaque key identifier. Two key presses compare equal iff they are the
/// same physical key, regardless of which backend produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyId {
    Char(char),
    Space,
    Escape,
    CapsLock,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
    KeypadAdd,
    KeypadSubtract,
    KeypadMultiply,
    KeypadDivide,
    /// Keypad digit keys 1-4, recognized by the contract even though no
    /// command in the default table binds them. Unreachable from
    /// [`CrosstermKeyboard`]: a terminal cannot distinguish a numpad digit
    /// from the top-row digit of the same value without the Kitty
    /// keyboard protocol.
    Keypad(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyId,
    pub pressed: bool,
    /// Ctrl held concurrently with this key. Used by the record keys'
    /// reset-track chord.
    pub ctrl: bool,
}

/// A source of key press/release events. `poll` must return promptly
/// (bounded by `timeout`) so the caller's redraw loop stays responsive.
pub trait KeyboardBackend {
    fn poll(&mut self, timeout: Duration) -> Option<KeyEvent>;
}

/// Desktop-hook keyboard backend: puts the terminal in raw mode and reads
/// `crossterm` key events, translating them to [`KeyId`].
///
/// Terminals report only presses by default, which starves every command
/// with a release edge (`record`/`record_after`). `new` pushes
/// `REPORT_EVENT_TYPES` on terminals that support the Kitty keyboard
/// protocol so `poll` actually sees `KeyEventKind::Release`.
pub struct CrosstermKeyboard {
    enhanced: bool,
}

impl CrosstermKeyboard {
    pub fn new() -> std::io::Result<Self> {
        use crossterm::event::{KeyboardEnhancementFlags, PushKeyboardEnhancementFlags};

        crossterm::terminal::enable_raw_mode()?;
        let enhanced = crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            crossterm::execute!(
                std::io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        Ok(Self { enhanced })
    }
}

impl Drop for CrosstermKeyboard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = crossterm::execute!(
                std::io::stdout(),
                crossterm::event::PopKeyboardEnhancementFlags
            );
        }
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

impl KeyboardBackend for CrosstermKeyboard {
    fn poll(&mut self, timeout: Duration) -> Option<KeyEvent> {
        use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

        if !event::poll(timeout).unwrap_or(false) {
            return None;
        }
        let Ok(Event::Key(key)) = event::read() else {
            return None;
        };
        let pressed = match key.kind {
            KeyEventKind::Press => true,
            KeyEventKind::Release => false,
            KeyEventKind::Repeat => return None,
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let id = match key.code {
            KeyCode::Char(' ') => KeyId::Space,
            KeyCode::Char('+') => KeyId::KeypadAdd,
            KeyCode::Char('-') => KeyId::KeypadSubtract,
            KeyCode::Char('*') => KeyId::KeypadMultiply,
            KeyCode::Char('/') => KeyId::KeypadDivide,
            KeyCode::Char(c) => KeyId::Char(c.to_ascii_lowercase()),
            KeyCode::Esc => KeyId::Escape,
            KeyCode::CapsLock => KeyId::CapsLock,
            KeyCode::Home => KeyId::Home,
            KeyCode::End => KeyId::End,
            KeyCode::PageUp => KeyId::PageUp,
            KeyCode::PageDown => KeyId::PageDown,
            KeyCode::Insert => KeyId::Insert,
            KeyCode::Delete => KeyId::Delete,
            KeyCode::F(n) => KeyId::F(n),
            _ => return None,
        };
        Some(KeyEvent { key: id, pressed, ctrl })
    }
}
