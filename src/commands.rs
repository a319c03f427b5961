//! Translates key identifiers into looper operations with edge-trigger
//! (press/release) semantics. The key->command table is static; dispatch
//! itself lives here, state mutation lives in [`crate::looper`].
use std::collections::HashSet;

use crate::backend::keyboard::{KeyEvent, KeyId};

/// A fully resolved operation, produced by looking up a pressed or released
/// [`KeyId`] in the bindings table. Carries its own arguments so dispatch
/// never needs a second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Record(u8),
    RecordAfter(u8),
    ResetTrack(u8),
    Mute(u8),
    ToggleChannel(u8),
    IncrementTempo(i32),
    IncrementMeasure(i32),
    DecreaseQuantize,
    IncreaseQuantize,
    MidiPrevPort,
    MidiNextPort,
    SaveSettings,
    LoadSettings,
    ToggleTick,
    ToggleRecordOnFirstNote,
    StopRecord,
    TogglePlay,
    Panic,
}

const RECORD_KEYS: [char; 8] = ['z', 'x', 'c', 'v', 'b', 'n', 'm', ','];
const MUTE_KEYS: [char; 8] = ['a', 's', 'd', 'f', 'g', 'h', 'j', 'k'];
const CHANNEL_KEYS: [char; 8] = ['1', '2', '3', '4', '5', '6', '7', '8'];

/// Resolve the command a key *press* triggers, or `None` if the key is
/// unbound. Unknown keys are dropped silently, never an error. `ctrl` held
/// on a record key resets that track instead of arming it.
fn on_press(key: KeyId, ctrl: bool) -> Option<Command> {
    if let KeyId::Char(c) = key {
        if let Some(index) = RECORD_KEYS.iter().position(|&k| k == c) {
            let index = index as u8 + 1;
            return Some(if ctrl {
                Command::ResetTrack(index)
            } else {
                Command::Record(index)
            });
        }
        if let Some(index) = MUTE_KEYS.iter().position(|&k| k == c) {
            return Some(Command::Mute(index as u8 + 1));
        }
        if let Some(index) = CHANNEL_KEYS.iter().position(|&k| k == c) {
            return Some(Command::ToggleChannel(index as u8));
        }
        if c == 'r' {
            return Some(Command::Reset);
        }
        if c == 'q' {
            return Some(Command::StopRecord);
        }
    }
    match key {
        KeyId::Space => Some(Command::TogglePlay),
        KeyId::Escape => Some(Command::Panic),
        KeyId::Home => Some(Command::IncrementTempo(1)),
        KeyId::End => Some(Command::IncrementTempo(-1)),
        KeyId::PageUp => Some(Command::IncrementTempo(10)),
        KeyId::PageDown => Some(Command::IncrementTempo(-10)),
        KeyId::KeypadAdd => Some(Command::IncrementMeasure(1)),
        KeyId::KeypadSubtract => Some(Command::IncrementMeasure(-1)),
        KeyId::Insert => Some(Command::DecreaseQuantize),
        KeyId::Delete => Some(Command::IncreaseQuantize),
        KeyId::KeypadDivide => Some(Command::MidiPrevPort),
        KeyId::KeypadMultiply => Some(Command::MidiNextPort),
        KeyId::F(12) => Some(Command::SaveSettings),
        KeyId::F(11) => Some(Command::LoadSettings),
        KeyId::F(9) => Some(Command::ToggleTick),
        KeyId::CapsLock => Some(Command::ToggleRecordOnFirstNote),
        _ => None,
    }
}

/// Resolve the `_after` counterpart a key *release* triggers. Only
/// `Record` has one; every other binding is a bare press.
fn on_release(key: KeyId) -> Option<Command> {
    if let KeyId::Char(c) = key {
        if let Some(index) = RECORD_KEYS.iter().position(|&k| k == c) {
            return Some(Command::RecordAfter(index as u8 + 1));
        }
    }
    None
}

/// Debounces key auto-repeat and turns a stream of [`KeyEvent`]s into a
/// stream of [`Command`]s. A key already held is ignored on a repeated
/// press; release always clears it from the held set regardless of
/// whether it produces a command.
#[derive(Default)]
pub struct Dispatcher {
    held: HashSet<KeyId>,
    /// Record keys pressed with `ctrl` held, so their release doesn't also
    /// fire `RecordAfter` for a recording pass that never started.
    reset_chord: HashSet<KeyId>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, event: KeyEvent) -> Option<Command> {
        if event.pressed {
            if !self.held.insert(event.key) {
                return None;
            }
            let command = on_press(event.key, event.ctrl);
            if matches!(command, Some(Command::ResetTrack(_))) {
                self.reset_chord.insert(event.key);
            }
            command
        } else {
            self.held.remove(&event.key);
            if self.reset_chord.remove(&event.key) {
                return None;
            }
            on_release(event.key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_press_then_release_pairs() {
        let mut d = Dispatcher::new();
        let press = KeyEvent {
            key: KeyId::Char('z'),
            pressed: true,
            ctrl: false,
        };
        let release = KeyEvent {
            key: KeyId::Char('z'),
            pressed: false,
            ctrl: false,
        };
        assert_eq!(d.dispatch(press), Some(Command::Record(1)));
        assert_eq!(d.dispatch(release), Some(Command::RecordAfter(1)));
    }

    #[test]
    fn ctrl_held_record_key_resets_track_instead_of_arming() {
        let mut d = Dispatcher::new();
        let press = KeyEvent {
            key: KeyId::Char('z'),
            pressed: true,
            ctrl: true,
        };
        let release = KeyEvent {
            key: KeyId::Char('z'),
            pressed: false,
            ctrl: true,
        };
        assert_eq!(d.dispatch(press), Some(Command::ResetTrack(1)));
        // No RecordAfter on release: recording never started for this chord.
        assert_eq!(d.dispatch(release), None);
    }

    #[test]
    fn held_key_is_debounced() {
        let mut d = Dispatcher::new();
        let press = KeyEvent {
            key: KeyId::Char('a'),
            pressed: true,
            ctrl: false,
        };
        assert_eq!(d.dispatch(press), Some(Command::Mute(1)));
        assert_eq!(d.dispatch(press), None);
    }

    #[test]
    fn unbound_key_is_silently_dropped() {
        let mut d = Dispatcher::new();
        let press = KeyEvent {
            key: KeyId::Char('y'),
            pressed: true,
            ctrl: false,
        };
        assert_eq!(d.dispatch(press), None);
    }

    #[test]
    fn transport_and_misc_bindings_resolve() {
        assert_eq!(on_press(KeyId::Space, false), Some(Command::TogglePlay));
        assert_eq!(on_press(KeyId::Escape, false), Some(Command::Panic));
        assert_eq!(on_press(KeyId::Home, false), Some(Command::IncrementTempo(1)));
        assert_eq!(
            on_press(KeyId::PageDown, false),
            Some(Command::IncrementTempo(-10))
        );
        assert_eq!(on_press(KeyId::F(12), false), Some(Command::SaveSettings));
        assert_eq!(
            on_press(KeyId::Char('1'), false),
            Some(Command::ToggleChannel(0))
        );
    }
}
