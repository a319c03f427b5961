//! Crate-wide error type.
//!
//! A plain enum with a manual `Display`/`std::error::Error` impl, no
//! `thiserror` macro: propagated with `?` from fallible setup paths and
//! otherwise logged and swallowed on the realtime threads.
use std::fmt;

#[derive(Debug)]
pub enum LooperError {
    /// No MIDI port exists at the requested index.
    NoSuchPort { index: usize, available: usize },
    /// The backend failed to open or write to a port.
    Backend(String),
    /// `settings.json` is missing, malformed, or carries an unsupported
    /// `__version__`.
    Settings(String),
    /// Track index outside `1..=8`.
    InvalidTrackIndex(u8),
}

impl fmt::Display for LooperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LooperError::NoSuchPort { index, available } => write!(
                f,
                "no MIDI port at index {index} ({available} port(s) available)"
            ),
            LooperError::Backend(msg) => write!(f, "MIDI backend error: {msg}"),
            LooperError::Settings(msg) => write!(f, "settings error: {msg}"),
            LooperError::InvalidTrackIndex(index) => {
                write!(f, "track index {index} is outside 1..=8")
            }
        }
    }
}

impl std::error::Error for LooperError {}

pub type Result<T> = std::result::Result<T, LooperError>;
