pub mod backend;
pub mod commands;
pub mod error;
pub mod looper;
pub mod midi;
pub mod player;
pub mod settings;
pub mod track;

pub use error::{LooperError, Result};
pub use looper::Looper;
