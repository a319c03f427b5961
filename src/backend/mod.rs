//! Trait contracts for the collaborators the core engine treats as thin,
//! platform-specific adapters: MIDI I/O and keyboard events. Each trait has
//! exactly one concrete implementation in this crate; swapping in another
//! platform means implementing the trait, not touching
//! `track`/`player`/`looper`. The status display has no such contract: the
//! bin's UI renders directly against `ratatui::Frame`, the only surface it
//! targets.
pub mod keyboard;
pub mod midi_midir;

use std::sync::{Arc, Mutex};

use crate::error::Result;

/// A MIDI input/output backend: port enumeration, open/close, and
/// best-effort synchronous send. The in-callback is installed once per
/// `open_in` call and re-invoked by the backend on its own thread for
/// every incoming message.
pub trait MidiBackend: Send {
    fn list_ports(&self) -> Vec<String>;
    fn open_in(&mut self, port: usize, callback: InCallback) -> Result<()>;
    fn open_out(&mut self, port: usize) -> Result<()>;
    fn close(&mut self);
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

/// `fn(message_bytes, delta_wallclock_seconds)`, invoked by the backend on
/// its own thread for every incoming MIDI message.
pub type InCallback = Box<dyn FnMut(&[u8], f64) + Send + 'static>;

/// An in-memory [`MidiBackend`] double used by tests and benchmarks: it
/// never touches real hardware, records every sent message in a shared
/// log a test can inspect after the backend has been moved into a
/// `Looper`, and lets the test inject inbound messages by calling the
/// stored callback directly.
#[derive(Default)]
pub struct FakeMidiBackend {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    pub in_callback: Option<InCallback>,
    pub out_open: bool,
}

impl FakeMidiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloneable handle onto the sent-message log, retained by the
    /// caller after the backend itself has been boxed and moved away.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }

    /// Simulate an inbound MIDI message from the backend's callback thread.
    pub fn deliver(&mut self, message: &[u8], delta: f64) {
        if let Some(cb) = self.in_callback.as_mut() {
            cb(message, delta);
        }
    }
}

impl MidiBackend for FakeMidiBackend {
    fn list_ports(&self) -> Vec<String> {
        vec!["fake port 0".to_string()]
    }

    fn open_in(&mut self, _port: usize, callback: InCallback) -> Result<()> {
        self.in_callback = Some(callback);
        Ok(())
    }

    fn open_out(&mut self, _port: usize) -> Result<()> {
        self.out_open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.in_callback = None;
        self.out_open = false;
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.sent.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}
