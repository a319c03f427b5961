//! Concrete [`super::MidiBackend`] built on the `midir` crate. This is the
//! only collaborator in the crate that touches real hardware.
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use super::{InCallback, MidiBackend};
use crate::error::{LooperError, Result};

const CLIENT_NAME: &str = "looplet";
const IN_PORT_NAME: &str = "looplet-in";
const OUT_PORT_NAME: &str = "looplet-out";

/// Real MIDI I/O. Input and output are independent connections, each opened
/// lazily and torn down on `close` or when replaced by a later `open_in`/
/// `open_out` call.
pub struct MidirBackend {
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
}

impl MidirBackend {
    pub fn new() -> Self {
        Self {
            input: None,
            output: None,
        }
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiBackend for MidirBackend {
    fn list_ports(&self) -> Vec<String> {
        let Ok(midi_out) = MidiOutput::new(CLIENT_NAME) else {
            return Vec::new();
        };
        midi_out
            .ports()
            .iter()
            .map(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_else(|_| "unknown".to_string())
            })
            .collect()
    }

    fn open_in(&mut self, port: usize, mut callback: InCallback) -> Result<()> {
        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| LooperError::Backend(e.to_string()))?;
        let ports = midi_in.ports();
        let available = ports.len();
        let Some(in_port) = ports.get(port) else {
            return Err(LooperError::NoSuchPort {
                index: port,
                available,
            });
        };
        let connection = midi_in
            .connect(
                in_port,
                IN_PORT_NAME,
                move |stamp_micros, message, ()| {
                    callback(message, stamp_micros as f64 / 1_000_000.0);
                },
                (),
            )
            .map_err(|e| LooperError::Backend(e.to_string()))?;
        self.input = Some(connection);
        Ok(())
    }

    fn open_out(&mut self, port: usize) -> Result<()> {
        let midi_out =
            MidiOutput::new(CLIENT_NAME).map_err(|e| LooperError::Backend(e.to_string()))?;
        let ports = midi_out.ports();
        let available = ports.len();
        let Some(out_port) = ports.get(port) else {
            return Err(LooperError::NoSuchPort {
                index: port,
                available,
            });
        };
        let connection = midi_out
            .connect(out_port, OUT_PORT_NAME)
            .map_err(|e| LooperError::Backend(e.to_string()))?;
        self.output = Some(connection);
        Ok(())
    }

    fn close(&mut self) {
        self.input = None;
        self.output = None;
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        let Some(output) = self.output.as_mut() else {
            return Err(LooperError::Backend("output port not open".to_string()));
        };
        output
            .send(message)
            .map_err(|e| LooperError::Backend(e.to_string()))
    }
}
