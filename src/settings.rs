//! Versioned JSON session document: serializes/deserializes the fields a
//! user wants to survive a restart. Read/write failures are reported to
//! the caller and never panic; a failed load leaves current state intact.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LooperError, Result};
use crate::midi::{Event, RawMessage};

const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDocument {
    pub index: u8,
    pub notes: Vec<(f64, [u8; 3], Option<f64>)>,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsDocument {
    #[serde(rename = "__version__")]
    pub version: u32,
    pub bpm: u32,
    pub measures: u32,
    pub beat_per_measures: u32,
    pub port: usize,
    pub record_on_first_note: bool,
    pub quantize: u32,
    pub channels: [bool; 16],
    pub with_tick: bool,
    pub tracks: Vec<TrackDocument>,
}

impl TrackDocument {
    pub fn from_track(index: u8, notes: &[Event], muted: bool) -> Self {
        Self {
            index,
            notes: notes
                .iter()
                .map(|e| (e.clock, e.bytes.data, e.aux))
                .collect(),
            muted,
        }
    }

    pub fn into_notes(&self) -> Vec<Event> {
        self.notes
            .iter()
            .map(|(clock, bytes, aux)| Event::new(*clock, RawMessage::new(bytes), *aux))
            .collect()
    }
}

/// Write `doc` to `settings.json` in the working directory.
pub fn save(doc: &SettingsDocument) -> Result<()> {
    save_to(Path::new(SETTINGS_FILE), doc)
}

pub fn save_to(path: &Path, doc: &SettingsDocument) -> Result<()> {
    let json =
        serde_json::to_string_pretty(doc).map_err(|e| LooperError::Settings(e.to_string()))?;
    fs::write(path, json).map_err(|e| LooperError::Settings(e.to_string()))
}

/// Read and validate `settings.json` in the working directory.
pub fn load() -> Result<SettingsDocument> {
    load_from(Path::new(SETTINGS_FILE))
}

pub fn load_from(path: &Path) -> Result<SettingsDocument> {
    let contents = fs::read_to_string(path).map_err(|e| LooperError::Settings(e.to_string()))?;
    let doc: SettingsDocument =
        serde_json::from_str(&contents).map_err(|e| LooperError::Settings(e.to_string()))?;
    if doc.version != CURRENT_VERSION {
        return Err(LooperError::Settings(format!(
            "unsupported settings version {}",
            doc.version
        )));
    }
    Ok(doc)
}
