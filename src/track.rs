//! One loop slot: records incoming events, plays them back on a cursor
//! window, and keeps the sounding-note bookkeeping that guarantees no
//! stuck notes.
use std::collections::HashSet;

use crate::midi::{Event, RawMessage};

/// Latency compensation subtracted from every recorded clock before it is
/// (optionally) quantized.
pub const LAG: f64 = 0.010;

/// Snap `clock` to the nearest multiple of `step`, ties rounding up.
/// `step <= 0.0` is a no-op (quantization disabled). Idempotent: snapping
/// an already-snapped value returns it unchanged.
pub fn snap_to_grid(clock: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return clock;
    }
    let diff = clock.rem_euclid(step);
    if diff <= step / 2.0 {
        clock - diff
    } else {
        clock + (step - diff)
    }
}

/// Subtract latency compensation and snap to the quantize grid, the full
/// pipeline `Track::record_on` applies to an incoming clock.
pub fn quantize_clock(clock: f64, step: f64) -> f64 {
    snap_to_grid(clock - LAG, step)
}

/// One of the 8 recordable loop slots.
pub struct Track {
    pub index: u8,
    /// Committed loop content, sorted ascending by `clock`.
    notes: Vec<Event>,
    /// Events recorded in the current pass, not yet visible to playback.
    pending: Vec<Event>,
    recording: bool,
    muted: bool,
    /// `(channel, note)` pairs sounding because of a NOTE_ON this track
    /// emitted whose NOTE_OFF hasn't gone out yet.
    active: HashSet<(u8, u8)>,
}

impl Track {
    pub fn new(index: u8) -> Self {
        Self {
            index,
            notes: Vec::new(),
            pending: Vec::new(),
            recording: false,
            muted: false,
            active: HashSet::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn notes(&self) -> &[Event] {
        &self.notes
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    pub fn active(&self) -> &HashSet<(u8, u8)> {
        &self.active
    }

    /// Replace committed `notes` wholesale, e.g. when restoring from a
    /// settings document. Callers are responsible for pre-sorting; this
    /// re-sorts defensively to preserve the `notes`-is-sorted invariant.
    pub fn load_notes(&mut self, mut notes: Vec<Event>) {
        notes.sort_by(|a, b| a.clock.partial_cmp(&b.clock).unwrap());
        self.notes = notes;
    }

    /// Record one event into `pending`, applying quantization if `step >
    /// 0.0`. Ignored if the track isn't recording or the message isn't a
    /// note on/off.
    pub fn record_on(&mut self, clock: f64, bytes: RawMessage, step: f64, aux: Option<f64>) {
        if !self.recording {
            return;
        }
        if !bytes.is_note_on() && !bytes.is_note_off() {
            return;
        }
        let clock = quantize_clock(clock, step);
        self.pending.push(Event::new(clock, bytes, aux));
    }

    /// Begin a recording pass. Drains `active` first so dangling playback
    /// notes from before arming can never hang.
    pub fn start_recording(&mut self, mut send: impl FnMut(RawMessage)) {
        self.recording = true;
        self.off(&mut send);
    }

    /// End a recording pass and fold `pending` into `notes`.
    pub fn stop_recording(&mut self) {
        self.recording = false;
        self.merge();
    }

    /// Concatenate `pending` into `notes`, stable-sort by clock, clear
    /// `pending`. The only safe merge point for pending recordings (loop
    /// wrap or explicit stop).
    pub fn merge(&mut self) {
        self.notes.append(&mut self.pending);
        self.notes
            .sort_by(|a, b| a.clock.partial_cmp(&b.clock).unwrap());
    }

    /// Clear both `notes` and `pending`; the track remains but is empty.
    pub fn reset(&mut self) {
        self.notes.clear();
        self.pending.clear();
    }

    /// Invert `muted`. Draining `active` on the off->on transition is what
    /// keeps mute silence-safe.
    pub fn toggle_mute(&mut self, mut send: impl FnMut(RawMessage)) {
        self.muted = !self.muted;
        if self.muted {
            self.off(&mut send);
        }
    }

    /// Emit every event in `notes` with `start <= clock <= end`, updating
    /// `active` as NOTE_ONs/NOTE_OFFs go out. No-op while muted.
    ///
    /// `start == 0.0` is treated as `start == -epsilon` so an event
    /// recorded exactly at clock 0 fires on the first window of each loop
    /// iteration rather than being skipped by a strict `>=`.
    pub fn play_window(&mut self, start: f64, end: f64, mut send: impl FnMut(RawMessage)) {
        if self.muted {
            return;
        }
        let start = if start == 0.0 { -f64::EPSILON } else { start };
        for event in &self.notes {
            if event.clock >= start && event.clock <= end {
                let bytes = event.bytes;
                if bytes.is_note_on() {
                    self.active.insert((bytes.channel(), bytes.note()));
                } else if bytes.is_note_off() {
                    self.active.remove(&(bytes.channel(), bytes.note()));
                }
                send(bytes);
            }
        }
    }

    /// Emit a NOTE_OFF for every currently active note, then clear
    /// `active`. Called on mute, stop, panic, and arming.
    pub fn off(&mut self, mut send: impl FnMut(RawMessage)) {
        for (channel, note) in self.active.drain() {
            send(RawMessage::note_off(channel, note));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::RawMessage;

    #[test]
    fn quantize_snaps_to_nearest_step_ties_up() {
        // bpm=120 -> beat_length=0.5, quantize=4 -> step=0.125, LAG=0.01
        let step = 0.125;
        assert!((quantize_clock(0.137, step) - 0.125).abs() < 1e-9);
        assert!((quantize_clock(0.200, step) - 0.25).abs() < 1e-9);
        assert!(quantize_clock(0.000, step) < 0.0);
    }

    #[test]
    fn quantize_is_idempotent() {
        let step = 0.125;
        for c in [0.0, 0.05, 0.137, 0.2, 0.49, -0.01] {
            let once = snap_to_grid(c, step);
            let twice = snap_to_grid(once, step);
            assert!((twice - once).abs() < 1e-9);
        }
    }

    #[test]
    fn start_recording_drains_active_notes() {
        let mut t = Track::new(1);
        t.active.insert((0, 60));
        let mut sent = Vec::new();
        t.start_recording(|m| sent.push(m));
        assert_eq!(sent, vec![RawMessage::note_off(0, 60)]);
        assert!(t.active.is_empty());
    }

    #[test]
    fn merge_sorts_by_clock() {
        let mut t = Track::new(1);
        t.recording = true;
        t.record_on(0.5, RawMessage::note_on(0, 60, 100), 0.0, None);
        t.record_on(0.1, RawMessage::note_on(0, 61, 100), 0.0, None);
        t.merge();
        let clocks: Vec<f64> = t.notes().iter().map(|e| e.clock).collect();
        assert!(clocks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn play_window_tracks_active_and_skips_unmatched_off() {
        let mut t = Track::new(1);
        t.load_notes(vec![
            Event::new(0.0, RawMessage::note_on(0, 60, 100), None),
            Event::new(1.0, RawMessage::note_off(0, 61), None),
        ]);
        let mut sent = Vec::new();
        t.play_window(0.0, 1.0, |m| sent.push(m));
        assert_eq!(sent.len(), 2);
        assert!(t.active().contains(&(0, 60)));
    }

    #[test]
    fn play_window_zero_start_includes_clock_zero_event() {
        let mut t = Track::new(1);
        t.load_notes(vec![Event::new(0.0, RawMessage::note_on(0, 60, 100), None)]);
        let mut sent = Vec::new();
        t.play_window(0.0, 0.5, |m| sent.push(m));
        assert_eq!(sent.len(), 1);
    }

    #[test]
    fn toggle_mute_off_drains_active() {
        let mut t = Track::new(1);
        t.active.insert((2, 64));
        let mut sent = Vec::new();
        t.toggle_mute(|m| sent.push(m));
        assert!(t.is_muted());
        assert_eq!(sent, vec![RawMessage::note_off(2, 64)]);
    }

    #[test]
    fn muted_track_emits_nothing_on_play_window() {
        let mut t = Track::new(1);
        t.load_notes(vec![Event::new(0.0, RawMessage::note_on(0, 60, 100), None)]);
        t.muted = true;
        let mut sent = Vec::new();
        t.play_window(0.0, 1.0, |m| sent.push(m));
        assert!(sent.is_empty());
    }
}
