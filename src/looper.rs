//! Session state, command dispatch, MIDI-in routing, and tempo/length
//! math. Ties `track`, `player`, `backend`, and `settings` together behind
//! one session mutex, per the concurrency model: the player thread and the
//! MIDI-in callback each take the lock only briefly.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::backend::MidiBackend;
use crate::error::{LooperError, Result};
use crate::midi::{self, RawMessage};
use crate::player::Player;
use crate::settings::{SettingsDocument, TrackDocument};
use crate::track::Track;

const MIN_BPM: u32 = 60;
const MAX_BPM: u32 = 240;
const MIN_MEASURES: u32 = 1;
const MAX_MEASURES: u32 = 24;
const QUANTIZE_STEPS: [u32; 7] = [0, 1, 2, 3, 4, 8, 16];

/// Everything the player thread, the MIDI-in callback, and the key
/// dispatcher all read or mutate. Lives behind one `Mutex`.
pub struct Session {
    tracks: BTreeMap<u8, Track>,
    active_track: Option<u8>,
    bpm: u32,
    beat_per_measures: u32,
    measures: u32,
    loop_length: f64,
    quantize: u32,
    channels: [bool; 16],
    record_on_first_note: bool,
    require_length: bool,
    length_start: Option<f64>,
    with_tick: bool,
    port: usize,
}

impl Session {
    fn new() -> Self {
        let mut s = Self {
            tracks: BTreeMap::new(),
            active_track: None,
            bpm: 120,
            beat_per_measures: 4,
            measures: 1,
            loop_length: 0.0,
            quantize: 0,
            channels: [true; 16],
            record_on_first_note: true,
            require_length: true,
            length_start: None,
            with_tick: false,
            port: 0,
        };
        s.recompute_length();
        s
    }

    fn beat_length(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    fn recompute_length(&mut self) {
        if !self.require_length {
            self.loop_length =
                self.measures as f64 * self.beat_per_measures as f64 * self.beat_length();
        }
    }

    fn quantize_step(&self) -> f64 {
        if self.quantize == 0 {
            0.0
        } else {
            self.beat_length() / self.quantize as f64
        }
    }

    fn track_mut(&mut self, index: u8) -> &mut Track {
        self.tracks.entry(index).or_insert_with(|| Track::new(index))
    }
}

/// Owns the session, the player, and the shared MIDI I/O. Cloned cheaply
/// (it's an `Arc` of its inner state) so the player thread, the MIDI-in
/// callback, and the key/UI loop can each hold a handle.
#[derive(Clone)]
pub struct Looper {
    session: Arc<Mutex<Session>>,
    player: Arc<Player>,
    midi_out: Arc<Mutex<Box<dyn MidiBackend>>>,
    midi_in: Arc<Mutex<Option<Box<dyn MidiBackend>>>>,
}

impl Looper {
    pub fn new(midi_out: Box<dyn MidiBackend>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            player: Arc::new(Player::new()),
            midi_out: Arc::new(Mutex::new(midi_out)),
            midi_in: Arc::new(Mutex::new(None)),
        }
    }

    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    fn send(&self, message: RawMessage) {
        let mut backend = self.midi_out.lock().unwrap();
        if let Err(e) = backend.send(message.as_slice()) {
            warn!(error = %e, "dropped outbound MIDI message");
        }
    }

    /// Drive the player thread. Blocks until `Player::request_quit` wakes
    /// it for the last time; callers spawn this on its own `std::thread`.
    pub fn run_player(&self) {
        let session_for_length = Arc::clone(&self.session);
        let session_for_beat = Arc::clone(&self.session);
        let session_for_tick = Arc::clone(&self.session);
        let session_for_play = Arc::clone(&self.session);
        let session_for_merge = Arc::clone(&self.session);
        let this = self.clone();

        self.player.run(
            move || session_for_length.lock().unwrap().loop_length,
            move || session_for_beat.lock().unwrap().beat_length(),
            move || session_for_tick.lock().unwrap().with_tick,
            move |start, end| {
                let mut session = session_for_play.lock().unwrap();
                let mut outgoing = Vec::new();
                for track in session.tracks.values_mut() {
                    track.play_window(start, end, |m| outgoing.push(m));
                }
                drop(session);
                for m in outgoing {
                    this.send(m);
                }
            },
            move || {
                session_for_merge.lock().unwrap().tracks.values_mut().for_each(Track::merge);
            },
            {
                let this = self.clone();
                move |m| this.send(m)
            },
        );
    }

    /// Stop playback and silence every track's currently active notes.
    fn stop_transport(&self) {
        self.player.stop();
        let mut outgoing = Vec::new();
        let mut session = self.session.lock().unwrap();
        for track in session.tracks.values_mut() {
            track.off(|m| outgoing.push(m));
        }
        drop(session);
        self.send(RawMessage::new(&[midi::SONG_STOP]));
        for m in outgoing {
            self.send(m);
        }
    }

    pub fn toggle_play(&self) {
        if self.player.is_playing() {
            self.stop_transport();
        } else {
            self.player.play(|| {});
            self.send(RawMessage::new(&[midi::SONG_START]));
        }
    }

    /// Emit the full all-sound-off sweep and stop the transport. After
    /// this returns no note can remain stuck on any channel.
    pub fn panic(&self) {
        self.stop_transport();
        for channel in 0..=15u8 {
            self.send(RawMessage::control_change(channel, midi::ALL_SOUND_OFF, 0));
            self.send(RawMessage::control_change(
                channel,
                midi::RESET_ALL_CONTROLLERS,
                0,
            ));
            for note in 0..=127u8 {
                self.send(RawMessage::note_off(channel, note));
            }
        }
    }

    pub fn reset(&self) {
        let mut session = self.session.lock().unwrap();
        session.tracks.clear();
        session.active_track = None;
        session.require_length = true;
        session.length_start = None;
        session.recompute_length();
    }

    /// Arm `index` for recording, toggling off an already-armed track.
    /// If `record_on_first_note` is false, starts the transport
    /// immediately and captures `length_start` while length isn't fixed.
    pub fn record(&self, index: u8) {
        let mut outgoing = Vec::new();
        let mut start_transport = false;
        {
            let mut session = self.session.lock().unwrap();
            if let Some(prev) = session.active_track {
                session.track_mut(prev).stop_recording();
                if prev == index {
                    session.active_track = None;
                    return;
                }
            }
            session.active_track = Some(index);
            session.track_mut(index).start_recording(|m| outgoing.push(m));
            if !session.record_on_first_note {
                start_transport = true;
                if session.require_length {
                    session.length_start = Some(0.0);
                }
            }
        }
        for m in outgoing {
            self.send(m);
        }
        if start_transport {
            self.player.play(|| {});
            self.send(RawMessage::new(&[midi::SONG_START]));
        }
    }

    /// Key-release counterpart of [`Looper::record`]: stop recording and,
    /// if this was the very first pass, fix `loop_length` from the
    /// measured span.
    pub fn record_after(&self, index: u8) {
        let deltatime = self.player.deltatime();
        let mut session = self.session.lock().unwrap();
        session.track_mut(index).stop_recording();
        if session.require_length {
            let start = session.length_start.unwrap_or(0.0);
            session.loop_length = (deltatime - start).max(0.01);
            session.require_length = false;
        }
        session.active_track = None;
    }

    pub fn stop_record(&self) {
        let mut session = self.session.lock().unwrap();
        let indices: Vec<u8> = session.tracks.keys().copied().collect();
        for i in indices {
            session.track_mut(i).stop_recording();
        }
        session.active_track = None;
    }

    pub fn mute(&self, index: u8) {
        let mut outgoing = Vec::new();
        let mut session = self.session.lock().unwrap();
        session.track_mut(index).toggle_mute(|m| outgoing.push(m));
        drop(session);
        for m in outgoing {
            self.send(m);
        }
    }

    pub fn toggle_channel(&self, channel: u8) {
        let mut session = self.session.lock().unwrap();
        let c = (channel as usize).min(15);
        session.channels[c] = !session.channels[c];
        debug!(channel = c, enabled = session.channels[c], "channel mask toggled");
    }

    pub fn increment_tempo(&self, delta: i32) {
        let mut session = self.session.lock().unwrap();
        let bpm = (session.bpm as i32 + delta).clamp(MIN_BPM as i32, MAX_BPM as i32);
        session.bpm = bpm as u32;
        session.recompute_length();
    }

    pub fn increment_measure(&self, delta: i32) {
        let mut session = self.session.lock().unwrap();
        let measures = (session.measures as i32 + delta).clamp(MIN_MEASURES as i32, MAX_MEASURES as i32);
        session.measures = measures as u32;
        session.recompute_length();
    }

    fn shift_quantize(&self, forward: bool) {
        let mut session = self.session.lock().unwrap();
        let pos = QUANTIZE_STEPS
            .iter()
            .position(|&q| q == session.quantize)
            .unwrap_or(0);
        let next = if forward {
            (pos + 1).min(QUANTIZE_STEPS.len() - 1)
        } else {
            pos.saturating_sub(1)
        };
        session.quantize = QUANTIZE_STEPS[next];
    }

    pub fn increase_quantize(&self) {
        self.shift_quantize(true);
    }

    pub fn decrease_quantize(&self) {
        self.shift_quantize(false);
    }

    pub fn toggle_tick(&self) {
        let mut session = self.session.lock().unwrap();
        session.with_tick = !session.with_tick;
    }

    pub fn toggle_record_on_first_note(&self) {
        let mut session = self.session.lock().unwrap();
        session.record_on_first_note = !session.record_on_first_note;
    }

    /// Dispatch one inbound MIDI message against the session. Invoked by
    /// the MIDI backend's callback thread; must return quickly.
    pub fn midi_in_callback(&self, message: &[u8], delta: f64) {
        if message.first() == Some(&midi::SONG_START) {
            if !self.player.is_playing() {
                self.player.play(|| {});
                self.send(RawMessage::new(&[midi::SONG_START]));
            }
            return;
        }
        if message.first() == Some(&midi::SONG_STOP) {
            if self.player.is_playing() {
                self.stop_transport();
            }
            return;
        }
        if message.len() < 3 {
            return;
        }
        let bytes = RawMessage::new(message);
        if bytes.status() != midi::NOTE_ON {
            return;
        }

        let mut session = self.session.lock().unwrap();
        if !session.channels[bytes.channel() as usize] {
            return;
        }
        let Some(active) = session.active_track else {
            return;
        };

        // Start the transport (which re-anchors the player's time_start)
        // before deltatime() is read below, or the first note of a
        // record_on_first_note pass gets a clock measured against the
        // stale anchor from the previous play session.
        let need_start = session.record_on_first_note && !self.player.is_playing();
        if need_start && session.require_length {
            session.length_start = Some(0.0);
        }
        drop(session);
        if need_start {
            self.player.play(|| {});
            self.send(RawMessage::new(&[midi::SONG_START]));
        }

        let mut session = self.session.lock().unwrap();
        let length = session.loop_length;
        let deltatime = self.player.deltatime();
        let clock = if length > 0.0 {
            deltatime.rem_euclid(length)
        } else {
            deltatime
        };
        let step = session.quantize_step();
        session.track_mut(active).record_on(clock, bytes, step, Some(delta));
    }

    /// Reinstall the MIDI-in callback and reopen the output port after a
    /// port switch. No-op for either side that hasn't been installed.
    fn switch_port(&self, port: usize) {
        {
            let mut out = self.midi_out.lock().unwrap();
            out.close();
            if let Err(e) = out.open_out(port) {
                warn!(error = %e, port, "failed to reopen MIDI output on port switch");
            }
        }
        let mut midi_in = self.midi_in.lock().unwrap();
        if let Some(backend) = midi_in.as_mut() {
            backend.close();
            let this = self.clone();
            let callback: crate::backend::InCallback =
                Box::new(move |message, delta| this.midi_in_callback(message, delta));
            if let Err(e) = backend.open_in(port, callback) {
                warn!(error = %e, port, "failed to reopen MIDI input on port switch");
            }
        }
    }

    /// Take ownership of the MIDI-input backend, open it on the current
    /// port, and install the session's callback. Called once at startup;
    /// `switch_port` reinstalls the same callback on a new port.
    pub fn install_midi_in(&self, mut backend: Box<dyn MidiBackend>) -> Result<()> {
        let port = self.session.lock().unwrap().port;
        let this = self.clone();
        let callback: crate::backend::InCallback =
            Box::new(move |message, delta| this.midi_in_callback(message, delta));
        backend.open_in(port, callback)?;
        *self.midi_in.lock().unwrap() = Some(backend);
        Ok(())
    }

    pub fn midi_next_port(&self, backend_ports: usize) {
        if backend_ports == 0 {
            return;
        }
        let port = {
            let mut session = self.session.lock().unwrap();
            session.port = (session.port + 1) % backend_ports;
            session.port
        };
        self.switch_port(port);
    }

    pub fn midi_prev_port(&self, backend_ports: usize) {
        if backend_ports == 0 {
            return;
        }
        let port = {
            let mut session = self.session.lock().unwrap();
            session.port = (session.port + backend_ports - 1) % backend_ports;
            session.port
        };
        self.switch_port(port);
    }

    pub fn port(&self) -> usize {
        self.session.lock().unwrap().port
    }

    pub fn save_settings(&self) -> Result<()> {
        let session = self.session.lock().unwrap();
        let doc = SettingsDocument {
            version: 1,
            bpm: session.bpm,
            measures: session.measures,
            beat_per_measures: session.beat_per_measures,
            port: session.port,
            record_on_first_note: session.record_on_first_note,
            quantize: session.quantize,
            channels: session.channels,
            with_tick: session.with_tick,
            tracks: session
                .tracks
                .values()
                .map(|t| TrackDocument::from_track(t.index, t.notes(), t.is_muted()))
                .collect(),
        };
        drop(session);
        crate::settings::save(&doc)
    }

    /// Load and apply a settings document. Validates every track index and
    /// builds the replacement tracks map off to the side first, so a
    /// malformed document leaves the live session completely untouched
    /// rather than overwriting it partway through.
    pub fn load_settings(&self) -> Result<()> {
        let doc = crate::settings::load()?;
        for track_doc in &doc.tracks {
            if track_doc.index == 0 || track_doc.index > 8 {
                return Err(LooperError::InvalidTrackIndex(track_doc.index));
            }
        }
        let mut tracks = BTreeMap::new();
        for track_doc in &doc.tracks {
            let mut track = Track::new(track_doc.index);
            track.load_notes(track_doc.into_notes());
            if track_doc.muted {
                track.toggle_mute(|_| {});
            }
            tracks.insert(track_doc.index, track);
        }

        let mut session = self.session.lock().unwrap();
        session.bpm = doc.bpm;
        session.measures = doc.measures;
        session.beat_per_measures = doc.beat_per_measures;
        session.port = doc.port;
        session.record_on_first_note = doc.record_on_first_note;
        session.quantize = doc.quantize;
        session.channels = doc.channels;
        session.with_tick = doc.with_tick;
        session.require_length = false;
        session.recompute_length();
        session.tracks = tracks;
        Ok(())
    }

    /// Reset one track's recorded content without touching transport or
    /// arming state. Bound to the record keys' reset-modifier chord.
    pub fn reset_track(&self, index: u8) {
        let mut session = self.session.lock().unwrap();
        session.track_mut(index).reset();
    }
}

/// Read-only snapshot of the fields a UI needs to redraw, collected under
/// the session lock once per frame rather than borrowing it for the whole
/// render.
pub struct Snapshot {
    pub playing: bool,
    pub bpm: u32,
    pub measures: u32,
    pub quantize: u32,
    pub with_tick: bool,
    pub port: usize,
    pub loop_length: f64,
    pub active_track: Option<u8>,
    pub tracks: Vec<TrackSnapshot>,
}

pub struct TrackSnapshot {
    pub index: u8,
    pub recording: bool,
    pub muted: bool,
    pub note_count: usize,
}

impl Looper {
    pub fn snapshot(&self) -> Snapshot {
        let session = self.session.lock().unwrap();
        Snapshot {
            playing: self.player.is_playing(),
            bpm: session.bpm,
            measures: session.measures,
            quantize: session.quantize,
            with_tick: session.with_tick,
            port: session.port,
            loop_length: session.loop_length,
            active_track: session.active_track,
            tracks: session
                .tracks
                .values()
                .map(|t| TrackSnapshot {
                    index: t.index,
                    recording: t.is_recording(),
                    muted: t.is_muted(),
                    note_count: t.notes().len(),
                })
                .collect(),
        }
    }
}
