//! Drives the monotonic time cursor and replays every track's window each
//! tick. Runs on its own `std::thread`; blocks on a condvar while stopped
//! so the idle cost is zero.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::midi::RawMessage;

const TICK_SLEEP: Duration = Duration::from_millis(1);
const TICK_CHANNEL: u8 = 9;
const TICK_NOTE: u8 = 42;
const TICK_VELOCITY: u8 = 50;

/// The small, frequently-touched slice of transport state the player
/// thread and the command dispatcher both need: time anchor and the
/// one-shot restart flag. Kept in its own mutex, separate from the larger
/// session lock, so `play()`/`stop()` never contend with track mutation.
struct Clock {
    time_start: Instant,
    restart: bool,
}

pub struct Player {
    playing: AtomicBool,
    quit: AtomicBool,
    clock: Mutex<Clock>,
    condvar: Condvar,
    park: Mutex<()>,
}

impl Player {
    pub fn new() -> Self {
        Self {
            playing: AtomicBool::new(false),
            quit: AtomicBool::new(false),
            clock: Mutex::new(Clock {
                time_start: Instant::now(),
                restart: false,
            }),
            condvar: Condvar::new(),
            park: Mutex::new(()),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Seconds elapsed since the current play session's anchor. Meaningless
    /// (but harmless) while stopped.
    pub fn deltatime(&self) -> f64 {
        self.clock.lock().unwrap().time_start.elapsed().as_secs_f64()
    }

    /// Start the transport if not already running: anchors `time_start`,
    /// requests a cursor restart on the player thread's next iteration,
    /// and wakes it up.
    pub fn play(&self, mut emit_song_start: impl FnMut()) {
        if self.is_playing() {
            return;
        }
        {
            let mut clock = self.clock.lock().unwrap();
            clock.time_start = Instant::now();
            clock.restart = true;
        }
        self.playing.store(true, Ordering::Release);
        let _guard = self.park.lock().unwrap();
        self.condvar.notify_all();
        drop(_guard);
        emit_song_start();
    }

    /// Stop the transport. The caller is responsible for emitting
    /// SONG_STOP and draining every track's active notes before or after
    /// this call completes (the looper coordinates that under the session
    /// lock so it can't race the player thread's next iteration).
    pub fn stop(&self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.playing.store(false, Ordering::Release);
        true
    }

    pub fn toggle_play(&self, emit_song_start: impl FnMut(), mut emit_song_stop: impl FnMut()) {
        if self.is_playing() {
            if self.stop() {
                emit_song_stop();
            }
        } else {
            self.play(emit_song_start);
        }
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
        let _guard = self.park.lock().unwrap();
        self.condvar.notify_all();
    }

    fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    fn wait_until_playing(&self) {
        let guard = self.park.lock().unwrap();
        let _unused = self
            .condvar
            .wait_while(guard, |_| !self.is_playing() && !self.should_quit())
            .unwrap();
    }

    /// The player thread body. `loop_length` and `with_tick` are read
    /// fresh every iteration via the provided accessor so tempo/measure
    /// edits take effect without restarting the thread; `play_window` and
    /// `merge_all` are callbacks into the session so the player never
    /// needs to know about the tracks map directly.
    pub fn run(
        &self,
        loop_length: impl Fn() -> f64,
        beat_length: impl Fn() -> f64,
        with_tick: impl Fn() -> bool,
        mut play_window: impl FnMut(f64, f64),
        mut merge_all: impl FnMut(),
        mut send: impl FnMut(RawMessage),
    ) {
        let mut prev_cursor = 0.0f64;
        let mut tick_accum = 0.0f64;

        while !self.should_quit() {
            if !self.is_playing() {
                self.wait_until_playing();
                continue;
            }

            {
                let mut clock = self.clock.lock().unwrap();
                if clock.restart {
                    prev_cursor = 0.0;
                    tick_accum = 0.0;
                    clock.restart = false;
                }
            }

            std::thread::sleep(TICK_SLEEP);

            let length = loop_length();
            if length <= 0.0 {
                continue;
            }
            let now = self.deltatime();
            let cursor = now.rem_euclid(length);

            if now - tick_accum > beat_length() {
                if with_tick() {
                    send(RawMessage::note_off(TICK_CHANNEL, TICK_NOTE));
                    send(RawMessage::note_on(TICK_CHANNEL, TICK_NOTE, TICK_VELOCITY));
                }
                tick_accum = now;
            }

            if cursor > prev_cursor {
                play_window(prev_cursor, cursor);
            } else {
                play_window(prev_cursor, length);
                merge_all();
                play_window(0.0, cursor);
            }
            prev_cursor = cursor;
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_is_a_noop_when_already_playing() {
        let p = Player::new();
        let mut starts = 0;
        p.play(|| starts += 1);
        p.play(|| starts += 1);
        assert_eq!(starts, 1);
    }

    #[test]
    fn stop_is_a_noop_when_not_playing() {
        let p = Player::new();
        assert!(!p.stop());
    }

    #[test]
    fn toggle_play_flips_state() {
        let p = Player::new();
        p.toggle_play(|| {}, || {});
        assert!(p.is_playing());
        p.toggle_play(|| {}, || {});
        assert!(!p.is_playing());
    }
}
