//! Benchmarks for the realtime-hot path: quantizing a recorded clock and
//! replaying a track's playback window.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use looplet::midi::{Event, RawMessage};
use looplet::track::{quantize_clock, Track};

fn bench_quantize(c: &mut Criterion) {
    let step = 0.125;
    c.bench_function("quantize_clock", |b| {
        b.iter(|| quantize_clock(black_box(0.2371), black_box(step)))
    });
}

fn bench_play_window(c: &mut Criterion) {
    let mut track = Track::new(1);
    let mut notes = Vec::new();
    for i in 0..256 {
        let clock = i as f64 * 0.0078125;
        notes.push(Event::new(clock, RawMessage::note_on(0, 60, 100), None));
        notes.push(Event::new(clock + 0.004, RawMessage::note_off(0, 60), None));
    }
    track.load_notes(notes);

    c.bench_function("track_play_window_full_loop", |b| {
        b.iter(|| {
            track.play_window(black_box(0.0), black_box(2.0), |m| {
                black_box(m);
            });
        })
    });
}

criterion_group!(benches, bench_quantize, bench_play_window);
criterion_main!(benches);
