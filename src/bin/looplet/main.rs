//! looplet - realtime multi-track MIDI looper
//!
//! Run with: cargo run --bin looplet

mod ui;

use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

use looplet::backend::keyboard::{CrosstermKeyboard, KeyboardBackend};
use looplet::backend::midi_midir::MidirBackend;
use looplet::backend::MidiBackend;
use looplet::commands::{Command, Dispatcher};
use looplet::Looper;

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut midi_out = MidirBackend::new();
    let ports = midi_out.list_ports();
    if ports.is_empty() {
        return Err(color_eyre::eyre::eyre!("no MIDI output ports available"));
    }
    let port_count = ports.len();
    midi_out
        .open_out(0)
        .wrap_err("failed to open MIDI output port")?;

    let looper = Looper::new(Box::new(midi_out));

    let midi_in = MidirBackend::new();
    if !midi_in.list_ports().is_empty() {
        if let Err(e) = looper.install_midi_in(Box::new(midi_in)) {
            tracing::warn!(error = %e, "failed to open MIDI input port, continuing without live input");
        }
    }

    let player_looper = looper.clone();
    std::thread::spawn(move || player_looper.run_player());

    let terminal = ratatui::init();
    let result = run_ui(terminal, looper.clone(), port_count);
    ratatui::restore();

    looper.panic();
    looper.player().request_quit();

    result
}

fn run_ui(mut terminal: ratatui::DefaultTerminal, looper: Looper, port_count: usize) -> Result<()> {
    let mut keyboard = CrosstermKeyboard::new().wrap_err("failed to initialize keyboard")?;
    let mut dispatcher = Dispatcher::new();

    loop {
        let snapshot = looper.snapshot();
        terminal.draw(|frame| ui::render(frame, &snapshot))?;

        let Some(event) = keyboard.poll(Duration::from_millis(16)) else {
            continue;
        };
        let Some(command) = dispatcher.dispatch(event) else {
            continue;
        };
        apply(&looper, command, port_count);
    }
}

fn apply(looper: &Looper, command: Command, port_count: usize) {
    match command {
        Command::Reset => looper.reset(),
        Command::Record(index) => looper.record(index),
        Command::RecordAfter(index) => looper.record_after(index),
        Command::ResetTrack(index) => looper.reset_track(index),
        Command::Mute(index) => looper.mute(index),
        Command::ToggleChannel(channel) => looper.toggle_channel(channel),
        Command::IncrementTempo(delta) => looper.increment_tempo(delta),
        Command::IncrementMeasure(delta) => looper.increment_measure(delta),
        Command::DecreaseQuantize => looper.decrease_quantize(),
        Command::IncreaseQuantize => looper.increase_quantize(),
        Command::MidiPrevPort => looper.midi_prev_port(port_count),
        Command::MidiNextPort => looper.midi_next_port(port_count),
        Command::SaveSettings => {
            if let Err(e) = looper.save_settings() {
                tracing::error!(error = %e, "failed to save settings");
            }
        }
        Command::LoadSettings => {
            if let Err(e) = looper.load_settings() {
                tracing::error!(error = %e, "failed to load settings");
            }
        }
        Command::ToggleTick => looper.toggle_tick(),
        Command::ToggleRecordOnFirstNote => looper.toggle_record_on_first_note(),
        Command::StopRecord => looper.stop_record(),
        Command::TogglePlay => looper.toggle_play(),
        Command::Panic => looper.panic(),
    }
}
