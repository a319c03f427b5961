//! TUI dashboard for looplet: transport bar, a track grid, and a help
//! bar. Keyboard polling is handled by `looplet::backend::keyboard`; this
//! module only renders state that the looper has already mutated.
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use looplet::looper::Snapshot;

pub fn render(frame: &mut Frame, state: &Snapshot) {
    let area = frame.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

    render_transport(frame, chunks[0], state);
    render_tracks(frame, chunks[1], state);
    render_help(frame, chunks[2]);
}

fn render_transport(frame: &mut Frame, area: Rect, state: &Snapshot) {
    let status = if state.playing { "PLAYING" } else { "STOPPED" };
    let status_color = if state.playing { Color::Green } else { Color::DarkGray };
    let line = Line::from(vec![
        Span::styled(status, Style::default().fg(status_color).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "  bpm={}  measures={}  quantize={}  tick={}  port={}  loop={:.2}s",
            state.bpm, state.measures, state.quantize, state.with_tick, state.port, state.loop_length
        )),
    ]);
    let block = Block::default().title(" Transport ").borders(Borders::ALL);
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_tracks(frame: &mut Frame, area: Rect, state: &Snapshot) {
    let block = Block::default().title(" Tracks ").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = state
        .tracks
        .iter()
        .map(|t| {
            let mut spans = vec![Span::raw(format!("{}: {:>4} notes  ", t.index, t.note_count))];
            if state.active_track == Some(t.index) {
                spans.push(Span::styled("ARMED ", Style::default().fg(Color::Red)));
            }
            if t.recording {
                spans.push(Span::styled("REC ", Style::default().fg(Color::Red)));
            }
            if t.muted {
                spans.push(Span::styled("MUTE", Style::default().fg(Color::DarkGray)));
            }
            Line::from(spans)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        " [space] play/stop  [esc] panic  [r] reset  [z..,] record  [a..k] mute  [1-8] channel  [f12/f11] save/load",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, area);
}
