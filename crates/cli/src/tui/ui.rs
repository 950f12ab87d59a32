// SPDX-License-Identifier: Apache-2.0

//! Rendering for the TUI

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs};
use ratatui::Frame;

use super::app::{App, Screen};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3)])
        .split(frame.area());

    draw_header(frame, chunks[0], app);
    draw_content(frame, chunks[1], app);
    draw_footer(frame, chunks[2], app);
}

fn draw_header(frame: &mut Frame, area: Rect, app: &App) {
    let titles = ["Dashboard", "Streams", "Limiter"].map(Line::from);
    let index = match app.current_screen {
        Screen::Dashboard => 0,
        Screen::Streams => 1,
        Screen::Limiter => 2,
    };
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title("Loudness Balancer"))
        .select(index)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, area);
}

fn draw_content(frame: &mut Frame, area: Rect, app: &App) {
    match app.current_screen {
        Screen::Dashboard => draw_dashboard(frame, area, app),
        Screen::Streams => draw_streams(frame, area, app),
        Screen::Limiter => draw_limiter(frame, area, app),
    }
}

fn draw_dashboard(frame: &mut Frame, area: Rect, app: &App) {
    let stream_count = app.stream_count();
    let solo = app
        .streams
        .as_ref()
        .and_then(|v| v["solo_stream"].as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string());

    let text = vec![
        Line::from(format!("registered streams: {stream_count}")),
        Line::from(format!("solo: {solo}")),
        Line::from(""),
        Line::from("press n/p to switch screens, b to run a balance pass now"),
    ];
    let block = Block::default().borders(Borders::ALL).title("Dashboard");
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_streams(frame: &mut Frame, area: Rect, app: &App) {
    let empty = Vec::new();
    let streams = app
        .streams
        .as_ref()
        .and_then(|v| v["streams"].as_array())
        .unwrap_or(&empty);

    let header = Row::new(vec!["Label", "Status", "Gain", "Momentary", "Short-term", "Integrated", "Solo"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = streams
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let label = s["label"].as_str().unwrap_or("-").to_string();
            let status = s["status"].as_str().unwrap_or("-").to_string();
            let gain = format!("{:.1} dB", s["gain_db"].as_f64().unwrap_or(0.0));
            let reading = &s["reading"];
            let momentary = fmt_lufs(reading["momentary"].as_f64());
            let short_term = fmt_lufs(reading["short_term"].as_f64());
            let integrated = fmt_lufs(reading["integrated"].as_f64());
            let solo = if s["solo"].as_bool().unwrap_or(false) { "*" } else { "" };

            let style = if i == app.selected_index {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };

            Row::new(vec![
                Cell::from(label),
                Cell::from(status),
                Cell::from(gain),
                Cell::from(momentary),
                Cell::from(short_term),
                Cell::from(integrated),
                Cell::from(solo),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(16),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(11),
        Constraint::Length(11),
        Constraint::Length(11),
        Constraint::Length(4),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Streams"));
    frame.render_widget(table, area);
}

fn fmt_lufs(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.1}"),
        _ => "-inf".to_string(),
    }
}

fn draw_limiter(frame: &mut Frame, area: Rect, app: &App) {
    let limiter = app.limiter.as_ref().map(|v| &v["limiter"]);

    let text = match limiter {
        Some(l) => vec![
            Line::from(format!("enabled: {}", l["enabled"].as_bool().unwrap_or(false))),
            Line::from(format!("threshold: {:.1} dB", l["threshold_db"].as_f64().unwrap_or(0.0))),
            Line::from(format!("knee: {:.1} dB", l["knee_db"].as_f64().unwrap_or(0.0))),
            Line::from(format!("ratio: {:.1}:1", l["ratio"].as_f64().unwrap_or(0.0))),
            Line::from(format!("attack: {:.1} ms", l["attack_ms"].as_f64().unwrap_or(0.0))),
            Line::from(format!("release: {:.1} ms", l["release_ms"].as_f64().unwrap_or(0.0))),
        ],
        None => vec![Line::from("no limiter data yet")],
    };

    let block = Block::default().borders(Borders::ALL).title("Limiter");
    frame.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_footer(frame: &mut Frame, area: Rect, app: &App) {
    let help = match app.current_screen {
        Screen::Streams => {
            "q: quit | n/p: screen | j/k: select | +/-: gain | s: solo | x: clear solo | b: balance now"
        }
        _ => "q: quit | n/p: screen | b: balance now",
    };

    let line = if let Some(error) = &app.error_message {
        Line::from(Span::styled(format!("error: {error}"), Style::default().fg(Color::Red)))
    } else {
        Line::from(help)
    };

    frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
}
