//! Rendering. Every function here reads [`UiState`] and never mutates it.

use super::help::draw_help;
use super::state::{FormField, UiState};
use crate::model::{Control, LineLevel, NotificationKind, RunState, Tab};
use crate::validators;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Wrap},
    Frame,
};

const SIDEBAR_WIDTH: u16 = 24;
const MAX_TOASTS: usize = 4;

fn key(k: &str) -> Span<'_> {
    Span::styled(k, Style::default().fg(Color::Magenta))
}

pub fn draw(area: Rect, f: &mut Frame, state: &UiState) {
    let columns = if state.sidebar_open {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)])
            .split(area)
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(0), Constraint::Min(0)])
            .split(area)
    };
    if state.sidebar_open {
        draw_sidebar(columns[0], f, state);
    }

    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(columns[1]);

    draw_breadcrumb(main[0], f, state);
    match state.tab {
        Tab::Validation => draw_validation(main[1], f, state),
        Tab::Results if state.detail.is_some() => draw_detail(main[1], f, state),
        Tab::Results => draw_results(main[1], f, state),
        Tab::Batch => draw_batch(main[1], f, state),
        Tab::Help => draw_help(main[1], f),
    }
    draw_footer(main[2], f, state);
    draw_toasts(area, f, state);
}

fn draw_sidebar(area: Rect, f: &mut Frame, state: &UiState) {
    let mut lines = vec![Line::from("")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let selected = *tab == state.tab;
        let style = if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let shortcut = if *tab == Tab::Help {
            "F1".to_string()
        } else {
            format!("^{}", i + 1)
        };
        lines.push(Line::from(vec![
            Span::styled(if selected { " > " } else { "   " }, style),
            Span::styled(format!("{:<16}", tab.title()), style),
            Span::styled(shortcut, Style::default().fg(Color::DarkGray)),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw(" Run: "),
        Span::styled(state.run_state.label(), run_state_style(state.run_state)),
    ]));

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("drs-validator"),
    );
    f.render_widget(p, area);
}

fn draw_breadcrumb(area: Rect, f: &mut Frame, state: &UiState) {
    let mut spans = vec![
        Span::styled("DRS", Style::default().fg(Color::Gray)),
        Span::styled(" › ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            state.tab.title(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    ];
    if state.tab == Tab::Results {
        if let Some(r) = &state.detail {
            spans.push(Span::styled(" › ", Style::default().fg(Color::DarkGray)));
            spans.push(Span::raw(r.id.clone()));
        }
    }
    let p = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(Line::from(format!(" {} ", state.server)).alignment(Alignment::Right)),
    );
    f.render_widget(p, area);
}

fn run_state_style(s: RunState) -> Style {
    match s {
        RunState::Idle => Style::default().fg(Color::Gray),
        RunState::Running => Style::default().fg(Color::Cyan),
        RunState::Completed => Style::default().fg(Color::Green),
        RunState::Failed => Style::default().fg(Color::Red),
    }
}

fn level_color(level: LineLevel) -> Color {
    match level {
        LineLevel::Error => Color::Red,
        LineLevel::Success => Color::Green,
        LineLevel::Warning => Color::Yellow,
        LineLevel::Info => Color::White,
    }
}

fn draw_validation(area: Rect, f: &mut Frame, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(FormField::ALL.len() as u16 + 5),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(area);

    draw_form(rows[0], f, state);
    draw_progress(rows[1], f, state);
    draw_output(rows[2], f, state);
}

fn draw_form(area: Rect, f: &mut Frame, state: &UiState) {
    let mut lines = Vec::new();
    for field in FormField::ALL {
        let focused = field == state.focus && state.tab == Tab::Validation;
        let value = field.value(&state.form);
        let marker = if focused { "> " } else { "  " };
        let label_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        let mut spans = vec![
            Span::styled(marker, label_style),
            Span::styled(format!("{:<12}", field.label()), label_style),
            Span::raw(value.to_string()),
        ];
        if focused {
            spans.push(Span::styled("▏", Style::default().fg(Color::Yellow)));
        }
        if let Some(err) = validators::field_error(field.key(), value) {
            spans.push(Span::styled(
                format!("  {err}"),
                Style::default().fg(Color::Red),
            ));
        }
        lines.push(Line::from(spans));
    }

    if !state.form.extra.is_empty() {
        let extras = state
            .form
            .extra
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<12}", "Extra"), Style::default().fg(Color::Gray)),
            Span::raw(extras),
        ]));
    } else {
        lines.push(Line::from(""));
    }

    let submit = if state.is_loading(Control::Submit) {
        Span::styled("Validating...", Style::default().fg(Color::Cyan))
    } else {
        Span::raw("Start validation")
    };
    let prevalidate = if state.is_loading(Control::Prevalidate) {
        Span::styled("Checking...", Style::default().fg(Color::Cyan))
    } else {
        Span::raw("Pre-validate")
    };
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("  "),
        key("Enter"),
        Span::raw(" "),
        submit,
        Span::raw("   "),
        key("Ctrl-P"),
        Span::raw(" "),
        prevalidate,
        Span::raw("   "),
        key("Ctrl-L"),
        Span::raw(" Clear output"),
    ]));

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Device Validation"),
    );
    f.render_widget(p, area);
}

fn draw_progress(area: Rect, f: &mut Frame, state: &UiState) {
    let ratio = (state.progress / 100.0).clamp(0.0, 1.0);
    let title = Line::from(vec![
        Span::raw(" "),
        Span::styled(state.run_state.label(), run_state_style(state.run_state)),
        Span::raw(if state.status.is_empty() { " " } else { " | " }),
        Span::raw(state.status.clone()),
        Span::raw(" "),
    ]);
    let g = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(run_state_style(state.run_state))
        .ratio(ratio)
        .label(format!("{:.0}%", ratio * 100.0));
    f.render_widget(g, area);
}

fn draw_output(area: Rect, f: &mut Frame, state: &UiState) {
    let visible = (area.height as usize).saturating_sub(2);
    let lines: Vec<Line> = if state.output.is_empty() {
        vec![
            Line::from(Span::styled("Ready", Style::default().fg(Color::Green))),
            Line::from(Span::styled(
                "Waiting for commands...",
                Style::default().fg(Color::DarkGray),
            )),
        ]
    } else {
        let end = state.output.len().saturating_sub(state.output_scroll);
        let start = end.saturating_sub(visible);
        state.output[start..end]
            .iter()
            .map(|l| {
                Line::from(vec![
                    Span::styled(format!("[{}] ", l.stamp), Style::default().fg(Color::DarkGray)),
                    Span::styled(l.text.clone(), Style::default().fg(level_color(l.level))),
                ])
            })
            .collect()
    };

    let title = if state.output_scroll > 0 {
        format!("Output (scrolled {} lines, PgDn to follow)", state.output_scroll)
    } else {
        "Output".to_string()
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_results(area: Rect, f: &mut Frame, state: &UiState) {
    let block = Block::default().borders(Borders::ALL).title(Line::from(vec![
        Span::raw(format!(
            " Results ({}/{}) ",
            if state.results.is_empty() {
                0
            } else {
                state.results_selected + 1
            },
            state.results.len()
        )),
    ]));

    if state.results.is_empty() {
        let msg = if state.results_loaded {
            "No validations available"
        } else {
            "Loading results..."
        };
        let p = Paragraph::new(Line::from(Span::styled(
            msg,
            Style::default().fg(Color::DarkGray),
        )))
        .alignment(Alignment::Center)
        .block(block);
        f.render_widget(p, area);
        return;
    }

    // Header row plus borders.
    let max_items = (area.height as usize).saturating_sub(3).max(1);
    let offset = {
        let mut offset = state
            .results_scroll_offset
            .min(state.results.len().saturating_sub(1));
        if state.results_selected < offset {
            offset = state.results_selected;
        } else if state.results_selected >= offset + max_items {
            offset = state.results_selected + 1 - max_items;
        }
        offset
    };

    let rows: Vec<Row> = state
        .results
        .iter()
        .enumerate()
        .skip(offset)
        .take(max_items)
        .map(|(i, r)| {
            let status_color = if r.status_label() == "Success" {
                Color::Green
            } else {
                Color::Red
            };
            let row = Row::new(vec![
                Cell::from(r.local_timestamp()),
                Cell::from(r.device()),
                Cell::from(r.scenario.clone()),
                Cell::from(Span::styled(
                    r.status_label(),
                    Style::default().fg(status_color),
                )),
                Cell::from(r.duration_label()),
            ]);
            if i == state.results_selected {
                row.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(19),
            Constraint::Length(21),
            Constraint::Min(12),
            Constraint::Length(8),
            Constraint::Length(10),
        ],
    )
    .header(
        Row::new(vec!["Date", "Device", "Scenario", "Status", "Duration"])
            .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD)),
    )
    .column_spacing(2)
    .block(block);
    f.render_widget(table, area);
}

fn draw_detail(area: Rect, f: &mut Frame, state: &UiState) {
    let Some(r) = &state.detail else {
        return;
    };
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Status:   ", Style::default().fg(Color::Gray)),
            Span::raw(r.status_label()),
        ]),
        Line::from(vec![
            Span::styled("Device:   ", Style::default().fg(Color::Gray)),
            Span::raw(r.device()),
        ]),
        Line::from(vec![
            Span::styled("Scenario: ", Style::default().fg(Color::Gray)),
            Span::raw(r.scenario.clone()),
        ]),
        Line::from(vec![
            Span::styled("Date:     ", Style::default().fg(Color::Gray)),
            Span::raw(r.local_timestamp()),
        ]),
        Line::from(vec![
            Span::styled("Duration: ", Style::default().fg(Color::Gray)),
            Span::raw(r.duration_label()),
        ]),
        Line::from(""),
    ];
    let json = serde_json::to_string_pretty(r).unwrap_or_else(|e| format!("<{e}>"));
    lines.extend(json.lines().map(|l| Line::from(l.to_string())));

    let p = Paragraph::new(lines)
        .scroll((state.detail_scroll.min(u16::MAX as usize) as u16, 0))
        .block(Block::default().borders(Borders::ALL).title(Line::from(vec![
            Span::raw(" Result "),
            key("Esc"),
            Span::raw(" back  "),
            key("d"),
            Span::raw(" download "),
        ])));
    f.render_widget(p, area);
}

fn draw_batch(area: Rect, f: &mut Frame, state: &UiState) {
    let uploading = state.is_loading(Control::Batch);
    let lines = vec![
        Line::from("Path to a batch command file to upload and execute on the server."),
        Line::from(""),
        Line::from(vec![
            Span::styled("File: ", Style::default().fg(Color::Yellow)),
            Span::raw(state.batch_path.clone()),
            Span::styled("▏", Style::default().fg(Color::Yellow)),
        ]),
        Line::from(""),
        if uploading {
            Line::from(Span::styled("Uploading...", Style::default().fg(Color::Cyan)))
        } else {
            Line::from(vec![key("Enter"), Span::raw(" Upload and execute")])
        },
    ];
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Batch Commands"));
    f.render_widget(p, area);
}

fn draw_footer(area: Rect, f: &mut Frame, state: &UiState) {
    let line = if state.info.is_empty() {
        Line::from(vec![
            key("Ctrl-B"),
            Span::raw(" sidebar  "),
            key("Tab"),
            Span::raw(" next view  "),
            key("F1"),
            Span::raw(" help  "),
            key("Ctrl-Q"),
            Span::raw(" quit"),
        ])
    } else {
        Line::from(vec![
            Span::styled("Info: ", Style::default().fg(Color::Gray)),
            Span::raw(state.info.clone()),
        ])
    };
    f.render_widget(Paragraph::new(line), area);
}

fn toast_color(kind: NotificationKind) -> Color {
    match kind {
        NotificationKind::Success => Color::Green,
        NotificationKind::Error => Color::Red,
        NotificationKind::Warning => Color::Yellow,
        NotificationKind::Info => Color::Cyan,
    }
}

/// Stack of notifications in the top-right corner, newest on top.
fn draw_toasts(area: Rect, f: &mut Frame, state: &UiState) {
    let width = area.width.min(50);
    if width < 10 {
        return;
    }
    let x = area.x + area.width - width;
    let mut y = area.y + 1;
    for n in state.toasts.visible(MAX_TOASTS) {
        let text_width = width.saturating_sub(2).max(1) as usize;
        let height = (n.message.chars().count().div_ceil(text_width) as u16).clamp(1, 3) + 2;
        if y + height > area.y + area.height {
            break;
        }
        let rect = Rect::new(x, y, width, height);
        let color = toast_color(n.kind);
        f.render_widget(Clear, rect);
        f.render_widget(
            Paragraph::new(n.message.clone())
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(color))
                        .title(Span::styled(
                            format!(" {} ", n.kind.title()),
                            Style::default().fg(color).add_modifier(Modifier::BOLD),
                        )),
                ),
            rect,
        );
        y += height;
    }
}
