use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn bind(keys: &str, what: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{keys:<14}"), Style::default().fg(Color::Magenta)),
        Span::raw(what.to_string()),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        bind("Ctrl-Q/Ctrl-C", "Quit"),
        bind("Ctrl-B", "Toggle sidebar"),
        bind("Ctrl-1/2/3", "Validation / Results / Batch (Alt-1/2/3 also work)"),
        bind("Tab/Shift-Tab", "Next / previous view"),
        bind("F1", "Show this help"),
        bind("Esc", "Close sidebar on narrow terminals, leave detail view"),
        bind("Ctrl-X", "Dismiss newest notification"),
        Line::from(""),
        Line::from("Validation:"),
        bind("↑/↓", "Move between fields"),
        bind("Enter", "Start validation"),
        bind("Ctrl-P", "Pre-validate device connection"),
        bind("Ctrl-L", "Clear output"),
        bind("PgUp/PgDn", "Scroll output"),
        Line::from(""),
        Line::from("Results:"),
        bind("↑/↓ or j/k", "Navigate"),
        bind("Enter/v", "View selected result"),
        bind("d", "Download selected result as JSON"),
        bind("e", "Export all results as CSV"),
        bind("r", "Refresh"),
        bind("y", "Copy last saved path to clipboard"),
        bind("q", "Quit"),
        Line::from(""),
        Line::from("Batch:"),
        bind("Enter", "Upload and execute the file"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
