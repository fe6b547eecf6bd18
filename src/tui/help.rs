use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Simulation:"),
        key_line("p", "Play / pause"),
        key_line("space", "Pause"),
        key_line("t", "Stop"),
        key_line("3", "Toggle 3D"),
        key_line("+ / -", "Move the 3D slider"),
        key_line("c", "Screenshot (PNG)"),
        key_line("y", "Copy screenshot or export path to clipboard"),
        key_line("v", "Toggle auto-save"),
        key_line("tab", "Switch tabs"),
        key_line("?", "Show this help"),
        key_line("q / Ctrl-C", "Quit"),
        Line::from(""),
        Line::from("Console buttons (Simulator tab):"),
        key_line("arrows", "D-pad"),
        key_line("x / z", "A / B"),
        key_line("s / a", "X / Y"),
        key_line("[ / ]", "L / R"),
        key_line("Enter", "START"),
        key_line("Backspace", "SELECT"),
        Line::from(""),
        Line::from("Runs tab:"),
        key_line("↑/↓ or j/k", "Navigate"),
        key_line("e", "Export selected as JSON"),
        key_line("d", "Delete selected"),
        key_line("r", "Refresh"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
