use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use super::styles;
use crate::app::App;
use crate::buffer::BufferKind;

const VIEWS: [(&str, BufferKind); 2] = [("1", BufferKind::Status), ("2", BufferKind::Refs)];

const HINTS: &[(&str, &str)] = &[
    ("tab", "fold"),
    ("g", "refresh"),
    ("⏎", "visit"),
    ("a/A", "stash"),
    ("f", "fetch"),
    ("w", "watch"),
    ("q", "quit"),
];

/// Render the top bar
///
///   repo · 1 STATUS  2 REFS                    ● watching
pub fn render_top_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans: Vec<Span> = vec![
        Span::styled(
            format!(" {}", app.repo_name()),
            ratatui::style::Style::default()
                .fg(styles::CYAN)
                .add_modifier(ratatui::style::Modifier::BOLD),
        ),
        Span::styled(" · ", ratatui::style::Style::default().fg(styles::BORDER)),
    ];

    for (key, kind) in VIEWS {
        let label = format!(" {} {} ", key, kind.label().to_uppercase());
        let style = if app.view() == kind {
            styles::active_tab_style()
        } else {
            ratatui::style::Style::default().fg(styles::MUTED)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }

    let mut right: Vec<Span> = Vec::new();
    if app.busy() {
        right.push(Span::styled(
            "git running ",
            ratatui::style::Style::default().fg(styles::YELLOW),
        ));
    }
    if app.watching {
        right.push(Span::styled("● ", ratatui::style::Style::default().fg(styles::GREEN)));
        right.push(Span::styled("watching ", ratatui::style::Style::default().fg(styles::DIM)));
    }

    let used = spans_width(&spans) + spans_width(&right);
    let pad = (area.width as usize).saturating_sub(used);
    spans.push(Span::raw(" ".repeat(pad)));
    spans.extend(right);

    let bar = Paragraph::new(Line::from(spans)).style(styles::panel_style());
    f.render_widget(bar, area);
}

/// Render the bottom bar: the current message or key hints, plus the diagnostic count
pub fn render_bottom_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans: Vec<Span> = Vec::new();
    match &app.message {
        Some(msg) => spans.push(Span::styled(
            format!(" {}", msg),
            ratatui::style::Style::default().fg(styles::TEXT),
        )),
        None => {
            for (key, action) in HINTS {
                spans.push(Span::styled(format!(" {}", key), styles::key_hint_style()));
                spans.push(Span::styled(
                    format!(" {} ", action),
                    ratatui::style::Style::default().fg(styles::DIM),
                ));
            }
        }
    }

    let count = app.diagnostic_count();
    if count > 0 {
        let label = format!(" {} diagnostic{} ", count, if count == 1 { "" } else { "s" });
        let pad = (area.width as usize).saturating_sub(spans_width(&spans) + label.chars().count());
        spans.push(Span::raw(" ".repeat(pad)));
        spans.push(Span::styled(
            label,
            ratatui::style::Style::default()
                .fg(styles::BG)
                .bg(styles::RED)
                .add_modifier(ratatui::style::Modifier::BOLD),
        ));
    }

    let bar = Paragraph::new(Line::from(spans)).style(styles::panel_style());
    f.render_widget(bar, area);
}

/// Compute the display width of a list of spans
fn spans_width(spans: &[Span]) -> usize {
    spans.iter().map(|s| s.content.chars().count()).sum()
}
