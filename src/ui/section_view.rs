use ratatui::{
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use std::collections::HashSet;
use std::ops::Range;

use super::styles;
use crate::app::App;
use crate::section::{Face, SectionTree};

/// Marker appended to the heading of a collapsed section
const FOLDED: &str = " …";

/// Split `line` into runs of one face; gaps between face spans are plain
pub fn line_runs(tree: &SectionTree, line: Range<usize>) -> Vec<(Range<usize>, Face)> {
    let faces = tree.faces();
    let first = faces.partition_point(|f| f.range.end <= line.start);
    let mut runs = Vec::new();
    let mut pos = line.start;

    for span in faces[first..].iter().take_while(|f| f.range.start < line.end) {
        let start = span.range.start.max(line.start);
        let end = span.range.end.min(line.end);
        if start > pos {
            runs.push((pos..start, Face::Plain));
        }
        if end > start {
            runs.push((start..end, span.face));
        }
        pos = pos.max(end);
    }
    if pos < line.end {
        runs.push((pos..line.end, Face::Plain));
    }
    runs
}

/// Start offsets of collapsed, collapsible sections
fn folded_headings(tree: &SectionTree) -> HashSet<usize> {
    tree.iter()
        .filter(|(id, s)| s.collapsible && s.hidden && tree.is_visible(*id))
        .map(|(_, s)| s.start)
        .collect()
}

pub fn render(f: &mut Frame, area: Rect, app: &mut App) {
    let height = area.height as usize;
    let scroll = app.scroll_for(height);
    let cursor = app.cursor();
    let lines = app.lines();

    let Some(tree) = app.buffer().tree() else {
        let empty = Paragraph::new(Line::from(Span::styled(
            " Loading…",
            ratatui::style::Style::default().fg(styles::DIM),
        )))
        .style(styles::default_style());
        f.render_widget(empty, area);
        return;
    };
    let folded = folded_headings(tree);
    let text = tree.text();

    let rows: Vec<Line> = lines
        .iter()
        .enumerate()
        .skip(scroll)
        .take(height)
        .map(|(i, range)| {
            let mut spans: Vec<Span> = line_runs(tree, range.clone())
                .into_iter()
                .map(|(run, face)| Span::styled(&text[run], styles::face_style(face)))
                .collect();
            if folded.contains(&range.start) {
                spans.push(Span::styled(
                    FOLDED,
                    ratatui::style::Style::default().fg(styles::DIM),
                ));
            }
            let line = Line::from(spans);
            if i == cursor {
                line.style(ratatui::style::Style::default().bg(styles::CURSOR_BG))
            } else {
                line
            }
        })
        .collect();

    let view = Paragraph::new(rows).style(styles::default_style());
    f.render_widget(view, area);
}
