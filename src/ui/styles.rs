use crate::section::Face;
use ratatui::style::{Color, Modifier, Style};

// ── Background colors ──
pub const BG: Color = Color::Rgb(12, 12, 12);
pub const PANEL: Color = Color::Rgb(26, 26, 26);
pub const BORDER: Color = Color::Rgb(42, 42, 42);
pub const CURSOR_BG: Color = Color::Rgb(26, 42, 58);

// ── Text colors ──
pub const TEXT: Color = Color::Rgb(200, 200, 200);
pub const DIM: Color = Color::Rgb(102, 102, 102);
pub const MUTED: Color = Color::Rgb(136, 136, 136);
pub const BRIGHT: Color = Color::Rgb(232, 232, 232);

// ── Accent colors ──
pub const BLUE: Color = Color::Rgb(96, 165, 250);
pub const CYAN: Color = Color::Rgb(34, 211, 238);
pub const GREEN: Color = Color::Rgb(74, 222, 128);
pub const YELLOW: Color = Color::Rgb(250, 204, 21);
pub const RED: Color = Color::Rgb(248, 113, 113);
pub const PURPLE: Color = Color::Rgb(167, 139, 250);

// ── Diff colors ──
pub const ADD_BG: Color = Color::Rgb(16, 62, 40);
pub const ADD_TEXT: Color = Color::Rgb(120, 240, 160);
pub const DEL_BG: Color = Color::Rgb(68, 16, 24);
pub const DEL_TEXT: Color = Color::Rgb(255, 140, 140);
pub const HUNK_BG: Color = Color::Rgb(28, 28, 60);

// ── Composed styles ──

pub fn default_style() -> Style {
    Style::default().fg(TEXT).bg(BG)
}

pub fn panel_style() -> Style {
    Style::default().bg(PANEL)
}

pub fn key_hint_style() -> Style {
    Style::default().fg(MUTED).add_modifier(Modifier::BOLD)
}

pub fn active_tab_style() -> Style {
    Style::default()
        .fg(BG)
        .bg(BLUE)
        .add_modifier(Modifier::BOLD)
}

/// Style for a face tag of the section text
pub fn face_style(face: Face) -> Style {
    let base = Style::default().fg(TEXT);
    match face {
        Face::Plain => base,
        Face::Heading => base.fg(BRIGHT).add_modifier(Modifier::BOLD),
        Face::Branch => base.fg(GREEN),
        Face::CurrentBranch => base.fg(GREEN).add_modifier(Modifier::BOLD),
        Face::RemoteBranch => base.fg(CYAN),
        Face::Tag => base.fg(YELLOW),
        Face::Hash => base.fg(DIM),
        Face::FileHeading => base.fg(BRIGHT),
        Face::HunkHeading => base.fg(PURPLE).bg(HUNK_BG),
        Face::Added => base.fg(ADD_TEXT).bg(ADD_BG),
        Face::Removed => base.fg(DEL_TEXT).bg(DEL_BG),
        Face::Dim => base.fg(MUTED),
        Face::Error => base.fg(RED).add_modifier(Modifier::BOLD),
    }
}
