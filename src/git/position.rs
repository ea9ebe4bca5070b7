//! Map a position inside a rendered hunk to a line and column of the post-image file.

use super::diff::{parse_hunk_header, DiffHunk, LineType};
use crate::error::{Error, Result};
use crate::section::{SectionId, SectionKind, SectionTree};

/// A hunk plus a position within it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkAnchor {
    /// `@@ -a,b +c,d @@` header; supplies the post-image start and marker width
    pub header: String,
    pub lines: Vec<LineType>,
    /// 1-based, counted from the first content line
    pub target_line: usize,
    /// Column within the rendered line, marker prefix included
    pub column: usize,
}

/// 1-based line and 0-based column in the working-tree file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePosition {
    pub line: usize,
    pub column: usize,
}

impl HunkAnchor {
    pub fn from_hunk(hunk: &DiffHunk, target_line: usize, column: usize) -> Self {
        Self {
            header: hunk.header.clone(),
            lines: hunk.lines.iter().map(|l| l.line_type).collect(),
            target_line,
            column,
        }
    }

    /// Anchor for `point` inside the body of the hunk section `hunk_id`
    pub fn from_rendered(tree: &SectionTree, hunk_id: SectionId, point: usize) -> Result<Self> {
        let section = tree.get(hunk_id)?;
        if section.kind != SectionKind::Hunk {
            return Err(Error::UnknownSection(hunk_id));
        }
        let text = tree.text();
        let header = text[section.heading_span()].trim_end_matches('\n').to_string();
        let width = parse_hunk_header(&header)?.marker_width;

        let body = &text[section.body_span()];
        let lines: Vec<LineType> = body
            .lines()
            .map(|l| {
                let marker = l.get(..width.min(l.len())).unwrap_or("");
                LineType::from_marker(marker).unwrap_or(LineType::Context)
            })
            .collect();

        if point < section.content || point >= section.end {
            return Err(Error::MapperOutOfRange {
                line: 0,
                len: lines.len(),
            });
        }
        let before = &text[section.content..point];
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Ok(Self {
            header,
            lines,
            target_line: before.matches('\n').count() + 1,
            column: before.len() - line_start,
        })
    }

    /// Walk content lines up to the target, counting every line that exists in the post-image.
    ///
    /// A deleted target line maps to the line after it at column 0. A target
    /// outside the hunk is a caller bug and yields [`Error::MapperOutOfRange`].
    pub fn file_position(&self) -> Result<FilePosition> {
        let hunk = parse_hunk_header(&self.header)?;
        if self.target_line == 0 || self.target_line > self.lines.len() {
            return Err(Error::MapperOutOfRange {
                line: self.target_line,
                len: self.lines.len(),
            });
        }

        let present = self.lines[..self.target_line]
            .iter()
            .filter(|t| **t != LineType::Delete)
            .count();
        let line = hunk.new_start + present.saturating_sub(1);
        let column = match self.lines[self.target_line - 1] {
            LineType::Delete => 0,
            _ => self.column.saturating_sub(hunk.marker_width),
        };
        Ok(FilePosition { line, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Builder, Face};
    use LineType::*;

    fn anchor(target_line: usize, column: usize) -> HunkAnchor {
        HunkAnchor {
            header: "@@ -8,3 +10,3 @@ fn main()".into(),
            lines: vec![Context, Add, Delete, Context],
            target_line,
            column,
        }
    }

    // ── file_position ──

    #[test]
    fn maps_each_rendered_line() {
        let lines: Vec<usize> = (1..=4)
            .map(|n| anchor(n, 0).file_position().unwrap().line)
            .collect();
        assert_eq!(lines, vec![10, 11, 11, 12]);
    }

    #[test]
    fn deletion_maps_to_column_zero() {
        let pos = anchor(3, 7).file_position().unwrap();
        assert_eq!(pos, FilePosition { line: 11, column: 0 });
    }

    #[test]
    fn column_drops_marker_prefix() {
        assert_eq!(anchor(2, 5).file_position().unwrap().column, 4);
        assert_eq!(anchor(2, 0).file_position().unwrap().column, 0);
    }

    #[test]
    fn combined_header_strips_two_columns() {
        let a = HunkAnchor {
            header: "@@@ -1,2 -1,2 +5,3 @@@".into(),
            lines: vec![Context, Add],
            target_line: 2,
            column: 6,
        };
        assert_eq!(a.file_position().unwrap(), FilePosition { line: 6, column: 4 });
    }

    #[test]
    fn out_of_range_target_is_an_error() {
        assert!(matches!(
            anchor(5, 0).file_position(),
            Err(Error::MapperOutOfRange { line: 5, len: 4 })
        ));
        assert!(anchor(0, 0).file_position().is_err());
    }

    // ── from_rendered ──

    #[test]
    fn anchor_from_rendered_hunk() {
        let mut b = Builder::new();
        let h = b.begin_section(SectionKind::Hunk, "@@ -8,3 +10,3 @@", true);
        b.set_heading_styled(&[("@@ -8,3 +10,3 @@", Face::HunkHeading)]).unwrap();
        b.line(" keep", Face::Plain);
        b.line("+added", Face::Added);
        b.line("-gone", Face::Removed);
        b.line(" tail", Face::Plain);
        b.end_section(h).unwrap();
        let tree = b.finish(1).unwrap();

        let section = tree.get(1).unwrap();
        // "add" inside "+added"
        let point = section.content + " keep\n".len() + 2;
        let anchor = HunkAnchor::from_rendered(&tree, 1, point).unwrap();
        assert_eq!(anchor.target_line, 2);
        assert_eq!(anchor.column, 2);
        assert_eq!(anchor.lines, vec![Context, Add, Delete, Context]);
        assert_eq!(
            anchor.file_position().unwrap(),
            FilePosition { line: 11, column: 1 }
        );

        assert!(matches!(
            HunkAnchor::from_rendered(&tree, 1, section.start),
            Err(Error::MapperOutOfRange { .. })
        ));
    }
}
