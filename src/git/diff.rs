use crate::error::{Error, Result};
use tracing::warn;

/// How a file changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed(String), // old path
    Unmerged,
}

impl FileStatus {
    /// Label shown before the path in file headings
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Added => "new file",
            FileStatus::Modified => "modified",
            FileStatus::Deleted => "deleted",
            FileStatus::Renamed(_) => "renamed",
            FileStatus::Unmerged => "unmerged",
        }
    }
}

/// A single line in a diff hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub line_type: LineType,
    /// The line without its marker prefix
    pub content: String,
    /// The marker prefix exactly as git printed it (`+`, ` -`, `++`, ...)
    pub marker: String,
    pub new_num: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Context,
    Add,
    Delete,
}

impl LineType {
    /// Classify a marker prefix. Any `-` column means the line is absent from the result.
    pub fn from_marker(marker: &str) -> Option<Self> {
        if !marker.chars().all(|c| matches!(c, '+' | '-' | ' ')) {
            return None;
        }
        Some(if marker.contains('-') {
            LineType::Delete
        } else if marker.contains('+') {
            LineType::Add
        } else {
            LineType::Context
        })
    }
}

/// A diff hunk with header and lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub header: String,
    pub new_start: usize,
    pub new_count: usize,
    /// Columns of marker prefix on every content line: 1 for `@@`, 2 for `@@@`
    pub marker_width: usize,
    pub lines: Vec<DiffLine>,
}

/// A file with its diff hunks and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: String,
    pub status: FileStatus,
    pub hunks: Vec<DiffHunk>,
    pub adds: usize,
    pub dels: usize,
}

/// Parse `git diff` output (plain or `--cc` combined) into files and hunks.
///
/// Hunks without any content line are dropped with a warning; a hunk header
/// that does not parse drops the lines up to the next header.
pub fn parse_diff(raw: &str) -> Vec<DiffFile> {
    let mut files: Vec<DiffFile> = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<DiffHunk> = None;
    let mut new_line: usize = 0;

    for line in raw.lines() {
        // New file header: diff --git a/path b/path, or diff --cc path
        if line.starts_with("diff --git ") || line.starts_with("diff --cc ") {
            flush_hunk(&mut current_file, current_hunk.take());
            if let Some(file) = current_file.take() {
                files.push(file);
            }

            let (path, status) = match line.strip_prefix("diff --cc ") {
                Some(path) => (path.to_string(), FileStatus::Unmerged),
                None => (
                    line.split(" b/").last().unwrap_or("").to_string(),
                    FileStatus::Modified,
                ),
            };
            current_file = Some(DiffFile {
                path,
                status,
                hunks: Vec::new(),
                adds: 0,
                dels: 0,
            });
            continue;
        }

        if current_hunk.is_none() {
            if let Some(ref mut file) = current_file {
                if line.starts_with("new file") {
                    file.status = FileStatus::Added;
                    continue;
                }
                if line.starts_with("deleted file") {
                    file.status = FileStatus::Deleted;
                    continue;
                }
                if let Some(old_path) = line.strip_prefix("rename from ") {
                    file.status = FileStatus::Renamed(old_path.to_string());
                    continue;
                }
            }
        }

        if line.starts_with("@@") {
            flush_hunk(&mut current_file, current_hunk.take());
            match parse_hunk_header(line) {
                Ok(hunk) => {
                    new_line = hunk.new_start;
                    current_hunk = Some(hunk);
                }
                Err(err) => warn!(error = %err, "skipping hunk"),
            }
            continue;
        }

        let Some(ref mut hunk) = current_hunk else {
            // index, ---, +++, mode lines and anything else before the first hunk
            continue;
        };
        if line.starts_with('\\') {
            // \ No newline at end of file
            continue;
        }

        let width = hunk.marker_width.min(line.len());
        let (marker, content) = if line.is_char_boundary(width) {
            line.split_at(width)
        } else {
            (line, "")
        };
        let Some(line_type) = LineType::from_marker(marker) else {
            continue;
        };
        let new_num = match line_type {
            LineType::Delete => None,
            _ => {
                new_line += 1;
                Some(new_line - 1)
            }
        };
        if let Some(ref mut file) = current_file {
            match line_type {
                LineType::Add => file.adds += 1,
                LineType::Delete => file.dels += 1,
                LineType::Context => {}
            }
        }
        hunk.lines.push(DiffLine {
            line_type,
            content: content.to_string(),
            marker: format!("{:width$}", marker, width = hunk.marker_width),
            new_num,
        });
    }

    flush_hunk(&mut current_file, current_hunk);
    if let Some(file) = current_file {
        files.push(file);
    }

    files
}

fn flush_hunk(file: &mut Option<DiffFile>, hunk: Option<DiffHunk>) {
    let (Some(file), Some(hunk)) = (file.as_mut(), hunk) else {
        return;
    };
    if hunk.lines.is_empty() {
        warn!(path = %file.path, header = %hunk.header, "dropping hunk without content lines");
        return;
    }
    file.hunks.push(hunk);
}

/// Parse a hunk header like "@@ -10,4 +10,15 @@ fn foo()" or "@@@ -1,2 -1,2 +1,3 @@@".
/// The post-image range is always the last one.
pub fn parse_hunk_header(line: &str) -> Result<DiffHunk> {
    let bad = || Error::BadHunkHeader(line.to_string());
    let ats = line.chars().take_while(|&c| c == '@').count();
    if ats < 2 {
        return Err(bad());
    }
    let fence = &line[..ats];
    let after_first = line[ats..].strip_prefix(' ').ok_or_else(bad)?;
    let end_idx = after_first.find(&format!(" {}", fence)).ok_or_else(bad)?;
    let ranges: Vec<&str> = after_first[..end_idx].split_whitespace().collect();

    // one pre-image range per parent, then the post-image range
    if ranges.len() != ats {
        return Err(bad());
    }
    for old in &ranges[..ranges.len() - 1] {
        let old = old.strip_prefix('-').ok_or_else(bad)?;
        parse_range(old).ok_or_else(bad)?;
    }
    let new = ranges[ranges.len() - 1].strip_prefix('+').ok_or_else(bad)?;
    let (new_start, new_count) = parse_range(new).ok_or_else(bad)?;

    Ok(DiffHunk {
        header: line.to_string(),
        new_start,
        new_count,
        marker_width: ats - 1,
        lines: Vec::new(),
    })
}

/// Parse "start,count" or just "start" (count defaults to 1)
fn parse_range(s: &str) -> Option<(usize, usize)> {
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}
