//! Repository discovery under search roots, and display names that stay
//! unique when several repositories share a directory name.

use crate::error::Error;
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

// ── Filesystem ──

/// Filesystem questions the scanner asks
pub trait RepoFs {
    /// Does `dir` contain a repository marker?
    fn is_repository(&self, dir: &Path) -> bool;

    /// Immediate subdirectories of `dir`, in a stable order
    fn subdirectories(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>>;
}

/// The real filesystem; a repository is any directory with a `.git` entry
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl RepoFs for LocalFs {
    fn is_repository(&self, dir: &Path) -> bool {
        dir.join(".git").exists()
    }

    fn subdirectories(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

// ── Scanner ──

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Directory levels below each root that may still be searched
    pub depth: usize,
    /// Directories matching any of these (by name or full path) are never entered
    pub ignore: Vec<Pattern>,
}

impl ScanOptions {
    /// Compile ignore globs; invalid patterns are skipped with a warning
    pub fn new(depth: usize, ignore: &[String]) -> Self {
        let ignore = ignore
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid glob");
                    None
                }
            })
            .collect();
        Self { depth, ignore }
    }

    fn is_ignored(&self, dir: &Path) -> bool {
        const OPTS: MatchOptions = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
        self.ignore
            .iter()
            .any(|p| p.matches_with(name, OPTS) || p.matches_path_with(dir, OPTS))
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Repository roots in discovery order, without duplicates
    pub repositories: Vec<PathBuf>,
    /// Directories that could not be read; their subtrees were skipped
    pub errors: Vec<Error>,
}

/// Collect repository roots under `roots`.
///
/// Depth 0 means only the roots themselves may qualify. A directory that is a
/// repository is not descended into.
pub fn scan(roots: &[PathBuf], options: &ScanOptions, fs: &dyn RepoFs) -> ScanReport {
    let started = Instant::now();
    let mut report = ScanReport::default();
    let mut seen = HashSet::new();
    for root in roots {
        visit(root, options.depth, options, fs, &mut seen, &mut report);
    }
    debug!(
        roots = roots.len(),
        found = report.repositories.len(),
        errors = report.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "repository scan finished"
    );
    report
}

fn visit(
    dir: &Path,
    remaining: usize,
    options: &ScanOptions,
    fs: &dyn RepoFs,
    seen: &mut HashSet<PathBuf>,
    report: &mut ScanReport,
) {
    if options.is_ignored(dir) {
        return;
    }
    if fs.is_repository(dir) {
        if seen.insert(dir.to_path_buf()) {
            report.repositories.push(dir.to_path_buf());
        }
        return;
    }
    if remaining == 0 {
        return;
    }
    match fs.subdirectories(dir) {
        Ok(children) => {
            for child in children {
                visit(&child, remaining - 1, options, fs, seen, report);
            }
        }
        Err(source) => {
            let err = Error::ScanIo {
                path: dir.to_path_buf(),
                source,
            };
            warn!(error = %err, "skipping unreadable directory");
            report.errors.push(err);
        }
    }
}

// ── Uniquifier ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Last path segment, or the whole path when there is none
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

struct Candidate {
    name: String,
    path: PathBuf,
    consumed: usize,
}

/// Make display names distinct by appending `\parent` segments to colliding names,
/// one level per pass, until no name is shared or no colliding entry has a
/// segment left.
///
/// Each pass regroups the whole set, so a renamed entry that lands on another
/// entry's name is split again. Output is ordered by display name.
pub fn uniquify(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Vec<RepoEntry> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<Candidate> = entries
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .map(|(name, path)| Candidate {
            name,
            path,
            consumed: 0,
        })
        .collect();

    while rename_collisions(&mut candidates) {}

    let mut out: Vec<RepoEntry> = candidates
        .into_iter()
        .map(|c| RepoEntry {
            name: c.name,
            path: c.path,
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

/// One pass: extend every shared name by its next parent segment.
/// Returns false when nothing could be renamed.
fn rename_collisions(candidates: &mut [Candidate]) -> bool {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for c in candidates.iter() {
        *counts.entry(c.name.clone()).or_default() += 1;
    }

    let mut renamed = false;
    for c in candidates.iter_mut() {
        if counts.get(&c.name).copied().unwrap_or(0) < 2 {
            continue;
        }
        // exhausted entries keep their name
        if let Some(segment) = parent_segment(&c.path, c.consumed) {
            c.name = format!("{}\\{}", c.name, segment);
            c.consumed += 1;
            renamed = true;
        }
    }
    renamed
}

/// The `level`-th ancestor directory name of `path` (0 = immediate parent)
fn parent_segment(path: &Path, level: usize) -> Option<String> {
    path.components()
        .rev()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .nth(level + 1)
}

/// Scan and uniquify in one step
pub fn list_repositories(
    roots: &[PathBuf],
    options: &ScanOptions,
    fs: &dyn RepoFs,
) -> (Vec<RepoEntry>, Vec<Error>) {
    let report = scan(roots, options, fs);
    let entries = uniquify(
        report
            .repositories
            .iter()
            .map(|p| (display_name(p), p.clone())),
    );
    (entries, report.errors)
}
