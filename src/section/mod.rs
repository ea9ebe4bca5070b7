//! Section tree: the typed, collapsible structure laid over rendered text.
//!
//! All nodes of one rebuild live in a single arena owned by [`SectionTree`].
//! Children are stored as ordered id lists; the parent link is an id used
//! for traversal only. Identity across rebuilds is the [`Key`], never the id.

mod builder;
mod reconcile;
mod wash;

pub use builder::{Builder, Checkpoint, SectionHandle};
pub(crate) use reconcile::pending_washers;
pub use reconcile::{
    capture_cursor, restore_cursor, CursorAnchor, FoldState, HiddenPolicy,
};
pub use wash::{collapse, expand, toggle};

use crate::buffer::RefreshContext;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Arena index of a section within one tree generation
pub type SectionId = usize;

/// Id of the root section of every tree
pub const ROOT: SectionId = 0;

// ── Kinds & keys ──

/// What a section represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionKind {
    Root,
    Status,
    Branch,
    Remote,
    Tag,
    Stash,
    UntrackedGroup,
    File,
    Hunk,
    Commit,
    BranchDescription,
    MergeLog,
    Generic,
}

impl SectionKind {
    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::Root => "root",
            SectionKind::Status => "status",
            SectionKind::Branch => "branch",
            SectionKind::Remote => "remote",
            SectionKind::Tag => "tag",
            SectionKind::Stash => "stash",
            SectionKind::UntrackedGroup => "untracked-group",
            SectionKind::File => "file",
            SectionKind::Hunk => "hunk",
            SectionKind::Commit => "commit",
            SectionKind::BranchDescription => "branch-description",
            SectionKind::MergeLog => "merge-log",
            SectionKind::Generic => "generic",
        }
    }
}

/// One `(kind, value)` step of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPart {
    pub kind: SectionKind,
    pub value: String,
}

/// Cross-rebuild identity: the `(kind, value)` path from the root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Vec<KeyPart>);

impl Key {
    /// Key of the root section
    pub fn root() -> Self {
        Key(vec![KeyPart {
            kind: SectionKind::Root,
            value: String::new(),
        }])
    }

    /// Key of a child of this section
    pub fn child(&self, kind: SectionKind, value: &str) -> Self {
        let mut parts = self.0.clone();
        parts.push(KeyPart {
            kind,
            value: value.to_string(),
        });
        Key(parts)
    }

    /// Key of the enclosing section, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(Key(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in self.0.iter().skip(1) {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            write!(f, "{}:{}", part.kind.label(), part.value)?;
        }
        if first {
            f.write_str("root")?;
        }
        Ok(())
    }
}

// ── Washer ──

/// Deferred body builder, invoked once on first expansion
pub type WashFn = Box<dyn FnOnce(&mut Builder, &RefreshContext<'_>) -> anyhow::Result<()>>;

/// Body construction state of a section
pub enum Washer {
    /// Body is present (or there never was a deferred one)
    Eager,
    /// Body will be built by the closure on first expansion
    Deferred(WashFn),
}

impl Washer {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Washer::Deferred(_))
    }
}

impl fmt::Debug for Washer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Washer::Eager => f.write_str("Eager"),
            Washer::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

// ── Faces ──

/// Styling tag attached to ranges of rendered text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Plain,
    Heading,
    Branch,
    CurrentBranch,
    RemoteBranch,
    Tag,
    Hash,
    FileHeading,
    HunkHeading,
    Added,
    Removed,
    Dim,
    Error,
}

/// A styled range of the rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSpan {
    pub range: Range<usize>,
    pub face: Face,
}

// ── Sections ──

/// A node of the section tree.
///
/// `start..content` is the heading, `content..end` the body. Both are byte
/// offsets into the owning tree's text.
#[derive(Debug)]
pub struct Section {
    pub kind: SectionKind,
    pub value: String,
    pub key: Key,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
    pub start: usize,
    pub content: usize,
    pub end: usize,
    pub hidden: bool,
    pub collapsible: bool,
    pub washer: Washer,
}

impl Section {
    pub fn heading_span(&self) -> Range<usize> {
        self.start..self.content
    }

    pub fn body_span(&self) -> Range<usize> {
        self.content..self.end
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// The rendered output of one rebuild: text, faces and the section arena
#[derive(Debug)]
pub struct SectionTree {
    nodes: Vec<Section>,
    text: String,
    faces: Vec<FaceSpan>,
    generation: u64,
}

impl SectionTree {
    pub(crate) fn from_parts(
        nodes: Vec<Section>,
        text: String,
        faces: Vec<FaceSpan>,
        generation: u64,
    ) -> Self {
        Self {
            nodes,
            text,
            faces,
            generation,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn faces(&self) -> &[FaceSpan] {
        &self.faces
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> &Section {
        &self.nodes[ROOT]
    }

    pub fn get(&self, id: SectionId) -> Result<&Section> {
        self.nodes.get(id).ok_or(Error::UnknownSection(id))
    }

    pub(crate) fn get_mut(&mut self, id: SectionId) -> Result<&mut Section> {
        self.nodes.get_mut(id).ok_or(Error::UnknownSection(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionId, &Section)> {
        self.nodes.iter().enumerate()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.nodes.iter_mut()
    }

    /// First section with the given key path
    pub fn find(&self, key: &Key) -> Option<SectionId> {
        self.nodes.iter().position(|s| &s.key == key)
    }

    /// Ids of `id` and all its ancestors, innermost first
    pub fn ancestors(&self, id: SectionId) -> Vec<SectionId> {
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            out.push(current);
            cursor = self.nodes.get(current).and_then(|s| s.parent);
        }
        out
    }

    /// Innermost section whose span covers `offset`; the root when none does
    pub fn section_at(&self, offset: usize) -> SectionId {
        let mut id = ROOT;
        loop {
            let children = &self.nodes[id].children;
            let idx = children.partition_point(|&c| self.nodes[c].start <= offset);
            if idx == 0 {
                break;
            }
            let candidate = children[idx - 1];
            if offset < self.nodes[candidate].end {
                id = candidate;
            } else {
                break;
            }
        }
        id
    }

    /// True if the section and every ancestor are expanded
    pub fn is_visible(&self, id: SectionId) -> bool {
        self.ancestors(id)
            .into_iter()
            .skip(1)
            .all(|a| !self.nodes[a].hidden)
    }

    /// Text ranges a display shows: headings always, bodies only when expanded
    pub fn visible_spans(&self) -> Vec<Range<usize>> {
        let mut spans: Vec<Range<usize>> = Vec::new();
        self.collect_visible(ROOT, &mut spans);
        spans
    }

    fn collect_visible(&self, id: SectionId, out: &mut Vec<Range<usize>>) {
        let node = &self.nodes[id];
        push_merged(out, node.heading_span());
        if node.hidden {
            return;
        }
        let mut pos = node.content;
        for &child in &node.children {
            let c = &self.nodes[child];
            if c.start > pos {
                push_merged(out, pos..c.start);
            }
            self.collect_visible(child, out);
            pos = c.end;
        }
        if node.end > pos {
            push_merged(out, pos..node.end);
        }
    }

    /// Visible text split into lines (ranges exclude the newline)
    pub fn visible_lines(&self) -> Vec<Range<usize>> {
        let mut lines = Vec::new();
        for span in self.visible_spans() {
            let mut line_start = span.start;
            for (i, b) in self.text[span.clone()].bytes().enumerate() {
                if b == b'\n' {
                    let at = span.start + i;
                    lines.push(line_start..at);
                    line_start = at + 1;
                }
            }
            if line_start < span.end {
                lines.push(line_start..span.end);
            }
        }
        lines
    }

    /// Verify span nesting and ordering; returns a description of the first violation
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let root = &self.nodes[ROOT];
        if root.start != 0 || root.end != self.text.len() {
            return Err(format!(
                "root span {:?} does not cover text of length {}",
                root.span(),
                self.text.len()
            ));
        }
        for (id, node) in self.iter() {
            if !(node.start <= node.content && node.content <= node.end) {
                return Err(format!("{} has inverted spans {:?}", node.key, node.span()));
            }
            let mut prev_end = node.content;
            for &child in &node.children {
                let c = &self.nodes[child];
                if c.parent != Some(id) {
                    return Err(format!("{} has a wrong parent link", c.key));
                }
                if c.start < prev_end || c.end > node.end {
                    return Err(format!(
                        "{} span {:?} escapes parent {} body {:?} or overlaps a sibling",
                        c.key,
                        c.span(),
                        node.key,
                        node.body_span()
                    ));
                }
                prev_end = c.end;
            }
        }
        Ok(())
    }
}

fn push_merged(out: &mut Vec<Range<usize>>, range: Range<usize>) {
    if range.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut() {
        if last.end == range.start {
            last.end = range.end;
            return;
        }
    }
    out.push(range);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root
    ///   status:a   "A\n" body "a1\n"
    ///     file:x   "x\n" body "x1\n"
    ///   status:b   "B\n"
    fn sample() -> SectionTree {
        let mut b = Builder::new();
        let a = b.begin_section(SectionKind::Status, "a", true);
        b.set_heading("A").unwrap();
        b.insert("a1\n", Face::Plain);
        let x = b.begin_section(SectionKind::File, "x", true);
        b.set_heading("x").unwrap();
        b.insert("x1\n", Face::Added);
        b.end_section(x).unwrap();
        b.end_section(a).unwrap();
        let bb = b.begin_section(SectionKind::Status, "b", true);
        b.set_heading("B").unwrap();
        b.end_section(bb).unwrap();
        b.finish(1).unwrap()
    }

    // ── Key ──

    #[test]
    fn key_display_skips_root() {
        let key = Key::root()
            .child(SectionKind::Status, "local")
            .child(SectionKind::Branch, "main");
        assert_eq!(key.to_string(), "status:local/branch:main");
        assert_eq!(Key::root().to_string(), "root");
    }

    #[test]
    fn key_parent_walks_up_to_root() {
        let key = Key::root().child(SectionKind::Tag, "v1");
        assert_eq!(key.parent(), Some(Key::root()));
        assert_eq!(Key::root().parent(), None);
    }

    // ── section_at ──

    #[test]
    fn section_at_finds_innermost() {
        let tree = sample();
        assert_eq!(tree.text(), "A\na1\nx\nx1\nB\n");
        let x = tree.section_at(6);
        assert_eq!(tree.get(x).unwrap().value, "x");
        let a = tree.section_at(2);
        assert_eq!(tree.get(a).unwrap().value, "a");
        let b = tree.section_at(11);
        assert_eq!(tree.get(b).unwrap().value, "b");
    }

    #[test]
    fn section_at_end_of_text_is_root() {
        let tree = sample();
        assert_eq!(tree.section_at(tree.text().len()), ROOT);
    }

    // ── visibility ──

    #[test]
    fn visible_lines_all_expanded() {
        let tree = sample();
        let lines: Vec<&str> = tree
            .visible_lines()
            .into_iter()
            .map(|r| &tree.text()[r])
            .collect();
        assert_eq!(lines, vec!["A", "a1", "x", "x1", "B"]);
    }

    #[test]
    fn hidden_section_shows_heading_only() {
        let mut tree = sample();
        let a = tree.find(&Key::root().child(SectionKind::Status, "a")).unwrap();
        tree.get_mut(a).unwrap().hidden = true;
        let lines: Vec<&str> = tree
            .visible_lines()
            .into_iter()
            .map(|r| &tree.text()[r])
            .collect();
        assert_eq!(lines, vec!["A", "B"]);
        let x = tree.section_at(6);
        assert!(!tree.is_visible(x));
    }

    #[test]
    fn sample_tree_satisfies_invariants() {
        assert_eq!(sample().check_invariants(), Ok(()));
    }
}
