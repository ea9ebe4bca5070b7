use super::{Face, FaceSpan, Key, Section, SectionId, SectionKind, SectionTree, WashFn, Washer, ROOT};
use crate::error::{Error, Result};
use tracing::warn;

/// Proof that a section was opened; consumed by [`Builder::end_section`]
#[derive(Debug, PartialEq, Eq)]
#[must_use = "every begun section must be ended"]
pub struct SectionHandle {
    id: SectionId,
}

/// Builder state to roll back to when a content step fails
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    text_len: usize,
    faces_len: usize,
    nodes_len: usize,
    stack_len: usize,
    top_level_len: usize,
}

/// An open section on the builder stack
#[derive(Debug)]
struct Frame {
    id: SectionId,
    heading: bool,
}

/// Emits text and records the sections laid over it.
///
/// Sections nest with stack discipline: `end_section` must receive the
/// innermost open handle. A top-level builder opens the root on creation;
/// a nested builder (used by washers) grafts its sections under an existing
/// node of another tree, starting at `base`.
pub struct Builder {
    text: String,
    faces: Vec<FaceSpan>,
    nodes: Vec<Section>,
    stack: Vec<Frame>,
    base: usize,
    first_id: SectionId,
    attach: Option<(SectionId, Key)>,
    top_level: Vec<SectionId>,
    diagnostics: Vec<String>,
}

/// Sections and text produced by a nested builder
pub(crate) struct Graft {
    pub nodes: Vec<Section>,
    pub text: String,
    pub faces: Vec<FaceSpan>,
    pub top_level: Vec<SectionId>,
}

impl Builder {
    /// Top-level builder with the root section already open
    pub fn new() -> Self {
        let mut builder = Self::empty(0, 0, None);
        builder.nodes.push(Section {
            kind: SectionKind::Root,
            value: String::new(),
            key: Key::root(),
            parent: None,
            children: Vec::new(),
            start: 0,
            content: 0,
            end: 0,
            hidden: false,
            collapsible: false,
            washer: Washer::Eager,
        });
        builder.stack.push(Frame {
            id: ROOT,
            heading: true,
        });
        builder
    }

    /// Builder whose sections become children of `parent` (keyed `parent_key`),
    /// with text that will be inserted at `base` and ids allocated from `first_id`
    pub(crate) fn nested(parent: SectionId, parent_key: Key, base: usize, first_id: SectionId) -> Self {
        Self::empty(base, first_id, Some((parent, parent_key)))
    }

    fn empty(base: usize, first_id: SectionId, attach: Option<(SectionId, Key)>) -> Self {
        Self {
            text: String::new(),
            faces: Vec::new(),
            nodes: Vec::new(),
            stack: Vec::new(),
            base,
            first_id,
            attach,
            top_level: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Absolute offset of the next byte written
    pub fn offset(&self) -> usize {
        self.base + self.text.len()
    }

    fn node_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.nodes[id - self.first_id]
    }

    fn node(&self, id: SectionId) -> &Section {
        &self.nodes[id - self.first_id]
    }

    // ── Sections ──

    /// Open a child of the innermost open section
    pub fn begin_section(&mut self, kind: SectionKind, value: &str, collapsible: bool) -> SectionHandle {
        let (parent, key) = match self.stack.last() {
            Some(frame) => (frame.id, self.node(frame.id).key.child(kind, value)),
            None => match &self.attach {
                Some((id, parent_key)) => (*id, parent_key.child(kind, value)),
                None => unreachable!("top-level builder always has the root open"),
            },
        };

        let id = self.first_id + self.nodes.len();
        let offset = self.offset();
        self.nodes.push(Section {
            kind,
            value: value.to_string(),
            key,
            parent: Some(parent),
            children: Vec::new(),
            start: offset,
            content: offset,
            end: offset,
            hidden: false,
            collapsible,
            washer: Washer::Eager,
        });

        if self.stack.is_empty() {
            self.top_level.push(id);
        } else {
            self.node_mut(parent).children.push(id);
        }
        self.stack.push(Frame { id, heading: false });
        SectionHandle { id }
    }

    /// Close the innermost open section
    pub fn end_section(&mut self, handle: SectionHandle) -> Result<()> {
        let innermost = match self.stack.last() {
            Some(frame) if frame.id != ROOT || self.attach.is_some() => frame.id,
            _ => {
                return Err(Error::UnbalancedSection(format!(
                    "no open section to end (handle {})",
                    handle.id
                )))
            }
        };
        if innermost != handle.id {
            return Err(Error::UnbalancedSection(format!(
                "ending {} while {} is still open",
                self.key_of(handle.id),
                self.node(innermost).key
            )));
        }
        self.stack.pop();
        let offset = self.offset();
        self.node_mut(handle.id).end = offset;
        Ok(())
    }

    fn key_of(&self, id: SectionId) -> String {
        id.checked_sub(self.first_id)
            .and_then(|i| self.nodes.get(i))
            .map(|s| s.key.to_string())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Write the heading of the innermost open section; a trailing newline is added if missing
    pub fn set_heading(&mut self, text: &str) -> Result<()> {
        self.set_heading_styled(&[(text, Face::Heading)])
    }

    /// Write a heading made of differently styled parts
    pub fn set_heading_styled(&mut self, parts: &[(&str, Face)]) -> Result<()> {
        let offset = self.offset();
        let frame = match self.stack.last() {
            Some(frame) if frame.id != ROOT || self.attach.is_some() => frame,
            _ => return Err(Error::HeadingMisplaced("root".to_string())),
        };
        let id = frame.id;
        if frame.heading || self.node(id).start != offset {
            return Err(Error::HeadingMisplaced(self.node(id).key.to_string()));
        }

        for (text, face) in parts {
            self.insert(text, *face);
        }
        if !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        let offset = self.offset();
        self.node_mut(id).content = offset;
        if let Some(frame) = self.stack.last_mut() {
            frame.heading = true;
        }
        Ok(())
    }

    /// Defer the body of the innermost open section until it is first expanded
    pub fn set_washer(&mut self, washer: WashFn) -> Result<()> {
        let offset = self.offset();
        let id = match self.stack.last() {
            Some(frame) if frame.id != ROOT || self.attach.is_some() => frame.id,
            _ => return Err(Error::UnbalancedSection("washer without an open section".into())),
        };
        let node = self.node_mut(id);
        if !node.collapsible {
            return Err(Error::UnbalancedSection(format!(
                "washer on non-collapsible section {}",
                node.key
            )));
        }
        if node.content != offset {
            return Err(Error::UnbalancedSection(format!(
                "washer on {} after body content",
                node.key
            )));
        }
        node.washer = Washer::Deferred(washer);
        Ok(())
    }

    // ── Text ──

    /// Append text to the body of the innermost open section
    pub fn insert(&mut self, text: &str, face: Face) {
        let start = self.offset();
        self.text.push_str(text);
        if face != Face::Plain && !text.is_empty() {
            self.faces.push(FaceSpan {
                range: start..self.offset(),
                face,
            });
        }
    }

    /// Append one line of body text
    pub fn line(&mut self, text: &str, face: Face) {
        self.insert(text, face);
        self.text.push('\n');
    }

    /// Append an empty line
    pub fn blank(&mut self) {
        self.text.push('\n');
    }

    /// Record a recoverable problem noticed while building
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "section builder diagnostic");
        self.diagnostics.push(message);
    }

    pub fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }

    // ── Containment ──

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            text_len: self.text.len(),
            faces_len: self.faces.len(),
            nodes_len: self.nodes.len(),
            stack_len: self.stack.len(),
            top_level_len: self.top_level.len(),
        }
    }

    /// Error unless exactly the sections open at `checkpoint` are still open
    pub fn ensure_balanced(&self, checkpoint: &Checkpoint) -> Result<()> {
        if self.stack.len() != checkpoint.stack_len {
            let open: Vec<String> = self.stack[checkpoint.stack_len.min(self.stack.len())..]
                .iter()
                .map(|f| self.node(f.id).key.to_string())
                .collect();
            return Err(Error::UnbalancedSection(format!(
                "left open: {}",
                open.join(", ")
            )));
        }
        Ok(())
    }

    /// Discard everything emitted since `checkpoint`
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.text.truncate(checkpoint.text_len);
        self.faces.truncate(checkpoint.faces_len);
        self.nodes.truncate(checkpoint.nodes_len);
        self.stack.truncate(checkpoint.stack_len);
        self.top_level.truncate(checkpoint.top_level_len);

        let limit = self.first_id + checkpoint.nodes_len;
        let open: Vec<SectionId> = self.stack.iter().map(|f| f.id).collect();
        for id in open {
            self.node_mut(id).children.retain(|&c| c < limit);
        }
    }

    /// Emit a visible, heading-only marker section describing a failure
    pub fn error_marker(&mut self, label: &str, error: &dyn std::fmt::Display) {
        let handle = self.begin_section(SectionKind::Generic, &format!("error:{}", label), false);
        let heading = format!("! {}: {}", label, error);
        let headed = self.set_heading_styled(&[(heading.as_str(), Face::Error)]);
        debug_assert!(headed.is_ok());
        let closed = self.end_section(handle);
        debug_assert!(closed.is_ok());
    }

    /// Close every open section at the current offset; returns how many were open
    pub(crate) fn close_all(&mut self) -> usize {
        let mut closed = 0;
        while let Some(frame) = self.stack.last() {
            if frame.id == ROOT && self.attach.is_none() {
                break;
            }
            let id = frame.id;
            self.stack.pop();
            let offset = self.offset();
            self.node_mut(id).end = offset;
            closed += 1;
        }
        closed
    }

    // ── Output ──

    /// Close the root and produce the tree
    pub fn finish(mut self, generation: u64) -> Result<SectionTree> {
        if self.attach.is_some() {
            return Err(Error::UnbalancedSection("finish on a nested builder".into()));
        }
        if self.stack.len() != 1 {
            let open: Vec<String> = self.stack[1..]
                .iter()
                .map(|f| self.node(f.id).key.to_string())
                .collect();
            return Err(Error::UnbalancedSection(format!(
                "left open at finish: {}",
                open.join(", ")
            )));
        }
        self.stack.clear();
        let end = self.text.len();
        self.nodes[ROOT].end = end;
        Ok(SectionTree::from_parts(self.nodes, self.text, self.faces, generation))
    }

    pub(crate) fn into_graft(mut self) -> Graft {
        self.close_all();
        Graft {
            nodes: self.nodes,
            text: self.text,
            faces: self.faces,
            top_level: self.top_level,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::RefreshContext;

    // ── spans ──

    #[test]
    fn heading_and_body_spans_are_recorded() {
        let mut b = Builder::new();
        let h = b.begin_section(SectionKind::Branch, "main", true);
        b.set_heading("main").unwrap();
        b.line("body", Face::Plain);
        b.end_section(h).unwrap();
        let tree = b.finish(1).unwrap();

        let (_, main) = tree.iter().nth(1).unwrap();
        assert_eq!(main.heading_span(), 0..5);
        assert_eq!(main.body_span(), 5..10);
        assert_eq!(&tree.text()[main.body_span()], "body\n");
        assert_eq!(main.key.to_string(), "branch:main");
    }

    #[test]
    fn heading_only_section_has_empty_body() {
        let mut b = Builder::new();
        let h = b.begin_section(SectionKind::Tag, "v1.0", false);
        b.set_heading("v1.0").unwrap();
        b.end_section(h).unwrap();
        let tree = b.finish(1).unwrap();

        let (_, tag) = tree.iter().nth(1).unwrap();
        assert!(tag.body_span().is_empty());
        assert_eq!(tag.content, tag.end);
    }

    #[test]
    fn root_wraps_all_text() {
        let mut b = Builder::new();
        b.line("loose text", Face::Plain);
        let h = b.begin_section(SectionKind::Generic, "x", false);
        b.set_heading("x").unwrap();
        b.end_section(h).unwrap();
        let tree = b.finish(3).unwrap();
        assert_eq!(tree.root().span(), 0..tree.text().len());
        assert_eq!(tree.generation(), 3);
        assert_eq!(tree.check_invariants(), Ok(()));
    }

    #[test]
    fn nested_keys_extend_parent_key() {
        let mut b = Builder::new();
        let outer = b.begin_section(SectionKind::Status, "unstaged", true);
        b.set_heading("Unstaged").unwrap();
        let file = b.begin_section(SectionKind::File, "src/lib.rs", true);
        b.set_heading("src/lib.rs").unwrap();
        b.end_section(file).unwrap();
        b.end_section(outer).unwrap();
        let tree = b.finish(1).unwrap();
        let key = Key::root()
            .child(SectionKind::Status, "unstaged")
            .child(SectionKind::File, "src/lib.rs");
        assert!(tree.find(&key).is_some());
    }

    // ── stack discipline ──

    #[test]
    fn ending_outer_section_first_fails() {
        let mut b = Builder::new();
        let outer = b.begin_section(SectionKind::Status, "a", true);
        let _inner = b.begin_section(SectionKind::File, "b", true);
        let err = b.end_section(outer).unwrap_err();
        assert!(matches!(err, Error::UnbalancedSection(_)));
    }

    #[test]
    fn finish_with_open_section_fails() {
        let mut b = Builder::new();
        let _open = b.begin_section(SectionKind::Status, "a", true);
        assert!(matches!(b.finish(1), Err(Error::UnbalancedSection(_))));
    }

    #[test]
    fn heading_after_body_fails() {
        let mut b = Builder::new();
        let h = b.begin_section(SectionKind::Status, "a", true);
        b.line("body first", Face::Plain);
        assert!(matches!(b.set_heading("late"), Err(Error::HeadingMisplaced(_))));
        b.end_section(h).unwrap();
    }

    #[test]
    fn washer_on_non_collapsible_fails() {
        let mut b = Builder::new();
        let h = b.begin_section(SectionKind::Commit, "abc", false);
        b.set_heading("abc").unwrap();
        assert!(b.set_washer(Box::new(|_: &mut Builder, _: &RefreshContext<'_>| -> anyhow::Result<()> { Ok(()) })).is_err());
        b.end_section(h).unwrap();
    }

    // ── rollback ──

    #[test]
    fn rollback_discards_partial_step() {
        let mut b = Builder::new();
        let keep = b.begin_section(SectionKind::Status, "keep", false);
        b.set_heading("keep").unwrap();
        b.end_section(keep).unwrap();

        let cp = b.checkpoint();
        let _dangling = b.begin_section(SectionKind::Status, "broken", true);
        b.set_heading("broken").unwrap();
        b.line("partial", Face::Added);
        assert!(b.ensure_balanced(&cp).is_err());
        b.rollback(cp);
        b.error_marker("broken", &"left open");

        let tree = b.finish(1).unwrap();
        assert_eq!(tree.text(), "keep\n! broken: left open\n");
        assert_eq!(tree.root().children.len(), 2);
        assert!(tree
            .find(&Key::root().child(SectionKind::Status, "broken"))
            .is_none());
        assert_eq!(tree.check_invariants(), Ok(()));
    }

    #[test]
    fn faces_track_absolute_offsets() {
        let mut b = Builder::new();
        b.insert("ab", Face::Plain);
        b.insert("cd", Face::Hash);
        let tree = b.finish(1).unwrap();
        assert_eq!(
            tree.faces(),
            &[FaceSpan {
                range: 2..4,
                face: Face::Hash
            }]
        );
    }
}
