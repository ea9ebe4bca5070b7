use super::{Key, Section, SectionId, SectionKind, SectionTree};
use std::collections::{HashMap, HashSet};

/// Per-kind default for the `hidden` flag of sections seen for the first time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiddenPolicy {
    hidden: HashSet<SectionKind>,
}

impl HiddenPolicy {
    pub fn new(kinds: impl IntoIterator<Item = SectionKind>) -> Self {
        Self {
            hidden: kinds.into_iter().collect(),
        }
    }

    pub fn default_hidden(&self, kind: SectionKind) -> bool {
        self.hidden.contains(&kind)
    }
}

/// Fold state to carry into sections built after a rebuild: the previous
/// tree's key→hidden index plus the per-kind policy for new keys.
pub struct FoldState<'a> {
    policy: &'a HiddenPolicy,
    previous: HashMap<&'a Key, bool>,
}

impl<'a> FoldState<'a> {
    pub fn new(previous: Option<&'a SectionTree>, policy: &'a HiddenPolicy) -> Self {
        let mut index = HashMap::new();
        if let Some(prev) = previous {
            for (_, section) in prev.iter() {
                index.entry(&section.key).or_insert(section.hidden);
            }
        }
        Self {
            policy,
            previous: index,
        }
    }

    /// Set `section.hidden`; returns true when the previous tree had its key
    pub(crate) fn apply(&self, section: &mut Section) -> bool {
        if !section.collapsible {
            section.hidden = false;
            return false;
        }
        match self.previous.get(&section.key) {
            Some(&hidden) => {
                section.hidden = hidden;
                true
            }
            None => {
                section.hidden = self.policy.default_hidden(section.kind);
                false
            }
        }
    }

    /// Copy fold state into every section of `next` by key path.
    ///
    /// Sections without a counterpart take the policy default. Non-collapsible
    /// sections are always expanded. Returns how many sections were matched.
    pub fn reconcile(&self, next: &mut SectionTree) -> usize {
        let mut matched = 0;
        for section in next.nodes_mut() {
            if self.apply(section) {
                matched += 1;
            }
        }
        matched
    }
}

/// Cursor position expressed relative to the section containing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorAnchor {
    pub key: Key,
    pub offset: usize,
}

/// Record where `point` is, relative to its innermost section
pub fn capture_cursor(tree: &SectionTree, point: usize) -> CursorAnchor {
    let id = tree.section_at(point);
    let section = &tree.nodes[id];
    CursorAnchor {
        key: section.key.clone(),
        offset: point.saturating_sub(section.start),
    }
}

/// Translate an anchor into a point in a rebuilt tree.
///
/// An exact key match restores the offset, clamped to the section's new
/// length. Otherwise the nearest ancestor key still present wins and point
/// goes to that section's start.
pub fn restore_cursor(tree: &SectionTree, anchor: &CursorAnchor) -> usize {
    if let Some(id) = tree.find(&anchor.key) {
        let section = &tree.nodes[id];
        return section.start + anchor.offset.min(section.len().saturating_sub(1));
    }

    let mut key = anchor.key.parent();
    while let Some(candidate) = key {
        if let Some(id) = tree.find(&candidate) {
            return tree.nodes[id].start;
        }
        key = candidate.parent();
    }
    0
}

/// Sections that are expanded, visible, and still waiting for their washer
pub(crate) fn pending_washers(tree: &SectionTree) -> Vec<SectionId> {
    tree.iter()
        .filter(|(id, s)| s.washer.is_deferred() && !s.hidden && tree.is_visible(*id))
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::{Builder, Face};
    use crate::buffer::RefreshContext;
    use super::*;

    fn build(branches: &[&str]) -> SectionTree {
        let mut b = Builder::new();
        let group = b.begin_section(SectionKind::Status, "local", true);
        b.set_heading("Branches").unwrap();
        for name in branches {
            let h = b.begin_section(SectionKind::Branch, name, true);
            b.set_heading(name).unwrap();
            b.line("  abc1234 subject", Face::Plain);
            b.end_section(h).unwrap();
        }
        b.end_section(group).unwrap();
        let commit = b.begin_section(SectionKind::Commit, "abc1234", false);
        b.set_heading("abc1234 subject").unwrap();
        b.end_section(commit).unwrap();
        b.finish(1).unwrap()
    }

    fn branch_key(name: &str) -> Key {
        Key::root()
            .child(SectionKind::Status, "local")
            .child(SectionKind::Branch, name)
    }

    // ── reconcile ──

    #[test]
    fn first_build_uses_policy() {
        let mut tree = build(&["main", "dev"]);
        let policy = HiddenPolicy::new([SectionKind::Branch]);
        assert_eq!(FoldState::new(None, &policy).reconcile(&mut tree), 0);
        let main = tree.find(&branch_key("main")).unwrap();
        assert!(tree.get(main).unwrap().hidden);
        let group = tree
            .find(&Key::root().child(SectionKind::Status, "local"))
            .unwrap();
        assert!(!tree.get(group).unwrap().hidden);
    }

    #[test]
    fn hidden_flag_survives_rebuild() {
        let policy = HiddenPolicy::new([SectionKind::Branch]);
        let mut old = build(&["main", "dev"]);
        FoldState::new(None, &policy).reconcile(&mut old);
        let dev = old.find(&branch_key("dev")).unwrap();
        old.get_mut(dev).unwrap().hidden = false;

        let mut new = build(&["feature", "main", "dev"]);
        let matched = FoldState::new(Some(&old), &policy).reconcile(&mut new);
        assert_eq!(matched, 3); // group + main + dev

        let dev = new.find(&branch_key("dev")).unwrap();
        let main = new.find(&branch_key("main")).unwrap();
        let feature = new.find(&branch_key("feature")).unwrap();
        assert!(!new.get(dev).unwrap().hidden);
        assert!(new.get(main).unwrap().hidden);
        assert!(new.get(feature).unwrap().hidden);
    }

    #[test]
    fn non_collapsible_never_hidden() {
        let mut tree = build(&[]);
        let policy = HiddenPolicy::new([SectionKind::Commit]);
        FoldState::new(None, &policy).reconcile(&mut tree);
        assert!(tree.iter().all(|(_, s)| s.kind != SectionKind::Commit || !s.hidden));
    }

    // ── cursor ──

    #[test]
    fn cursor_restores_offset_in_same_section() {
        let old = build(&["main", "dev"]);
        let dev = old.find(&branch_key("dev")).unwrap();
        let point = old.get(dev).unwrap().start + 6;
        let anchor = capture_cursor(&old, point);
        assert_eq!(anchor.key, branch_key("dev"));

        let new = build(&["a", "b", "main", "dev"]);
        let dev = new.find(&branch_key("dev")).unwrap();
        assert_eq!(restore_cursor(&new, &anchor), new.get(dev).unwrap().start + 6);
    }

    #[test]
    fn cursor_offset_clamped_to_new_length() {
        let old = build(&["main"]);
        let anchor = CursorAnchor {
            key: branch_key("main"),
            offset: 10_000,
        };
        let main = old.find(&branch_key("main")).unwrap();
        let section = old.get(main).unwrap();
        assert_eq!(restore_cursor(&old, &anchor), section.end - 1);
    }

    #[test]
    fn cursor_falls_back_to_nearest_ancestor() {
        let old = build(&["gone", "main"]);
        let gone = old.find(&branch_key("gone")).unwrap();
        let anchor = capture_cursor(&old, old.get(gone).unwrap().start + 2);

        let new = build(&["main"]);
        let group = new
            .find(&Key::root().child(SectionKind::Status, "local"))
            .unwrap();
        assert_eq!(restore_cursor(&new, &anchor), new.get(group).unwrap().start);
    }

    #[test]
    fn pending_washers_skip_hidden_and_invisible() {
        let mut b = Builder::new();
        let outer = b.begin_section(SectionKind::Status, "local", true);
        b.set_heading("Branches").unwrap();
        let inner = b.begin_section(SectionKind::Branch, "main", true);
        b.set_heading("main").unwrap();
        b.set_washer(Box::new(|_: &mut Builder, _: &RefreshContext<'_>| -> anyhow::Result<()> { Ok(()) })).unwrap();
        b.end_section(inner).unwrap();
        b.end_section(outer).unwrap();
        let mut tree = b.finish(1).unwrap();

        FoldState::new(None, &HiddenPolicy::default()).reconcile(&mut tree);
        assert_eq!(pending_washers(&tree).len(), 1);

        let outer = tree
            .find(&Key::root().child(SectionKind::Status, "local"))
            .unwrap();
        tree.get_mut(outer).unwrap().hidden = true;
        assert!(pending_washers(&tree).is_empty());
    }
}
