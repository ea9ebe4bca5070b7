//! A buffer is an ordered list of section inserters plus the tree they last produced.
//!
//! `refresh` rebuilds the whole tree from fresh git output, then carries fold
//! state and the cursor over from the previous tree by key.

pub mod refs;
pub mod status;

use crate::error::{Error, Result};
use crate::git::{GitRunner, ToolOutput};
use crate::section::{
    self, capture_cursor, restore_cursor, Builder, FoldState, HiddenPolicy, SectionId, SectionTree,
};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Upper bound on washer rounds per refresh; washers may reveal further deferred sections
const MAX_WASH_ROUNDS: usize = 8;

/// Everything a rebuild may consult, passed explicitly instead of living in globals
#[derive(Clone, Copy)]
pub struct RefreshContext<'a> {
    pub runner: &'a dyn GitRunner,
    pub repo_root: &'a Path,
}

impl<'a> RefreshContext<'a> {
    pub fn new(runner: &'a dyn GitRunner, repo_root: &'a Path) -> Self {
        Self { runner, repo_root }
    }
}

/// One content-producing step of a rebuild
pub type InsertFn = fn(&mut Builder, &RefreshContext<'_>) -> anyhow::Result<()>;

#[derive(Clone, Copy)]
pub struct Inserter {
    pub name: &'static str,
    pub run: InsertFn,
}

impl std::fmt::Debug for Inserter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Status,
    Refs,
}

impl BufferKind {
    pub fn label(&self) -> &'static str {
        match self {
            BufferKind::Status => "status",
            BufferKind::Refs => "refs",
        }
    }

    /// All inserters this buffer kind knows, in default order
    pub fn available(&self) -> &'static [Inserter] {
        match self {
            BufferKind::Status => status::INSERTERS,
            BufferKind::Refs => refs::INSERTERS,
        }
    }

    /// Resolve configured names to inserters, keeping their order. Unknown names are skipped.
    pub fn inserters(&self, names: &[String]) -> Vec<Inserter> {
        let available = self.available();
        names
            .iter()
            .filter_map(|name| {
                let found = available.iter().find(|i| i.name == name).copied();
                if found.is_none() {
                    warn!(buffer = self.label(), %name, "unknown section inserter");
                }
                found
            })
            .collect()
    }
}

/// A section id that remembers which tree generation it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRef {
    pub generation: u64,
    pub id: SectionId,
}

/// Output of a finished asynchronous git invocation, tagged with the generation that issued it
#[derive(Debug, Clone)]
pub struct AsyncCompletion {
    pub generation: u64,
    pub label: String,
    pub output: ToolOutput,
}

pub struct SectionBuffer {
    kind: BufferKind,
    inserters: Vec<Inserter>,
    policy: HiddenPolicy,
    tree: Option<SectionTree>,
    generation: u64,
    point: usize,
    diagnostics: Vec<String>,
}

impl SectionBuffer {
    pub fn new(kind: BufferKind, inserters: Vec<Inserter>, policy: HiddenPolicy) -> Self {
        Self {
            kind,
            inserters,
            policy,
            tree: None,
            generation: 0,
            point: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// The tree of the last refresh, `None` before the first one
    pub fn tree(&self) -> Option<&SectionTree> {
        self.tree.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn set_point(&mut self, point: usize) {
        let len = self.tree.as_ref().map(|t| t.text().len()).unwrap_or(0);
        self.point = point.min(len.saturating_sub(1));
    }

    /// Problems noticed during the last refresh and later expansions
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Rebuild from scratch and reconcile against the previous tree.
    ///
    /// A failing inserter loses only its own output, replaced by an inline
    /// error marker. Expanded sections whose body is deferred are washed
    /// before returning.
    pub fn refresh(&mut self, ctx: &RefreshContext<'_>) -> Result<()> {
        let started = Instant::now();
        let anchor = self.tree.as_ref().map(|t| capture_cursor(t, self.point));
        let mut diagnostics = Vec::new();

        let mut builder = Builder::new();
        for inserter in &self.inserters {
            let checkpoint = builder.checkpoint();
            let result = (inserter.run)(&mut builder, ctx)
                .and_then(|()| builder.ensure_balanced(&checkpoint).map_err(anyhow::Error::from));
            if let Err(err) = result {
                let reason = format!("{:#}", err);
                warn!(buffer = self.kind.label(), inserter = inserter.name, %reason, "inserter failed");
                builder.rollback(checkpoint);
                builder.error_marker(inserter.name, &reason);
                diagnostics.push(format!("{}: {}", inserter.name, reason));
            }
        }
        diagnostics.extend(builder.take_diagnostics());

        self.generation += 1;
        let mut tree = builder.finish(self.generation)?;
        let fold = FoldState::new(self.tree.as_ref(), &self.policy);
        let matched = fold.reconcile(&mut tree);

        for _ in 0..MAX_WASH_ROUNDS {
            let pending = section::pending_washers(&tree);
            if pending.is_empty() {
                break;
            }
            for id in pending {
                if let Err(err) = section::expand(&mut tree, id, ctx, &fold) {
                    diagnostics.push(err.to_string());
                }
            }
        }

        self.point = match anchor {
            Some(anchor) => restore_cursor(&tree, &anchor),
            None => 0,
        };
        debug!(
            buffer = self.kind.label(),
            generation = self.generation,
            sections = tree.len(),
            matched,
            diagnostics = diagnostics.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "buffer refreshed"
        );
        self.tree = Some(tree);
        self.diagnostics = diagnostics;
        Ok(())
    }

    /// Handle to the innermost section at `point`
    pub fn section_at(&self, point: usize) -> Option<SectionRef> {
        let tree = self.tree.as_ref()?;
        Some(SectionRef {
            generation: tree.generation(),
            id: tree.section_at(point),
        })
    }

    /// Check that `section` belongs to the current tree
    pub fn resolve(&self, section: SectionRef) -> Result<SectionId> {
        let current = self.tree.as_ref().map(|t| t.generation()).unwrap_or(0);
        if section.generation != current {
            return Err(Error::StaleSection {
                handle: section.generation,
                current,
            });
        }
        Ok(section.id)
    }

    fn tree_for(&mut self, handle: SectionRef) -> Result<(&mut SectionTree, SectionId, &HiddenPolicy)> {
        let id = self.resolve(handle)?;
        let tree = self.tree.as_mut().ok_or(Error::UnknownSection(id))?;
        Ok((tree, id, &self.policy))
    }

    pub fn toggle(&mut self, handle: SectionRef, ctx: &RefreshContext<'_>) -> Result<bool> {
        let (tree, id, policy) = self.tree_for(handle)?;
        let result = section::toggle(tree, id, ctx, &FoldState::new(None, policy));
        self.note(result)
    }

    pub fn expand(&mut self, handle: SectionRef, ctx: &RefreshContext<'_>) -> Result<bool> {
        let (tree, id, policy) = self.tree_for(handle)?;
        let result = section::expand(tree, id, ctx, &FoldState::new(None, policy));
        self.note(result)
    }

    pub fn collapse(&mut self, handle: SectionRef) -> Result<()> {
        let (tree, id, _) = self.tree_for(handle)?;
        section::collapse(tree, id)
    }

    fn note(&mut self, result: Result<bool>) -> Result<bool> {
        if let Err(err @ Error::WasherFailure { .. }) = &result {
            self.diagnostics.push(err.to_string());
        }
        result
    }

    /// React to a finished asynchronous git call by rebuilding
    pub fn on_async_complete(&mut self, completion: &AsyncCompletion, ctx: &RefreshContext<'_>) -> Result<()> {
        let stale = completion.generation != self.generation;
        debug!(
            label = %completion.label,
            exit = completion.output.exit_code,
            issued = completion.generation,
            current = self.generation,
            stale,
            "async git completed"
        );
        if !completion.output.success() {
            let message = format!(
                "{} failed: {}",
                completion.label,
                completion.output.stderr.trim()
            );
            warn!(%message, "async git failed");
            self.refresh(ctx)?;
            self.diagnostics.push(message);
            return Ok(());
        }
        self.refresh(ctx)
    }

    /// Visible text as it would be displayed, one line per row
    pub fn render_visible(&self) -> String {
        let Some(tree) = &self.tree else {
            return String::new();
        };
        let mut out = String::new();
        for line in tree.visible_lines() {
            out.push_str(&tree.text()[line]);
            out.push('\n');
        }
        out
    }
}
