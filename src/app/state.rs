use crate::buffer::{AsyncCompletion, BufferKind, RefreshContext, SectionBuffer};
use crate::config::StratumConfig;
use crate::error::Error;
use crate::git::{apply_stash, pop_stash, FilePosition, Git, GitRunner, HunkAnchor, StashApply, ToolOutput};
use crate::repos::display_name;
use crate::section::{SectionId, SectionKind, SectionTree, ROOT};
use anyhow::{Context, Result};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use tracing::{error, info};

/// Ticks a bottom-bar message stays up
const MESSAGE_TICKS: u32 = 20;

/// A file position to open in the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub path: PathBuf,
    pub position: FilePosition,
}

/// How to start the editor for a [`Visit`]
pub struct EditorLaunch {
    pub command: Command,
    /// Terminal editors need the screen handed over until they exit
    pub blocking: bool,
}

pub struct App {
    pub repo_root: PathBuf,
    runner: Box<dyn GitRunner>,
    pub config: StratumConfig,
    view: BufferKind,
    status: SectionBuffer,
    refs: SectionBuffer,

    /// Index into the visible lines of the current view
    cursor: usize,
    /// First visible line shown on screen
    scroll: usize,

    pub watching: bool,
    pub message: Option<String>,
    message_ticks: u32,
    pub should_quit: bool,

    completions_tx: mpsc::Sender<AsyncCompletion>,
    completions_rx: mpsc::Receiver<AsyncCompletion>,
    in_flight: usize,
}

impl App {
    pub fn new(git: Git, config: StratumConfig, view: BufferKind) -> Self {
        let root = git.root().to_path_buf();
        Self::with_runner(Box::new(git), root, config, view)
    }

    pub fn with_runner(
        runner: Box<dyn GitRunner>,
        repo_root: PathBuf,
        config: StratumConfig,
        view: BufferKind,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        let status = buffer_for(&config, BufferKind::Status);
        let refs = buffer_for(&config, BufferKind::Refs);
        let watching = config.watch.enabled;
        Self {
            repo_root,
            runner,
            config,
            view,
            status,
            refs,
            cursor: 0,
            scroll: 0,
            watching,
            message: None,
            message_ticks: 0,
            should_quit: false,
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    pub fn view(&self) -> BufferKind {
        self.view
    }

    pub fn buffer(&self) -> &SectionBuffer {
        match self.view {
            BufferKind::Status => &self.status,
            BufferKind::Refs => &self.refs,
        }
    }

    pub fn repo_name(&self) -> String {
        display_name(&self.repo_root)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn diagnostic_count(&self) -> usize {
        self.buffer().diagnostics().len()
    }

    /// Visible line ranges of the current view
    pub fn lines(&self) -> Vec<Range<usize>> {
        self.buffer()
            .tree()
            .map(SectionTree::visible_lines)
            .unwrap_or_default()
    }

    // ── Refresh ──

    /// Rebuild the current view
    pub fn refresh(&mut self) -> Result<()> {
        let ctx = RefreshContext::new(self.runner.as_ref(), &self.repo_root);
        let buffer = match self.view {
            BufferKind::Status => &mut self.status,
            BufferKind::Refs => &mut self.refs,
        };
        buffer.refresh(&ctx)?;
        self.sync_cursor();
        Ok(())
    }

    pub fn switch_view(&mut self, view: BufferKind) -> Result<()> {
        if self.view == view {
            return Ok(());
        }
        self.view = view;
        self.scroll = 0;
        if self.buffer().tree().is_none() {
            return self.refresh();
        }
        self.sync_cursor();
        Ok(())
    }

    // ── Cursor ──

    /// Put the cursor on the visible line holding the buffer's point
    fn sync_cursor(&mut self) {
        let point = self.buffer().point();
        let lines = self.lines();
        self.cursor = lines
            .partition_point(|l| l.start <= point)
            .saturating_sub(1);
    }

    fn set_point(&mut self, point: usize) {
        match self.view {
            BufferKind::Status => self.status.set_point(point),
            BufferKind::Refs => self.refs.set_point(point),
        }
        self.sync_cursor();
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let lines = self.lines();
        if lines.is_empty() {
            return;
        }
        let target = self
            .cursor
            .saturating_add_signed(delta)
            .min(lines.len() - 1);
        self.set_point(lines[target].start);
    }

    pub fn move_to_top(&mut self) {
        self.set_point(0);
    }

    pub fn move_to_bottom(&mut self) {
        if let Some(last) = self.lines().last() {
            self.set_point(last.start);
        }
    }

    /// First line to draw so the cursor stays within `height` rows
    pub fn scroll_for(&mut self, height: usize) -> usize {
        if height == 0 {
            return self.scroll;
        }
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + height {
            self.scroll = self.cursor + 1 - height;
        }
        self.scroll
    }

    /// Innermost section under the cursor that satisfies `pred`
    fn enclosing(&self, pred: impl Fn(SectionKind, bool) -> bool) -> Option<(SectionId, &SectionTree)> {
        let tree = self.buffer().tree()?;
        let at = tree.section_at(self.buffer().point());
        tree.ancestors(at)
            .into_iter()
            .filter(|&id| id != ROOT)
            .find(|&id| {
                tree.get(id)
                    .map(|s| pred(s.kind, s.collapsible))
                    .unwrap_or(false)
            })
            .map(|id| (id, tree))
    }

    // ── Sections ──

    /// Toggle the nearest collapsible section around the cursor
    pub fn toggle_at_point(&mut self) -> Result<()> {
        let Some((id, tree)) = self.enclosing(|_, collapsible| collapsible) else {
            return Ok(());
        };
        let start = tree.get(id)?.start;
        let handle = crate::buffer::SectionRef {
            generation: tree.generation(),
            id,
        };

        let ctx = RefreshContext::new(self.runner.as_ref(), &self.repo_root);
        let buffer = match self.view {
            BufferKind::Status => &mut self.status,
            BufferKind::Refs => &mut self.refs,
        };
        let result = buffer.toggle(handle, &ctx);
        // the body may have disappeared from under the cursor
        self.set_point(start);
        match result {
            Ok(_) => Ok(()),
            Err(err @ Error::WasherFailure { .. }) => {
                self.notify(&err.to_string());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// File position under the cursor; `None` outside a hunk
    pub fn visit_at_point(&self) -> Result<Option<Visit>> {
        let Some((hunk, tree)) = self.enclosing(|kind, _| kind == SectionKind::Hunk) else {
            return Ok(None);
        };
        let section = tree.get(hunk)?;
        // on the hunk heading, go to the hunk's first line
        let point = self.buffer().point().max(section.content);
        let anchor = HunkAnchor::from_rendered(tree, hunk, point)?;
        let position = anchor.file_position()?;

        let file = tree
            .ancestors(hunk)
            .into_iter()
            .find_map(|id| tree.get(id).ok().filter(|s| s.kind == SectionKind::File))
            .context("hunk outside a file section")?;
        Ok(Some(Visit {
            path: self.repo_root.join(&file.value),
            position,
        }))
    }

    /// Resolve the visit target, reporting problems on the bottom bar
    pub fn visit(&mut self) -> Option<Visit> {
        match self.visit_at_point() {
            Ok(Some(visit)) => Some(visit),
            Ok(None) => {
                self.notify("Not on a hunk");
                None
            }
            Err(err) => {
                error!(error = %err, "cannot map cursor to file position");
                self.notify(&format!("Cannot visit: {}", err));
                None
            }
        }
    }

    // ── Stashes ──

    fn stash_at_point(&self) -> Option<String> {
        let (id, tree) = self.enclosing(|kind, _| kind == SectionKind::Stash)?;
        tree.get(id).ok().map(|s| s.value.clone())
    }

    pub fn apply_stash_at_point(&mut self, pop: bool) -> Result<()> {
        let Some(reference) = self.stash_at_point() else {
            self.notify("No stash at point");
            return Ok(());
        };
        let result = if pop {
            pop_stash(self.runner.as_ref(), &reference)
        } else {
            apply_stash(self.runner.as_ref(), &reference)
        };
        match result {
            Ok(applied) => {
                let verb = if pop { "Popped" } else { "Applied" };
                let note = match applied {
                    StashApply::WithIndex => "",
                    StashApply::WithoutIndex => " (index not restored)",
                };
                self.notify(&format!("{} {}{}", verb, reference, note));
            }
            Err(err) => self.notify(&format!("{:#}", err)),
        }
        self.refresh()
    }

    // ── Async git ──

    /// Start `git fetch --all`; the view rebuilds when it finishes
    pub fn fetch(&mut self) -> Result<()> {
        self.spawn_async("fetch", &["fetch", "--all"])
    }

    fn spawn_async(&mut self, label: &str, args: &[&str]) -> Result<()> {
        let tx = self.completions_tx.clone();
        let generation = self.buffer().generation();
        let label = label.to_string();
        let callback_label = label.clone();
        self.in_flight += 1;
        let started = self.runner.run_async(
            args.iter().map(|a| a.to_string()).collect(),
            Box::new(move |output: ToolOutput| {
                // the app may have quit already
                let _ = tx.send(AsyncCompletion {
                    generation,
                    label: callback_label,
                    output,
                });
            }),
        );
        if let Err(err) = started {
            self.in_flight -= 1;
            return Err(err);
        }
        info!(%label, generation, "async git started");
        self.notify(&format!("Running git {}...", label));
        Ok(())
    }

    /// Fold finished async calls into the current view. Returns true if any arrived.
    pub fn poll_async(&mut self) -> Result<bool> {
        let mut any = false;
        while let Ok(completion) = self.completions_rx.try_recv() {
            any = true;
            self.in_flight = self.in_flight.saturating_sub(1);

            let ctx = RefreshContext::new(self.runner.as_ref(), &self.repo_root);
            let buffer = match self.view {
                BufferKind::Status => &mut self.status,
                BufferKind::Refs => &mut self.refs,
            };
            buffer.on_async_complete(&completion, &ctx)?;
            self.sync_cursor();

            let message = if completion.output.success() {
                format!("git {} finished", completion.label)
            } else {
                format!("git {} failed", completion.label)
            };
            self.notify(&message);
        }
        Ok(any)
    }

    // ── Messages ──

    pub fn notify(&mut self, msg: &str) {
        self.message = Some(msg.to_string());
        self.message_ticks = 0;
    }

    /// Called every event-loop iteration; expires the bottom-bar message
    pub fn tick(&mut self) {
        if self.message.is_some() {
            self.message_ticks += 1;
            if self.message_ticks > MESSAGE_TICKS {
                self.message = None;
                self.message_ticks = 0;
            }
        }
    }
}

fn buffer_for(config: &StratumConfig, kind: BufferKind) -> SectionBuffer {
    let names = match kind {
        BufferKind::Status => &config.status.sections,
        BufferKind::Refs => &config.refs.sections,
    };
    SectionBuffer::new(kind, kind.inserters(names), config.sections.policy())
}

/// Editor invocation for `visit`, honoring `$EDITOR` (default `code`)
pub fn editor_command(repo_root: &Path, visit: &Visit) -> EditorLaunch {
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "code".to_string());
    editor_launch(&editor, repo_root, visit)
}

fn editor_launch(editor: &str, repo_root: &Path, visit: &Visit) -> EditorLaunch {
    let FilePosition { line, column } = visit.position;
    let target = format!("{}:{}:{}", visit.path.display(), line, column + 1);

    let mut command = Command::new(editor);
    let blocking = if editor.contains("code") || editor.contains("cursor") {
        command.arg(repo_root).arg("-g").arg(target);
        false
    } else if editor.contains("zed") {
        command.arg(repo_root).arg(target);
        false
    } else {
        command.arg(format!("+{}", line)).arg(&visit.path);
        true
    };
    EditorLaunch { command, blocking }
}
