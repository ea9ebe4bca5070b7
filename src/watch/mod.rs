use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The working tree or refs changed; the buffers should be rebuilt
    Changed(Vec<PathBuf>),
}

/// A debounced file watcher over a repository's working tree
pub struct FileWatcher {
    _watcher: notify_debouncer_mini::Debouncer<RecommendedWatcher>,
}

impl FileWatcher {
    /// Start watching `root`. Relevant changes are debounced by `debounce_ms`
    /// and sent as [`WatchEvent::Changed`].
    pub fn new(root: &Path, debounce_ms: u64, tx: mpsc::Sender<WatchEvent>) -> Result<Self> {
        let mut debouncer = new_debouncer(
            Duration::from_millis(debounce_ms),
            move |result: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    let paths: Vec<PathBuf> = events
                        .into_iter()
                        .filter(|e| e.kind == DebouncedEventKind::Any)
                        .map(|e| e.path)
                        .filter(|p| is_relevant(p))
                        .collect();
                    if paths.is_empty() {
                        return;
                    }
                    debug!(changed = paths.len(), "watcher saw changes");
                    if tx.send(WatchEvent::Changed(paths)).is_err() {
                        debug!("watch receiver gone");
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            },
        )?;

        debouncer.watcher().watch(root, RecursiveMode::Recursive)?;

        Ok(FileWatcher {
            _watcher: debouncer,
        })
    }
}

/// Working-tree files count; inside `.git` only the index, HEAD, MERGE_HEAD and refs do
pub fn is_relevant(path: &Path) -> bool {
    let mut components = path.components();
    let in_git = components.any(|c| c == Component::Normal(".git".as_ref()));
    if !in_git {
        return true;
    }
    let rest: Vec<&std::ffi::OsStr> = components
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();
    match rest.first().and_then(|s| s.to_str()) {
        Some("index" | "HEAD" | "MERGE_HEAD") => rest.len() == 1,
        Some("refs") => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_tree_files_are_relevant() {
        assert!(is_relevant(Path::new("/repo/src/main.rs")));
    }

    #[test]
    fn git_internals_are_filtered() {
        assert!(is_relevant(Path::new("/repo/.git/index")));
        assert!(is_relevant(Path::new("/repo/.git/HEAD")));
        assert!(is_relevant(Path::new("/repo/.git/refs/heads/main")));
        assert!(!is_relevant(Path::new("/repo/.git/objects/ab/cdef")));
        assert!(!is_relevant(Path::new("/repo/.git/logs/HEAD")));
        assert!(!is_relevant(Path::new("/repo/.git/index.lock")));
    }
}
