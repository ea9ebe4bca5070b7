mod diff;
mod position;
mod refs;
mod runner;
mod stash;

pub use diff::{parse_diff, parse_hunk_header, DiffFile, DiffHunk, DiffLine, FileStatus, LineType};
pub use position::{FilePosition, HunkAnchor};
pub use refs::{
    format_tracking, parse_branch_line, parse_cherry_line, parse_commit_line, parse_count,
    parse_lines, parse_remote_line, parse_stash_line, parse_tag_line, resolve_local_upstreams,
    BranchRecord, CherryMark,
    CommitRecord, Parsed, RemoteDirection, RemoteRecord, StashRecord, TagRecord,
};
pub use runner::{Git, GitRunner, OnComplete, ToolOutput};
pub use stash::{apply_stash, pop_stash, StashApply};

#[cfg(test)]
pub use runner::ScriptedRunner;
