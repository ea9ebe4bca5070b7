//! Line parsers for `git branch`, `git tag`, `git stash list`, `git remote`
//! and one-line commit listings.

use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::warn;

// ── Records ──

/// One line of `git branch -vv` (or `git branch -r -v`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    /// `None` for a detached HEAD
    pub name: Option<String>,
    pub current: bool,
    /// Checked out in another worktree (`+` flag)
    pub worktree: bool,
    pub hash: String,
    pub subject: String,
    pub upstream: Option<String>,
    /// Absent when git printed no count, which is not the same as zero
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
    /// Upstream configured but deleted on the remote
    pub gone: bool,
}

/// A tag and how many commits HEAD is ahead of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub name: String,
    pub commits: Option<usize>,
}

/// One line of `git stash list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashRecord {
    pub index: usize,
    /// `stash@{N}`
    pub reference: String,
    pub branch: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDirection {
    Fetch,
    Push,
}

/// One line of `git remote -v`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub name: String,
    pub url: String,
    pub direction: RemoteDirection,
}

/// `git cherry` marker: `+` not yet upstream, `-` an equivalent change exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CherryMark {
    Missing,
    Equivalent,
}

/// One line of `git log --format='%h %s'` or `git cherry -v`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub subject: String,
    pub cherry: Option<CherryMark>,
}

/// Records parsed from a block of output plus the lines that were dropped
#[derive(Debug)]
pub struct Parsed<T> {
    pub records: Vec<T>,
    pub skipped: Vec<Error>,
}

/// Parse every non-blank line; lines failing their grammar are skipped and reported
pub fn parse_lines<T>(lines: &[String], parse: fn(&str) -> Result<T>) -> Parsed<T> {
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse(line) {
            Ok(record) => records.push(record),
            Err(err) => {
                warn!(error = %err, "skipping line");
                skipped.push(err);
            }
        }
    }
    Parsed { records, skipped }
}

// ── Branches ──

fn is_hash(s: &str) -> bool {
    s.len() >= 4 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Split off the first whitespace-delimited token
fn token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// Parse `* name hash [upstream: ahead N, behind M] subject`.
///
/// The two-column flag is `*` for the current branch and `+` for a branch
/// checked out in another worktree. A detached HEAD shows a parenthesized
/// description instead of a name. The tracking clause and its counts are
/// optional; the hash is not.
pub fn parse_branch_line(line: &str) -> Result<BranchRecord> {
    if line.len() < 2 || !line.is_char_boundary(2) {
        return Err(Error::malformed("branch", line, "missing flag column"));
    }
    let (flag, rest) = line.split_at(2);
    let current = flag.starts_with('*');
    let worktree = flag.starts_with('+');
    let rest = rest.trim_start();

    let (name, rest) = if rest.starts_with('(') {
        let close = rest
            .find(')')
            .ok_or_else(|| Error::malformed("branch", line, "unterminated detached description"))?;
        (None, &rest[close + 1..])
    } else {
        let (name, rest) = token(rest);
        if name.is_empty() {
            return Err(Error::malformed("branch", line, "missing branch name"));
        }
        if rest.trim_start().starts_with("->") {
            return Err(Error::malformed("branch", line, "symbolic ref"));
        }
        (Some(name.to_string()), rest)
    };

    let (hash, rest) = token(rest);
    if !is_hash(hash) {
        return Err(Error::malformed("branch", line, "missing commit hash"));
    }

    let mut rest = rest.trim_start();
    if worktree && rest.starts_with('(') {
        if let Some(close) = rest.find(") ") {
            rest = rest[close + 1..].trim_start();
        }
    }

    let mut tracking = None;
    if rest.starts_with('[') {
        if let Some(close) = rest.find(']') {
            if let Some(parsed) = parse_tracking(&rest[1..close]) {
                tracking = Some(parsed);
                rest = &rest[close + 1..];
            }
        }
    }
    let (upstream, ahead, behind, gone) = match tracking {
        Some(t) => (Some(t.upstream), t.ahead, t.behind, t.gone),
        None => (None, None, None, false),
    };

    Ok(BranchRecord {
        name,
        current,
        worktree,
        hash: hash.to_string(),
        subject: rest.trim().to_string(),
        upstream,
        ahead,
        behind,
        gone,
    })
}

struct Tracking {
    upstream: String,
    ahead: Option<usize>,
    behind: Option<usize>,
    gone: bool,
}

/// Parse the inside of `[origin/main: ahead 1, behind 2]`.
/// Returns `None` when the brackets are not a tracking clause (e.g. a subject like `[WIP]`).
///
/// With counts, any single-word upstream is accepted as long as every count parses.
/// Without counts only a remote-tracking ref (`origin/main`) is recognized here; a bare
/// local upstream like `[main]` is resolved later by [`resolve_local_upstreams`].
fn parse_tracking(clause: &str) -> Option<Tracking> {
    let (upstream, counts) = match clause.split_once(": ") {
        Some((u, c)) => (u, Some(c)),
        None => (clause, None),
    };
    if upstream.is_empty() || upstream.contains(char::is_whitespace) {
        return None;
    }
    if counts.is_none() && !upstream.contains('/') {
        return None;
    }

    let mut tracking = Tracking {
        upstream: upstream.to_string(),
        ahead: None,
        behind: None,
        gone: false,
    };
    for part in counts.into_iter().flat_map(|c| c.split(", ")) {
        if part == "gone" {
            tracking.gone = true;
        } else if let Some(n) = part.strip_prefix("ahead ") {
            tracking.ahead = Some(n.parse().ok()?);
        } else if let Some(n) = part.strip_prefix("behind ") {
            tracking.behind = Some(n.parse().ok()?);
        } else {
            return None;
        }
    }
    Some(tracking)
}

/// Reread a leading `[name]` in the subject as an in-sync upstream when `name` is
/// another branch in the same listing.
pub fn resolve_local_upstreams(branches: &mut [BranchRecord]) {
    let names: HashSet<String> = branches.iter().filter_map(|b| b.name.clone()).collect();
    for branch in branches.iter_mut().filter(|b| b.upstream.is_none()) {
        let Some(inner) = branch.subject.strip_prefix('[') else {
            continue;
        };
        let Some((candidate, rest)) = inner.split_once(']') else {
            continue;
        };
        if branch.name.as_deref() == Some(candidate) || !names.contains(candidate) {
            continue;
        }
        branch.upstream = Some(candidate.to_string());
        branch.subject = rest.trim().to_string();
    }
}

/// Render the tracking clause the way `git branch -vv` does, or nothing without an upstream
pub fn format_tracking(branch: &BranchRecord) -> String {
    let Some(upstream) = &branch.upstream else {
        return String::new();
    };
    if branch.gone {
        return format!("[{}: gone]", upstream);
    }
    let mut counts = Vec::new();
    if let Some(n) = branch.ahead {
        counts.push(format!("ahead {}", n));
    }
    if let Some(n) = branch.behind {
        counts.push(format!("behind {}", n));
    }
    if counts.is_empty() {
        format!("[{}]", upstream)
    } else {
        format!("[{}: {}]", upstream, counts.join(", "))
    }
}

// ── Tags ──

/// Parse one line of `git tag`; the commit count is filled in separately
pub fn parse_tag_line(line: &str) -> Result<TagRecord> {
    let name = line.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(Error::malformed("tag", line, "expected a single tag name"));
    }
    Ok(TagRecord {
        name: name.to_string(),
        commits: None,
    })
}

/// Parse the single number printed by `git rev-list --count`
pub fn parse_count(line: &str) -> Result<usize> {
    line.trim()
        .parse()
        .map_err(|_| Error::malformed("count", line, "expected a non-negative integer"))
}

// ── Stashes ──

/// Parse `stash@{0}: WIP on main: abc1234 subject` or `stash@{1}: On main: message`
pub fn parse_stash_line(line: &str) -> Result<StashRecord> {
    let (reference, rest) = line
        .split_once(": ")
        .ok_or_else(|| Error::malformed("stash", line, "missing ': ' after reference"))?;
    let index = reference
        .strip_prefix("stash@{")
        .and_then(|r| r.strip_suffix('}'))
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::malformed("stash", line, "expected stash@{N}"))?;

    let described = rest
        .strip_prefix("WIP on ")
        .or_else(|| rest.strip_prefix("On "))
        .and_then(|r| r.split_once(": "));
    let (branch, message) = match described {
        Some((branch, message)) => {
            let branch = (branch != "(no branch)").then(|| branch.to_string());
            (branch, message.to_string())
        }
        None => (None, rest.to_string()),
    };

    Ok(StashRecord {
        index,
        reference: reference.to_string(),
        branch,
        message,
    })
}

// ── Remotes ──

/// Parse `origin\thttps://example.com/repo.git (fetch)`
pub fn parse_remote_line(line: &str) -> Result<RemoteRecord> {
    let mut fields = line.split_whitespace();
    let (Some(name), Some(url), Some(direction)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(Error::malformed("remote", line, "expected name, url and direction"));
    };
    let direction = match direction {
        "(fetch)" => RemoteDirection::Fetch,
        "(push)" => RemoteDirection::Push,
        _ => return Err(Error::malformed("remote", line, "unknown direction")),
    };
    Ok(RemoteRecord {
        name: name.to_string(),
        url: url.to_string(),
        direction,
    })
}

// ── Commits ──

/// Parse `abc1234 subject`
pub fn parse_commit_line(line: &str) -> Result<CommitRecord> {
    let (hash, subject) = token(line);
    if !is_hash(hash) {
        return Err(Error::malformed("commit", line, "missing commit hash"));
    }
    Ok(CommitRecord {
        hash: hash.to_string(),
        subject: subject.trim().to_string(),
        cherry: None,
    })
}

/// Parse `+ abc1234 subject` from `git cherry -v`
pub fn parse_cherry_line(line: &str) -> Result<CommitRecord> {
    let (mark, rest) = token(line);
    let cherry = match mark {
        "+" => CherryMark::Missing,
        "-" => CherryMark::Equivalent,
        _ => return Err(Error::malformed("cherry", line, "expected '+' or '-' marker")),
    };
    let mut record = parse_commit_line(rest.trim_start())?;
    record.cherry = Some(cherry);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_branch_line ──

    #[test]
    fn branch_without_tracking_clause_has_no_counts() {
        let b = parse_branch_line("  feature   1a2b3c4 Add the thing").unwrap();
        assert_eq!(b.name.as_deref(), Some("feature"));
        assert!(!b.current);
        assert_eq!(b.hash, "1a2b3c4");
        assert_eq!(b.subject, "Add the thing");
        assert_eq!(b.upstream, None);
        assert_eq!(b.ahead, None);
        assert_eq!(b.behind, None);
    }

    #[test]
    fn branch_behind_only_leaves_ahead_absent() {
        let b = parse_branch_line("* main 1a2b3c4 [origin/main: behind 2] Fix build").unwrap();
        assert!(b.current);
        assert_eq!(b.upstream.as_deref(), Some("origin/main"));
        assert_eq!(b.ahead, None);
        assert_eq!(b.behind, Some(2));
        assert_eq!(b.subject, "Fix build");
    }

    #[test]
    fn branch_ahead_and_behind() {
        let b = parse_branch_line("  dev 1a2b3c4 [origin/dev: ahead 3, behind 12] wip").unwrap();
        assert_eq!(b.ahead, Some(3));
        assert_eq!(b.behind, Some(12));
    }

    #[test]
    fn branch_in_sync_upstream_has_no_counts() {
        let b = parse_branch_line("  dev 1a2b3c4 [origin/dev] wip").unwrap();
        assert_eq!(b.upstream.as_deref(), Some("origin/dev"));
        assert_eq!((b.ahead, b.behind), (None, None));
    }

    #[test]
    fn branch_gone_upstream() {
        let b = parse_branch_line("  old 1a2b3c4 [origin/old: gone] stale").unwrap();
        assert!(b.gone);
        assert_eq!(format_tracking(&b), "[origin/old: gone]");
    }

    #[test]
    fn detached_head_has_no_name() {
        let b = parse_branch_line("* (HEAD detached at 1a2b3c4) 1a2b3c4 Some commit").unwrap();
        assert_eq!(b.name, None);
        assert!(b.current);
        assert_eq!(b.hash, "1a2b3c4");
        assert_eq!(b.subject, "Some commit");
    }

    #[test]
    fn bracketed_subject_is_not_tracking() {
        let b = parse_branch_line("  wip 1a2b3c4 [WIP] half done").unwrap();
        assert_eq!(b.upstream, None);
        assert_eq!(b.subject, "[WIP] half done");
    }

    #[test]
    fn counted_clause_accepts_any_upstream_name() {
        let b = parse_branch_line("  x 1a2b3c4 [upstream: behind 2] subj").unwrap();
        assert_eq!(b.upstream.as_deref(), Some("upstream"));
        assert_eq!(b.ahead, None);
        assert_eq!(b.behind, Some(2));
        assert_eq!(b.subject, "subj");
    }

    #[test]
    fn local_upstream_with_counts() {
        let b = parse_branch_line("  feature 1a2b3c4 [main: ahead 3] subj").unwrap();
        assert_eq!(b.upstream.as_deref(), Some("main"));
        assert_eq!(b.ahead, Some(3));
        assert_eq!(b.behind, None);
        assert_eq!(b.subject, "subj");
    }

    #[test]
    fn bracketed_subject_with_colon_is_not_tracking() {
        let b = parse_branch_line("  wip 1a2b3c4 [WIP: not yet] half done").unwrap();
        assert_eq!(b.upstream, None);
        assert_eq!(b.subject, "[WIP: not yet] half done");
    }

    // ── resolve_local_upstreams ──

    #[test]
    fn in_sync_local_upstream_is_resolved_against_listing() {
        let mut branches = vec![
            parse_branch_line("* main 1a2b3c4 [origin/main] base").unwrap(),
            parse_branch_line("  feature 1a2b3c4 [main] subj").unwrap(),
            parse_branch_line("  wip 1a2b3c4 [WIP] half done").unwrap(),
        ];
        assert_eq!(branches[1].upstream, None);

        resolve_local_upstreams(&mut branches);
        assert_eq!(branches[0].upstream.as_deref(), Some("origin/main"));
        assert_eq!(branches[1].upstream.as_deref(), Some("main"));
        assert_eq!(branches[1].subject, "subj");
        assert_eq!((branches[1].ahead, branches[1].behind), (None, None));
        assert_eq!(branches[2].upstream, None);
        assert_eq!(branches[2].subject, "[WIP] half done");
    }

    #[test]
    fn worktree_branch_skips_path() {
        let b = parse_branch_line("+ other 1a2b3c4 (/tmp/wt) [origin/other] msg").unwrap();
        assert!(b.worktree);
        assert_eq!(b.upstream.as_deref(), Some("origin/other"));
        assert_eq!(b.subject, "msg");
    }

    #[test]
    fn branch_missing_hash_is_malformed() {
        let err = parse_branch_line("  feature").unwrap_err();
        assert!(matches!(err, Error::MalformedLine { kind: "branch", .. }));
    }

    #[test]
    fn symbolic_remote_ref_is_rejected() {
        assert!(parse_branch_line("  origin/HEAD -> origin/main").is_err());
        let b = parse_branch_line("  origin/main 1a2b3c4 Merge pull request").unwrap();
        assert_eq!(b.name.as_deref(), Some("origin/main"));
    }

    // ── format_tracking ──

    #[test]
    fn format_tracking_distinguishes_absent_and_counts() {
        let mut b = parse_branch_line("  x 1a2b3c4 s").unwrap();
        assert_eq!(format_tracking(&b), "");
        b.upstream = Some("origin/x".into());
        assert_eq!(format_tracking(&b), "[origin/x]");
        b.behind = Some(0);
        assert_eq!(format_tracking(&b), "[origin/x: behind 0]");
        b.ahead = Some(1);
        assert_eq!(format_tracking(&b), "[origin/x: ahead 1, behind 0]");
    }

    // ── parse_lines ──

    #[test]
    fn parse_lines_collects_skips() {
        let lines: Vec<String> = ["* main 1a2b3c4 ok", "", "  origin/HEAD -> origin/main", "  bad"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let parsed = parse_lines(&lines, parse_branch_line);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.skipped.len(), 2);
    }

    // ── tags, counts ──

    #[test]
    fn tag_line_is_single_name() {
        assert_eq!(parse_tag_line("v1.2.0\n").unwrap().name, "v1.2.0");
        assert!(parse_tag_line("two words").is_err());
    }

    #[test]
    fn count_rejects_negative() {
        assert_eq!(parse_count(" 17 ").unwrap(), 17);
        assert!(parse_count("-1").is_err());
    }

    // ── stashes ──

    #[test]
    fn stash_wip_line() {
        let s = parse_stash_line("stash@{0}: WIP on main: 1a2b3c4 Fix build").unwrap();
        assert_eq!(s.index, 0);
        assert_eq!(s.reference, "stash@{0}");
        assert_eq!(s.branch.as_deref(), Some("main"));
        assert_eq!(s.message, "1a2b3c4 Fix build");
    }

    #[test]
    fn stash_message_line() {
        let s = parse_stash_line("stash@{12}: On feature/x: try again").unwrap();
        assert_eq!(s.index, 12);
        assert_eq!(s.branch.as_deref(), Some("feature/x"));
        assert_eq!(s.message, "try again");
    }

    #[test]
    fn stash_without_prefix_keeps_message() {
        let s = parse_stash_line("stash@{1}: autostash").unwrap();
        assert_eq!(s.branch, None);
        assert_eq!(s.message, "autostash");
        assert!(parse_stash_line("garbage").is_err());
    }

    // ── remotes ──

    #[test]
    fn remote_line() {
        let r = parse_remote_line("origin\tgit@example.com:me/repo.git (push)").unwrap();
        assert_eq!(r.name, "origin");
        assert_eq!(r.url, "git@example.com:me/repo.git");
        assert_eq!(r.direction, RemoteDirection::Push);
        assert!(parse_remote_line("origin").is_err());
    }

    // ── commits ──

    #[test]
    fn cherry_line_marks() {
        let c = parse_cherry_line("+ 1a2b3c4 Add feature").unwrap();
        assert_eq!(c.cherry, Some(CherryMark::Missing));
        assert_eq!(c.subject, "Add feature");
        let c = parse_cherry_line("- 1a2b3c4 Already upstream").unwrap();
        assert_eq!(c.cherry, Some(CherryMark::Equivalent));
        assert!(parse_cherry_line("1a2b3c4 no mark").is_err());
    }

    #[test]
    fn commit_line_requires_hash() {
        assert!(parse_commit_line("not-a-hash subject").is_err());
        assert_eq!(parse_commit_line("deadbeef").unwrap().subject, "");
    }
}
