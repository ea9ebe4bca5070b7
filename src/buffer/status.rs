//! Section inserters for the status buffer.

use super::{Inserter, RefreshContext};
use crate::git::{
    parse_commit_line, parse_diff, parse_lines, parse_stash_line, DiffFile, LineType,
};
use crate::section::{Builder, Face, SectionKind};

pub const INSERTERS: &[Inserter] = &[
    Inserter { name: "head", run: insert_head },
    Inserter { name: "merge", run: insert_merge },
    Inserter { name: "untracked", run: insert_untracked },
    Inserter { name: "unstaged", run: insert_unstaged },
    Inserter { name: "staged", run: insert_staged },
    Inserter { name: "stashes", run: insert_stashes },
    Inserter { name: "unpulled", run: insert_unpulled },
    Inserter { name: "unpushed", run: insert_unpushed },
];

const LOG_FORMAT: &str = "--format=%h %s";

// ── Head ──

fn insert_head(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let git = ctx.runner;
    let branch = git.optional_line(&["symbolic-ref", "--short", "-q", "HEAD"])?;
    let head = git.optional_line(&["log", "-1", LOG_FORMAT])?;
    let upstream = git.optional_line(&["rev-parse", "--abbrev-ref", "@{upstream}"])?;

    let section = b.begin_section(SectionKind::Generic, "head", false);
    let mut heading = vec![("Head:     ", Face::Heading)];
    match &branch {
        Some(name) => heading.push((name.as_str(), Face::CurrentBranch)),
        None => heading.push(("(detached)", Face::Dim)),
    }
    let head_commit = head.as_deref().and_then(|l| l.split_once(' '));
    match head_commit {
        Some((hash, subject)) => {
            heading.extend([(" ", Face::Plain), (hash, Face::Hash), (" ", Face::Plain), (subject, Face::Plain)]);
        }
        None => heading.push((" (no commits yet)", Face::Dim)),
    }
    b.set_heading_styled(&heading)?;

    if let Some(upstream) = &upstream {
        let tip = git.optional_line(&["log", "-1", LOG_FORMAT, "@{upstream}"])?;
        b.insert("Upstream: ", Face::Heading);
        b.insert(upstream, Face::RemoteBranch);
        if let Some((hash, subject)) = tip.as_deref().and_then(|l| l.split_once(' ')) {
            b.insert(" ", Face::Plain);
            b.insert(hash, Face::Hash);
            b.insert(" ", Face::Plain);
            b.insert(subject, Face::Plain);
        }
        b.blank();
    }

    if let Some(name) = &branch {
        insert_description(b, ctx, name)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

fn insert_description(b: &mut Builder, ctx: &RefreshContext<'_>, branch: &str) -> anyhow::Result<()> {
    let key = format!("branch.{}.description", branch);
    let out = ctx.runner.run(&["config", &key])?;
    let mut lines = out.stdout.iter().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next().filter(|_| out.success()) else {
        return Ok(());
    };

    let section = b.begin_section(SectionKind::BranchDescription, branch, true);
    b.set_heading_styled(&[("Description: ", Face::Heading), (first.as_str(), Face::Plain)])?;
    for line in lines {
        b.line(&format!("  {}", line), Face::Plain);
    }
    b.end_section(section)?;
    Ok(())
}

// ── Merge ──

fn insert_merge(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let git = ctx.runner;
    let Some(merge_head) = git.optional_line(&["rev-parse", "-q", "--short", "--verify", "MERGE_HEAD"])? else {
        return Ok(());
    };
    let lines = git.lines(&["log", LOG_FORMAT, "HEAD..MERGE_HEAD"])?;
    let parsed = parse_lines(&lines, parse_commit_line);
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }

    let section = b.begin_section(SectionKind::MergeLog, &merge_head, true);
    b.set_heading_styled(&[
        ("Merging ", Face::Heading),
        (merge_head.as_str(), Face::Hash),
        (format!(" ({})", parsed.records.len()).as_str(), Face::Dim),
    ])?;
    for commit in &parsed.records {
        insert_commit(b, &commit.hash, &commit.subject)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

// ── Files ──

fn insert_untracked(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let files = ctx
        .runner
        .lines(&["ls-files", "--others", "--exclude-standard", "--directory", "--no-empty-directory"])?;
    let files: Vec<&String> = files.iter().filter(|f| !f.is_empty()).collect();
    if files.is_empty() {
        return Ok(());
    }

    let section = b.begin_section(SectionKind::UntrackedGroup, "untracked", true);
    b.set_heading(&format!("Untracked files ({})", files.len()))?;
    for path in files {
        let file = b.begin_section(SectionKind::File, path, false);
        b.set_heading_styled(&[(path.as_str(), Face::FileHeading)])?;
        b.end_section(file)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

fn insert_unstaged(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let lines = ctx.runner.lines(&["diff", "--no-ext-diff", "--no-color"])?;
    insert_diff_group(b, "unstaged", "Unstaged changes", &lines)
}

fn insert_staged(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let lines = ctx.runner.lines(&["diff", "--cached", "--no-ext-diff", "--no-color"])?;
    insert_diff_group(b, "staged", "Staged changes", &lines)
}

fn insert_diff_group(b: &mut Builder, value: &str, title: &str, lines: &[String]) -> anyhow::Result<()> {
    let files = parse_diff(&lines.join("\n"));
    if files.is_empty() {
        return Ok(());
    }
    let section = b.begin_section(SectionKind::Status, value, true);
    b.set_heading(&format!("{} ({})", title, files.len()))?;
    for file in &files {
        insert_file(b, file)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

/// One file of a diff: a heading with status and path, one child section per hunk
fn insert_file(b: &mut Builder, file: &DiffFile) -> anyhow::Result<()> {
    let section = b.begin_section(SectionKind::File, &file.path, true);
    let label = format!("{:<11}", file.status.label());
    let renamed = match &file.status {
        crate::git::FileStatus::Renamed(old) => format!("{} -> ", old),
        _ => String::new(),
    };
    b.set_heading_styled(&[
        (label.as_str(), Face::Heading),
        (renamed.as_str(), Face::FileHeading),
        (file.path.as_str(), Face::FileHeading),
    ])?;

    for hunk in &file.hunks {
        let h = b.begin_section(SectionKind::Hunk, &hunk.header, true);
        b.set_heading_styled(&[(hunk.header.as_str(), Face::HunkHeading)])?;
        for line in &hunk.lines {
            let face = match line.line_type {
                LineType::Add => Face::Added,
                LineType::Delete => Face::Removed,
                LineType::Context => Face::Plain,
            };
            b.line(&format!("{}{}", line.marker, line.content), face);
        }
        b.end_section(h)?;
    }
    b.end_section(section)?;
    Ok(())
}

// ── Stashes ──

fn insert_stashes(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let lines = ctx.runner.lines(&["stash", "list"])?;
    let parsed = parse_lines(&lines, parse_stash_line);
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }
    if parsed.records.is_empty() {
        return Ok(());
    }

    let section = b.begin_section(SectionKind::Status, "stashes", true);
    b.set_heading(&format!("Stashes ({})", parsed.records.len()))?;
    for stash in parsed.records {
        let s = b.begin_section(SectionKind::Stash, &stash.reference, true);
        b.set_heading_styled(&[
            (stash.reference.as_str(), Face::Tag),
            (" ", Face::Plain),
            (stash.message.as_str(), Face::Plain),
        ])?;
        let reference = stash.reference.clone();
        b.set_washer(Box::new(move |b: &mut Builder, ctx: &RefreshContext<'_>| -> anyhow::Result<()> {
            for line in ctx.runner.lines(&["stash", "show", "--stat", &reference])? {
                b.line(&format!("  {}", line.trim_start()), Face::Dim);
            }
            Ok(())
        }))?;
        b.end_section(s)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

// ── Upstream logs ──

fn insert_unpulled(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    insert_upstream_log(b, ctx, "unpulled", "Unpulled from", "HEAD..@{upstream}")
}

fn insert_unpushed(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    insert_upstream_log(b, ctx, "unpushed", "Unpushed to", "@{upstream}..HEAD")
}

fn insert_upstream_log(
    b: &mut Builder,
    ctx: &RefreshContext<'_>,
    value: &str,
    title: &str,
    range: &str,
) -> anyhow::Result<()> {
    let git = ctx.runner;
    let Some(upstream) = git.optional_line(&["rev-parse", "--abbrev-ref", "@{upstream}"])? else {
        return Ok(());
    };
    let lines = git.lines(&["log", LOG_FORMAT, range])?;
    let parsed = parse_lines(&lines, parse_commit_line);
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }
    if parsed.records.is_empty() {
        return Ok(());
    }

    let section = b.begin_section(SectionKind::Status, value, true);
    b.set_heading_styled(&[
        (title, Face::Heading),
        (" ", Face::Heading),
        (upstream.as_str(), Face::RemoteBranch),
        (format!(" ({})", parsed.records.len()).as_str(), Face::Dim),
    ])?;
    for commit in &parsed.records {
        insert_commit(b, &commit.hash, &commit.subject)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

fn insert_commit(b: &mut Builder, hash: &str, subject: &str) -> anyhow::Result<()> {
    let c = b.begin_section(SectionKind::Commit, hash, false);
    b.set_heading_styled(&[(hash, Face::Hash), (" ", Face::Plain), (subject, Face::Plain)])?;
    b.end_section(c)?;
    Ok(())
}
