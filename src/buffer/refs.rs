//! Section inserters for the refs buffer: local branches, remotes and tags.

use super::{Inserter, RefreshContext};
use crate::git::{
    format_tracking, parse_branch_line, parse_cherry_line, parse_count, parse_lines,
    parse_remote_line, parse_tag_line, resolve_local_upstreams, BranchRecord, CherryMark,
    RemoteDirection,
};
use crate::section::{Builder, Face, SectionKind};

pub const INSERTERS: &[Inserter] = &[
    Inserter { name: "local", run: insert_local_branches },
    Inserter { name: "remotes", run: insert_remotes },
    Inserter { name: "tags", run: insert_tags },
];

// ── Local branches ──

fn insert_local_branches(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let lines = ctx.runner.lines(&["branch", "-vv", "--no-color"])?;
    let mut parsed = parse_lines(&lines, parse_branch_line);
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }
    resolve_local_upstreams(&mut parsed.records);

    let section = b.begin_section(SectionKind::Status, "local", true);
    b.set_heading(&format!("Branches ({})", parsed.records.len()))?;
    for branch in &parsed.records {
        insert_branch(b, branch)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

/// A branch line; with an upstream its body is the cherry list, built on first expansion
fn insert_branch(b: &mut Builder, branch: &BranchRecord) -> anyhow::Result<()> {
    let name = branch.name.as_deref().unwrap_or("(detached)");
    let section = b.begin_section(SectionKind::Branch, name, branch.upstream.is_some());

    let flag = if branch.current {
        "* "
    } else if branch.worktree {
        "+ "
    } else {
        "  "
    };
    let name_face = if branch.current {
        Face::CurrentBranch
    } else {
        Face::Branch
    };
    let tracking = format_tracking(branch);
    let mut heading = vec![
        (flag, Face::Plain),
        (name, name_face),
        (" ", Face::Plain),
        (branch.hash.as_str(), Face::Hash),
    ];
    if !tracking.is_empty() {
        heading.extend([(" ", Face::Plain), (tracking.as_str(), Face::RemoteBranch)]);
    }
    if !branch.subject.is_empty() {
        heading.extend([(" ", Face::Plain), (branch.subject.as_str(), Face::Plain)]);
    }
    b.set_heading_styled(&heading)?;

    if let (Some(upstream), Some(local)) = (&branch.upstream, &branch.name) {
        if !branch.gone {
            let upstream = upstream.clone();
            let local = local.clone();
            b.set_washer(Box::new(
                move |b: &mut Builder, ctx: &RefreshContext<'_>| -> anyhow::Result<()> {
                    insert_cherries(b, ctx, &upstream, &local)
                },
            ))?;
        }
    }
    b.end_section(section)?;
    Ok(())
}

fn insert_cherries(b: &mut Builder, ctx: &RefreshContext<'_>, upstream: &str, branch: &str) -> anyhow::Result<()> {
    let lines = ctx.runner.lines(&["cherry", "-v", upstream, branch])?;
    let parsed = parse_lines(&lines, parse_cherry_line);
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }
    for commit in &parsed.records {
        let mark = match commit.cherry {
            Some(CherryMark::Equivalent) => ("  - ", Face::Dim),
            _ => ("  + ", Face::Added),
        };
        let c = b.begin_section(SectionKind::Commit, &commit.hash, false);
        b.set_heading_styled(&[
            mark,
            (commit.hash.as_str(), Face::Hash),
            (" ", Face::Plain),
            (commit.subject.as_str(), Face::Plain),
        ])?;
        b.end_section(c)?;
    }
    Ok(())
}

// ── Remotes ──

fn insert_remotes(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let git = ctx.runner;
    let remotes = parse_lines(&git.lines(&["remote", "-v"])?, parse_remote_line);
    let branches = parse_lines(&git.lines(&["branch", "-r", "-v", "--no-color"])?, parse_branch_line);
    for skipped in remotes.skipped.iter().chain(&branches.skipped) {
        b.warn(skipped.to_string());
    }

    for remote in remotes
        .records
        .iter()
        .filter(|r| r.direction == RemoteDirection::Fetch)
    {
        let prefix = format!("{}/", remote.name);
        let section = b.begin_section(SectionKind::Remote, &remote.name, true);
        b.set_heading_styled(&[
            ("Remote ", Face::Heading),
            (remote.name.as_str(), Face::RemoteBranch),
            (" (", Face::Dim),
            (remote.url.as_str(), Face::Dim),
            (")", Face::Dim),
        ])?;
        for branch in &branches.records {
            let Some(name) = branch.name.as_deref().filter(|n| n.starts_with(&prefix)) else {
                continue;
            };
            let s = b.begin_section(SectionKind::Branch, name, false);
            b.set_heading_styled(&[
                ("  ", Face::Plain),
                (name, Face::RemoteBranch),
                (" ", Face::Plain),
                (branch.hash.as_str(), Face::Hash),
                (" ", Face::Plain),
                (branch.subject.as_str(), Face::Plain),
            ])?;
            b.end_section(s)?;
        }
        b.end_section(section)?;
        b.blank();
    }
    Ok(())
}

// ── Tags ──

fn insert_tags(b: &mut Builder, ctx: &RefreshContext<'_>) -> anyhow::Result<()> {
    let git = ctx.runner;
    let mut parsed = parse_lines(&git.lines(&["tag", "--sort=-creatordate"])?, parse_tag_line);
    for tag in &mut parsed.records {
        let range = format!("{}..HEAD", tag.name);
        tag.commits = match git.optional_line(&["rev-list", "--count", &range])? {
            Some(line) => match parse_count(&line) {
                Ok(n) => Some(n),
                Err(err) => {
                    b.warn(err.to_string());
                    None
                }
            },
            None => None,
        };
    }
    for skipped in &parsed.skipped {
        b.warn(skipped.to_string());
    }
    if parsed.records.is_empty() {
        return Ok(());
    }

    let section = b.begin_section(SectionKind::Status, "tags", true);
    b.set_heading(&format!("Tags ({})", parsed.records.len()))?;
    for tag in &parsed.records {
        let t = b.begin_section(SectionKind::Tag, &tag.name, false);
        let count = tag.commits.map(|n| format!(" ({})", n)).unwrap_or_default();
        b.set_heading_styled(&[(tag.name.as_str(), Face::Tag), (count.as_str(), Face::Dim)])?;
        b.end_section(t)?;
    }
    b.end_section(section)?;
    b.blank();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferKind, SectionBuffer};
    use crate::git::ScriptedRunner;
    use crate::section::{HiddenPolicy, Key};
    use std::path::Path;

    const BRANCHES: &str = "\
* main    1a2b3c4 [origin/main: ahead 1] Fix build
  feature 5d6e7f8 Add the thing
  old     9a9a9a9 [origin/old: gone] Stale";

    fn runner(branches: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .ok("branch -vv --no-color", branches)
            .ok("cherry -v origin/main main", "+ 1a2b3c4 Fix build\n- 0b0b0b0 Upstreamed")
            .ok(
                "remote -v",
                "origin\thttps://example.com/r.git (fetch)\norigin\thttps://example.com/r.git (push)",
            )
            .ok(
                "branch -r -v --no-color",
                "  origin/HEAD -> origin/main\n  origin/main 0f0f0f0 Older",
            )
            .ok("tag --sort=-creatordate", "v1.0\nv0.9")
            .ok("rev-list --count v1.0..HEAD", "3")
            .ok("rev-list --count v0.9..HEAD", "17")
    }

    fn refs_buffer(hidden: &[SectionKind]) -> SectionBuffer {
        let names: Vec<String> = ["local", "remotes", "tags"].iter().map(|s| s.to_string()).collect();
        SectionBuffer::new(
            BufferKind::Refs,
            BufferKind::Refs.inserters(&names),
            HiddenPolicy::new(hidden.iter().copied()),
        )
    }

    fn main_key() -> Key {
        Key::root()
            .child(SectionKind::Status, "local")
            .child(SectionKind::Branch, "main")
    }

    #[test]
    fn renders_refs_buffer() {
        let runner = runner(BRANCHES);
        let ctx = RefreshContext::new(&runner, Path::new("/repo"));
        let mut buf = refs_buffer(&[SectionKind::Branch]);
        buf.refresh(&ctx).unwrap();

        let expected = "\
Branches (3)
* main 1a2b3c4 [origin/main: ahead 1] Fix build
  feature 5d6e7f8 Add the thing
  old 9a9a9a9 [origin/old: gone] Stale

Remote origin (https://example.com/r.git)
  origin/main 0f0f0f0 Older

Tags (2)
v1.0 (3)
v0.9 (17)

";
        assert_eq!(buf.render_visible(), expected);
        // symbolic origin/HEAD line
        assert_eq!(buf.diagnostics().len(), 1);
        assert_eq!(runner.count("cherry -v origin/main main"), 0);
    }

    #[test]
    fn branch_fold_state_survives_refresh() {
        let runner = runner(BRANCHES);
        let ctx = RefreshContext::new(&runner, Path::new("/repo"));
        let mut buf = refs_buffer(&[SectionKind::Branch]);
        buf.refresh(&ctx).unwrap();

        let tree = buf.tree().unwrap();
        let point = tree.get(tree.find(&main_key()).unwrap()).unwrap().start;
        let handle = buf.section_at(point).unwrap();
        assert!(buf.toggle(handle, &ctx).unwrap());
        assert_eq!(runner.count("cherry -v origin/main main"), 1);

        for _ in 0..2 {
            buf.refresh(&ctx).unwrap();
            let tree = buf.tree().unwrap();
            let main = tree.find(&main_key()).unwrap();
            assert!(!tree.get(main).unwrap().hidden);
        }
        // every rebuild of the expanded branch washes it again
        assert_eq!(runner.count("cherry -v origin/main main"), 3);
        let text = buf.render_visible();
        assert!(text.contains("  + 1a2b3c4 Fix build\n  - 0b0b0b0 Upstreamed\n"));

        let tree = buf.tree().unwrap();
        let feature = tree
            .find(
                &Key::root()
                    .child(SectionKind::Status, "local")
                    .child(SectionKind::Branch, "feature"),
            )
            .unwrap();
        let feature = tree.get(feature).unwrap();
        assert!(!feature.collapsible);
        assert!(!feature.hidden);
    }

    #[test]
    fn cherry_failure_is_inline() {
        let runner = ScriptedRunner::new().ok("branch -vv --no-color", "* topic 1a2b3c4 [origin/topic] wip");
        let ctx = RefreshContext::new(&runner, Path::new("/repo"));
        let mut buf = SectionBuffer::new(
            BufferKind::Refs,
            BufferKind::Refs.inserters(&["local".to_string()]),
            HiddenPolicy::default(),
        );
        buf.refresh(&ctx).unwrap();
        assert!(buf.render_visible().contains("! git cherry -v origin/topic topic failed"));
        assert_eq!(buf.diagnostics().len(), 1);
    }

    #[test]
    fn local_upstream_branches_get_cherry_washers() {
        let runner = ScriptedRunner::new()
            .ok(
                "branch -vv --no-color",
                "* main 1a2b3c4 base\n  feature 5d6e7f8 [main: ahead 1] subj\n  topic 5d6e7f8 [main] other",
            )
            .ok("cherry -v main feature", "+ 5d6e7f8 subj")
            .ok("cherry -v main topic", "");
        let ctx = RefreshContext::new(&runner, Path::new("/repo"));
        let mut buf = SectionBuffer::new(
            BufferKind::Refs,
            BufferKind::Refs.inserters(&["local".to_string()]),
            HiddenPolicy::default(),
        );
        buf.refresh(&ctx).unwrap();

        let local = Key::root().child(SectionKind::Status, "local");
        let tree = buf.tree().unwrap();
        for name in ["feature", "topic"] {
            let id = tree.find(&local.child(SectionKind::Branch, name)).unwrap();
            assert!(tree.get(id).unwrap().collapsible, "{} has an upstream", name);
        }
        assert_eq!(runner.count("cherry -v main feature"), 1);
        assert_eq!(runner.count("cherry -v main topic"), 1);
        let text = buf.render_visible();
        assert!(text.contains("  feature 5d6e7f8 [main: ahead 1] subj\n  + 5d6e7f8 subj\n"));
        assert!(text.contains("  topic 5d6e7f8 [main] other\n"));
    }

    #[test]
    fn empty_tag_list_emits_nothing() {
        let runner = ScriptedRunner::new().ok("tag --sort=-creatordate", "");
        let ctx = RefreshContext::new(&runner, Path::new("/repo"));
        let mut b = Builder::new();
        insert_tags(&mut b, &ctx).unwrap();
        assert_eq!(b.finish(1).unwrap().text(), "");
    }
}
