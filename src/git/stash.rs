use super::runner::GitRunner;
use anyhow::Result;
use tracing::{info, warn};

/// Which attempt restored the stash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashApply {
    /// Index state was restored too
    WithIndex,
    /// The first attempt failed; the stash went back without its staged state
    WithoutIndex,
}

/// Apply `reference` (e.g. `stash@{0}`), preserving the index when git allows.
///
/// A failed `--index` attempt is retried once without it, whatever the cause
/// of the failure; only the second failure is reported.
pub fn apply_stash(runner: &dyn GitRunner, reference: &str) -> Result<StashApply> {
    let first = runner.run(&["stash", "apply", "--index", reference])?;
    if first.success() {
        info!(%reference, "stash applied with index");
        return Ok(StashApply::WithIndex);
    }
    warn!(
        %reference,
        stderr = %first.stderr.trim(),
        "stash apply --index failed, retrying without index"
    );

    let second = runner.run(&["stash", "apply", reference])?;
    if !second.success() {
        anyhow::bail!("git stash apply {} failed: {}", reference, second.stderr.trim());
    }
    info!(%reference, "stash applied without index");
    Ok(StashApply::WithoutIndex)
}

/// Apply and then drop `reference`; the stash is kept if applying failed
pub fn pop_stash(runner: &dyn GitRunner, reference: &str) -> Result<StashApply> {
    let applied = apply_stash(runner, reference)?;
    let out = runner.run(&["stash", "drop", reference])?;
    if !out.success() {
        anyhow::bail!("git stash drop {} failed: {}", reference, out.stderr.trim());
    }
    Ok(applied)
}
