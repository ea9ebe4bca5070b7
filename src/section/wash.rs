use super::builder::Graft;
use super::{Builder, Face, FoldState, SectionId, SectionTree, Washer};
use crate::buffer::RefreshContext;
use crate::error::{Error, Result};
use tracing::{debug, warn};

/// Expand a section, running its washer if the body was never built.
///
/// Returns `Ok(true)` when a washer ran. Sections the washer creates get their
/// fold state from `fold`, like sections built eagerly. A failing washer keeps
/// whatever it emitted, gets an inline error marker appended, and leaves the
/// section expanded; the failure is then returned as [`Error::WasherFailure`].
pub fn expand(
    tree: &mut SectionTree,
    id: SectionId,
    ctx: &RefreshContext<'_>,
    fold: &FoldState<'_>,
) -> Result<bool> {
    let section = tree.get_mut(id)?;
    if !section.collapsible {
        return Ok(false);
    }
    section.hidden = false;

    let washer = std::mem::replace(&mut section.washer, Washer::Eager);
    let Washer::Deferred(wash) = washer else {
        return Ok(false);
    };

    let at = section.end;
    let key = section.key.clone();
    let mut builder = Builder::nested(id, key.clone(), at, tree.len());
    let result = wash(&mut builder, ctx);
    let left_open = builder.close_all();

    let failure = match result {
        Err(err) => Some(format!("{:#}", err)),
        Ok(()) if left_open > 0 => Some(format!("{} section(s) left open", left_open)),
        Ok(()) => None,
    };
    if let Some(reason) = &failure {
        builder.line(&format!("! {}", reason), Face::Error);
    }

    let mut graft = builder.into_graft();
    for node in &mut graft.nodes {
        fold.apply(node);
    }
    let added = graft.nodes.len();
    tree.splice(id, at, graft);
    debug!(key = %key, added, "washer ran");

    match failure {
        Some(reason) => {
            warn!(key = %key, %reason, "washer failed");
            Err(Error::WasherFailure {
                key: key.to_string(),
                reason,
            })
        }
        None => Ok(true),
    }
}

/// Hide a section's body; no-op for non-collapsible sections
pub fn collapse(tree: &mut SectionTree, id: SectionId) -> Result<()> {
    let section = tree.get_mut(id)?;
    if section.collapsible {
        section.hidden = true;
    }
    Ok(())
}

/// Flip a section between expanded and collapsed
pub fn toggle(
    tree: &mut SectionTree,
    id: SectionId,
    ctx: &RefreshContext<'_>,
    fold: &FoldState<'_>,
) -> Result<bool> {
    if tree.get(id)?.hidden {
        expand(tree, id, ctx, fold)
    } else {
        collapse(tree, id)?;
        Ok(false)
    }
}

impl SectionTree {
    /// Insert washer output at `at`, the end of `parent`'s (empty) body
    fn splice(&mut self, parent: SectionId, at: usize, graft: Graft) {
        let delta = graft.text.len();
        let ancestors = self.ancestors(parent);

        for (id, section) in self.nodes.iter_mut().enumerate() {
            if ancestors.contains(&id) {
                section.end += delta;
            } else if section.start >= at {
                section.start += delta;
                section.content += delta;
                section.end += delta;
            }
        }
        for face in self.faces.iter_mut() {
            if face.range.start >= at {
                face.range.start += delta;
                face.range.end += delta;
            }
        }

        self.text.insert_str(at, &graft.text);
        self.faces.extend(graft.faces);
        self.faces.sort_by_key(|f| f.range.start);
        self.nodes.extend(graft.nodes);
        self.nodes[parent].children.extend(graft.top_level);
    }
}
