//! Graph mining: three passes that contract the PPM tree into an
//! equivalence-class DAG.
//!
//! The symmetric pass merges the branches of symmetric inosculations. The
//! asymmetric pass searches one branch for terminating subtrees similar to
//! the other branch. The recurrence pass finds stem sections that repeat
//! further down the same stem, encapsulates each repetition in a wrapper
//! and merges them. All passes only merge groups (plus the wrappers the
//! recurrence pass inserts); the flattened model is unchanged.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{Model, VertexBody, VertexId};

// ── Symmetric pass ─────────────────────────────────────────────────

/// Merge the branches of every symmetric inosculation, bottom-up.
pub fn mine_symmetric(model: &mut Model) {
    if let Some(h) = model.head() {
        mine_symmetric_r(model, h);
    }
    debug!(groups = model.group_count(), "symmetric pass done");
}

fn mine_symmetric_r(model: &mut Model, v: VertexId) {
    match model.vertex(v).body {
        VertexBody::Segment { .. } => {}
        VertexBody::Inosculation { pp, cp, .. } => {
            if let Some(p) = pp {
                mine_symmetric_r(model, p);
            }
            if let Some(c) = cp {
                mine_symmetric_r(model, c);
            }
            if model.insc_is_symmetric(v) {
                model.merge_recursive(pp, cp);
            }
        }
        VertexBody::Wrapper { wp } => {
            if let Some(w) = wp {
                mine_symmetric_r(model, w);
            }
        }
    }

    if let Some(n) = model.np(v) {
        mine_symmetric_r(model, n);
    }
}

// ── Asymmetric pass ────────────────────────────────────────────────

/// For every asymmetric inosculation, search one branch (the haystack)
/// for terminating subtrees similar to the other branch (the needle) and
/// merge each match with the needle. Roles swap when nothing is found.
pub fn mine_asymmetric(model: &mut Model) {
    if let Some(h) = model.head() {
        mine_asymmetric_r(model, h);
    }
    debug!(groups = model.group_count(), "asymmetric pass done");
}

fn mine_asymmetric_r(model: &mut Model, v: VertexId) {
    match model.vertex(v).body {
        VertexBody::Segment { .. } => {}
        VertexBody::Wrapper { wp } => {
            if let Some(w) = wp {
                mine_asymmetric_r(model, w);
            }
        }
        VertexBody::Inosculation { pp, cp, .. } => {
            if let Some(p) = pp {
                mine_asymmetric_r(model, p);
            }
            if let Some(c) = cp {
                mine_asymmetric_r(model, c);
            }

            if !model.insc_is_symmetric(v) {
                if let (Some(p), Some(c)) = (pp, cp) {
                    let mut needle = c;
                    let mut matches = Vec::new();
                    find_terminating(model, Some(p), needle, &mut matches);
                    if matches.is_empty() {
                        needle = p;
                        find_terminating(model, Some(c), needle, &mut matches);
                    }
                    for m in matches {
                        model.merge_recursive(Some(needle), Some(m));
                    }
                }
            }
        }
    }

    if let Some(n) = model.np(v) {
        mine_asymmetric_r(model, n);
    }
}

/// DFS over `haystack` for subtrees similar to `needle` (summary-checked,
/// so a match terminates like the needle does). A match stops the descent
/// of its branch; subtrees too small to contain the needle are pruned.
pub fn find_terminating(
    model: &Model,
    haystack: Option<VertexId>,
    needle: VertexId,
    matches: &mut Vec<VertexId>,
) {
    let Some(h) = haystack else { return };

    if model.is_similar(Some(h), Some(needle), true) {
        matches.push(h);
        return;
    }

    let (hd, hv) = (model.vertex(h).depth, model.vertex(h).vcnt);
    let (nd, nv) = (model.vertex(needle).depth, model.vertex(needle).vcnt);
    if hd < nd || hv < nv {
        return;
    }

    match model.vertex(h).body {
        VertexBody::Segment { .. } => {}
        VertexBody::Inosculation { pp, cp, .. } => {
            find_terminating(model, pp, needle, matches);
            find_terminating(model, cp, needle, matches);
        }
        VertexBody::Wrapper { wp } => {
            find_terminating(model, wp, needle, matches);
        }
    }

    find_terminating(model, model.np(h), needle, matches);
}

// ── Recurrence pass ────────────────────────────────────────────────

/// Find stem sections that repeat further down their own stem. The first
/// occurrence is wrapped; every later occurrence with the same extent is
/// wrapped too and merged with the first, so all repetitions end up as
/// wrappers sharing one group. Wrappers inserted by this pass are
/// remembered in a pass-local set and not rescanned.
pub fn mine_recurrence(model: &mut Model) {
    let mut inserted: HashSet<VertexId> = HashSet::new();
    if let Some(h) = model.head() {
        mine_recurrence_r(model, h, &mut inserted);
    }
    debug!(
        groups = model.group_count(),
        wrappers = inserted.len(),
        "recurrence pass done"
    );
}

fn mine_recurrence_r(model: &mut Model, v: VertexId, inserted: &mut HashSet<VertexId>) {
    if let VertexBody::Inosculation { pp, cp, .. } = model.vertex(v).body {
        if let Some(p) = pp {
            mine_recurrence_r(model, p, inserted);
        }
        if let Some(c) = cp {
            mine_recurrence_r(model, c, inserted);
        }
    }

    let mut np = model.np(v);
    // Where the recursion continues: the first successor that did not
    // match (it may still start its own recurrence).
    let mut resume = np;
    let mut resume_fixed = false;

    if !inserted.contains(&v) {
        // Extent of the first wrapped occurrence; later matches must end
        // at the same vertex to be folded into the same recurrence.
        let mut wrap_end: Option<VertexId> = None;
        let mut first_wrapper: Option<VertexId> = None;

        while let Some(n) = np {
            let found = model.find_similar_stem(Some(v), Some(n), false);

            let accepted = match (found, wrap_end) {
                (Some((vend, _)), None) => Some(vend),
                (Some((vend, _)), Some(canon)) if vend == canon => Some(vend),
                _ => None,
            };

            match (accepted, found) {
                (Some(vend), Some((_, nend))) => {
                    if wrap_end.is_none() {
                        let w = model.wrap_section(v, vend);
                        inserted.insert(w);
                        wrap_end = Some(vend);
                        first_wrapper = Some(w);
                    }

                    let w2 = model.wrap_section(n, nend);
                    inserted.insert(w2);
                    model.merge_recursive(Some(v), Some(n));

                    let first = first_wrapper.expect("set at the first match");
                    let (g1, g2) = (model.vertex(first).group, model.vertex(w2).group);
                    model.merge_groups(g1, g2);

                    np = model.np(w2);
                }
                _ => {
                    if !resume_fixed {
                        resume = Some(n);
                        resume_fixed = true;
                    }
                    np = model.np(n);
                }
            }
        }
    }

    if let Some(r) = resume {
        mine_recurrence_r(model, r, inserted);
    }
}

// ── Tests ──────────────────────────────────────────────────────────
