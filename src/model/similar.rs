//! Stem similarity: the longest common stem prefix of two subtrees.
//!
//! A stem is a chain of vertices linked exclusively by `np`. Two stems are
//! similar iff they form identical PPM trees considered as detached units.
//! Segment contents never enter the comparison — similarity is purely
//! structural; segment equivalence is handled later by clustering.
//!
//! Wrappers are transparent to the comparison: when a wrapper meets a bare
//! stem, its wrapped subgraph is matched against the other side as a
//! detached unit (summary checking forced off there, since the wrapped
//! stem does not sit on top of anything), and on full coverage the match
//! continues behind the wrapper.
//!
//! The matcher carries the vertices currently serving as match starts on
//! each side, so overlapping probes on one stem terminate instead of
//! running into themselves.

use std::collections::HashSet;

use super::{Model, Vertex, VertexBody, VertexId};

struct StemMatcher<'a> {
    model: &'a Model,
    starts1: HashSet<VertexId>,
    starts2: HashSet<VertexId>,
}

impl<'a> StemMatcher<'a> {
    fn new(model: &'a Model) -> Self {
        Self {
            model,
            starts1: HashSet::new(),
            starts2: HashSet::new(),
        }
    }

    fn vx(&self, v: VertexId) -> &Vertex {
        self.model.vertex(v)
    }

    /// Guarded entry point: registers the pair as match starts for the
    /// duration of the descent.
    fn matched(
        &mut self,
        v1: Option<VertexId>,
        v2: Option<VertexId>,
        check_summary: bool,
    ) -> Option<(VertexId, VertexId)> {
        let (a, b) = match (v1, v2) {
            (Some(a), Some(b)) if a != b => (a, b),
            // One side ends before the other, both are absent, or the
            // probe folded onto itself.
            _ => return None,
        };

        // Overlap: one endpoint is already serving as the other side's
        // start further up the recursion.
        if self.starts2.contains(&a) || self.starts1.contains(&b) {
            return None;
        }

        self.starts1.insert(a);
        self.starts2.insert(b);
        let result = self.common_stem(a, b, check_summary);
        self.starts1.remove(&a);
        self.starts2.remove(&b);
        result
    }

    fn common_stem(
        &mut self,
        a: VertexId,
        b: VertexId,
        check_summary: bool,
    ) -> Option<(VertexId, VertexId)> {
        let (ka, kb) = (self.vx(a).kind(), self.vx(b).kind());

        if ka != kb {
            return self.bridge_wrapper(a, b, check_summary);
        }

        if check_summary {
            let (ax, bx) = (self.vx(a), self.vx(b));
            if ax.hash != bx.hash || ax.depth != bx.depth || ax.vcnt != bx.vcnt {
                return None;
            }
        }

        match (self.vx(a).body, self.vx(b).body) {
            (VertexBody::Segment { .. }, VertexBody::Segment { .. }) => {}

            (
                VertexBody::Inosculation {
                    pp: pp1,
                    cp: cp1,
                    is_symmetric: sym1,
                },
                VertexBody::Inosculation {
                    pp: pp2,
                    cp: cp2,
                    is_symmetric: sym2,
                },
            ) => {
                if sym1 != sym2 {
                    return None;
                }
                let (e1, e2) = self.matched(pp1, pp2, true)?;
                if self.vx(e1).np != self.vx(e2).np {
                    return None;
                }
                let (e1, e2) = self.matched(cp1, cp2, true)?;
                if self.vx(e1).np != self.vx(e2).np {
                    return None;
                }
            }

            (VertexBody::Wrapper { wp: wp1 }, VertexBody::Wrapper { wp: wp2 }) => {
                let (e1, e2) = self.matched(wp1, wp2, true)?;
                if self.vx(e1).np != self.vx(e2).np {
                    return None;
                }
            }

            _ => unreachable!("variant tags already matched"),
        }

        // Extend along the stem; without an extension the match ends here.
        match self.matched(self.vx(a).np, self.vx(b).np, check_summary) {
            Some(ends) => Some(ends),
            None => Some((a, b)),
        }
    }

    /// Variant mismatch: only a wrapper can stand in for a bare stem. Its
    /// wrapped subgraph must match the other side completely (it is a
    /// detached unit, so the summary check is off); the comparison then
    /// continues behind the wrapper against the matched tail's successor.
    fn bridge_wrapper(
        &mut self,
        a: VertexId,
        b: VertexId,
        check_summary: bool,
    ) -> Option<(VertexId, VertexId)> {
        match (self.vx(a).body, self.vx(b).body) {
            (VertexBody::Wrapper { wp }, _) => {
                let (wend, oend) = self.matched(wp, Some(b), false)?;
                if self.vx(wend).np.is_some() {
                    // The wrapped stem only matched partially.
                    return None;
                }
                match self.matched(self.vx(a).np, self.vx(oend).np, check_summary) {
                    Some(ends) => Some(ends),
                    None => Some((a, oend)),
                }
            }
            (_, VertexBody::Wrapper { wp }) => {
                let (wend, oend) = self.matched(wp, Some(a), false)?;
                if self.vx(wend).np.is_some() {
                    return None;
                }
                match self.matched(self.vx(b).np, self.vx(oend).np, check_summary) {
                    Some((eb, ea)) => Some((ea, eb)),
                    None => Some((oend, b)),
                }
            }
            _ => None,
        }
    }
}

impl Model {
    /// Longest common stem prefix of the stems starting at `v1` and `v2`,
    /// as the pair of last matched vertices; `None` when no common prefix
    /// exists.
    ///
    /// `check_summary` enables the (hash, depth, vcnt) fast reject along
    /// the compared stem; it is forced back on inside branch and wrapped
    /// comparisons and forced off when a wrapped subgraph is matched
    /// against a bare stem.
    pub fn find_similar_stem(
        &self,
        v1: Option<VertexId>,
        v2: Option<VertexId>,
        check_summary: bool,
    ) -> Option<(VertexId, VertexId)> {
        StemMatcher::new(self).matched(v1, v2, check_summary)
    }

    /// Whether the PPMs starting at `v1` and `v2` are similar: a common
    /// stem covers both and the successors behind its ends agree.
    pub fn is_similar(
        &self,
        v1: Option<VertexId>,
        v2: Option<VertexId>,
        check_summary: bool,
    ) -> bool {
        if v1.is_none() {
            return v1 == v2;
        }
        match self.find_similar_stem(v1, v2, check_summary) {
            Some((e1, e2)) => self.vertex(e1).np == self.vertex(e2).np,
            None => false,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
