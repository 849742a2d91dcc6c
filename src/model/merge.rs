//! Merging of similar subtrees.
//!
//! Merging never changes the tree's flattened shape (apart from wrapping a
//! bare stem to line it up with a wrapper on the other side); its effect is
//! on the group level: corresponding vertices of the two subtrees end up in
//! shared groups, which is what contracts the model into a DAG.

use super::{Model, VertexBody, VertexId};

impl Model {
    /// Merge the similar subtrees starting at `v1` and `v2` by merging the
    /// groups of corresponding vertices, recursively.
    ///
    /// Precondition: the subtrees are similar (see
    /// [`Model::is_similar`]); violations are programmer errors and panic.
    pub fn merge_recursive(&mut self, v1: Option<VertexId>, v2: Option<VertexId>) {
        let (a, b) = match (v1, v2) {
            (Some(a), Some(b)) => (a, b),
            (None, None) => return,
            _ => panic!("merge of dissimilar subtrees: one side ends early"),
        };
        assert_ne!(a, b, "reflexive merge");

        if self.vertex(a).kind() != self.vertex(b).kind() {
            self.merge_across_wrapper(a, b);
            return;
        }

        match (self.vertex(a).body, self.vertex(b).body) {
            (VertexBody::Segment { .. }, VertexBody::Segment { .. }) => {}
            (
                VertexBody::Inosculation {
                    pp: pp1, cp: cp1, ..
                },
                VertexBody::Inosculation {
                    pp: pp2, cp: cp2, ..
                },
            ) => {
                self.merge_recursive(pp1, pp2);
                self.merge_recursive(cp1, cp2);
            }
            (VertexBody::Wrapper { wp: wp1 }, VertexBody::Wrapper { wp: wp2 }) => {
                self.merge_recursive(wp1, wp2);
            }
            _ => unreachable!("variant tags already matched"),
        }

        self.merge_recursive(self.vertex(a).np, self.vertex(b).np);

        let (ga, gb) = (self.vertex(a).group, self.vertex(b).group);
        tracing::trace!(
            into = self.group(ga).debug_id,
            from = self.group(gb).debug_id,
            "merging vertex groups"
        );
        self.merge_groups(ga, gb);
    }

    /// One side is a wrapper, the other a bare stem: wrap the bare side
    /// over the extent matched by the wrapper's content, then merge the
    /// two wrappers.
    fn merge_across_wrapper(&mut self, a: VertexId, b: VertexId) {
        let (wrap, other, wrap_is_first) = match (self.vertex(a).body, self.vertex(b).body) {
            (VertexBody::Wrapper { .. }, _) => (a, b, true),
            (_, VertexBody::Wrapper { .. }) => (b, a, false),
            _ => panic!("merge of dissimilar subtrees: variant mismatch without a wrapper"),
        };

        let (wend, oend) = self
            .find_similar_stem(self.wp(wrap), Some(other), false)
            .expect("merge precondition: wrapped stem must match the bare side");
        assert!(
            self.vertex(wend).np.is_none(),
            "merge precondition: wrapped stem must match to its end"
        );

        let new_wrap = self.wrap_section(other, oend);
        if wrap_is_first {
            self.merge_recursive(Some(a), Some(new_wrap));
        } else {
            self.merge_recursive(Some(new_wrap), Some(b));
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
