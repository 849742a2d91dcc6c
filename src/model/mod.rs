//! The PPM intermediate representation.
//!
//! A model is a tree of vertices in three variants: *segment* vertices carry
//! a task segment (through a container indirection), *inosculation* vertices
//! carry two branches that rejoin (they originate from forks), *wrapper*
//! vertices encapsulate a contiguous stem as a detached unit. Every vertex
//! also chains to its successor along `np`; a chain of `np` links is a stem.
//!
//! Vertices live in an arena owned by [`Model`] and are addressed by
//! [`VertexId`] handles. Each vertex records the slot that points at it
//! ([`ParentSlot`]), so a wrapper can be spliced in place in O(1). Every
//! vertex belongs to a [`Group`] — an equivalence class of structurally
//! similar vertices. Mining merges groups; [`Model::link_groups`] then turns
//! the group set into the compressed DAG with one node per group.

pub mod builder;
mod merge;
mod similar;

pub use builder::{build_model, BuildOptions};

use serde::Serialize;

use crate::segment::{
    BucketedSegmentStore, RawSegmentStore, SegmentRef, SegmentSummary, TaskKind, TASK_KIND_COUNT,
};
use crate::stats;

/// Hash modulus: the largest prime at or below (2^31 − 1) / 2, so two
/// hashes always add without overflowing 31 bits.
pub(crate) const HASH_PRIME: u32 = 1_073_741_789;

// ── Handles ────────────────────────────────────────────────────────

/// Handle of a vertex inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexId(pub usize);

/// Handle of a vertex group inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

/// The slot a vertex is attached to: who points at it, and through which
/// edge. Replaces a pointer-to-pointer with a checked handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentSlot {
    /// The model head points at this vertex.
    Head,
    /// `np` of the given vertex.
    Np(VertexId),
    /// Parent branch of the given inosculation.
    Pp(VertexId),
    /// Child branch of the given inosculation.
    Cp(VertexId),
    /// Wrapped stem of the given wrapper.
    Wp(VertexId),
}

// ── Vertices ───────────────────────────────────────────────────────

/// Vertex variant tag (also the on-disk type code).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VertexKind {
    Segment = 0,
    Inosculation = 1,
    Wrapper = 2,
}

impl VertexKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Segment),
            1 => Some(Self::Inosculation),
            2 => Some(Self::Wrapper),
            _ => None,
        }
    }
}

/// Variant payload of a vertex.
#[derive(Debug, Clone, Copy)]
pub enum VertexBody {
    /// Index of the segment container this vertex displays.
    Segment { container: usize },
    /// Two branches that start here and rejoin after. `is_symmetric` is
    /// cached by evaluation: the branches form identical detached stems.
    Inosculation {
        pp: Option<VertexId>,
        cp: Option<VertexId>,
        is_symmetric: bool,
    },
    /// A contiguous stem, detached and represented as one unit.
    Wrapper { wp: Option<VertexId> },
}

/// One IR vertex.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub body: VertexBody,
    /// Successor on the stem.
    pub np: Option<VertexId>,
    /// The slot pointing at this vertex.
    pub parent_slot: ParentSlot,
    pub group: GroupId,
    /// Structural hash (additive, modulo [`HASH_PRIME`]). Wrappers are
    /// transparent: they hash to their wrapped stem.
    pub hash: u32,
    /// Longest path in this subtree. Wrappers contribute 0 themselves.
    pub depth: u32,
    /// Vertex count of this subtree. Wrappers contribute 0 themselves.
    pub vcnt: u32,
    pub evaluated: bool,
}

impl Vertex {
    pub fn kind(&self) -> VertexKind {
        match self.body {
            VertexBody::Segment { .. } => VertexKind::Segment,
            VertexBody::Inosculation { .. } => VertexKind::Inosculation,
            VertexBody::Wrapper { .. } => VertexKind::Wrapper,
        }
    }
}

// ── Groups ─────────────────────────────────────────────────────────

/// Edges of a group's compressed vertex, filled in by
/// [`Model::link_groups`]: the same shape as a vertex, but pointing at
/// groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressedVertex {
    pub np: Option<GroupId>,
    pub pp: Option<GroupId>,
    pub cp: Option<GroupId>,
    pub wp: Option<GroupId>,
}

/// An equivalence class of vertices of one variant.
#[derive(Debug, Clone)]
pub struct Group {
    pub kind: VertexKind,
    /// Members in insertion order. The group does not own the vertices.
    pub members: Vec<VertexId>,
    pub compressed: CompressedVertex,
    /// Stable debug id (creation order, survives merges).
    pub debug_id: u32,
}

// ── Containers ─────────────────────────────────────────────────────

/// Segment container: the indirection between segment vertices and
/// segments, so deduplication can repoint many vertices at one segment.
/// `pid` is the process the segment belongs to (serialization only).
#[derive(Debug, Clone, Copy)]
pub struct SegmentContainer {
    pub seg: SegmentRef,
    pub pid: i32,
}

// ── Model ──────────────────────────────────────────────────────────

/// Number of vertex variants.
pub const VERTEX_KIND_COUNT: usize = 3;

/// The PPM IR: vertex arena, group arena, segment containers and the head
/// of the tree.
#[derive(Debug, Default)]
pub struct Model {
    vertices: Vec<Vertex>,
    groups: Vec<Option<Group>>,
    live_groups: usize,
    containers: Vec<SegmentContainer>,
    head: Option<VertexId>,
    counts: [usize; VERTEX_KIND_COUNT],
    next_group_debug_id: u32,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<VertexId> {
        self.head
    }

    // ── Vertex access ──────────────────────────────────────────────

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.0]
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id.0]
    }

    /// Successor on the stem.
    pub fn np(&self, id: VertexId) -> Option<VertexId> {
        self.vertex(id).np
    }

    /// Parent branch of an inosculation vertex.
    pub fn pp(&self, id: VertexId) -> Option<VertexId> {
        match self.vertex(id).body {
            VertexBody::Inosculation { pp, .. } => pp,
            _ => panic!("pp of a non-inosculation vertex"),
        }
    }

    /// Child branch of an inosculation vertex.
    pub fn cp(&self, id: VertexId) -> Option<VertexId> {
        match self.vertex(id).body {
            VertexBody::Inosculation { cp, .. } => cp,
            _ => panic!("cp of a non-inosculation vertex"),
        }
    }

    /// Wrapped stem of a wrapper vertex.
    pub fn wp(&self, id: VertexId) -> Option<VertexId> {
        match self.vertex(id).body {
            VertexBody::Wrapper { wp } => wp,
            _ => panic!("wp of a non-wrapper vertex"),
        }
    }

    /// Per-variant vertex counts (segment, inosculation, wrapper).
    pub fn vertex_counts(&self) -> [usize; VERTEX_KIND_COUNT] {
        self.counts
    }

    pub fn vertex_count_total(&self) -> usize {
        self.counts.iter().sum()
    }

    // ── Vertex creation / splicing ─────────────────────────────────

    fn create_vertex(&mut self, body: VertexBody, slot: ParentSlot) -> VertexId {
        let kind = match body {
            VertexBody::Segment { .. } => VertexKind::Segment,
            VertexBody::Inosculation { .. } => VertexKind::Inosculation,
            VertexBody::Wrapper { .. } => VertexKind::Wrapper,
        };
        let vid = VertexId(self.vertices.len());
        let gid = GroupId(self.groups.len());

        self.groups.push(Some(Group {
            kind,
            members: vec![vid],
            compressed: CompressedVertex::default(),
            debug_id: self.next_group_debug_id,
        }));
        self.next_group_debug_id += 1;
        self.live_groups += 1;

        self.vertices.push(Vertex {
            body,
            np: None,
            parent_slot: slot,
            group: gid,
            hash: 0,
            depth: 0,
            vcnt: 0,
            evaluated: false,
        });
        self.counts[kind as usize] += 1;
        self.attach(slot, vid);
        vid
    }

    pub fn create_segment_vertex(&mut self, container: usize, slot: ParentSlot) -> VertexId {
        self.create_vertex(VertexBody::Segment { container }, slot)
    }

    pub fn create_inosculation_vertex(&mut self, slot: ParentSlot) -> VertexId {
        self.create_vertex(
            VertexBody::Inosculation {
                pp: None,
                cp: None,
                is_symmetric: false,
            },
            slot,
        )
    }

    fn create_wrapper_vertex(&mut self, slot: ParentSlot) -> VertexId {
        self.create_vertex(VertexBody::Wrapper { wp: None }, slot)
    }

    /// Point `slot` at `child` and record the slot on the child.
    pub(crate) fn attach(&mut self, slot: ParentSlot, child: VertexId) {
        match slot {
            ParentSlot::Head => self.head = Some(child),
            ParentSlot::Np(p) => self.vertex_mut(p).np = Some(child),
            ParentSlot::Pp(p) => match &mut self.vertex_mut(p).body {
                VertexBody::Inosculation { pp, .. } => *pp = Some(child),
                _ => panic!("Pp slot on a non-inosculation vertex"),
            },
            ParentSlot::Cp(p) => match &mut self.vertex_mut(p).body {
                VertexBody::Inosculation { cp, .. } => *cp = Some(child),
                _ => panic!("Cp slot on a non-inosculation vertex"),
            },
            ParentSlot::Wp(p) => match &mut self.vertex_mut(p).body {
                VertexBody::Wrapper { wp } => *wp = Some(child),
                _ => panic!("Wp slot on a non-wrapper vertex"),
            },
        }
        self.vertex_mut(child).parent_slot = slot;
    }

    /// Wrap the stem `from ..= until` into a new wrapper vertex.
    ///
    /// The wrapper takes `from`'s place; the wrapped stem is detached (its
    /// tail loses its successor, which becomes the wrapper's successor).
    /// Both endpoints must sit on the same stem.
    pub fn wrap_section(&mut self, from: VertexId, until: VertexId) -> VertexId {
        let mut cur = Some(from);
        while let Some(c) = cur {
            if c == until {
                break;
            }
            cur = self.vertex(c).np;
        }
        assert!(cur.is_some(), "wrap endpoints are not on the same stem");

        let slot = self.vertex(from).parent_slot;
        let w = self.create_wrapper_vertex(slot);
        self.attach(ParentSlot::Wp(w), from);

        let after = self.vertex(until).np;
        self.vertex_mut(until).np = None;
        if let Some(a) = after {
            self.vertex_mut(w).np = Some(a);
            self.vertex_mut(a).parent_slot = ParentSlot::Np(w);
        }

        self.eval_recursive(from, true);
        self.eval_recursive(w, false);

        tracing::debug!(
            wrapper = self.group(self.vertex(w).group).debug_id,
            single = (from == until),
            "wrapped stem section"
        );
        w
    }

    // ── Evaluation ─────────────────────────────────────────────────

    /// Assign structural hash, depth and vertex count bottom-up.
    ///
    /// With `force` the whole subtree is recomputed; otherwise subtrees
    /// whose `evaluated` flag is set are reused. The vertex itself is
    /// always recomputed. Inosculation symmetry is cached here.
    pub fn eval_recursive(&mut self, v: VertexId, force: bool) {
        let mut hash: u32;
        let mut depth: u32;
        let mut vcnt: u32;

        match self.vertex(v).body {
            VertexBody::Wrapper { wp } => {
                hash = 0;
                depth = 0;
                vcnt = 0;
                if let Some(w) = wp {
                    if force || !self.vertex(w).evaluated {
                        self.eval_recursive(w, force);
                    }
                    let wx = self.vertex(w);
                    hash = (hash + wx.hash) % HASH_PRIME;
                    depth += wx.depth;
                    vcnt += wx.vcnt;
                }
            }

            VertexBody::Inosculation { pp, cp, .. } => {
                hash = 1 << 15;
                depth = 1;
                vcnt = 1;
                let mut max_depth = 0;

                if let Some(p) = pp {
                    if force || !self.vertex(p).evaluated {
                        self.eval_recursive(p, force);
                    }
                    let px = self.vertex(p);
                    max_depth = px.depth;
                    vcnt += px.vcnt;
                    hash = (hash + px.hash) % HASH_PRIME;
                }
                if let Some(c) = cp {
                    if force || !self.vertex(c).evaluated {
                        self.eval_recursive(c, force);
                    }
                    let cx = self.vertex(c);
                    if cx.depth > max_depth {
                        max_depth = cx.depth;
                    }
                    vcnt += cx.vcnt;
                    hash = (hash + cx.hash) % HASH_PRIME;
                }
                depth += max_depth;

                let sym = self.is_similar(pp, cp, true);
                if let VertexBody::Inosculation { is_symmetric, .. } =
                    &mut self.vertex_mut(v).body
                {
                    *is_symmetric = sym;
                }
            }

            VertexBody::Segment { .. } => {
                hash = 1;
                depth = 1;
                vcnt = 1;
            }
        }

        if let Some(n) = self.vertex(v).np {
            if force || !self.vertex(n).evaluated {
                self.eval_recursive(n, force);
            }
            let nx = self.vertex(n);
            hash = (hash + nx.hash) % HASH_PRIME;
            depth += nx.depth;
            vcnt += nx.vcnt;
        }

        let vx = self.vertex_mut(v);
        vx.hash = hash;
        vx.depth = depth;
        vx.vcnt = vcnt;
        vx.evaluated = true;
    }

    /// Whether an inosculation vertex has symmetric branches, evaluating
    /// lazily if needed.
    pub fn insc_is_symmetric(&mut self, v: VertexId) -> bool {
        if !self.vertex(v).evaluated {
            self.eval_recursive(v, false);
        }
        match self.vertex(v).body {
            VertexBody::Inosculation { is_symmetric, .. } => is_symmetric,
            _ => panic!("symmetry query on a non-inosculation vertex"),
        }
    }

    // ── Groups ─────────────────────────────────────────────────────

    pub fn group(&self, id: GroupId) -> &Group {
        self.groups[id.0].as_ref().expect("dead group handle")
    }

    pub(crate) fn group_mut(&mut self, id: GroupId) -> &mut Group {
        self.groups[id.0].as_mut().expect("dead group handle")
    }

    /// Number of live groups (= vertices of the compressed DAG).
    pub fn group_count(&self) -> usize {
        self.live_groups
    }

    /// Live groups in creation order.
    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| g.as_ref().map(|g| (GroupId(i), g)))
    }

    /// Live groups of segment vertices, in creation order.
    pub fn segment_groups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.groups()
            .filter(|(_, g)| g.kind == VertexKind::Segment)
            .map(|(id, _)| id)
    }

    /// Merge group `from` into group `to`: members move over, their
    /// back-references are retargeted, `from` dies.
    pub fn merge_groups(&mut self, to: GroupId, from: GroupId) {
        if to == from {
            return;
        }
        assert_eq!(
            self.group(to).kind,
            self.group(from).kind,
            "merging groups of different variants"
        );

        let moved = std::mem::take(&mut self.group_mut(from).members);
        for &m in &moved {
            self.vertex_mut(m).group = to;
        }
        self.group_mut(to).members.extend(moved);
        self.groups[from.0] = None;
        self.live_groups -= 1;
    }

    /// Populate every group's compressed-vertex edges from one walk over
    /// the tree. Idempotent per edge; after this the group set is the
    /// compressed DAG.
    pub fn link_groups(&mut self) {
        if let Some(h) = self.head {
            self.link_groups_r(h);
        }
    }

    fn link_groups_r(&mut self, v: VertexId) -> GroupId {
        let gid = self.vertex(v).group;
        match self.vertex(v).body {
            VertexBody::Segment { .. } => {}
            VertexBody::Inosculation { pp, cp, .. } => {
                if self.group(gid).compressed.pp.is_none() {
                    let linked = pp.map(|p| self.link_groups_r(p));
                    self.group_mut(gid).compressed.pp = linked;
                }
                if self.group(gid).compressed.cp.is_none() {
                    let linked = cp.map(|c| self.link_groups_r(c));
                    self.group_mut(gid).compressed.cp = linked;
                }
            }
            VertexBody::Wrapper { wp } => {
                if self.group(gid).compressed.wp.is_none() {
                    let linked = wp.map(|w| self.link_groups_r(w));
                    self.group_mut(gid).compressed.wp = linked;
                }
            }
        }
        if self.group(gid).compressed.np.is_none() {
            let np = self.vertex(v).np;
            let linked = np.map(|n| self.link_groups_r(n));
            self.group_mut(gid).compressed.np = linked;
        }
        gid
    }

    /// Serialization indices of live groups (creation order, 0-based),
    /// indexed by group handle.
    pub fn group_index_map(&self) -> Vec<Option<u32>> {
        let mut next = 0u32;
        self.groups
            .iter()
            .map(|g| {
                g.as_ref().map(|_| {
                    let i = next;
                    next += 1;
                    i
                })
            })
            .collect()
    }

    // ── Segment containers ─────────────────────────────────────────

    pub fn add_container(&mut self, seg: SegmentRef, pid: i32) -> usize {
        self.containers.push(SegmentContainer { seg, pid });
        self.containers.len() - 1
    }

    pub fn container(&self, idx: usize) -> &SegmentContainer {
        &self.containers[idx]
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Container index of a segment vertex.
    pub fn container_index(&self, v: VertexId) -> usize {
        match self.vertex(v).body {
            VertexBody::Segment { container } => container,
            _ => panic!("container of a non-segment vertex"),
        }
    }

    /// Segment reference of a segment vertex (through its container).
    pub fn segment_ref(&self, v: VertexId) -> SegmentRef {
        self.containers[self.container_index(v)].seg
    }

    /// Repoint a segment vertex's container at another segment. Every
    /// vertex sharing the container observes the change.
    pub fn set_vertex_segment(&mut self, v: VertexId, seg: SegmentRef) {
        let idx = self.container_index(v);
        self.containers[idx].seg = seg;
    }

    // ── Model summary ──────────────────────────────────────────────

    /// Aggregate per-segment statistics over every segment vertex, walking
    /// the group list in creation order.
    pub fn summary(
        &self,
        raw: &RawSegmentStore,
        buck: &BucketedSegmentStore,
    ) -> ModelSummary {
        let mut per_seg: Vec<SegmentSummary> = Vec::new();
        for (_, g) in self.groups() {
            if g.kind != VertexKind::Segment {
                continue;
            }
            for &m in &g.members {
                per_seg.push(match self.segment_ref(m) {
                    SegmentRef::Raw(id) => raw.get(id).summary(),
                    SegmentRef::Bucketed(id) => buck.get(id).summary(),
                });
            }
        }

        let mut out = ModelSummary::default();
        for kind in TaskKind::ALL {
            let i = kind.index();

            let devi_sums: Vec<f64> = per_seg.iter().map(|s| s.devi_sum[i]).collect();
            out.devi_sum_total[i] = devi_sums.iter().sum();
            out.devi_sum_mean[i] = stats::mean(&devi_sums);
            out.devi_sum_stddev[i] = stats::stddev_m(&devi_sums, out.devi_sum_mean[i]);

            let devi_means: Vec<f64> = per_seg.iter().map(|s| s.devi_mean[i]).collect();
            out.devi_mean[i] = stats::mean(&devi_means);
            out.devi_mean_stddev[i] = stats::stddev_m(&devi_means, out.devi_mean[i]);

            let dict_sizes: Vec<f64> = per_seg.iter().map(|s| s.dict_size[i] as f64).collect();
            out.dict_size_total[i] = dict_sizes.iter().sum();
            out.dict_size_mean[i] = stats::mean(&dict_sizes);

            let seg_badness: Vec<f64> = per_seg
                .iter()
                .map(|s| if s.sum[i] != 0.0 { s.devi_sum[i] / s.sum[i] } else { 0.0 })
                .collect();
            out.seg_badness_mean[i] = stats::mean(&seg_badness);

            let task_badness: Vec<f64> = per_seg
                .iter()
                .map(|s| if s.avg[i] != 0.0 { s.devi_mean[i] / s.avg[i] } else { 0.0 })
                .collect();
            out.task_badness_mean[i] = stats::mean(&task_badness);
        }
        out
    }
}

/// Model-wide segment statistics, per task kind. Deviation is the
/// difference between the bucketed and the raw weight of a task.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModelSummary {
    /// Deviation sum across the whole model.
    pub devi_sum_total: [f64; TASK_KIND_COUNT],
    /// Mean of the per-segment deviation sums.
    pub devi_sum_mean: [f64; TASK_KIND_COUNT],
    /// Standard deviation of the per-segment deviation sums.
    pub devi_sum_stddev: [f64; TASK_KIND_COUNT],
    /// Mean of the per-segment mean absolute deviations.
    pub devi_mean: [f64; TASK_KIND_COUNT],
    /// Standard deviation of the per-segment mean absolute deviations.
    pub devi_mean_stddev: [f64; TASK_KIND_COUNT],
    /// Mean dictionary size over segments.
    pub dict_size_mean: [f64; TASK_KIND_COUNT],
    /// Total dictionary size over segments.
    pub dict_size_total: [f64; TASK_KIND_COUNT],
    /// Mean of per-segment devi_mean / avg.
    pub task_badness_mean: [f64; TASK_KIND_COUNT],
    /// Mean of per-segment devi_sum / sum.
    pub seg_badness_mean: [f64; TASK_KIND_COUNT],
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{RawSegId, SegmentRef};

    /// Chain of `n` segment vertices from the head, each with its own
    /// container.
    fn seg_chain(model: &mut Model, n: usize) -> Vec<VertexId> {
        let mut out = Vec::new();
        let mut slot = ParentSlot::Head;
        for i in 0..n {
            let cont = model.add_container(SegmentRef::Raw(RawSegId(i)), 1);
            let v = model.create_segment_vertex(cont, slot);
            slot = ParentSlot::Np(v);
            out.push(v);
        }
        out
    }

    /// In-order flattening of a stem with wrappers expanded in place.
    fn flatten(model: &Model, v: Option<VertexId>, out: &mut Vec<VertexId>) {
        let Some(v) = v else { return };
        match model.vertex(v).body {
            VertexBody::Wrapper { wp } => flatten(model, wp, out),
            _ => out.push(v),
        }
        flatten(model, model.np(v), out);
    }

    #[test]
    fn test_segment_vertex_eval() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 3);
        model.eval_recursive(vs[0], true);

        // Hash of a segment chain is the chain length (each contributes 1).
        assert_eq!(model.vertex(vs[0]).hash, 3);
        assert_eq!(model.vertex(vs[0]).depth, 3);
        assert_eq!(model.vertex(vs[0]).vcnt, 3);
        assert_eq!(model.vertex(vs[2]).hash, 1);
    }

    #[test]
    fn test_inosculation_eval_and_symmetry() {
        let mut model = Model::new();
        let c0 = model.add_container(SegmentRef::Raw(RawSegId(0)), 1);
        let c1 = model.add_container(SegmentRef::Raw(RawSegId(1)), 1);

        let i = model.create_inosculation_vertex(ParentSlot::Head);
        model.create_segment_vertex(c0, ParentSlot::Pp(i));
        model.create_segment_vertex(c1, ParentSlot::Cp(i));
        model.eval_recursive(i, true);

        let v = model.vertex(i);
        assert_eq!(v.hash, (1 << 15) + 2);
        assert_eq!(v.depth, 2);
        assert_eq!(v.vcnt, 3);
        assert!(model.insc_is_symmetric(i));
    }

    #[test]
    fn test_asymmetric_branches_not_symmetric() {
        let mut model = Model::new();
        let c0 = model.add_container(SegmentRef::Raw(RawSegId(0)), 1);
        let c1 = model.add_container(SegmentRef::Raw(RawSegId(1)), 1);
        let c2 = model.add_container(SegmentRef::Raw(RawSegId(2)), 1);

        let i = model.create_inosculation_vertex(ParentSlot::Head);
        model.create_segment_vertex(c0, ParentSlot::Pp(i));
        let cp1 = model.create_segment_vertex(c1, ParentSlot::Cp(i));
        model.create_segment_vertex(c2, ParentSlot::Np(cp1));
        model.eval_recursive(i, true);

        // pp is one segment, cp is a two-segment stem.
        assert!(!model.insc_is_symmetric(i));
        assert_eq!(model.vertex(i).depth, 3);
        assert_eq!(model.vertex(i).vcnt, 4);
    }

    #[test]
    fn test_eval_stability() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 4);
        model.eval_recursive(vs[0], true);
        let h = model.vertex(vs[0]).hash;
        let d = model.vertex(vs[0]).depth;
        let c = model.vertex(vs[0]).vcnt;

        model.eval_recursive(vs[0], false);
        assert_eq!(model.vertex(vs[0]).hash, h);
        assert_eq!(model.vertex(vs[0]).depth, d);
        assert_eq!(model.vertex(vs[0]).vcnt, c);

        model.eval_recursive(vs[0], true);
        assert_eq!(model.vertex(vs[0]).hash, h);
        assert_eq!(model.vertex(vs[0]).depth, d);
        assert_eq!(model.vertex(vs[0]).vcnt, c);
    }

    #[test]
    fn test_wrap_section_splices_in_place() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 4);
        model.eval_recursive(vs[0], true);

        let before: Vec<VertexId> = {
            let mut out = Vec::new();
            flatten(&model, model.head(), &mut out);
            out
        };

        // Wrap the middle two vertices.
        let w = model.wrap_section(vs[1], vs[2]);

        assert_eq!(model.np(vs[0]), Some(w));
        assert_eq!(model.wp(w), Some(vs[1]));
        assert_eq!(model.np(w), Some(vs[3]));
        assert_eq!(model.np(vs[2]), None);
        assert_eq!(model.vertex(vs[3]).parent_slot, ParentSlot::Np(w));
        assert_eq!(model.vertex(vs[1]).parent_slot, ParentSlot::Wp(w));

        // Wrapper is hash/depth/vcnt-transparent.
        assert_eq!(model.vertex(w).hash, 2 + 1); // wrapped two + successor
        model.eval_recursive(vs[0], true);
        assert_eq!(model.vertex(vs[0]).hash, 4);
        assert_eq!(model.vertex(vs[0]).depth, 4);
        assert_eq!(model.vertex(vs[0]).vcnt, 4);

        // In-order flattening is preserved.
        let mut after = Vec::new();
        flatten(&model, model.head(), &mut after);
        assert_eq!(before, after);
    }

    #[test]
    fn test_wrap_head_section_updates_head() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 2);
        model.eval_recursive(vs[0], true);

        let w = model.wrap_section(vs[0], vs[0]);
        assert_eq!(model.head(), Some(w));
        assert_eq!(model.vertex(w).parent_slot, ParentSlot::Head);
        assert_eq!(model.np(w), Some(vs[1]));
        // Wrapper hash equals the hash of its wrapped stem plus successor.
        assert_eq!(model.vertex(w).hash, 2);
    }

    #[test]
    fn test_merge_groups_moves_members() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 2);
        let (g0, g1) = (model.vertex(vs[0]).group, model.vertex(vs[1]).group);
        assert_ne!(g0, g1);
        assert_eq!(model.group_count(), 2);

        model.merge_groups(g0, g1);
        assert_eq!(model.group_count(), 1);
        assert_eq!(model.vertex(vs[1]).group, g0);
        assert_eq!(model.group(g0).members, vec![vs[0], vs[1]]);

        // Reflexive merge is a no-op.
        model.merge_groups(g0, g0);
        assert_eq!(model.group_count(), 1);
    }

    #[test]
    fn test_link_groups_builds_compressed_dag() {
        let mut model = Model::new();
        let c0 = model.add_container(SegmentRef::Raw(RawSegId(0)), 1);
        let c1 = model.add_container(SegmentRef::Raw(RawSegId(1)), 1);

        let i = model.create_inosculation_vertex(ParentSlot::Head);
        let p = model.create_segment_vertex(c0, ParentSlot::Pp(i));
        let c = model.create_segment_vertex(c1, ParentSlot::Cp(i));
        model.eval_recursive(i, true);

        // Both branch vertices into one group, as the miner would.
        let (gp, gc) = (model.vertex(p).group, model.vertex(c).group);
        model.merge_groups(gp, gc);
        model.link_groups();

        let gi = model.vertex(i).group;
        assert_eq!(model.group(gi).compressed.pp, Some(gp));
        assert_eq!(model.group(gi).compressed.cp, Some(gp));
        assert_eq!(model.group(gi).compressed.np, None);
        assert_eq!(model.group(gp).compressed.np, None);
    }

    #[test]
    fn test_container_redirection() {
        let mut model = Model::new();
        let cont = model.add_container(SegmentRef::Raw(RawSegId(7)), 3);
        let v = model.create_segment_vertex(cont, ParentSlot::Head);

        assert_eq!(model.segment_ref(v), SegmentRef::Raw(RawSegId(7)));
        model.set_vertex_segment(v, SegmentRef::Raw(RawSegId(9)));
        assert_eq!(model.segment_ref(v), SegmentRef::Raw(RawSegId(9)));
        assert_eq!(model.container(cont).pid, 3);
    }

    #[test]
    fn test_vertex_counts() {
        let mut model = Model::new();
        let vs = seg_chain(&mut model, 2);
        model.eval_recursive(vs[0], true);
        model.wrap_section(vs[0], vs[0]);
        assert_eq!(model.vertex_counts(), [2, 0, 1]);
        assert_eq!(model.vertex_count_total(), 3);
    }
}
