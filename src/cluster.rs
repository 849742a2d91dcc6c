//! Segment clustering: quantization and deduplication drivers.
//!
//! A cluster set partitions the segment vertices of one vertex group into
//! clusters of equal segments, under the segments' own notion of equality
//! (ratio-tolerant for raw segments, exact for bucketed ones). Two passes
//! use it: `compress` turns each raw cluster into bucketed segments
//! sharing a per-cluster dictionary pair, `remove_duplicates` collapses
//! each bucketed cluster onto one representative.

use tracing::debug;

use crate::classifier::{Dictionary, DictionaryStore, MAX_DICT_KEYS};
use crate::error::Result;
use crate::model::{GroupId, Model, VertexId};
use crate::segment::{
    BucketedSegment, BucketedSegmentStore, RawSegment, RawSegmentStore, SegmentRef, TaskKind,
};

/// Equality of the segments behind two segment vertices. Mixing shapes is
/// a programmer error.
fn segment_equal(
    model: &Model,
    a: VertexId,
    b: VertexId,
    raw: &RawSegmentStore,
    buck: &BucketedSegmentStore,
) -> bool {
    match (model.segment_ref(a), model.segment_ref(b)) {
        (SegmentRef::Raw(x), SegmentRef::Raw(y)) => raw.compare(x, y),
        (SegmentRef::Bucketed(x), SegmentRef::Bucketed(y)) => buck.compare(x, y),
        _ => panic!("comparing segments of different shapes"),
    }
}

/// Clusters of equal-segment vertices from one segment vertex group.
#[derive(Debug)]
pub struct ClusterSet {
    clusters: Vec<Vec<VertexId>>,
    k: f64,
}

impl ClusterSet {
    /// Partition the group's members, in insertion order: each vertex
    /// joins the first cluster whose representative (first member) has an
    /// equal segment, or opens a new cluster.
    pub fn from_group(
        model: &Model,
        group: GroupId,
        raw: &RawSegmentStore,
        buck: &BucketedSegmentStore,
        k: f64,
    ) -> Self {
        let mut clusters: Vec<Vec<VertexId>> = Vec::new();

        for &v in &model.group(group).members {
            let mut placed = false;
            for cluster in &mut clusters {
                if segment_equal(model, cluster[0], v, raw, buck) {
                    cluster.push(v);
                    placed = true;
                    break;
                }
            }
            if !placed {
                clusters.push(vec![v]);
            }
        }

        ClusterSet { clusters, k }
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn clusters(&self) -> &[Vec<VertexId>] {
        &self.clusters
    }

    /// Quantize every cluster: merge its members into a synthetic raw
    /// segment, build one dictionary per task kind from its sorted weight
    /// lists, re-encode each member as a bucketed segment against these
    /// dictionaries and repoint the member's container.
    ///
    /// The replaced raw segments stay registered with the raw store; the
    /// caller drops the whole store once every group is compressed.
    pub fn compress(
        &self,
        model: &mut Model,
        raw: &RawSegmentStore,
        buck: &mut BucketedSegmentStore,
        dicts: &mut DictionaryStore,
    ) -> Result<()> {
        for cluster in &self.clusters {
            let mut merged = RawSegment::new();
            for &v in cluster {
                let SegmentRef::Raw(sid) = model.segment_ref(v) else {
                    panic!("compress expects raw segments");
                };
                for task in raw.get(sid).tasks() {
                    merged.put(task)?;
                }
            }

            let lists = merged.to_weight_lists(true);
            let calc_dict = dicts.insert(Dictionary::build(
                lists.get(TaskKind::Calc),
                self.k,
                MAX_DICT_KEYS,
            )?);
            let com_dict = dicts.insert(Dictionary::build(
                lists.get(TaskKind::Com),
                self.k,
                MAX_DICT_KEYS,
            )?);

            for &v in cluster {
                let SegmentRef::Raw(sid) = model.segment_ref(v) else {
                    panic!("compress expects raw segments");
                };
                let bseg = BucketedSegment::from_raw(dicts, calc_dict, com_dict, raw.get(sid))?;
                let bid = buck.insert(bseg);
                model.set_vertex_segment(v, SegmentRef::Bucketed(bid));
            }

            debug!(
                members = cluster.len(),
                calc_buckets = dicts.get(calc_dict).len(),
                com_buckets = dicts.get(com_dict).len(),
                "cluster quantized"
            );
        }
        Ok(())
    }

    /// Collapse every cluster onto its first member's segment: the other
    /// members' segments are destroyed and their containers repointed at
    /// the representative.
    pub fn remove_duplicates(&self, model: &mut Model, buck: &mut BucketedSegmentStore) {
        for cluster in &self.clusters {
            let SegmentRef::Bucketed(rep) = model.segment_ref(cluster[0]) else {
                panic!("deduplication expects bucketed segments");
            };
            for &v in &cluster[1..] {
                let SegmentRef::Bucketed(sid) = model.segment_ref(v) else {
                    panic!("deduplication expects bucketed segments");
                };
                if sid == rep {
                    continue;
                }
                buck.remove(sid);
                model.set_vertex_segment(v, SegmentRef::Bucketed(rep));
            }
        }
    }
}

// ── Whole-model drivers ────────────────────────────────────────────

/// Cluster and quantize every segment vertex group of the model.
pub fn compress_segments(
    model: &mut Model,
    raw: &RawSegmentStore,
    buck: &mut BucketedSegmentStore,
    dicts: &mut DictionaryStore,
    k: f64,
) -> Result<()> {
    let groups: Vec<GroupId> = model.segment_groups().collect();
    for g in groups {
        let set = ClusterSet::from_group(model, g, raw, buck, k);
        set.compress(model, raw, buck, dicts)?;
    }
    debug!(
        segments = buck.len(),
        dictionaries = dicts.len(),
        "model quantized"
    );
    Ok(())
}

/// Cluster every segment vertex group by exact bucketed equality and drop
/// duplicate segments.
pub fn deduplicate_segments(
    model: &mut Model,
    raw: &RawSegmentStore,
    buck: &mut BucketedSegmentStore,
    k: f64,
) {
    let groups: Vec<GroupId> = model.segment_groups().collect();
    for g in groups {
        let set = ClusterSet::from_group(model, g, raw, buck, k);
        set.remove_duplicates(model, buck);
    }
    debug!(segments = buck.len(), "duplicate segments removed");
}

// ── Tests ──────────────────────────────────────────────────────────
