//! Raw task segments: growable per-kind weight lists with cached statistics.
//!
//! A raw segment records tasks in insertion order. Weights live in one list
//! per task kind; a parallel kind list preserves the original interleaving so
//! iteration yields tasks exactly as they were appended.

use std::fmt::Write as _;
use std::io::Write;

use crate::error::Result;
use crate::stats;

use super::{RawSegId, SegmentSummary, Task, TaskKind, WeightLists, TASK_KIND_COUNT};

// ── RawSegment ─────────────────────────────────────────────────────

/// Per-kind weight list with iteration cursor and cached statistics.
#[derive(Debug, Clone, Default)]
struct KindList {
    weights: Vec<f64>,
    cursor: usize,
    avg: f64,
    stddev: f64,
    sum: f64,
}

/// A raw (unquantized) task segment.
#[derive(Debug, Clone, Default)]
pub struct RawSegment {
    /// Interleaved per-task kind list, in insertion order.
    kinds: Vec<TaskKind>,
    lists: [KindList; TASK_KIND_COUNT],
}

impl RawSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Allocation failure surfaces as `OutOfMemory`.
    pub fn put(&mut self, task: Task) -> Result<()> {
        self.kinds.try_reserve(1)?;
        let list = &mut self.lists[task.kind.index()];
        list.weights.try_reserve(1)?;

        self.kinds.push(task.kind);
        list.weights.push(task.weight);
        Ok(())
    }

    /// Yield the next task in insertion order, or `None` past the end.
    pub fn next(&mut self) -> Option<Task> {
        let consumed: usize = self.lists.iter().map(|l| l.cursor).sum();
        let kind = *self.kinds.get(consumed)?;
        let list = &mut self.lists[kind.index()];
        let weight = list.weights[list.cursor];
        list.cursor += 1;
        Some(Task { kind, weight })
    }

    /// Reset the iteration cursors.
    pub fn rewind(&mut self) {
        for list in &mut self.lists {
            list.cursor = 0;
        }
    }

    /// Iterate tasks in insertion order without touching the cursors.
    pub fn tasks(&self) -> impl Iterator<Item = Task> + '_ {
        let mut taken = [0usize; TASK_KIND_COUNT];
        self.kinds.iter().map(move |&kind| {
            let i = taken[kind.index()];
            taken[kind.index()] += 1;
            Task {
                kind,
                weight: self.lists[kind.index()].weights[i],
            }
        })
    }

    /// Task count for one kind.
    pub fn size(&self, kind: TaskKind) -> usize {
        self.lists[kind.index()].weights.len()
    }

    /// Task count across all kinds.
    pub fn total_len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Recompute the cached per-kind statistics. Must be called again after
    /// the segment is mutated.
    pub fn eval(&mut self) {
        for list in &mut self.lists {
            list.avg = stats::mean(&list.weights);
            list.stddev = stats::stddev_m(&list.weights, list.avg);
            list.sum = list.weights.iter().sum();
        }
    }

    pub fn avg(&self, kind: TaskKind) -> f64 {
        self.lists[kind.index()].avg
    }

    pub fn stddev(&self, kind: TaskKind) -> f64 {
        self.lists[kind.index()].stddev
    }

    pub fn sum(&self, kind: TaskKind) -> f64 {
        self.lists[kind.index()].sum
    }

    /// Extract the per-kind weight lists, optionally sorted ascending.
    pub fn to_weight_lists(&self, sort: bool) -> WeightLists {
        let mut wl = WeightLists::default();
        for kind in TaskKind::ALL {
            wl.lists[kind.index()] = self.lists[kind.index()].weights.clone();
        }
        if sort {
            wl.sort();
        }
        wl
    }

    /// Segment summary: only total and average requirement are defined for
    /// the raw shape (cached stats must be current, see [`Self::eval`]).
    pub fn summary(&self) -> SegmentSummary {
        let mut s = SegmentSummary::default();
        for kind in TaskKind::ALL {
            s.sum[kind.index()] = self.sum(kind);
            s.avg[kind.index()] = self.avg(kind);
        }
        s
    }

    /// Write the weights of one kind, one per line (plot/export format).
    pub fn dump_weights<W: Write>(&self, kind: TaskKind, w: &mut W) -> Result<()> {
        for task in self.tasks().filter(|t| t.kind == kind) {
            writeln!(w, "{}", task.weight)?;
        }
        Ok(())
    }

    /// One-line human-readable rendering.
    pub fn describe(&self) -> String {
        let mut out = format!("len={}\t{{", self.total_len());
        for task in self.tasks() {
            let _ = write!(out, ",{}={}", task.kind.label(), task.weight);
        }
        out.push('}');
        out
    }
}

// ── Comparison ─────────────────────────────────────────────────────

/// Ratio tolerances for raw-segment similarity, shared by a whole store.
#[derive(Debug, Clone, Copy)]
pub struct CompareOpts {
    pub mu_max: f64,
    pub sigma_max: f64,
}

/// True when the larger of two non-negative statistics is within `max`
/// ratio of the smaller. A zero on one side requires a zero on the other.
fn ratio_within(a: f64, b: f64, max: f64) -> bool {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if lo == 0.0 {
        return hi == 0.0;
    }
    hi / lo <= max
}

/// Ratio-tolerant raw-segment equality: per kind the task counts must match
/// and mean and standard deviation must each lie within the configured
/// ratio bounds; the interleaved kind sequences must be identical.
pub fn compare(a: &RawSegment, b: &RawSegment, opts: &CompareOpts) -> bool {
    for kind in TaskKind::ALL {
        let (la, lb) = (&a.lists[kind.index()], &b.lists[kind.index()]);
        if la.weights.len() != lb.weights.len() {
            return false;
        }
        if la.weights.is_empty() {
            continue;
        }
        if !ratio_within(la.avg, lb.avg, opts.mu_max) {
            return false;
        }
        if !ratio_within(la.stddev, lb.stddev, opts.sigma_max) {
            return false;
        }
    }
    a.kinds == b.kinds
}

// ── RawSegmentStore ────────────────────────────────────────────────

/// Owner of all raw segments of one model run. Hands out stable handles;
/// removal tombstones the slot so surviving handles stay valid.
#[derive(Debug)]
pub struct RawSegmentStore {
    segs: Vec<Option<RawSegment>>,
    live: usize,
    opts: CompareOpts,
}

impl RawSegmentStore {
    pub fn new(mu_max: f64, sigma_max: f64) -> Self {
        Self {
            segs: Vec::new(),
            live: 0,
            opts: CompareOpts { mu_max, sigma_max },
        }
    }

    pub fn opts(&self) -> &CompareOpts {
        &self.opts
    }

    pub fn insert(&mut self, seg: RawSegment) -> RawSegId {
        let id = RawSegId(self.segs.len());
        self.segs.push(Some(seg));
        self.live += 1;
        id
    }

    pub fn get(&self, id: RawSegId) -> &RawSegment {
        self.segs[id.0].as_ref().expect("dead raw segment handle")
    }

    pub fn get_mut(&mut self, id: RawSegId) -> &mut RawSegment {
        self.segs[id.0].as_mut().expect("dead raw segment handle")
    }

    pub fn remove(&mut self, id: RawSegId) {
        if self.segs[id.0].take().is_some() {
            self.live -= 1;
        }
    }

    /// Number of live segments.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live segments in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (RawSegId, &RawSegment)> {
        self.segs
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|seg| (RawSegId(i), seg)))
    }

    /// Serialization indices of live segments (insertion order, 0-based),
    /// indexed by handle.
    pub fn index_map(&self) -> Vec<Option<u32>> {
        let mut next = 0u32;
        self.segs
            .iter()
            .map(|s| {
                s.as_ref().map(|_| {
                    let i = next;
                    next += 1;
                    i
                })
            })
            .collect()
    }

    /// Ratio-tolerant equality of two stored segments.
    pub fn compare(&self, a: RawSegId, b: RawSegId) -> bool {
        compare(self.get(a), self.get(b), &self.opts)
    }

    /// Append all of `src`'s tasks to `dst`, in `src`'s iteration order.
    pub fn merge(&mut self, dst: RawSegId, src: RawSegId) -> Result<()> {
        let tasks: Vec<Task> = self.get(src).tasks().collect();
        let d = self.get_mut(dst);
        for t in tasks {
            d.put(t)?;
        }
        Ok(())
    }

    /// Average task count over the live segments.
    pub fn mean_len(&self) -> f64 {
        let lens: Vec<f64> = self.iter().map(|(_, s)| s.total_len() as f64).collect();
        stats::mean(&lens)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
