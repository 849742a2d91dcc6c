//! Task segments — the weight-carrying payload of the PPM tree.
//!
//! A segment is a maximal run of calc/com tasks from a single process. Two
//! concrete shapes exist: [`raw::RawSegment`] holds the original weights,
//! [`bucketed::BucketedSegment`] holds dictionary-encoded letters. Segment
//! vertices refer to segments indirectly through [`SegmentRef`] handles so
//! that deduplication can repoint many vertices at one representative.

pub mod bucketed;
pub mod raw;

pub use bucketed::{BucketedSegment, BucketedSegmentStore, Letter};
pub use raw::{CompareOpts, RawSegment, RawSegmentStore};

use serde::Serialize;

// ── Task kinds ─────────────────────────────────────────────────────

/// Number of task kinds a segment distinguishes.
pub const TASK_KIND_COUNT: usize = 2;

/// Kind of a weighted task inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskKind {
    Calc = 0,
    Com = 1,
}

impl TaskKind {
    pub const ALL: [TaskKind; TASK_KIND_COUNT] = [TaskKind::Calc, TaskKind::Com];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        match i {
            0 => Some(Self::Calc),
            1 => Some(Self::Com),
            _ => None,
        }
    }

    /// Short label used in debug dumps.
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Calc => "cal",
            TaskKind::Com => "com",
        }
    }
}

/// One weighted task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task {
    pub kind: TaskKind,
    pub weight: f64,
}

// ── Weight lists ───────────────────────────────────────────────────

/// Per-kind weight lists extracted from a segment (the quantizer input).
#[derive(Debug, Clone, Default)]
pub struct WeightLists {
    pub lists: [Vec<f64>; TASK_KIND_COUNT],
}

impl WeightLists {
    pub fn get(&self, kind: TaskKind) -> &[f64] {
        &self.lists[kind.index()]
    }

    /// Sort every per-kind list ascending.
    pub fn sort(&mut self) {
        for list in &mut self.lists {
            list.sort_by(|a, b| a.partial_cmp(b).expect("NaN weight in segment"));
        }
    }
}

// ── Segment summary ────────────────────────────────────────────────

/// Per-segment statistics, indexed by task kind. Deviation fields are only
/// meaningful for bucketed segments (deviation = bucketed − raw weight) and
/// stay zero on raw segments.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SegmentSummary {
    /// Sum of the individual task deviations.
    pub devi_sum: [f64; TASK_KIND_COUNT],
    /// Average absolute task deviation.
    pub devi_mean: [f64; TASK_KIND_COUNT],
    /// Size of the dictionary the segment is encoded against.
    pub dict_size: [u32; TASK_KIND_COUNT],
    /// Total requirement.
    pub sum: [f64; TASK_KIND_COUNT],
    /// Average requirement.
    pub avg: [f64; TASK_KIND_COUNT],
}

// ── Segment handles ────────────────────────────────────────────────

/// Handle of a raw segment inside a [`RawSegmentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSegId(pub usize);

/// Handle of a bucketed segment inside a [`BucketedSegmentStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuckSegId(pub usize);

/// Shape-tagged segment reference, as stored in a segment container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRef {
    Raw(RawSegId),
    Bucketed(BuckSegId),
}
