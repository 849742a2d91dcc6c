//! Bucketed task segments: dictionary-encoded letter streams.
//!
//! A bucketed segment is the quantized form of a raw segment. Each task
//! becomes one 16-bit letter: the low bit carries the task kind, the upper
//! 15 bits the key into that kind's dictionary. The segment keeps handles to
//! its two dictionaries and a summary of how far the encoding deviates from
//! the originating raw weights.

use std::fmt::Write as _;
use std::io::Write;

use crate::classifier::{DictId, DictionaryStore};
use crate::error::{PpmError, Result};
use crate::stats;

use super::raw::RawSegment;
use super::{BuckSegId, SegmentSummary, TaskKind, WeightLists, TASK_KIND_COUNT};

// ── Letter ─────────────────────────────────────────────────────────

/// One bucketed task: bit 0 is the task kind, bits 1..15 the dictionary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letter(u16);

impl Letter {
    pub fn new(kind: TaskKind, key: u16) -> Self {
        debug_assert!(key < 1 << 15, "dictionary key exceeds 15 bits");
        Letter((key << 1) | kind.index() as u16)
    }

    pub fn kind(self) -> TaskKind {
        TaskKind::from_index((self.0 & 1) as usize).expect("1-bit kind")
    }

    pub fn key(self) -> u16 {
        self.0 >> 1
    }

    pub fn as_u16(self) -> u16 {
        self.0
    }

    pub fn from_u16(v: u16) -> Self {
        Letter(v)
    }
}

// ── BucketedSegment ────────────────────────────────────────────────

/// A dictionary-encoded task segment.
#[derive(Debug, Clone)]
pub struct BucketedSegment {
    /// Per-kind dictionary handles (calc, com).
    dicts: [DictId; TASK_KIND_COUNT],
    /// Letters in the originating raw segment's task order.
    letters: Vec<Letter>,
    task_cnt: [usize; TASK_KIND_COUNT],
    summary: SegmentSummary,
}

impl BucketedSegment {
    /// Encode a raw segment against one dictionary per task kind.
    ///
    /// Fails with `Structural` when a raw weight lies outside its
    /// dictionary's domain (the dictionary was not built to cover it).
    pub fn from_raw(
        dicts: &DictionaryStore,
        calc_dict: DictId,
        com_dict: DictId,
        raw: &RawSegment,
    ) -> Result<Self> {
        let dict_ids = [calc_dict, com_dict];
        let mut letters = Vec::new();
        letters.try_reserve(raw.total_len())?;
        let mut task_cnt = [0usize; TASK_KIND_COUNT];

        for task in raw.tasks() {
            let dict = dicts.get(dict_ids[task.kind.index()]);
            let key = dict.key_from_value(task.weight).ok_or_else(|| {
                PpmError::structural(format!(
                    "weight {} of a {} task exceeds its dictionary domain",
                    task.weight,
                    task.kind.label()
                ))
            })?;
            letters.push(Letter::new(task.kind, key));
            task_cnt[task.kind.index()] += 1;
        }

        let mut seg = Self {
            dicts: dict_ids,
            letters,
            task_cnt,
            summary: SegmentSummary::default(),
        };
        seg.summary = seg.eval_against(dicts, raw);
        Ok(seg)
    }

    /// Compute the segment summary against the originating raw weights:
    /// per kind the total/average of the bucketed weights, the signed
    /// deviation sum, the mean absolute deviation and the dictionary size.
    fn eval_against(&self, dicts: &DictionaryStore, raw: &RawSegment) -> SegmentSummary {
        let buck = self.to_weight_lists(dicts, false);
        let orig = raw.to_weight_lists(false);

        let mut s = SegmentSummary::default();
        for kind in TaskKind::ALL {
            let i = kind.index();
            let (bw, rw) = (buck.get(kind), orig.get(kind));
            assert_eq!(bw.len(), rw.len(), "bucketed/raw task count mismatch");
            s.dict_size[i] = dicts.get(self.dicts[i]).len() as u32;
            if bw.is_empty() {
                continue;
            }

            s.sum[i] = bw.iter().sum();
            s.avg[i] = stats::mean(bw);

            let deltas: Vec<f64> = bw.iter().zip(rw).map(|(b, r)| b - r).collect();
            s.devi_sum[i] = deltas.iter().sum();
            let abs: Vec<f64> = deltas.iter().map(|d| d.abs()).collect();
            s.devi_mean[i] = stats::mean(&abs);
        }
        s
    }

    /// Exact equality: same dictionaries, same letter stream.
    pub fn compare(a: &BucketedSegment, b: &BucketedSegment) -> bool {
        if std::ptr::eq(a, b) {
            return true;
        }
        a.dicts == b.dicts && a.letters == b.letters
    }

    pub fn dict(&self, kind: TaskKind) -> DictId {
        self.dicts[kind.index()]
    }

    pub fn letters(&self) -> &[Letter] {
        &self.letters
    }

    /// Task count for one kind.
    pub fn size(&self, kind: TaskKind) -> usize {
        self.task_cnt[kind.index()]
    }

    /// Task count across all kinds.
    pub fn total_len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    pub fn summary(&self) -> SegmentSummary {
        self.summary
    }

    /// Decode the per-kind weight lists, optionally sorted ascending.
    pub fn to_weight_lists(&self, dicts: &DictionaryStore, sort: bool) -> WeightLists {
        let mut wl = WeightLists::default();
        for &letter in &self.letters {
            let value = dicts
                .get(self.dicts[letter.kind().index()])
                .value_from_key(letter.key())
                .expect("letter key outside its dictionary");
            wl.lists[letter.kind().index()].push(value);
        }
        if sort {
            wl.sort();
        }
        wl
    }

    /// Write the decoded weights of one kind, one per line.
    pub fn dump_weights<W: Write>(
        &self,
        dicts: &DictionaryStore,
        kind: TaskKind,
        w: &mut W,
    ) -> Result<()> {
        for &letter in self.letters.iter().filter(|l| l.kind() == kind) {
            let value = dicts
                .get(self.dicts[letter.kind().index()])
                .value_from_key(letter.key())
                .expect("letter key outside its dictionary");
            writeln!(w, "{}", value)?;
        }
        Ok(())
    }

    /// Human-readable rendering: the decoded letter stream, then each
    /// per-kind dictionary exactly once.
    pub fn describe(&self, dicts: &DictionaryStore) -> String {
        let mut out = String::new();
        for &letter in &self.letters {
            let value = dicts
                .get(self.dicts[letter.kind().index()])
                .value_from_key(letter.key())
                .expect("letter key outside its dictionary");
            let _ = write!(out, "{}={}, ", letter.kind().label(), value);
        }
        out.push('\n');
        for kind in TaskKind::ALL {
            let _ = writeln!(
                out,
                "\t{} {}",
                kind.label(),
                dicts.get(self.dicts[kind.index()]).describe()
            );
        }
        out
    }
}

// ── BucketedSegmentStore ───────────────────────────────────────────

/// Owner of all bucketed segments of one compression run. Removal
/// tombstones the slot; surviving handles stay valid.
#[derive(Debug, Default)]
pub struct BucketedSegmentStore {
    segs: Vec<Option<BucketedSegment>>,
    live: usize,
}

impl BucketedSegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, seg: BucketedSegment) -> BuckSegId {
        let id = BuckSegId(self.segs.len());
        self.segs.push(Some(seg));
        self.live += 1;
        id
    }

    pub fn get(&self, id: BuckSegId) -> &BucketedSegment {
        self.segs[id.0].as_ref().expect("dead bucketed segment handle")
    }

    pub fn remove(&mut self, id: BuckSegId) {
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
    pub fn iter(&self) -> impl Iterator<Item = (BuckSegId, &BucketedSegment)> {
        self.segs
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|seg| (BuckSegId(i), seg)))
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

    /// Exact equality of two stored segments.
    pub fn compare(&self, a: BuckSegId, b: BuckSegId) -> bool {
        BucketedSegment::compare(self.get(a), self.get(b))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
