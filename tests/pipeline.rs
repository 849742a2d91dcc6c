//! End-to-end pipeline scenarios: parse → build → mine → quantize →
//! deduplicate → serialize, plus round-trip and determinism checks.

use std::io::Write;

use ppmc::classifier::DictionaryStore;
use ppmc::cluster::{compress_segments, deduplicate_segments};
use ppmc::miner;
use ppmc::model::{build_model, BuildOptions, Model, VertexKind};
use ppmc::parser::parse_model;
use ppmc::segment::{BucketedSegmentStore, RawSegmentStore, SegmentRef, TaskKind};
use ppmc::wire::{self, ModelFile, SegmentBlock};

const MU_MAX: f64 = 1.25;
const SIGMA_MAX: f64 = 1.25;
const K: f64 = 0.04;

fn build(input: &str) -> (Model, RawSegmentStore) {
    let table = parse_model(input.as_bytes()).expect("parse");
    let mut raw = RawSegmentStore::new(MU_MAX, SIGMA_MAX);
    let model = build_model(&table, BuildOptions::default(), &mut raw).expect("build");
    (model, raw)
}

fn mine_all(model: &mut Model) {
    miner::mine_symmetric(model);
    miner::mine_asymmetric(model);
    miner::mine_recurrence(model);
}

/// Full pipeline; returns the raw and the compressed file images.
fn run_pipeline(input: &str, k: f64) -> (Vec<u8>, Vec<u8>) {
    let (mut model, raw) = build(input);

    let mut raw_file = Vec::new();
    wire::export_raw(&mut model, &raw, &mut raw_file).expect("raw export");

    mine_all(&mut model);

    let mut buck = BucketedSegmentStore::new();
    let mut dicts = DictionaryStore::new();
    compress_segments(&mut model, &raw, &mut buck, &mut dicts, k).expect("compress");
    deduplicate_segments(&mut model, &raw, &mut buck, k);

    let mut comp_file = Vec::new();
    wire::export_bucketed(&mut model, &buck, &dicts, &mut comp_file).expect("comp export");
    (raw_file, comp_file)
}

// ── Scenario: minimal sequential model ─────────────────────────────

const MINIMAL: &str = "1 1 0 0 -> 2\n\
     2 1 4 0 2.0 -> 3\n\
     3 1 4 0 2.0 -> 4\n\
     4 1 1 0\n";

#[test]
fn minimal_sequential_model() {
    let (mut model, raw) = build(MINIMAL);

    // One segment vertex with two calc weights.
    assert_eq!(model.vertex_counts(), [1, 0, 0]);
    let head = model.head().unwrap();
    let SegmentRef::Raw(sid) = model.segment_ref(head) else {
        panic!("expected a raw segment");
    };
    assert_eq!(raw.get(sid).size(TaskKind::Calc), 2);

    // Mining changes nothing on a single-vertex model.
    mine_all(&mut model);
    assert_eq!(model.vertex_counts(), [1, 0, 0]);
    assert_eq!(model.group_count(), 1);

    // k = 0.04 over weights {2, 2}: one bucket, letters (calc, 0) twice.
    let mut buck = BucketedSegmentStore::new();
    let mut dicts = DictionaryStore::new();
    compress_segments(&mut model, &raw, &mut buck, &mut dicts, K).expect("compress");

    let SegmentRef::Bucketed(bid) = model.segment_ref(head) else {
        panic!("expected a bucketed segment");
    };
    let seg = buck.get(bid);
    let letters: Vec<(TaskKind, u16)> = seg.letters().iter().map(|l| (l.kind(), l.key())).collect();
    assert_eq!(letters, vec![(TaskKind::Calc, 0), (TaskKind::Calc, 0)]);
    assert_eq!(dicts.get(seg.dict(TaskKind::Calc)).len(), 1);
    assert_eq!(dicts.get(seg.dict(TaskKind::Calc)).value_from_key(0), Some(2.0));
}

#[test]
fn minimal_sequential_raw_roundtrip() {
    let (mut model, raw) = build(MINIMAL);
    let mut buf = Vec::new();
    wire::export_raw(&mut model, &raw, &mut buf).expect("export");

    let file = ModelFile::from_bytes(&buf).expect("reparse");
    assert_eq!(file.containers.len(), 1);
    assert_eq!(file.containers[0].pid, 1);
    assert_eq!(file.groups.len(), 1);
    assert_eq!(file.groups[0].kind, VertexKind::Segment.code());
    assert_eq!(file.groups[0].next, -1);

    let SegmentBlock::Raw(segs) = &file.segments else {
        panic!("expected raw segments");
    };
    assert_eq!(segs[0].tasks, vec![(0, 2.0), (0, 2.0)]);
}

// ── Scenario: symmetric fork ───────────────────────────────────────

const SYMMETRIC_FORK: &str = "1 1 0 0 -> 2\n\
     2 1 2 0 -> 3 0 0 -> 6\n\
     3 1 4 0 1.0 -> 4\n\
     4 1 4 0 1.0 -> 5\n\
     5 1 10 0 -> 9\n\
     6 2 4 0 1.0 -> 7\n\
     7 2 4 0 1.0 -> 8\n\
     8 2 10 0 -> 9\n\
     9 1 3 0 -> 10\n\
     10 1 1 0\n";

#[test]
fn symmetric_fork_merges_branch_groups() {
    let (mut model, _raw) = build(SYMMETRIC_FORK);

    let head = model.head().unwrap();
    assert_eq!(model.vertex(head).kind(), VertexKind::Inosculation);
    assert!(model.insc_is_symmetric(head));
    assert_eq!(model.group_count(), 3);

    miner::mine_symmetric(&mut model);

    assert_eq!(model.group_count(), 2);
    let (p, c) = (model.pp(head).unwrap(), model.cp(head).unwrap());
    assert_eq!(model.vertex(p).group, model.vertex(c).group);
}

// ── Scenario: asymmetric subtree reuse ─────────────────────────────

/// The child branch carries an extra prefix before repeating the parent
/// branch's structure; the pid change splits it into two segments.
const ASYMMETRIC_REUSE: &str = "1 1 0 0 -> 2\n\
     2 1 2 0 -> 3 0 0 -> 6\n\
     3 1 4 0 1.0 -> 4\n\
     4 1 4 0 1.0 -> 5\n\
     5 1 10 0 -> 12\n\
     6 2 4 0 2.0 -> 7\n\
     7 2 4 0 2.0 -> 8\n\
     8 3 4 0 1.0 -> 9\n\
     9 3 4 0 1.0 -> 10\n\
     10 3 10 0 -> 12\n\
     12 1 3 0 -> 13\n\
     13 1 1 0\n";

#[test]
fn asymmetric_reuse_merges_tail_group() {
    let (mut model, _raw) = build(ASYMMETRIC_REUSE);
    let head = model.head().unwrap();
    assert!(!model.insc_is_symmetric(head));

    miner::mine_symmetric(&mut model);
    miner::mine_asymmetric(&mut model);

    let p = model.pp(head).unwrap();
    let c = model.cp(head).unwrap();
    let c_tail = model.np(c).unwrap();
    assert_eq!(model.vertex(p).group, model.vertex(c_tail).group);
    assert_ne!(model.vertex(p).group, model.vertex(c).group);
}

// ── Scenario: recurrence along a stem ──────────────────────────────

/// Three identical two-task segments on one stem (pids keep them apart).
const RECURRENCE: &str = "1 1 0 0 -> 2\n\
     2 1 4 0 1.0 -> 3\n\
     3 1 4 0 1.0 -> 4\n\
     4 2 4 0 1.0 -> 5\n\
     5 2 4 0 1.0 -> 6\n\
     6 3 4 0 1.0 -> 7\n\
     7 3 4 0 1.0 -> 8\n\
     8 3 1 0\n";

#[test]
fn recurrence_wraps_and_merges_repetitions() {
    let (mut model, _raw) = build(RECURRENCE);
    assert_eq!(model.vertex_counts(), [3, 0, 0]);

    miner::mine_recurrence(&mut model);

    assert_eq!(model.vertex_counts(), [3, 0, 3]);
    // One wrapper group + one segment group.
    assert_eq!(model.group_count(), 2);

    let w1 = model.head().unwrap();
    let w2 = model.np(w1).unwrap();
    let w3 = model.np(w2).unwrap();
    for w in [w1, w2, w3] {
        assert_eq!(model.vertex(w).kind(), VertexKind::Wrapper);
    }
    assert_eq!(model.np(w3), None);
    assert_eq!(model.vertex(w1).group, model.vertex(w2).group);
    assert_eq!(model.vertex(w2).group, model.vertex(w3).group);

    // The inner segments share one group.
    let s1 = model.wp(w1).unwrap();
    let s3 = model.wp(w3).unwrap();
    assert_eq!(model.vertex(s1).group, model.vertex(s3).group);

    // With no successor the wrapper's hash is exactly its wrapped stem's.
    assert_eq!(model.vertex(w3).hash, model.vertex(s3).hash);
}

// ── Scenario: bucketization forcing a split ────────────────────────

/// One segment with calc weights {1,1,1,10,10,10}; k = 0.1 forces two
/// buckets.
const BIMODAL: &str = "1 1 0 0 -> 2\n\
     2 1 4 0 1.0 -> 3\n\
     3 1 4 0 1.0 -> 4\n\
     4 1 4 0 1.0 -> 5\n\
     5 1 4 0 10.0 -> 6\n\
     6 1 4 0 10.0 -> 7\n\
     7 1 4 0 10.0 -> 8\n\
     8 1 1 0\n";

#[test]
fn bimodal_weights_split_into_two_buckets() {
    let (mut model, raw) = build(BIMODAL);
    mine_all(&mut model);

    let mut buck = BucketedSegmentStore::new();
    let mut dicts = DictionaryStore::new();
    compress_segments(&mut model, &raw, &mut buck, &mut dicts, 0.1).expect("compress");

    let head = model.head().unwrap();
    let SegmentRef::Bucketed(bid) = model.segment_ref(head) else {
        panic!("expected a bucketed segment");
    };
    let seg = buck.get(bid);
    let dict = dicts.get(seg.dict(TaskKind::Calc));

    assert_eq!(dict.len(), 2);
    assert_eq!(dict.value_from_key(0), Some(1.0));
    assert_eq!(dict.value_from_key(1), Some(10.0));
    assert_eq!(dict.key_from_value(1.0), Some(0));
    assert_eq!(dict.key_from_value(10.0), Some(1));
    assert_eq!(dict.key_from_value(2.0), Some(1));

    let keys: Vec<u16> = seg.letters().iter().map(|l| l.key()).collect();
    assert_eq!(keys, vec![0, 0, 0, 1, 1, 1]);
}

// ── Scenario: dedup across isomorphic segments ─────────────────────

/// Symmetric fork whose branches are ratio-equivalent (4.0 vs 5.0 per
/// task: ratio 1.25) but not identical.
const ISOMORPHIC: &str = "1 1 0 0 -> 2\n\
     2 1 2 0 -> 3 0 0 -> 6\n\
     3 1 4 0 4.0 -> 4\n\
     4 1 4 0 4.0 -> 5\n\
     5 1 10 0 -> 9\n\
     6 2 4 0 5.0 -> 7\n\
     7 2 4 0 5.0 -> 8\n\
     8 2 10 0 -> 9\n\
     9 1 3 0 -> 10\n\
     10 1 1 0\n";

#[test]
fn dedup_collapses_ratio_equivalent_segments() {
    let (mut model, raw) = build(ISOMORPHIC);
    mine_all(&mut model);

    let head = model.head().unwrap();
    let (p, c) = (model.pp(head).unwrap(), model.cp(head).unwrap());
    assert_eq!(model.vertex(p).group, model.vertex(c).group);

    let mut buck = BucketedSegmentStore::new();
    let mut dicts = DictionaryStore::new();
    compress_segments(&mut model, &raw, &mut buck, &mut dicts, 10.0).expect("compress");

    // Same dictionaries, same letters: byte-equal bucketed segments.
    let (SegmentRef::Bucketed(a), SegmentRef::Bucketed(b)) =
        (model.segment_ref(p), model.segment_ref(c))
    else {
        panic!("expected bucketed segments");
    };
    assert!(buck.compare(a, b));
    assert_eq!(buck.len(), 2);

    deduplicate_segments(&mut model, &raw, &mut buck, 10.0);
    assert_eq!(buck.len(), 1);
    assert_eq!(model.segment_ref(p), model.segment_ref(c));

    // The file records both containers pointing at the one segment.
    let mut file = Vec::new();
    wire::export_bucketed(&mut model, &buck, &dicts, &mut file).expect("export");
    let parsed = ModelFile::from_bytes(&file).expect("reparse");
    assert_eq!(parsed.containers.len(), 2);
    assert_eq!(parsed.containers[0].segid, parsed.containers[1].segid);
    assert_eq!(parsed.segment_count(), 1);
}

// ── Round-trip through a real file ─────────────────────────────────

#[test]
fn raw_file_roundtrip_preserves_structure() {
    let (mut model, raw) = build(SYMMETRIC_FORK);
    let mut buf = Vec::new();
    wire::export_raw(&mut model, &raw, &mut buf).expect("export");

    let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
    tmp.write_all(&buf).expect("write");
    tmp.flush().expect("flush");

    let file = ModelFile::open(tmp.path()).expect("open");

    // Containers in DFS order: pp branch (pid 1) then cp branch (pid 2).
    let pids: Vec<u32> = file.containers.iter().map(|c| c.pid).collect();
    assert_eq!(pids, vec![1, 2]);

    // Before mining every vertex is a singleton group; the packed graph
    // is the tree itself.
    assert_eq!(file.groups.len(), model.vertex_count_total());
    let insc = file
        .groups
        .iter()
        .find(|g| g.kind == VertexKind::Inosculation.code())
        .expect("inosculation group");
    assert_ne!(insc.a, -1);
    assert_ne!(insc.b, -1);

    // Segment payloads survive byte-exactly.
    let SegmentBlock::Raw(segs) = &file.segments else {
        panic!("expected raw segments");
    };
    assert_eq!(segs.len(), 2);
    for seg in segs {
        assert_eq!(seg.tasks, vec![(0, 1.0), (0, 1.0)]);
    }
}

// ── Determinism ────────────────────────────────────────────────────

#[test]
fn pipeline_is_deterministic() {
    for input in [MINIMAL, SYMMETRIC_FORK, ASYMMETRIC_REUSE, RECURRENCE, ISOMORPHIC] {
        let (raw_a, comp_a) = run_pipeline(input, K);
        let (raw_b, comp_b) = run_pipeline(input, K);
        assert_eq!(raw_a, raw_b, "raw export differs");
        assert_eq!(comp_a, comp_b, "compressed export differs");
        assert!(
            ModelFile::from_bytes(&comp_a).is_ok(),
            "compressed file must reparse"
        );
    }
}

// ── Compression actually shrinks repetitive models ─────────────────

#[test]
fn compression_shrinks_repetitive_model() {
    let mut input = String::from("1 1 0 0 -> 2\n");
    let n = 40;
    for i in 0..n {
        let task = 2 + i;
        let pid = 1 + (i % 2);
        input.push_str(&format!("{} {} 4 0 3.0 -> {}\n", task, pid, task + 1));
    }
    input.push_str(&format!("{} {} 1 0\n", 2 + n, 1 + ((n - 1) % 2)));

    let (raw_file, comp_file) = run_pipeline(&input, K);
    assert!(
        comp_file.len() < raw_file.len(),
        "compressed ({} B) not smaller than raw ({} B)",
        comp_file.len(),
        raw_file.len()
    );
}
