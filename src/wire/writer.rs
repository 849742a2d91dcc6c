//! Binary model serialization.
//!
//! Layouts (all little-endian, packed):
//!
//! ```text
//! container block   u32 count, then count × { u32 segid, u32 pid }
//!                   (containers in DFS order over the tree)
//! group block       u32 count, then count × { u8 type, i32 ni, i32 a, i32 b }
//!                   (a, b) = (pi, ci) for inosculations, (wi, -1) for
//!                   wrappers, (-1, -1) for segments
//! raw segments      u8 class = 1, u32 n, then n × { u32 k, k × { u8 kind,
//!                   f64 weight } }
//! bucketed segments u8 class = 2, u32 n, then n × { u32 k, u32 calc_dict,
//!                   u32 com_dict, k × u16 letter }
//! dictionaries      u32 d, then d × { u32 size, size × f64 supremum,
//!                   size × f64 mean }
//! ```
//!
//! Raw file: containers + groups + raw segments. Bucketed file: containers
//! + groups + bucketed segments + dictionaries.

use std::io::Write;

use tracing::debug;

use crate::classifier::DictionaryStore;
use crate::error::Result;
use crate::model::{Model, VertexBody, VertexId};
use crate::segment::{BucketedSegmentStore, RawSegmentStore, SegmentRef, TaskKind};

use super::{BUCKETED_CLASS_ID, NO_EDGE, RAW_CLASS_ID};

// ── PPM block ──────────────────────────────────────────────────────

/// Collect (segid, pid) for every segment vertex in DFS order.
fn pack_containers(
    model: &Model,
    v: Option<VertexId>,
    seg_index: &impl Fn(SegmentRef) -> u32,
    out: &mut Vec<(u32, u32)>,
) {
    let Some(v) = v else { return };
    match model.vertex(v).body {
        VertexBody::Segment { container } => {
            let cont = model.container(container);
            out.push((seg_index(cont.seg), cont.pid as u32));
        }
        VertexBody::Inosculation { pp, cp, .. } => {
            pack_containers(model, pp, seg_index, out);
            pack_containers(model, cp, seg_index, out);
        }
        VertexBody::Wrapper { wp } => {
            pack_containers(model, wp, seg_index, out);
        }
    }
    pack_containers(model, model.np(v), seg_index, out);
}

fn write_container_block<W: Write>(
    model: &Model,
    seg_index: &impl Fn(SegmentRef) -> u32,
    w: &mut W,
) -> Result<u64> {
    let mut packed = Vec::new();
    pack_containers(model, model.head(), seg_index, &mut packed);
    assert_eq!(
        packed.len(),
        model.container_count(),
        "every container must be reachable exactly once"
    );

    w.write_all(&(packed.len() as u32).to_le_bytes())?;
    for (segid, pid) in &packed {
        w.write_all(&segid.to_le_bytes())?;
        w.write_all(&pid.to_le_bytes())?;
    }
    Ok(4 + 8 * packed.len() as u64)
}

fn write_group_block<W: Write>(model: &mut Model, w: &mut W) -> Result<u64> {
    model.link_groups();
    let index = model.group_index_map();
    let edge = |g: Option<crate::model::GroupId>| -> i32 {
        g.map(|g| index[g.0].expect("linked group must be live") as i32)
            .unwrap_or(NO_EDGE)
    };

    w.write_all(&(model.group_count() as u32).to_le_bytes())?;
    let mut written = 0usize;
    for (_, group) in model.groups() {
        let c = &group.compressed;
        let (a, b) = match group.kind {
            crate::model::VertexKind::Segment => (NO_EDGE, NO_EDGE),
            crate::model::VertexKind::Inosculation => (edge(c.pp), edge(c.cp)),
            crate::model::VertexKind::Wrapper => (edge(c.wp), NO_EDGE),
        };
        w.write_all(&[group.kind.code()])?;
        w.write_all(&edge(c.np).to_le_bytes())?;
        w.write_all(&a.to_le_bytes())?;
        w.write_all(&b.to_le_bytes())?;
        written += 1;
    }
    assert_eq!(written, model.group_count());
    Ok(4 + 13 * written as u64)
}

// ── Segment blocks ─────────────────────────────────────────────────

fn write_raw_block<W: Write>(raw: &RawSegmentStore, w: &mut W) -> Result<u64> {
    w.write_all(&[RAW_CLASS_ID])?;
    w.write_all(&(raw.len() as u32).to_le_bytes())?;
    let mut total = 5u64;

    for (_, seg) in raw.iter() {
        w.write_all(&(seg.total_len() as u32).to_le_bytes())?;
        total += 4;
        for task in seg.tasks() {
            w.write_all(&[task.kind.index() as u8])?;
            w.write_all(&task.weight.to_le_bytes())?;
            total += 9;
        }
    }
    Ok(total)
}

fn write_bucketed_block<W: Write>(buck: &BucketedSegmentStore, w: &mut W) -> Result<u64> {
    w.write_all(&[BUCKETED_CLASS_ID])?;
    w.write_all(&(buck.len() as u32).to_le_bytes())?;
    let mut total = 5u64;

    for (_, seg) in buck.iter() {
        w.write_all(&(seg.total_len() as u32).to_le_bytes())?;
        w.write_all(&(seg.dict(TaskKind::Calc).0 as u32).to_le_bytes())?;
        w.write_all(&(seg.dict(TaskKind::Com).0 as u32).to_le_bytes())?;
        total += 12;
        for letter in seg.letters() {
            w.write_all(&letter.as_u16().to_le_bytes())?;
            total += 2;
        }
    }
    Ok(total)
}

fn write_dict_block<W: Write>(dicts: &DictionaryStore, w: &mut W) -> Result<u64> {
    w.write_all(&(dicts.len() as u32).to_le_bytes())?;
    let mut total = 4u64;

    for (_, dict) in dicts.iter() {
        w.write_all(&(dict.len() as u32).to_le_bytes())?;
        total += 4;
        for &s in dict.supremums() {
            w.write_all(&s.to_le_bytes())?;
        }
        for &m in dict.means() {
            w.write_all(&m.to_le_bytes())?;
        }
        total += 16 * dict.len() as u64;
    }
    Ok(total)
}

// ── Entry points ───────────────────────────────────────────────────

/// Serialize the uncompressed model (raw segments). Returns the number of
/// bytes written.
pub fn export_raw<W: Write>(
    model: &mut Model,
    raw: &RawSegmentStore,
    w: &mut W,
) -> Result<u64> {
    let index = raw.index_map();
    let seg_index = |r: SegmentRef| -> u32 {
        match r {
            SegmentRef::Raw(id) => index[id.0].expect("unregistered raw segment"),
            SegmentRef::Bucketed(_) => panic!("raw export over a bucketed segment"),
        }
    };

    let mut total = write_container_block(model, &seg_index, w)?;
    total += write_group_block(model, w)?;
    total += write_raw_block(raw, w)?;
    w.flush()?;

    debug!(bytes = total, "raw model exported");
    Ok(total)
}

/// Serialize the compressed model (bucketed segments plus their
/// dictionaries). Returns the number of bytes written.
pub fn export_bucketed<W: Write>(
    model: &mut Model,
    buck: &BucketedSegmentStore,
    dicts: &DictionaryStore,
    w: &mut W,
) -> Result<u64> {
    let index = buck.index_map();
    let seg_index = |r: SegmentRef| -> u32 {
        match r {
            SegmentRef::Bucketed(id) => index[id.0].expect("unregistered bucketed segment"),
            SegmentRef::Raw(_) => panic!("bucketed export over a raw segment"),
        }
    };

    let mut total = write_container_block(model, &seg_index, w)?;
    total += write_group_block(model, w)?;
    total += write_bucketed_block(buck, w)?;
    total += write_dict_block(dicts, w)?;
    w.flush()?;

    debug!(bytes = total, "bucketed model exported");
    Ok(total)
}

// ── Tests ──────────────────────────────────────────────────────────
