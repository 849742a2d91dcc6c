//! Binary model parsing.
//!
//! Reads both file flavours back into plain data (containers, packed
//! groups, segment payloads, dictionaries) for verification, round-trip
//! testing and downstream tooling. Validates tags, counts and index
//! ranges; corrupt input surfaces as `InvalidFormat`.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{PpmError, Result};
use crate::segment::TASK_KIND_COUNT;

use super::{ByteCursor, BUCKETED_CLASS_ID, NO_EDGE, RAW_CLASS_ID};

// ── Packed records ─────────────────────────────────────────────────

/// One container record: segment index + process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedContainer {
    pub segid: u32,
    pub pid: u32,
}

/// One compressed-graph vertex (a group): type code and edge indices,
/// [`NO_EDGE`] when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedGroup {
    pub kind: u8,
    pub next: i32,
    pub a: i32,
    pub b: i32,
}

/// Raw segment payload: (kind, weight) per task, in segment order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegmentData {
    pub tasks: Vec<(u8, f64)>,
}

/// Bucketed segment payload: dictionary indices and the letter stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedSegmentData {
    pub calc_dict: u32,
    pub com_dict: u32,
    pub letters: Vec<u16>,
}

/// Serialized dictionary arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryData {
    pub supremum: Vec<f64>,
    pub mean: Vec<f64>,
}

/// The segment part of a model file, by class tag.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentBlock {
    Raw(Vec<RawSegmentData>),
    Bucketed {
        segments: Vec<BucketedSegmentData>,
        dictionaries: Vec<DictionaryData>,
    },
}

/// A parsed binary model file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFile {
    pub containers: Vec<PackedContainer>,
    pub groups: Vec<PackedGroup>,
    pub segments: SegmentBlock,
}

impl ModelFile {
    /// Parse a model file from a memory-mapped path.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(PpmError::Io)?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(PpmError::Io)?;
        Self::from_bytes(&mmap)
    }

    /// Parse a model file from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut c = ByteCursor::new(bytes);

        let containers = read_containers(&mut c)?;
        let groups = read_groups(&mut c)?;
        let segments = read_segment_block(&mut c)?;

        if c.remaining() != 0 {
            return Err(PpmError::InvalidFormat(format!(
                "{} trailing bytes after the model",
                c.remaining()
            )));
        }

        let file = Self {
            containers,
            groups,
            segments,
        };
        file.validate()?;
        Ok(file)
    }

    /// Number of segments in the segment block.
    pub fn segment_count(&self) -> usize {
        match &self.segments {
            SegmentBlock::Raw(segs) => segs.len(),
            SegmentBlock::Bucketed { segments, .. } => segments.len(),
        }
    }

    fn validate(&self) -> Result<()> {
        let group_count = self.groups.len() as i64;
        for (i, g) in self.groups.iter().enumerate() {
            if g.kind > 2 {
                return Err(PpmError::InvalidFormat(format!(
                    "group {} has unknown type {}",
                    i, g.kind
                )));
            }
            for edge in [g.next, g.a, g.b] {
                if edge != NO_EDGE && (edge < 0 || i64::from(edge) >= group_count) {
                    return Err(PpmError::InvalidFormat(format!(
                        "group {} references group {} of {}",
                        i, edge, group_count
                    )));
                }
            }
        }

        let seg_count = self.segment_count() as u32;
        for (i, cont) in self.containers.iter().enumerate() {
            if cont.segid >= seg_count {
                return Err(PpmError::InvalidFormat(format!(
                    "container {} references segment {} of {}",
                    i, cont.segid, seg_count
                )));
            }
        }

        if let SegmentBlock::Bucketed {
            segments,
            dictionaries,
        } = &self.segments
        {
            let dict_count = dictionaries.len() as u32;
            for (i, seg) in segments.iter().enumerate() {
                if seg.calc_dict >= dict_count || seg.com_dict >= dict_count {
                    return Err(PpmError::InvalidFormat(format!(
                        "segment {} references a dictionary out of range",
                        i
                    )));
                }
                for &letter in &seg.letters {
                    let kind = (letter & 1) as usize;
                    let key = u32::from(letter >> 1);
                    debug_assert!(kind < TASK_KIND_COUNT);
                    let dict = if kind == 0 { seg.calc_dict } else { seg.com_dict };
                    if key as usize >= dictionaries[dict as usize].supremum.len() {
                        return Err(PpmError::InvalidFormat(format!(
                            "segment {} holds a letter outside its dictionary",
                            i
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

// ── Block readers ──────────────────────────────────────────────────

fn read_containers(c: &mut ByteCursor) -> Result<Vec<PackedContainer>> {
    let count = c.read_u32("container count")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(PackedContainer {
            segid: c.read_u32("container segment index")?,
            pid: c.read_u32("container pid")?,
        });
    }
    Ok(out)
}

fn read_groups(c: &mut ByteCursor) -> Result<Vec<PackedGroup>> {
    let count = c.read_u32("vertex count")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(PackedGroup {
            kind: c.read_u8("vertex type")?,
            next: c.read_i32("next index")?,
            a: c.read_i32("first edge index")?,
            b: c.read_i32("second edge index")?,
        });
    }
    Ok(out)
}

fn read_segment_block(c: &mut ByteCursor) -> Result<SegmentBlock> {
    let class = c.read_u8("segment class id")?;
    match class {
        RAW_CLASS_ID => {
            let n = c.read_u32("segment count")? as usize;
            let mut segs = Vec::with_capacity(n);
            for _ in 0..n {
                let k = c.read_u32("task count")? as usize;
                let mut tasks = Vec::with_capacity(k);
                for _ in 0..k {
                    let kind = c.read_u8("task kind")?;
                    if kind as usize >= TASK_KIND_COUNT {
                        return Err(PpmError::InvalidFormat(format!(
                            "unknown task kind {}",
                            kind
                        )));
                    }
                    let weight = c.read_f64("task weight")?;
                    tasks.push((kind, weight));
                }
                segs.push(RawSegmentData { tasks });
            }
            Ok(SegmentBlock::Raw(segs))
        }

        BUCKETED_CLASS_ID => {
            let n = c.read_u32("segment count")? as usize;
            let mut segments = Vec::with_capacity(n);
            for _ in 0..n {
                let k = c.read_u32("letter count")? as usize;
                let calc_dict = c.read_u32("calc dictionary index")?;
                let com_dict = c.read_u32("com dictionary index")?;
                let mut letters = Vec::with_capacity(k);
                for _ in 0..k {
                    letters.push(c.read_u16("letter")?);
                }
                segments.push(BucketedSegmentData {
                    calc_dict,
                    com_dict,
                    letters,
                });
            }
            let dictionaries = read_dictionaries(c)?;
            Ok(SegmentBlock::Bucketed {
                segments,
                dictionaries,
            })
        }

        other => Err(PpmError::InvalidFormat(format!(
            "unknown segment class id {}",
            other
        ))),
    }
}

fn read_dictionaries(c: &mut ByteCursor) -> Result<Vec<DictionaryData>> {
    let count = c.read_u32("dictionary count")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let size = c.read_u32("dictionary size")? as usize;
        let mut supremum = Vec::with_capacity(size);
        for _ in 0..size {
            supremum.push(c.read_f64("dictionary supremum")?);
        }
        let mut mean = Vec::with_capacity(size);
        for _ in 0..size {
            mean.push(c.read_f64("dictionary mean")?);
        }
        out.push(DictionaryData { supremum, mean });
    }
    Ok(out)
}

// ── Tests ──────────────────────────────────────────────────────────
